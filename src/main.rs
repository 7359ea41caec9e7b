use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use app_lifecycle::components::{HttpServerComponent, Job, SchedulerComponent, TcpProbeComponent};
use app_lifecycle::config::AppConfig;
use app_lifecycle::lifecycle::{App, AppOptions};
use async_trait::async_trait;

#[derive(Parser)]
#[command(name = "app-lifecycle")]
#[command(about = "Runs a set of service components under one lifecycle supervisor")]
struct Cli {
    /// TOML config file. Defaults to the per-user config dir if present.
    #[arg(long, env = "APP_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Default per-component teardown budget in seconds.
    #[arg(long, env = "SHUTDOWN_TIMEOUT")]
    shutdown_timeout: Option<u64>,

    #[arg(long)]
    print_config: bool,
}

struct HeartbeatJob {
    schedule: String,
}

#[async_trait]
impl Job for HeartbeatJob {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn schedule(&self) -> &str {
        &self.schedule
    }

    async fn run(&self) -> anyhow::Result<()> {
        tracing::info!("heartbeat");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::resolve(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(secs) = cli.shutdown_timeout {
        config.shutdown_timeout_secs = secs;
    }
    config.validate()?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .with_writer(std::io::stderr)
        .init();

    let jitter = config.startup_jitter();
    if !jitter.is_zero() {
        tracing::info!(jitter_ms = jitter.as_millis() as u64, "Delaying startup");
        tokio::time::sleep(jitter).await;
    }

    tracing::info!("Starting service...");

    let mut app = App::with_options(AppOptions {
        shutdown_timeout: config.shutdown_timeout(),
        span: tracing::info_span!("app", service = "app-lifecycle"),
    });

    // Dependencies first so they are torn down last.
    for probe in &config.probes {
        // Component names are process-lifetime diagnostics.
        let name: &'static str = Box::leak(probe.name.clone().into_boxed_str());
        app.register(
            Arc::new(TcpProbeComponent::new(
                name,
                probe.address.clone(),
                probe.connect_timeout(),
            )),
            probe.teardown_timeout(),
        );
    }

    if config.scheduler.enabled {
        let heartbeat: Arc<dyn Job> = Arc::new(HeartbeatJob {
            schedule: config.scheduler.heartbeat_schedule.clone(),
        });
        app.register(
            Arc::new(SchedulerComponent::new(vec![heartbeat])),
            config.scheduler.teardown_timeout(),
        );
    }

    if config.http.enabled {
        let server = HttpServerComponent::new(config.http.socket_addr()?, axum::Router::new())
            .with_request_timeout(config.http.request_timeout());
        app.register(Arc::new(server), config.http.teardown_timeout());
    }

    if let Err(e) = app.run().await {
        tracing::error!(
            component = e.failed_component().unwrap_or("app"),
            error = %e,
            "Application failed"
        );
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
