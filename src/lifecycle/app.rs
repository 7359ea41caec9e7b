use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::shutdown::TeardownOutcome;
use super::signals::TerminationSignals;
use super::{Component, ComponentRegistry, ShutdownCoordinator, StartupCoordinator};
use crate::types::{AppError, Result};

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Idle,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Teardown budget for components with neither an explicit nor an
    /// advertised deadline.
    pub shutdown_timeout: Duration,
    /// Every lifecycle log line is emitted inside this span.
    pub span: tracing::Span,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            span: tracing::info_span!("app"),
        }
    }
}

/// Supervises a set of components for one run.
///
/// Registration happens on `&mut self`; `run`/`run_until` consume the app, so
/// it cannot be re-run or extended once started.
pub struct App {
    registry: ComponentRegistry,
    options: AppOptions,
    phase_tx: watch::Sender<LifecyclePhase>,
}

impl App {
    pub fn new() -> Self {
        Self::with_options(AppOptions::default())
    }

    pub fn with_options(options: AppOptions) -> Self {
        let (phase_tx, _) = watch::channel(LifecyclePhase::Idle);
        Self {
            registry: ComponentRegistry::new(),
            options,
            phase_tx,
        }
    }

    pub fn with_shutdown_timeout(timeout: Duration) -> Self {
        Self::with_options(AppOptions {
            shutdown_timeout: timeout,
            ..AppOptions::default()
        })
    }

    pub fn register<C: Component + 'static>(
        &mut self,
        component: Arc<C>,
        teardown_deadline: Option<Duration>,
    ) -> &mut Self {
        self.register_dyn(component, teardown_deadline)
    }

    /// Register an already type-erased component.
    pub fn register_dyn(
        &mut self,
        component: Arc<dyn Component>,
        teardown_deadline: Option<Duration>,
    ) -> &mut Self {
        self.registry.register(component, teardown_deadline);
        self
    }

    pub fn add<C: Component + 'static>(&mut self, component: Arc<C>) -> &mut Self {
        self.register(component, None)
    }

    pub fn add_with_deadline<C: Component + 'static>(
        &mut self,
        component: Arc<C>,
        deadline: Duration,
    ) -> &mut Self {
        self.register(component, Some(deadline))
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn phase_receiver(&self) -> watch::Receiver<LifecyclePhase> {
        self.phase_tx.subscribe()
    }

    /// Run until SIGINT/SIGTERM or the first component failure.
    ///
    /// Signal listeners are installed here and stay installed through drain and
    /// teardown, so a repeated signal is absorbed. The default dispositions are
    /// restored when this returns.
    pub async fn run(self) -> Result<()> {
        let mut signals = TerminationSignals::install()?;
        let span = self.options.span.clone();
        let result = self
            .run_until(async {
                let signal = signals.recv().await;
                tracing::info!(parent: &span, signal, "Termination signal observed");
            })
            .await;
        drop(signals);
        result
    }

    /// Run until `shutdown` resolves or the first component failure.
    ///
    /// Returns the first component failure, if there was one: the failure that
    /// triggered shutdown, or else the first entry routine to fail while
    /// draining. The error displays as the component's own message; use
    /// [`AppError::failed_component`] and [`AppError::component_error`] for
    /// the parts. Teardown errors are only logged.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let span = self.options.span.clone();
        self.supervise(shutdown).instrument(span).await
    }

    async fn supervise<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        self.set_phase(LifecyclePhase::Starting);
        let cancel = CancellationToken::new();
        let mut startup = StartupCoordinator::launch(&self.registry, cancel.clone());
        self.set_phase(LifecyclePhase::Running);
        tracing::info!(components = self.registry.len(), "Application running");

        let mut first_failure = wait_for_trigger(&mut startup, shutdown).await;

        self.set_phase(LifecyclePhase::ShuttingDown);
        cancel.cancel();

        for exit in startup.drain().await {
            let Err(e) = exit.result else { continue };
            if first_failure.is_none() {
                tracing::error!(
                    component = exit.name,
                    error = %e,
                    "Component failed while draining"
                );
                first_failure = Some((exit.name, e));
            } else {
                tracing::warn!(
                    component = exit.name,
                    error = %e,
                    "Component failed after shutdown was requested"
                );
            }
        }

        let reports = ShutdownCoordinator::new(self.options.shutdown_timeout)
            .teardown(&self.registry)
            .await;
        let clean = reports
            .iter()
            .filter(|r| r.outcome == TeardownOutcome::Completed)
            .count();

        self.set_phase(LifecyclePhase::Stopped);
        tracing::info!(clean, total = reports.len(), "Application stopped");

        match first_failure {
            Some((component, error)) => Err(AppError::ComponentFailed { component, error }),
            None => Ok(()),
        }
    }

    fn set_phase(&self, phase: LifecyclePhase) {
        self.phase_tx.send_replace(phase);
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocks until the external trigger fires or an entry routine fails.
/// Components that return `Ok` early are recorded and do not end the wait.
async fn wait_for_trigger<F>(
    startup: &mut StartupCoordinator,
    shutdown: F,
) -> Option<(&'static str, anyhow::Error)>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                return None;
            }
            Some(exit) = startup.next_exit(), if startup.has_pending() => {
                if let Err(e) = exit.result {
                    tracing::error!(
                        component = exit.name,
                        error = %e,
                        "Component error before shutdown"
                    );
                    return Some((exit.name, e));
                }
            }
        }
    }
}
