use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::Component;

/// Checks that a dependency (database, cache, RPC peer) accepts TCP
/// connections before the service is considered up, then idles until
/// cancelled.
pub struct TcpProbeComponent {
    name: &'static str,
    target: String,
    connect_timeout: Duration,
}

impl TcpProbeComponent {
    pub fn new(name: &'static str, target: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            name,
            target: target.into(),
            connect_timeout,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    async fn dial(&self) -> anyhow::Result<()> {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.target)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(anyhow::anyhow!("dial {}: {}", self.target, e)),
            Err(_) => Err(anyhow::anyhow!(
                "dial {}: timed out after {}ms",
                self.target,
                self.connect_timeout.as_millis()
            )),
        }
    }
}

#[async_trait]
impl Component for TcpProbeComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return Ok(()),
            res = self.dial() => res?,
        }
        tracing::info!(component = self.name, target = %self.target, "Dependency reachable");

        cancel.cancelled().await;
        Ok(())
    }

    async fn teardown(&self, _deadline: Duration) -> anyhow::Result<()> {
        tracing::debug!(component = self.name, "Probe stopped");
        Ok(())
    }
}
