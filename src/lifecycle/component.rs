use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A long-running subsystem supervised by [`App`](super::App).
///
/// `run` is the entry routine: it performs whatever setup is needed to become
/// ready, then blocks until `cancel` fires and returns `Ok(())`. Any setup
/// failure or internal fault must be returned straight away as an error.
///
/// `teardown` is called exactly once per registration after every entry
/// routine has returned, in reverse registration order.
#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred teardown budget. `None` means the component does not
    /// advertise one and the orchestrator default applies.
    fn teardown_deadline(&self) -> Option<Duration> {
        None
    }

    async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()>;

    /// Release resources. Should keep cleaning up past partial failures and
    /// report the first error it hit.
    async fn teardown(&self, deadline: Duration) -> anyhow::Result<()>;
}
