use super::ComponentRegistry;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownOutcome {
    Completed,
    Failed(String),
    Panicked(String),
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct TeardownReport {
    pub name: &'static str,
    pub deadline: Duration,
    pub outcome: TeardownOutcome,
}

/// Tears registered components down one at a time, last registered first.
pub struct ShutdownCoordinator {
    default_deadline: Duration,
}

impl ShutdownCoordinator {
    pub fn new(default_deadline: Duration) -> Self {
        Self { default_deadline }
    }

    /// Must only be called once every entry routine has returned.
    ///
    /// A teardown that overruns its deadline is left running in the
    /// background; the coordinator stops waiting and moves on.
    pub async fn teardown(&self, registry: &ComponentRegistry) -> Vec<TeardownReport> {
        let mut reports = Vec::with_capacity(registry.len());

        for entry in registry.entries().iter().rev() {
            let name = entry.name();
            let deadline = entry.effective_deadline(self.default_deadline);
            tracing::info!(
                component = name,
                timeout_ms = deadline.as_millis() as u64,
                "Stopping component"
            );

            let component = Arc::clone(entry.component());
            let handle = tokio::spawn(async move { component.teardown(deadline).await });

            let outcome = match tokio::time::timeout(deadline, handle).await {
                Ok(Ok(Ok(()))) => TeardownOutcome::Completed,
                Ok(Ok(Err(e))) => {
                    tracing::error!(component = name, error = %e, "Stop error");
                    TeardownOutcome::Failed(format!("{:#}", e))
                }
                Ok(Err(e)) => {
                    tracing::error!(component = name, error = %e, "Stop panicked");
                    TeardownOutcome::Panicked(e.to_string())
                }
                Err(_) => {
                    tracing::warn!(
                        component = name,
                        timeout_ms = deadline.as_millis() as u64,
                        "Stop timed out"
                    );
                    TeardownOutcome::TimedOut
                }
            };

            reports.push(TeardownReport {
                name,
                deadline,
                outcome,
            });
        }

        reports
    }
}
