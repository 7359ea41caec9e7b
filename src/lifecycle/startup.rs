use super::ComponentRegistry;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// How one entry routine ended.
#[derive(Debug)]
pub struct TaskExit {
    pub index: usize,
    pub name: &'static str,
    pub result: anyhow::Result<()>,
}

/// Runs every registered entry routine concurrently and reports their exits
/// in completion order.
pub struct StartupCoordinator {
    tasks: JoinSet<TaskExit>,
}

impl StartupCoordinator {
    pub fn launch(registry: &ComponentRegistry, cancel: CancellationToken) -> Self {
        let mut tasks = JoinSet::new();

        for (index, entry) in registry.entries().iter().enumerate() {
            let component = entry.component().clone();
            let cancel = cancel.clone();
            let name = entry.name();

            tasks.spawn(async move {
                tracing::info!(component = name, index, "Starting component");

                // Inner spawn so a panic is attributed to this component.
                let result = match tokio::spawn(async move { component.run(cancel).await }).await {
                    Ok(result) => result,
                    Err(e) => Err(anyhow::anyhow!("component task panicked: {}", e)),
                };

                match &result {
                    Ok(()) => tracing::debug!(component = name, index, "Component returned"),
                    Err(e) => {
                        tracing::error!(component = name, index, error = %e, "Component failed")
                    }
                }

                TaskExit {
                    index,
                    name,
                    result,
                }
            });
        }

        Self { tasks }
    }

    pub fn has_pending(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Next entry routine to finish, or `None` once all have.
    pub async fn next_exit(&mut self) -> Option<TaskExit> {
        loop {
            match self.tasks.join_next().await? {
                Ok(exit) => return Some(exit),
                // Supervising tasks never panic themselves; only a runtime
                // shutdown can land here.
                Err(e) => tracing::error!("Supervisor task failed: {}", e),
            }
        }
    }

    /// Wait for every remaining entry routine. There is no timeout: a
    /// component that ignores cancellation blocks this forever.
    pub async fn drain(&mut self) -> Vec<TaskExit> {
        let mut exits = Vec::with_capacity(self.tasks.len());
        while let Some(exit) = self.next_exit().await {
            exits.push(exit);
        }
        exits
    }
}
