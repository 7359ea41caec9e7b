use super::Component;
use std::sync::Arc;
use std::time::Duration;

/// One registration: a component plus its optional explicit teardown budget.
#[derive(Clone)]
pub struct RegisteredComponent {
    component: Arc<dyn Component>,
    teardown_deadline: Option<Duration>,
}

impl RegisteredComponent {
    pub fn component(&self) -> &Arc<dyn Component> {
        &self.component
    }

    pub fn name(&self) -> &'static str {
        self.component.name()
    }

    /// Explicit registration deadline, else the component's advertised one,
    /// else `default`.
    pub fn effective_deadline(&self, default: Duration) -> Duration {
        self.teardown_deadline
            .or_else(|| self.component.teardown_deadline())
            .unwrap_or(default)
    }
}

/// Ordered, append-only list of registered components.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    entries: Vec<RegisteredComponent>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, component: Arc<dyn Component>, teardown_deadline: Option<Duration>) {
        tracing::debug!(name = component.name(), ?teardown_deadline, "Registering component");
        self.entries.push(RegisteredComponent {
            component,
            teardown_deadline,
        });
    }

    pub fn entries(&self) -> &[RegisteredComponent] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
