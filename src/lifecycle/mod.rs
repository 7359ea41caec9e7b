//! Component lifecycle: register, run concurrently, stop in reverse order.
//!
//! ```text
//! register → run (fan-out, select on {signal, first failure})
//!          → cancel → drain entry routines → reverse teardown
//! ```
//!
//! Draining has no timeout: a component whose entry routine ignores
//! cancellation blocks shutdown indefinitely, and no teardown starts while
//! any entry routine is still live.

mod app;
mod component;
mod registry;
mod shutdown;
pub mod signals;
mod startup;

pub use app::{App, AppOptions, LifecyclePhase, DEFAULT_SHUTDOWN_TIMEOUT};
pub use component::Component;
pub use registry::{ComponentRegistry, RegisteredComponent};
pub use shutdown::{ShutdownCoordinator, TeardownOutcome, TeardownReport};
pub use signals::TerminationSignals;
pub use startup::{StartupCoordinator, TaskExit};
