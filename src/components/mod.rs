pub mod http;
pub mod probe;
pub mod scheduler;

pub use http::HttpServerComponent;
pub use probe::TcpProbeComponent;
pub use scheduler::{Job, SchedulerComponent};
