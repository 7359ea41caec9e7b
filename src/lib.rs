pub mod components;
pub mod config;
pub mod lifecycle;
pub mod types;

#[cfg(test)]
pub mod test_utils;

pub use config::AppConfig;
pub use lifecycle::{App, AppOptions, Component, LifecyclePhase};
pub use types::error::{AppError, Result};
