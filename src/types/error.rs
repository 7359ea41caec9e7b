use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Displays as the component's own error; the name is kept as a field.
    #[error("{error}")]
    ComponentFailed {
        component: &'static str,
        error: anyhow::Error,
    },

    #[error("Signal handler error: {0}")]
    Signal(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// The underlying cause when a component's entry routine failed.
    pub fn component_error(&self) -> Option<&anyhow::Error> {
        match self {
            AppError::ComponentFailed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn failed_component(&self) -> Option<&'static str> {
        match self {
            AppError::ComponentFailed { component, .. } => Some(component),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(e: toml::de::Error) -> Self {
        AppError::Config(e.to_string())
    }
}
