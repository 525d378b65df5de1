

use thiserror::Error;


/// Errors from loading and validating configuration. Lifecycle operations
/// return `LifecycleError` directly.
#[derive(Error, Debug)]
pub enum LabvaultError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),
}


pub type Result<T> = std::result::Result<T, LabvaultError>;
