

pub mod config;
pub mod error;

pub use self::config::LifecycleConfig;
pub use self::error::{LabvaultError, Result};
