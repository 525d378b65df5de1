

use std::path::Path;

use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::error::{LabvaultError, Result};


pub const ENV_PREFIX: &str = "LABVAULT";


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Days a record stays in the trash before it may be swept. One global
    /// policy for every entity type.
    pub retention_days: i64,
    pub expiring_soon_days: i64,

    pub default_page_size: usize,

    pub max_cascade_depth: usize,
    pub max_conflict_retries: u32,

    pub sweep_interval_secs: u64,

    /// Recorded in `trashed_by` / `archived_by` when the caller gives no actor.
    pub default_actor: String,
}

impl LifecycleConfig {
    pub fn new() -> Self {
        Self {
            retention_days: crate::TRASH_RETENTION_DAYS,
            expiring_soon_days: crate::EXPIRING_SOON_DAYS,
            default_page_size: crate::DEFAULT_PAGE_SIZE,
            max_cascade_depth: crate::DEFAULT_MAX_CASCADE_DEPTH,
            max_conflict_retries: crate::DEFAULT_CONFLICT_RETRIES,
            sweep_interval_secs: crate::DEFAULT_SWEEP_INTERVAL_SECS,
            default_actor: "system".to_string(),
        }
    }

    pub fn retention(&self) -> TimeDelta {
        TimeDelta::try_days(self.retention_days).unwrap_or(TimeDelta::MAX)
    }

    pub fn expiring_soon_window(&self) -> TimeDelta {
        TimeDelta::try_days(self.expiring_soon_days).unwrap_or(TimeDelta::MAX)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn resolve_actor(&self, actor: Option<&str>) -> String {
        match actor.map(str::trim) {
            Some(actor) if !actor.is_empty() => actor.to_string(),
            _ => self.default_actor.clone(),
        }
    }

    /// Defaults, then the optional TOML file, then `LABVAULT_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));
        Self::build(builder)
    }

    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Self::build(Config::builder().add_source(File::from_str(raw, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retention_days <= 0 {
            return Err(LabvaultError::Config(format!(
                "retention_days must be positive, got {}",
                self.retention_days
            )));
        }
        if !representable_window(self.retention_days) {
            return Err(LabvaultError::Config(format!(
                "retention_days is out of range, got {}",
                self.retention_days
            )));
        }
        if self.expiring_soon_days < 0 {
            return Err(LabvaultError::Config(format!(
                "expiring_soon_days must not be negative, got {}",
                self.expiring_soon_days
            )));
        }
        if !representable_window(self.expiring_soon_days) {
            return Err(LabvaultError::Config(format!(
                "expiring_soon_days is out of range, got {}",
                self.expiring_soon_days
            )));
        }
        if self.default_page_size == 0 {
            return Err(LabvaultError::Config("default_page_size must be at least 1".into()));
        }
        if self.max_cascade_depth == 0 {
            return Err(LabvaultError::Config("max_cascade_depth must be at least 1".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(LabvaultError::Config("sweep_interval_secs must be at least 1".into()));
        }
        if self.default_actor.trim().is_empty() {
            return Err(LabvaultError::Config("default_actor must not be empty".into()));
        }
        Ok(())
    }
}

/// A window of `days` can be added to and subtracted from the current time.
fn representable_window(days: i64) -> bool {
    let now = Utc::now();
    TimeDelta::try_days(days).is_some_and(|window| {
        now.checked_sub_signed(window).is_some() && now.checked_add_signed(window).is_some()
    })
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self::new()
    }
}
