

pub mod core;
pub mod db;
pub mod toolkit;


pub use self::core::config::LifecycleConfig;
pub use self::core::error::{LabvaultError, Result};
pub use db::{EntityRecord, EntityStore, InMemoryStore, StoreError};
pub use toolkit::lifecycle::{
    ArchivableType, EntityType, LifecycleError, LifecycleManager, RestoreMode, TrashableType,
};


/// Days a trashed record is kept before the sweeper may delete it.
pub const TRASH_RETENTION_DAYS: i64 = 30;


pub const EXPIRING_SOON_DAYS: i64 = 7;


pub const DEFAULT_PAGE_SIZE: usize = 20;


pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 64;


pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;


pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 86_400;
