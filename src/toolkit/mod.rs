

pub mod lifecycle;


pub use lifecycle::{ArchiveService, LifecycleError, LifecycleManager, TrashService};
