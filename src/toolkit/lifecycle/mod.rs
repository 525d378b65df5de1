

pub mod archive;
pub mod cascade;
pub mod manager;
pub mod models;
pub mod registry;
pub mod state;
pub mod sweeper;
pub mod trash;
mod txn;

#[cfg(test)]
mod testing;


pub use archive::ArchiveService;
pub use cascade::{CascadePlan, CascadeResolver, CascadeRule, CascadeSelection, SWEEP_ORDER};
pub use manager::LifecycleManager;
pub use models::{
    ArchiveOutcome, ArchiveStats, ArchivedItem, DeleteOutcome, LifecycleAction, LifecycleError,
    Page, RestoreMode, RestoreOutcome, SweepReport, TrashOutcome, TrashStats, TrashedItem,
    TypeTrashStats, UnarchiveOutcome,
};
pub use registry::{ArchivableType, Capabilities, EntityType, RegistryKind, TrashableType, TypeHandle};
pub use state::{LifecycleState, LifecycleStatus};
pub use sweeper::{RetentionSweeper, SweeperHandle};
pub use trash::TrashService;
