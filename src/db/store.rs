

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::models::{EntityId, EntityRecord, ForeignKey};
use crate::toolkit::lifecycle::registry::EntityType;
use crate::toolkit::lifecycle::state::LifecycleState;


#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Write conflict on {entity_type} #{id}: changed by a concurrent transaction")]
    Conflict { entity_type: EntityType, id: EntityId },
    #[error("Duplicate key: {entity_type} #{id}")]
    DuplicateKey { entity_type: EntityType, id: EntityId },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Backend error: {0}")]
    Backend(String),
}


/// Lifecycle predicates a store must be able to evaluate server side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter {
    All,
    Trashed,
    /// Trashed strictly before the given instant.
    TrashedBefore(DateTime<Utc>),
    /// Archived and not trashed.
    Archived,
}

impl StateFilter {
    pub fn matches(&self, state: &LifecycleState) -> bool {
        match self {
            Self::All => true,
            Self::Trashed => state.trashed_at.is_some(),
            Self::TrashedBefore(cutoff) => state.trashed_at.is_some_and(|at| at < *cutoff),
            Self::Archived => state.archived_at.is_some() && state.trashed_at.is_none(),
        }
    }
}


/// Entry point into the persistent entity store.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Opens a transaction reading from a snapshot taken now.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}


/// A unit of work against the store. Writes stay invisible to other
/// transactions until `commit`, which applies all of them or none.
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn get(
        &mut self,
        entity_type: EntityType,
        id: EntityId,
    ) -> Result<Option<EntityRecord>, StoreError>;

    async fn find_by(
        &mut self,
        entity_type: EntityType,
        key: ForeignKey,
        value: EntityId,
    ) -> Result<Vec<EntityRecord>, StoreError>;

    async fn find_where(
        &mut self,
        entity_type: EntityType,
        filter: StateFilter,
    ) -> Result<Vec<EntityRecord>, StoreError>;

    async fn save(&mut self, record: EntityRecord) -> Result<(), StoreError>;

    async fn delete(&mut self, entity_type: EntityType, id: EntityId) -> Result<(), StoreError>;

    /// Fails with [`StoreError::Conflict`] if a record this transaction wrote
    /// was committed by someone else after the snapshot was taken.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
