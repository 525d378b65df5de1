use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::registry::{EntityType, RegistryKind};
use super::state::LifecycleStatus;
use crate::db::{EntityId, StoreError};


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Trash,
    Restore,
    PermanentlyDelete,
    Archive,
    Unarchive,
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trash => write!(f, "trash"),
            Self::Restore => write!(f, "restore"),
            Self::PermanentlyDelete => write!(f, "permanently delete"),
            Self::Archive => write!(f, "archive"),
            Self::Unarchive => write!(f, "unarchive"),
        }
    }
}


/// Which children a cascading restore brings back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreMode {
    /// Every reachable child that is trashed right now, however it got there.
    #[default]
    CurrentlyTrashed,
    /// Only children trashed by the same operation as the parent.
    SameBatch,
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrashOutcome {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub trashed_at: DateTime<Utc>,
    pub trashed_by: String,
    pub deletion_date: DateTime<Utc>,
    pub cascade_count: usize,
    pub batch_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreOutcome {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    /// Mode actually applied; `SameBatch` falls back when the root has no batch.
    pub mode: RestoreMode,
    pub cascade_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    /// State the record was in when it was removed.
    pub previous_state: LifecycleStatus,
    pub forced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveOutcome {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub archived_at: DateTime<Utc>,
    pub archived_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnarchiveOutcome {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrashedItem {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub name: String,
    pub trashed_at: DateTime<Utc>,
    pub trashed_by: Option<String>,
    pub days_until_permanent_deletion: i64,
    pub scheduled_deletion_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedItem {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub name: String,
    pub archived_at: DateTime<Utc>,
    pub archived_by: Option<String>,
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
    /// Totals before pagination.
    pub by_type: BTreeMap<EntityType, usize>,
}

impl<T> Page<T> {
    /// Slices an already sorted result set. Pages are 1-based; page 0 is
    /// treated as page 1 and `per_page` is at least 1.
    pub fn paginate(
        all: Vec<T>,
        page: usize,
        per_page: usize,
        by_type: BTreeMap<EntityType, usize>,
    ) -> Self {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let total = all.len();
        let items = all
            .into_iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .collect();

        Self {
            items,
            total,
            page,
            per_page,
            total_pages: total.div_ceil(per_page),
            by_type,
        }
    }
}


#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeTrashStats {
    pub count: usize,
    pub expiring_soon: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashStats {
    pub total_trashed: usize,
    pub expiring_soon: usize,
    pub by_type: BTreeMap<EntityType, TypeTrashStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub total_archived: usize,
    pub by_type: BTreeMap<EntityType, usize>,
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub dry_run: bool,
    pub cutoff: DateTime<Utc>,
    /// Records removed per type; on a dry run, records that are past the cutoff.
    pub deleted: BTreeMap<EntityType, usize>,
    /// Expired records kept because something still references them.
    pub blocked: BTreeMap<EntityType, usize>,
    /// Types whose sweep failed and was rolled back.
    pub failed: BTreeMap<EntityType, String>,
}

impl SweepReport {
    pub fn new(cutoff: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            dry_run,
            cutoff,
            deleted: BTreeMap::new(),
            blocked: BTreeMap::new(),
            failed: BTreeMap::new(),
        }
    }

    pub fn total_deleted(&self) -> usize {
        self.deleted.values().sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}


#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Unknown entity type for the {registry} registry: {tag}")]
    UnknownEntityType { tag: String, registry: RegistryKind },

    #[error("{entity_type} #{id} not found")]
    NotFound { entity_type: EntityType, id: EntityId },

    #[error("{entity_type} #{id} is already {state}")]
    AlreadyInTargetState {
        entity_type: EntityType,
        id: EntityId,
        state: LifecycleStatus,
    },

    #[error("Cannot {action} {entity_type} #{id} while it is {state}: {reason}")]
    InvalidStateTransition {
        entity_type: EntityType,
        id: EntityId,
        state: LifecycleStatus,
        action: LifecycleAction,
        reason: String,
    },

    #[error("{entity_type} #{id} is not {expected} (currently {actual})")]
    NotInState {
        entity_type: EntityType,
        id: EntityId,
        expected: LifecycleStatus,
        actual: LifecycleStatus,
    },

    #[error("Cascade from {entity_type} #{id} went deeper than {max_depth} levels")]
    CascadeDepthExceeded {
        entity_type: EntityType,
        id: EntityId,
        max_depth: usize,
    },

    #[error("{entity_type} #{id} kept changing concurrently; gave up after {attempts} attempts")]
    Conflict {
        entity_type: EntityType,
        id: EntityId,
        attempts: u32,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl LifecycleError {
    /// Type and id of the record the error is about, if any.
    pub fn subject(&self) -> Option<(EntityType, EntityId)> {
        match self {
            Self::NotFound { entity_type, id }
            | Self::AlreadyInTargetState { entity_type, id, .. }
            | Self::InvalidStateTransition { entity_type, id, .. }
            | Self::NotInState { entity_type, id, .. }
            | Self::CascadeDepthExceeded { entity_type, id, .. }
            | Self::Conflict { entity_type, id, .. } => Some((*entity_type, *id)),
            Self::Store(StoreError::Conflict { entity_type, id })
            | Self::Store(StoreError::DuplicateKey { entity_type, id }) => Some((*entity_type, *id)),
            Self::UnknownEntityType { .. } | Self::Store(_) => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict { .. }))
    }
}
