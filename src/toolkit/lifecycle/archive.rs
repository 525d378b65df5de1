use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::models::{
    ArchiveOutcome, ArchiveStats, ArchivedItem, LifecycleAction, LifecycleError, Page,
    UnarchiveOutcome,
};
use super::registry::ArchivableType;
use super::state::LifecycleStatus;
use super::txn::{finish, with_conflict_retry};
use crate::core::config::LifecycleConfig;
use crate::db::{EntityId, EntityStore, StateFilter, StoreTransaction};


/// Archive and unarchive. Neither cascades and archived records never expire.
#[derive(Clone)]
pub struct ArchiveService {
    store: Arc<dyn EntityStore>,
    config: Arc<LifecycleConfig>,
}

impl ArchiveService {
    pub fn new(store: Arc<dyn EntityStore>, config: Arc<LifecycleConfig>) -> Self {
        Self { store, config }
    }

    pub async fn archive(
        &self,
        entity_type: ArchivableType,
        entity_id: EntityId,
        actor: Option<&str>,
    ) -> Result<ArchiveOutcome, LifecycleError> {
        let actor = self.config.resolve_actor(actor);
        with_conflict_retry("archive", self.config.max_conflict_retries, || async {
            let mut tx = self.store.begin().await?;
            let result = Self::apply_archive(tx.as_mut(), entity_type, entity_id, &actor).await;
            finish(tx, result).await
        })
        .await
        .inspect(|outcome| {
            info!(
                "Archived {} #{} by {}",
                outcome.entity_type, outcome.entity_id, outcome.archived_by
            );
        })
    }

    async fn apply_archive(
        tx: &mut dyn StoreTransaction,
        entity_type: ArchivableType,
        entity_id: EntityId,
        actor: &str,
    ) -> Result<ArchiveOutcome, LifecycleError> {
        let t = entity_type.entity_type();
        let mut record = entity_type.handle(tx).require(entity_id).await?;

        match record.lifecycle.status() {
            LifecycleStatus::Active => {}
            LifecycleStatus::Archived => {
                warn!("{} #{} is already archived", t, entity_id);
                return Err(LifecycleError::AlreadyInTargetState {
                    entity_type: t,
                    id: entity_id,
                    state: LifecycleStatus::Archived,
                });
            }
            LifecycleStatus::Trashed => {
                warn!("Refusing to archive trashed {} #{}", t, entity_id);
                return Err(LifecycleError::InvalidStateTransition {
                    entity_type: t,
                    id: entity_id,
                    state: LifecycleStatus::Trashed,
                    action: LifecycleAction::Archive,
                    reason: "restore it from the trash first".to_string(),
                });
            }
        }

        let now = Utc::now();
        record.lifecycle.mark_archived(now, actor);
        entity_type.handle(tx).save(record).await?;

        Ok(ArchiveOutcome {
            entity_type: t,
            entity_id,
            archived_at: now,
            archived_by: actor.to_string(),
        })
    }

    pub async fn unarchive(
        &self,
        entity_type: ArchivableType,
        entity_id: EntityId,
    ) -> Result<UnarchiveOutcome, LifecycleError> {
        with_conflict_retry("unarchive", self.config.max_conflict_retries, || async {
            let mut tx = self.store.begin().await?;
            let result = Self::apply_unarchive(tx.as_mut(), entity_type, entity_id).await;
            finish(tx, result).await
        })
        .await
        .inspect(|outcome| {
            info!("Unarchived {} #{}", outcome.entity_type, outcome.entity_id);
        })
    }

    async fn apply_unarchive(
        tx: &mut dyn StoreTransaction,
        entity_type: ArchivableType,
        entity_id: EntityId,
    ) -> Result<UnarchiveOutcome, LifecycleError> {
        let t = entity_type.entity_type();
        let mut record = entity_type.handle(tx).require(entity_id).await?;

        let status = record.lifecycle.status();
        if status != LifecycleStatus::Archived {
            return Err(LifecycleError::NotInState {
                entity_type: t,
                id: entity_id,
                expected: LifecycleStatus::Archived,
                actual: status,
            });
        }

        record.lifecycle.clear_archive();
        entity_type.handle(tx).save(record).await?;

        Ok(UnarchiveOutcome {
            entity_type: t,
            entity_id,
        })
    }

    /// Archived records, most recently archived first.
    pub async fn list_archived(
        &self,
        entity_type: Option<ArchivableType>,
        page: usize,
        per_page: usize,
    ) -> Result<Page<ArchivedItem>, LifecycleError> {
        let types: Vec<ArchivableType> = match entity_type {
            Some(t) => vec![t],
            None => ArchivableType::all().collect(),
        };

        let mut tx = self.store.begin().await?;
        let mut items = Vec::new();
        let mut by_type = BTreeMap::new();

        let scanned: Result<(), LifecycleError> = async {
            for t in types {
                // The archived filter already excludes trashed records.
                let records = t.handle(tx.as_mut()).find_where(StateFilter::Archived).await?;
                if !records.is_empty() {
                    by_type.insert(t.entity_type(), records.len());
                }
                items.extend(records.into_iter().filter_map(|record| {
                    let archived_at = record.lifecycle.archived_at?;
                    Some(ArchivedItem {
                        entity_type: record.entity_type,
                        entity_id: record.id,
                        name: record.display_name(),
                        archived_at,
                        archived_by: record.lifecycle.archived_by.clone(),
                    })
                }));
            }
            Ok(())
        }
        .await;
        finish(tx, scanned).await?;

        items.sort_by(|a, b| {
            b.archived_at
                .cmp(&a.archived_at)
                .then(a.entity_type.cmp(&b.entity_type))
                .then(a.entity_id.cmp(&b.entity_id))
        });
        Ok(Page::paginate(items, page, per_page, by_type))
    }

    pub async fn stats(&self) -> Result<ArchiveStats, LifecycleError> {
        let mut tx = self.store.begin().await?;
        let mut stats = ArchiveStats::default();

        let counted: Result<(), LifecycleError> = async {
            for t in ArchivableType::all() {
                let count = t.handle(tx.as_mut()).find_where(StateFilter::Archived).await?.len();
                if count > 0 {
                    stats.total_archived += count;
                    stats.by_type.insert(t.entity_type(), count);
                }
            }
            Ok(())
        }
        .await;
        finish(tx, counted).await?;

        Ok(stats)
    }
}
