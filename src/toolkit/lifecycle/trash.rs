use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cascade::{CascadeResolver, CascadeSelection};
use super::models::{
    DeleteOutcome, LifecycleAction, LifecycleError, Page, RestoreMode, RestoreOutcome,
    SweepReport, TrashOutcome, TrashStats, TrashedItem, TypeTrashStats,
};
use super::registry::TrashableType;
use super::state::{LifecycleStatus, deletion_deadline};
use super::sweeper;
use super::txn::{finish, with_conflict_retry};
use crate::core::config::LifecycleConfig;
use crate::db::{EntityId, EntityStore, StateFilter, StoreTransaction};


/// Trash, restore and permanent deletion for every trashable type.
///
/// Holds no state of its own; clones share the same store.
#[derive(Clone)]
pub struct TrashService {
    store: Arc<dyn EntityStore>,
    config: Arc<LifecycleConfig>,
    resolver: CascadeResolver,
}

impl TrashService {
    pub fn new(store: Arc<dyn EntityStore>, config: Arc<LifecycleConfig>) -> Self {
        let resolver = CascadeResolver::new(config.max_cascade_depth);
        Self {
            store,
            config,
            resolver,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub async fn trash(
        &self,
        entity_type: TrashableType,
        entity_id: EntityId,
        actor: Option<&str>,
        cascade: bool,
    ) -> Result<TrashOutcome, LifecycleError> {
        let actor = self.config.resolve_actor(actor);
        with_conflict_retry("trash", self.config.max_conflict_retries, || async {
            let mut tx = self.store.begin().await?;
            let result = self
                .apply_trash(tx.as_mut(), entity_type, entity_id, &actor, cascade)
                .await;
            finish(tx, result).await
        })
        .await
        .inspect(|outcome| {
            info!(
                "Trashed {} #{} by {} ({} cascaded), deletion scheduled for {}",
                outcome.entity_type,
                outcome.entity_id,
                outcome.trashed_by,
                outcome.cascade_count,
                outcome.deletion_date.format("%Y-%m-%d")
            );
        })
    }

    async fn apply_trash(
        &self,
        tx: &mut dyn StoreTransaction,
        entity_type: TrashableType,
        entity_id: EntityId,
        actor: &str,
        cascade: bool,
    ) -> Result<TrashOutcome, LifecycleError> {
        let t = entity_type.entity_type();
        let mut record = entity_type.handle(tx).require(entity_id).await?;

        match record.lifecycle.status() {
            LifecycleStatus::Active => {}
            LifecycleStatus::Trashed => {
                warn!("{} #{} is already in trash", t, entity_id);
                return Err(LifecycleError::AlreadyInTargetState {
                    entity_type: t,
                    id: entity_id,
                    state: LifecycleStatus::Trashed,
                });
            }
            LifecycleStatus::Archived => {
                warn!("Refusing to trash archived {} #{}", t, entity_id);
                return Err(LifecycleError::InvalidStateTransition {
                    entity_type: t,
                    id: entity_id,
                    state: LifecycleStatus::Archived,
                    action: LifecycleAction::Trash,
                    reason: "unarchive it first".to_string(),
                });
            }
        }

        let plan = if cascade {
            self.resolver
                .resolve(tx, t, entity_id, CascadeSelection::Active)
                .await?
        } else {
            Default::default()
        };

        let now = Utc::now();
        let batch = Uuid::new_v4();

        record.lifecycle.mark_trashed(now, actor, batch);
        entity_type.handle(tx).save(record).await?;

        let cascade_count = plan.len();
        for mut child in plan.items {
            debug!("Cascade trash {} #{} via {} #{}", child.entity_type, child.id, t, entity_id);
            child.lifecycle.mark_trashed(now, actor, batch);
            tx.save(child).await?;
        }

        Ok(TrashOutcome {
            entity_type: t,
            entity_id,
            trashed_at: now,
            trashed_by: actor.to_string(),
            deletion_date: deletion_deadline(now, self.config.retention()),
            cascade_count,
            batch_id: batch,
        })
    }

    pub async fn restore(
        &self,
        entity_type: TrashableType,
        entity_id: EntityId,
        cascade: bool,
    ) -> Result<RestoreOutcome, LifecycleError> {
        self.restore_with_mode(entity_type, entity_id, cascade, RestoreMode::default())
            .await
    }

    pub async fn restore_with_mode(
        &self,
        entity_type: TrashableType,
        entity_id: EntityId,
        cascade: bool,
        mode: RestoreMode,
    ) -> Result<RestoreOutcome, LifecycleError> {
        with_conflict_retry("restore", self.config.max_conflict_retries, || async {
            let mut tx = self.store.begin().await?;
            let result = self
                .apply_restore(tx.as_mut(), entity_type, entity_id, cascade, mode)
                .await;
            finish(tx, result).await
        })
        .await
        .inspect(|outcome| {
            info!(
                "Restored {} #{} from trash ({} cascaded, {:?})",
                outcome.entity_type, outcome.entity_id, outcome.cascade_count, outcome.mode
            );
        })
    }

    async fn apply_restore(
        &self,
        tx: &mut dyn StoreTransaction,
        entity_type: TrashableType,
        entity_id: EntityId,
        cascade: bool,
        mode: RestoreMode,
    ) -> Result<RestoreOutcome, LifecycleError> {
        let t = entity_type.entity_type();
        let mut record = entity_type.handle(tx).require(entity_id).await?;

        let status = record.lifecycle.status();
        if status != LifecycleStatus::Trashed {
            warn!("{} #{} is not in trash ({})", t, entity_id, status);
            return Err(LifecycleError::NotInState {
                entity_type: t,
                id: entity_id,
                expected: LifecycleStatus::Trashed,
                actual: status,
            });
        }

        let (mode, selection) = match (mode, record.lifecycle.trash_batch) {
            (RestoreMode::SameBatch, Some(batch)) => {
                (RestoreMode::SameBatch, CascadeSelection::TrashedInBatch(batch))
            }
            (RestoreMode::SameBatch, None) => {
                warn!(
                    "{} #{} has no trash batch, restoring every trashed child instead",
                    t, entity_id
                );
                (RestoreMode::CurrentlyTrashed, CascadeSelection::Trashed)
            }
            (RestoreMode::CurrentlyTrashed, _) => {
                (RestoreMode::CurrentlyTrashed, CascadeSelection::Trashed)
            }
        };
        let plan = if cascade {
            self.resolver.resolve(tx, t, entity_id, selection).await?
        } else {
            Default::default()
        };

        record.lifecycle.clear_trash();
        entity_type.handle(tx).save(record).await?;

        let cascade_count = plan.len();
        for mut child in plan.items {
            debug!("Cascade restore {} #{} via {} #{}", child.entity_type, child.id, t, entity_id);
            child.lifecycle.clear_trash();
            tx.save(child).await?;
        }

        Ok(RestoreOutcome {
            entity_type: t,
            entity_id,
            mode,
            cascade_count,
        })
    }

    /// Removes the record for good. Never cascades: a record that is still
    /// referenced through a cascade edge cannot be deleted, even with `force`.
    pub async fn permanently_delete(
        &self,
        entity_type: TrashableType,
        entity_id: EntityId,
        force: bool,
    ) -> Result<DeleteOutcome, LifecycleError> {
        with_conflict_retry("permanently_delete", self.config.max_conflict_retries, || async {
            let mut tx = self.store.begin().await?;
            let result = self
                .apply_permanent_delete(tx.as_mut(), entity_type, entity_id, force)
                .await;
            finish(tx, result).await
        })
        .await
        .inspect(|outcome| {
            warn!(
                "Permanently deleted {} #{} (was {}, forced: {})",
                outcome.entity_type, outcome.entity_id, outcome.previous_state, outcome.forced
            );
        })
    }

    async fn apply_permanent_delete(
        &self,
        tx: &mut dyn StoreTransaction,
        entity_type: TrashableType,
        entity_id: EntityId,
        force: bool,
    ) -> Result<DeleteOutcome, LifecycleError> {
        let t = entity_type.entity_type();
        let record = entity_type.handle(tx).require(entity_id).await?;
        let status = record.lifecycle.status();

        if status != LifecycleStatus::Trashed && !force {
            return Err(LifecycleError::InvalidStateTransition {
                entity_type: t,
                id: entity_id,
                state: status,
                action: LifecycleAction::PermanentlyDelete,
                reason: "it must be in the trash first".to_string(),
            });
        }

        let dependents = self.resolver.dependents(tx, t, entity_id).await?;
        if !dependents.is_empty() {
            return Err(LifecycleError::InvalidStateTransition {
                entity_type: t,
                id: entity_id,
                state: status,
                action: LifecycleAction::PermanentlyDelete,
                reason: format!("{} dependent record(s) still reference it", dependents.len()),
            });
        }

        entity_type.handle(tx).delete(entity_id).await?;

        Ok(DeleteOutcome {
            entity_type: t,
            entity_id,
            previous_state: status,
            forced: force && status != LifecycleStatus::Trashed,
        })
    }

    /// Trashed records across one or all types, soonest deletion first.
    pub async fn list_trashed(
        &self,
        entity_type: Option<TrashableType>,
        page: usize,
        per_page: usize,
    ) -> Result<Page<TrashedItem>, LifecycleError> {
        let now = Utc::now();
        let retention = self.config.retention();
        let types: Vec<TrashableType> = match entity_type {
            Some(t) => vec![t],
            None => TrashableType::all().collect(),
        };

        let mut tx = self.store.begin().await?;
        let mut items = Vec::new();
        let mut by_type = BTreeMap::new();

        let scanned: Result<(), LifecycleError> = async {
            for t in types {
                let records = t.handle(tx.as_mut()).find_where(StateFilter::Trashed).await?;
                if !records.is_empty() {
                    by_type.insert(t.entity_type(), records.len());
                }
                for record in records {
                    let Some(trashed_at) = record.lifecycle.trashed_at else {
                        continue;
                    };
                    let scheduled = deletion_deadline(trashed_at, retention);
                    items.push(TrashedItem {
                        entity_type: record.entity_type,
                        entity_id: record.id,
                        name: record.display_name(),
                        trashed_at,
                        trashed_by: record.lifecycle.trashed_by.clone(),
                        days_until_permanent_deletion: (scheduled - now).num_days().max(0),
                        scheduled_deletion_date: scheduled,
                    });
                }
            }
            Ok(())
        }
        .await;
        finish(tx, scanned).await?;

        items.sort_by(|a, b| {
            a.scheduled_deletion_date
                .cmp(&b.scheduled_deletion_date)
                .then(a.entity_type.cmp(&b.entity_type))
                .then(a.entity_id.cmp(&b.entity_id))
        });
        Ok(Page::paginate(items, page, per_page, by_type))
    }

    pub async fn stats(&self) -> Result<TrashStats, LifecycleError> {
        let now = Utc::now();
        let retention = self.config.retention();
        let horizon = deletion_deadline(now, self.config.expiring_soon_window());

        let mut tx = self.store.begin().await?;
        let mut stats = TrashStats::default();

        let counted: Result<(), LifecycleError> = async {
            for t in TrashableType::all() {
                let records = t.handle(tx.as_mut()).find_where(StateFilter::Trashed).await?;
                if records.is_empty() {
                    continue;
                }
                let expiring_soon = records
                    .iter()
                    .filter_map(|r| r.lifecycle.scheduled_deletion_date(retention))
                    .filter(|date| *date <= horizon)
                    .count();

                stats.total_trashed += records.len();
                stats.expiring_soon += expiring_soon;
                stats.by_type.insert(
                    t.entity_type(),
                    TypeTrashStats {
                        count: records.len(),
                        expiring_soon,
                    },
                );
            }
            Ok(())
        }
        .await;
        finish(tx, counted).await?;

        Ok(stats)
    }

    /// Permanently deletes everything trashed longer than the retention
    /// window. Failures are per type and reported, never fatal.
    pub async fn sweep_expired(&self) -> SweepReport {
        self.sweep_expired_as_of(Utc::now(), false).await
    }

    /// Reports what a sweep would delete without touching the store.
    pub async fn preview_expired(&self) -> SweepReport {
        self.sweep_expired_as_of(Utc::now(), true).await
    }

    pub async fn sweep_expired_as_of(&self, now: DateTime<Utc>, dry_run: bool) -> SweepReport {
        sweeper::sweep_expired(
            self.store.as_ref(),
            &self.resolver,
            &self.config,
            now,
            dry_run,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{EntityRecord, InMemoryStore};
    use crate::toolkit::lifecycle::registry::EntityType;
    use crate::toolkit::lifecycle::state::LifecycleState;
    use crate::toolkit::lifecycle::testing::{
        InterleavingStore, archive_directly, lab_fixture, trashed_days_ago,
    };

    fn service(store: &InMemoryStore) -> TrashService {
        TrashService::new(Arc::new(store.clone()), Arc::new(LifecycleConfig::default()))
    }

    fn tt(t: EntityType) -> TrashableType {
        TrashableType::new(t).unwrap()
    }

    #[tokio::test]
    async fn test_trash_sets_fields_and_schedules_deletion() {
        let store = lab_fixture();
        let trash = service(&store);

        let outcome = trash
            .trash(tt(EntityType::Sample), 100, Some("alice"), true)
            .await
            .unwrap();
        assert_eq!(outcome.cascade_count, 0);
        assert_eq!(outcome.deletion_date - outcome.trashed_at, chrono::Duration::days(30));

        let sample = store.record(EntityType::Sample, 100).unwrap();
        assert_eq!(sample.lifecycle.trashed_at, Some(outcome.trashed_at));
        assert_eq!(sample.lifecycle.trashed_by.as_deref(), Some("alice"));
        assert_eq!(sample.lifecycle.trash_batch, Some(outcome.batch_id));
    }

    #[tokio::test]
    async fn test_trash_twice_fails_without_changes() {
        let store = lab_fixture();
        let trash = service(&store);

        trash.trash(tt(EntityType::Sample), 100, Some("alice"), true).await.unwrap();
        let before = store.record(EntityType::Sample, 100).unwrap();

        let err = trash
            .trash(tt(EntityType::Sample), 100, Some("bob"), true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::AlreadyInTargetState { state: LifecycleStatus::Trashed, .. }
        ));
        assert_eq!(store.record(EntityType::Sample, 100).unwrap(), before);
    }

    #[tokio::test]
    async fn test_missing_entity_is_not_found() {
        let store = lab_fixture();
        let err = service(&store)
            .trash(tt(EntityType::Sample), 9999, None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound { id: 9999, .. }));
    }

    #[tokio::test]
    async fn test_lab_cascade_is_complete_and_scoped() {
        let store = lab_fixture();
        let trash = service(&store);

        let outcome = trash.trash(tt(EntityType::Lab), 1, Some("alice"), true).await.unwrap();

        let mut cascaded = 0;
        for record in store.records() {
            let under_lab_one = record.lab_id == Some(1);
            if record.entity_type == EntityType::Lab {
                assert_eq!(record.lifecycle.is_trashed(), record.id == 1);
            } else if under_lab_one {
                assert!(record.lifecycle.is_trashed(), "{} #{} not trashed", record.entity_type, record.id);
                assert_eq!(record.lifecycle.trashed_at, Some(outcome.trashed_at));
                assert_eq!(record.lifecycle.trashed_by.as_deref(), Some("alice"));
                cascaded += 1;
            } else {
                assert!(!record.lifecycle.is_trashed(), "{} #{} trashed", record.entity_type, record.id);
            }
        }
        assert_eq!(outcome.cascade_count, cascaded);
    }

    #[tokio::test]
    async fn test_cascade_disabled_touches_only_root() {
        let store = lab_fixture();
        let outcome = service(&store)
            .trash(tt(EntityType::Project), 10, None, false)
            .await
            .unwrap();

        assert_eq!(outcome.cascade_count, 0);
        assert_eq!(outcome.trashed_by, "system");
        assert!(!store.record(EntityType::Sample, 100).unwrap().lifecycle.is_trashed());
    }

    #[tokio::test]
    async fn test_recursive_location_cascade() {
        let store = InMemoryStore::with_records([
            EntityRecord::new(EntityType::Location, 1),
            EntityRecord::new(EntityType::Location, 2).with_parent_location(1),
            EntityRecord::new(EntityType::Location, 3).with_parent_location(2),
            EntityRecord::new(EntityType::Location, 4),
        ])
        .unwrap();
        let trash = service(&store);

        let outcome = trash.trash(tt(EntityType::Location), 1, None, true).await.unwrap();
        assert_eq!(outcome.cascade_count, 2);
        for id in [1, 2, 3] {
            assert!(store.record(EntityType::Location, id).unwrap().lifecycle.is_trashed());
        }
        assert!(!store.record(EntityType::Location, 4).unwrap().lifecycle.is_trashed());

        let restored = trash.restore(tt(EntityType::Location), 1, true).await.unwrap();
        assert_eq!(restored.cascade_count, 2);
        assert!(store.records().iter().all(|r| r.lifecycle.is_active()));
    }

    #[tokio::test]
    async fn test_location_cycle_terminates() {
        let store = InMemoryStore::with_records([
            EntityRecord::new(EntityType::Location, 1).with_parent_location(2),
            EntityRecord::new(EntityType::Location, 2).with_parent_location(1),
        ])
        .unwrap();

        let outcome = service(&store)
            .trash(tt(EntityType::Location), 1, None, true)
            .await
            .unwrap();
        assert_eq!(outcome.cascade_count, 1);
    }

    #[tokio::test]
    async fn test_archived_children_are_skipped_by_cascade() {
        let store = lab_fixture();
        archive_directly(&store, EntityType::Equipment, 300).await;

        service(&store).trash(tt(EntityType::Lab), 1, None, true).await.unwrap();

        let equipment = store.record(EntityType::Equipment, 300).unwrap();
        assert!(equipment.lifecycle.is_archived());
        assert!(!equipment.lifecycle.is_trashed());
    }

    #[tokio::test]
    async fn test_trash_then_restore_round_trip() {
        let store = lab_fixture();
        let trash = service(&store);

        trash.trash(tt(EntityType::Queue), 40, Some("alice"), true).await.unwrap();
        assert!(store.record(EntityType::Scan, 500).unwrap().lifecycle.is_trashed());

        let outcome = trash.restore(tt(EntityType::Queue), 40, true).await.unwrap();
        assert_eq!(outcome.cascade_count, 2);

        let queue = store.record(EntityType::Queue, 40).unwrap();
        assert!(queue.lifecycle.is_active());
        assert!(queue.lifecycle.trashed_by.is_none());
        assert!(store.record(EntityType::Scan, 500).unwrap().lifecycle.is_active());
    }

    #[tokio::test]
    async fn test_restore_of_active_entity_fails() {
        let store = lab_fixture();
        let err = service(&store)
            .restore(tt(EntityType::Sample), 100, true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::NotInState {
                expected: LifecycleStatus::Trashed,
                actual: LifecycleStatus::Active,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_restore_modes_after_independent_trash() {
        let store = lab_fixture();
        let trash = service(&store);

        // The project is trashed on its own before the lab.
        trash.trash(tt(EntityType::Project), 11, Some("bob"), false).await.unwrap();
        trash.trash(tt(EntityType::Lab), 1, Some("alice"), true).await.unwrap();

        let strict = trash
            .restore_with_mode(tt(EntityType::Lab), 1, true, RestoreMode::SameBatch)
            .await
            .unwrap();
        assert!(store.record(EntityType::Project, 11).unwrap().lifecycle.is_trashed());
        assert!(store.record(EntityType::Project, 10).unwrap().lifecycle.is_active());

        trash.trash(tt(EntityType::Lab), 1, Some("alice"), true).await.unwrap();
        let lenient = trash.restore(tt(EntityType::Lab), 1, true).await.unwrap();
        assert!(store.record(EntityType::Project, 11).unwrap().lifecycle.is_active());
        assert_eq!(lenient.cascade_count, strict.cascade_count + 1);
    }

    #[tokio::test]
    async fn test_child_trashed_after_parent_survives_strict_restore() {
        let store = lab_fixture();
        let trash = service(&store);

        trash.trash(tt(EntityType::Lab), 1, Some("alice"), true).await.unwrap();
        // Restored and trashed again on its own after the lab's cascade.
        trash.restore(tt(EntityType::Project), 10, false).await.unwrap();
        trash.trash(tt(EntityType::Project), 10, Some("bob"), false).await.unwrap();

        trash
            .restore_with_mode(tt(EntityType::Lab), 1, true, RestoreMode::SameBatch)
            .await
            .unwrap();

        let project = store.record(EntityType::Project, 10).unwrap();
        assert!(project.lifecycle.is_trashed());
        assert_eq!(project.lifecycle.trashed_by.as_deref(), Some("bob"));
        assert!(store.record(EntityType::Sample, 100).unwrap().lifecycle.is_active());
    }

    #[tokio::test]
    async fn test_permanent_delete_guard() {
        let store = lab_fixture();
        let trash = service(&store);

        let err = trash
            .permanently_delete(tt(EntityType::Sample), 100, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidStateTransition {
                state: LifecycleStatus::Active,
                action: LifecycleAction::PermanentlyDelete,
                ..
            }
        ));
        assert!(store.record(EntityType::Sample, 100).is_some());

        let outcome = trash
            .permanently_delete(tt(EntityType::Sample), 100, true)
            .await
            .unwrap();
        assert!(outcome.forced);
        assert!(store.record(EntityType::Sample, 100).is_none());

        let gone = trash.restore(tt(EntityType::Sample), 100, true).await.unwrap_err();
        assert!(matches!(gone, LifecycleError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_permanent_delete_blocked_by_dependents() {
        let store = lab_fixture();
        let trash = service(&store);

        trash.trash(tt(EntityType::Queue), 40, None, false).await.unwrap();
        let err = trash
            .permanently_delete(tt(EntityType::Queue), 40, false)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidStateTransition { .. }));
        assert!(store.record(EntityType::Queue, 40).is_some());

        for scan in [500, 501] {
            trash.trash(tt(EntityType::Scan), scan, None, false).await.unwrap();
            trash.permanently_delete(tt(EntityType::Scan), scan, false).await.unwrap();
        }
        let outcome = trash.permanently_delete(tt(EntityType::Queue), 40, false).await.unwrap();
        assert!(!outcome.forced);
        assert_eq!(outcome.previous_state, LifecycleStatus::Trashed);
    }

    #[tokio::test]
    async fn test_list_trashed_sorted_by_soonest_deletion() {
        let store = InMemoryStore::with_records([
            trashed_days_ago(EntityRecord::new(EntityType::Sample, 1), 2),
            trashed_days_ago(EntityRecord::new(EntityType::Equipment, 2), 20),
            trashed_days_ago(EntityRecord::new(EntityType::Sample, 3), 10).with_name("quartz"),
            EntityRecord::new(EntityType::Sample, 4),
        ])
        .unwrap();
        let trash = service(&store);

        let page = trash.list_trashed(None, 1, 2).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.by_type[&EntityType::Sample], 2);
        let ids: Vec<_> = page.items.iter().map(|i| (i.entity_type, i.entity_id)).collect();
        assert_eq!(ids, vec![(EntityType::Equipment, 2), (EntityType::Sample, 3)]);
        assert_eq!(page.items[0].days_until_permanent_deletion, 9);
        assert_eq!(page.items[1].name, "quartz");

        let samples = trash.list_trashed(Some(tt(EntityType::Sample)), 1, 20).await.unwrap();
        assert_eq!(samples.total, 2);
        assert_eq!(samples.items[1].name, "sample #1");
    }

    #[tokio::test]
    async fn test_stats_aggregation() {
        let store = lab_fixture();
        let trash = service(&store);

        for sample in [100, 101, 102] {
            trash.trash(tt(EntityType::Sample), sample, None, true).await.unwrap();
        }
        for equipment in [300, 301] {
            trash.trash(tt(EntityType::Equipment), equipment, None, true).await.unwrap();
        }

        let stats = trash.stats().await.unwrap();
        assert_eq!(stats.total_trashed, 5);
        assert_eq!(stats.by_type[&EntityType::Sample].count, 3);
        assert_eq!(stats.by_type[&EntityType::Equipment].count, 2);
        assert_eq!(stats.expiring_soon, 0);
        assert!(!stats.by_type.contains_key(&EntityType::Lab));
    }

    #[tokio::test]
    async fn test_stats_counts_expiring_soon() {
        let store = InMemoryStore::with_records([
            trashed_days_ago(EntityRecord::new(EntityType::Scan, 1), 25),
            trashed_days_ago(EntityRecord::new(EntityType::Scan, 2), 1),
        ])
        .unwrap();

        let stats = service(&store).stats().await.unwrap();
        assert_eq!(stats.total_trashed, 2);
        assert_eq!(stats.expiring_soon, 1);
        assert_eq!(
            stats.by_type[&EntityType::Scan],
            TypeTrashStats { count: 2, expiring_soon: 1 }
        );
    }

    #[tokio::test]
    async fn test_concurrent_trash_loser_retries_and_sees_winner() {
        let store = lab_fixture();
        let racing = InterleavingStore::new(store.clone());
        let trash = TrashService::new(Arc::new(racing.clone()), Arc::new(LifecycleConfig::default()));

        let (a, b) = tokio::join!(
            trash.trash(tt(EntityType::Project), 10, Some("alice"), true),
            trash.trash(tt(EntityType::Project), 10, Some("bob"), true),
        );

        // Both read the project as active before either committed, so the
        // loser's first commit conflicts and its retry re-reads the winner's state.
        assert_eq!(racing.begins(), 3);
        let (winner, loser) = match (a, b) {
            (Ok(winner), Err(loser)) | (Err(loser), Ok(winner)) => (winner, loser),
            other => panic!("expected exactly one winner, got {other:?}"),
        };
        assert!(matches!(
            loser,
            LifecycleError::AlreadyInTargetState { id: 10, state: LifecycleStatus::Trashed, .. }
        ));

        // Samples 100/101, scans 500/501, queue 40 and precursor 310.
        assert_eq!(winner.cascade_count, 6);
        let project = store.record(EntityType::Project, 10).unwrap();
        assert_eq!(project.lifecycle.trashed_by.as_deref(), Some(winner.trashed_by.as_str()));
        for (t, id) in [
            (EntityType::Sample, 100),
            (EntityType::Sample, 101),
            (EntityType::Scan, 500),
            (EntityType::Scan, 501),
            (EntityType::Queue, 40),
            (EntityType::Precursor, 310),
        ] {
            let child = store.record(t, id).unwrap();
            assert_eq!(child.lifecycle.trash_batch, Some(winner.batch_id), "{t} #{id}");
        }
    }

    #[tokio::test]
    async fn test_concurrent_trash_without_retries_reports_conflict() {
        let store = lab_fixture();
        let racing = InterleavingStore::new(store.clone());
        let config = LifecycleConfig {
            max_conflict_retries: 0,
            ..LifecycleConfig::default()
        };
        let trash = TrashService::new(Arc::new(racing.clone()), Arc::new(config));

        let (a, b) = tokio::join!(
            trash.trash(tt(EntityType::Sample), 102, Some("alice"), false),
            trash.trash(tt(EntityType::Sample), 102, Some("bob"), false),
        );

        assert_eq!(racing.begins(), 2);
        let loser = match (a, b) {
            (Ok(_), Err(loser)) | (Err(loser), Ok(_)) => loser,
            other => panic!("expected exactly one winner, got {other:?}"),
        };
        assert!(matches!(
            loser,
            LifecycleError::Conflict { entity_type: EntityType::Sample, id: 102, attempts: 1 }
        ));
    }

    #[tokio::test]
    async fn test_same_batch_restore_without_batch_falls_back() {
        let legacy = LifecycleState {
            trashed_at: Some(Utc::now() - chrono::Duration::days(3)),
            trashed_by: Some("import".into()),
            ..Default::default()
        };
        let store = InMemoryStore::with_records([
            EntityRecord::new(EntityType::Queue, 1).with_lifecycle(legacy.clone()),
            EntityRecord::new(EntityType::Scan, 2).with_queue(1).with_lifecycle(legacy),
        ])
        .unwrap();

        let outcome = service(&store)
            .restore_with_mode(tt(EntityType::Queue), 1, true, RestoreMode::SameBatch)
            .await
            .unwrap();

        assert_eq!(outcome.mode, RestoreMode::CurrentlyTrashed);
        assert_eq!(outcome.cascade_count, 1);
        assert!(store.record(EntityType::Scan, 2).unwrap().lifecycle.is_active());
    }
}
