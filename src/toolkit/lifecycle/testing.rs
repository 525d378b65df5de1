//! Shared fixtures for lifecycle tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use super::registry::EntityType;
use crate::db::{
    EntityId, EntityRecord, EntityStore, ForeignKey, InMemoryStore, StateFilter, StoreError,
    StoreTransaction,
};


/// Two labs. Lab 1 owns projects 10 and 11, queue 40 with scans 500/501, a
/// location 350 with a sub-location 351, and one record of every other lab
/// child type. Lab 2 owns a project, a sample, equipment and a scan.
pub(crate) fn lab_fixture() -> InMemoryStore {
    use EntityType::*;

    InMemoryStore::with_records([
        EntityRecord::new(Lab, 1).with_name("Thin Films"),
        EntityRecord::new(Lab, 2).with_name("Cryo"),
        EntityRecord::new(Project, 10).with_lab(1),
        EntityRecord::new(Project, 11).with_lab(1),
        EntityRecord::new(Project, 20).with_lab(2),
        EntityRecord::new(Sample, 100).with_lab(1).with_project(10),
        EntityRecord::new(Sample, 101).with_lab(1).with_project(10),
        EntityRecord::new(Sample, 102).with_lab(1).with_project(11),
        EntityRecord::new(Sample, 200).with_lab(2).with_project(20),
        EntityRecord::new(Equipment, 300).with_lab(1),
        EntityRecord::new(Equipment, 301).with_lab(1),
        EntityRecord::new(Equipment, 302).with_lab(2),
        EntityRecord::new(Precursor, 310).with_lab(1).with_project(10),
        EntityRecord::new(Procedure, 320).with_lab(1),
        EntityRecord::new(Instrument, 330).with_lab(1),
        EntityRecord::new(Computer, 340).with_lab(1),
        EntityRecord::new(Location, 350).with_lab(1),
        EntityRecord::new(Location, 351).with_parent_location(350),
        EntityRecord::new(Queue, 40).with_lab(1).with_project(10),
        EntityRecord::new(Scan, 500).with_lab(1).with_project(10).with_queue(40),
        EntityRecord::new(Scan, 501).with_lab(1).with_project(10).with_queue(40),
        EntityRecord::new(Scan, 502).with_lab(2),
        EntityRecord::new(Driver, 600),
        EntityRecord::new(Issue, 700),
    ])
    .expect("fixture ids are unique")
}

pub(crate) fn trashed_days_ago(mut record: EntityRecord, days: i64) -> EntityRecord {
    record
        .lifecycle
        .mark_trashed(Utc::now() - Duration::days(days), "alice", Uuid::new_v4());
    record
}

pub(crate) fn archived_days_ago(mut record: EntityRecord, days: i64) -> EntityRecord {
    record
        .lifecycle
        .mark_archived(Utc::now() - Duration::days(days), "bob");
    record
}

/// Archives a stored record without going through the archive service.
pub(crate) async fn archive_directly(store: &InMemoryStore, entity_type: EntityType, id: EntityId) {
    let mut tx = store.begin().await.unwrap();
    let mut record = tx.get(entity_type, id).await.unwrap().unwrap();
    record.lifecycle.mark_archived(Utc::now(), "bob");
    tx.save(record).await.unwrap();
    tx.commit().await.unwrap();
}


/// Store whose transactions yield to the scheduler on every read and before
/// commit, so operations joined on one task interleave the way concurrent
/// requests would.
#[derive(Clone)]
pub(crate) struct InterleavingStore {
    inner: InMemoryStore,
    begins: Arc<AtomicUsize>,
}

impl InterleavingStore {
    pub(crate) fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            begins: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityStore for InterleavingStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.begin().await?;
        Ok(Box::new(InterleavingTransaction { inner }))
    }
}

struct InterleavingTransaction {
    inner: Box<dyn StoreTransaction>,
}

#[async_trait]
impl StoreTransaction for InterleavingTransaction {
    async fn get(
        &mut self,
        entity_type: EntityType,
        id: EntityId,
    ) -> Result<Option<EntityRecord>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.get(entity_type, id).await
    }

    async fn find_by(
        &mut self,
        entity_type: EntityType,
        key: ForeignKey,
        value: EntityId,
    ) -> Result<Vec<EntityRecord>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.find_by(entity_type, key, value).await
    }

    async fn find_where(
        &mut self,
        entity_type: EntityType,
        filter: StateFilter,
    ) -> Result<Vec<EntityRecord>, StoreError> {
        tokio::task::yield_now().await;
        self.inner.find_where(entity_type, filter).await
    }

    async fn save(&mut self, record: EntityRecord) -> Result<(), StoreError> {
        self.inner.save(record).await
    }

    async fn delete(&mut self, entity_type: EntityType, id: EntityId) -> Result<(), StoreError> {
        self.inner.delete(entity_type, id).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.rollback().await
    }
}
