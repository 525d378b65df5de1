

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use im::{HashMap as ImHashMap, OrdMap};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::models::{EntityId, EntityRecord, ForeignKey};
use super::store::{EntityStore, StateFilter, StoreError, StoreTransaction};
use crate::toolkit::lifecycle::registry::EntityType;


type Table = OrdMap<EntityId, EntityRecord>;

type Tables = ImHashMap<EntityType, Table>;


#[derive(Serialize, Deserialize)]
struct StoreSnapshot {
    records: Vec<EntityRecord>,
}


/// Reference [`EntityStore`] backed by persistent maps.
///
/// Transactions snapshot the tables in O(1) at `begin` and validate record
/// versions at `commit` (first committer wins).
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(
        records: impl IntoIterator<Item = EntityRecord>,
    ) -> Result<Self, StoreError> {
        let store = Self::new();
        for record in records {
            store.insert(record)?;
        }
        Ok(store)
    }

    /// Inserts a record outside any transaction (seeding, imports).
    pub fn insert(&self, mut record: EntityRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if version_of(&tables, record.entity_type, record.id).is_some() {
            return Err(StoreError::DuplicateKey {
                entity_type: record.entity_type,
                id: record.id,
            });
        }
        record.version = record.version.max(1);
        put(&mut tables, record);
        Ok(())
    }

    pub fn record(&self, entity_type: EntityType, id: EntityId) -> Option<EntityRecord> {
        self.tables
            .read()
            .get(&entity_type)
            .and_then(|table| table.get(&id))
            .cloned()
    }

    pub fn records(&self) -> Vec<EntityRecord> {
        let tables = self.tables.read();
        let mut records: Vec<EntityRecord> = tables
            .values()
            .flat_map(|table| table.values().cloned())
            .collect();
        records.sort_by_key(|r| (r.entity_type, r.id));
        records
    }

    pub fn len(&self) -> usize {
        self.tables.read().values().map(|table| table.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn load_json(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path)?;
        let snapshot: StoreSnapshot = serde_json::from_str(&raw)?;
        let store = Self::with_records(snapshot.records)?;
        info!("Loaded {} records from {}", store.len(), path.display());
        Ok(store)
    }

    /// Writes all records to `path`, replacing it atomically.
    pub fn save_json(&self, path: &Path) -> Result<(), StoreError> {
        let snapshot = StoreSnapshot {
            records: self.records(),
        };
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&snapshot)?)?;
        std::fs::rename(&tmp, path)?;
        info!("Saved {} records to {}", snapshot.records.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let snapshot = self.tables.read().clone();
        Ok(Box::new(MemoryTransaction {
            live: Arc::clone(&self.tables),
            snapshot,
            writes: BTreeMap::new(),
        }))
    }
}


pub struct MemoryTransaction {
    live: Arc<RwLock<Tables>>,
    snapshot: Tables,
    /// `None` marks a delete.
    writes: BTreeMap<(EntityType, EntityId), Option<EntityRecord>>,
}

impl MemoryTransaction {
    fn visible(&self, entity_type: EntityType) -> Vec<EntityRecord> {
        let mut records: Vec<EntityRecord> = self
            .snapshot
            .get(&entity_type)
            .map(|table| {
                table
                    .values()
                    .filter(|r| !self.writes.contains_key(&(entity_type, r.id)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        records.extend(
            self.writes
                .range((entity_type, EntityId::MIN)..=(entity_type, EntityId::MAX))
                .filter_map(|(_, write)| write.clone()),
        );
        records.sort_by_key(|r| r.id);
        records
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(
        &mut self,
        entity_type: EntityType,
        id: EntityId,
    ) -> Result<Option<EntityRecord>, StoreError> {
        if let Some(write) = self.writes.get(&(entity_type, id)) {
            return Ok(write.clone());
        }
        Ok(self
            .snapshot
            .get(&entity_type)
            .and_then(|table| table.get(&id))
            .cloned())
    }

    async fn find_by(
        &mut self,
        entity_type: EntityType,
        key: ForeignKey,
        value: EntityId,
    ) -> Result<Vec<EntityRecord>, StoreError> {
        Ok(self
            .visible(entity_type)
            .into_iter()
            .filter(|r| r.foreign_key(key) == Some(value))
            .collect())
    }

    async fn find_where(
        &mut self,
        entity_type: EntityType,
        filter: StateFilter,
    ) -> Result<Vec<EntityRecord>, StoreError> {
        Ok(self
            .visible(entity_type)
            .into_iter()
            .filter(|r| filter.matches(&r.lifecycle))
            .collect())
    }

    async fn save(&mut self, record: EntityRecord) -> Result<(), StoreError> {
        self.writes
            .insert((record.entity_type, record.id), Some(record));
        Ok(())
    }

    async fn delete(&mut self, entity_type: EntityType, id: EntityId) -> Result<(), StoreError> {
        self.writes.insert((entity_type, id), None);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            live,
            snapshot,
            writes,
        } = *self;

        if writes.is_empty() {
            return Ok(());
        }

        let mut tables = live.write();
        for &(entity_type, id) in writes.keys() {
            if version_of(&snapshot, entity_type, id) != version_of(&tables, entity_type, id) {
                warn!("Commit rejected: {} #{} changed since snapshot", entity_type, id);
                return Err(StoreError::Conflict { entity_type, id });
            }
        }

        let count = writes.len();
        for ((entity_type, id), write) in writes {
            match write {
                Some(mut record) => {
                    record.version = version_of(&snapshot, entity_type, id).map_or(1, |v| v + 1);
                    put(&mut tables, record);
                }
                None => remove(&mut tables, entity_type, id),
            }
        }

        debug!("Committed {} writes", count);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        debug!("Rolled back {} pending writes", self.writes.len());
        Ok(())
    }
}


fn version_of(tables: &Tables, entity_type: EntityType, id: EntityId) -> Option<u64> {
    tables
        .get(&entity_type)
        .and_then(|table| table.get(&id))
        .map(|r| r.version)
}

fn put(tables: &mut Tables, record: EntityRecord) {
    let entity_type = record.entity_type;
    let mut table = tables.get(&entity_type).cloned().unwrap_or_default();
    table.insert(record.id, record);
    tables.insert(entity_type, table);
}

fn remove(tables: &mut Tables, entity_type: EntityType, id: EntityId) {
    if let Some(table) = tables.get(&entity_type) {
        let mut table = table.clone();
        table.remove(&id);
        tables.insert(entity_type, table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: EntityId, lab: EntityId) -> EntityRecord {
        EntityRecord::new(EntityType::Sample, id).with_lab(lab)
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let store = InMemoryStore::new();
        store.insert(sample(1, 10)).unwrap();
        assert!(matches!(
            store.insert(sample(1, 11)),
            Err(StoreError::DuplicateKey { id: 1, .. })
        ));
        assert_eq!(store.len(), 1);
        assert_eq!(store.record(EntityType::Sample, 1).unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_writes_invisible_until_commit() {
        let store = InMemoryStore::with_records([sample(1, 10)]).unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut record = tx.get(EntityType::Sample, 1).await.unwrap().unwrap();
        record.name = Some("renamed".into());
        tx.save(record).await.unwrap();
        tx.save(sample(2, 10)).await.unwrap();

        assert_eq!(tx.find_by(EntityType::Sample, ForeignKey::LabId, 10).await.unwrap().len(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.record(EntityType::Sample, 1).unwrap().name.is_none());

        tx.commit().await.unwrap();
        assert_eq!(store.len(), 2);
        let committed = store.record(EntityType::Sample, 1).unwrap();
        assert_eq!(committed.name.as_deref(), Some("renamed"));
        assert_eq!(committed.version, 2);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = InMemoryStore::with_records([sample(1, 10)]).unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.delete(EntityType::Sample, 1).await.unwrap();
        assert!(tx.get(EntityType::Sample, 1).await.unwrap().is_none());
        assert!(tx.find_where(EntityType::Sample, StateFilter::All).await.unwrap().is_empty());
        tx.rollback().await.unwrap();

        assert!(store.record(EntityType::Sample, 1).is_some());
    }

    #[tokio::test]
    async fn test_concurrent_writers_first_commit_wins() {
        let store = InMemoryStore::with_records([sample(1, 10)]).unwrap();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        let mut a = first.get(EntityType::Sample, 1).await.unwrap().unwrap();
        let mut b = second.get(EntityType::Sample, 1).await.unwrap().unwrap();
        a.name = Some("first".into());
        b.name = Some("second".into());
        first.save(a).await.unwrap();
        second.save(b).await.unwrap();

        first.commit().await.unwrap();
        assert!(matches!(
            second.commit().await,
            Err(StoreError::Conflict { entity_type: EntityType::Sample, id: 1 })
        ));
        assert_eq!(
            store.record(EntityType::Sample, 1).unwrap().name.as_deref(),
            Some("first")
        );
    }

    #[tokio::test]
    async fn test_snapshot_isolation_for_readers() {
        let store = InMemoryStore::with_records([sample(1, 10)]).unwrap();
        let mut reader = store.begin().await.unwrap();

        store.insert(sample(2, 10)).unwrap();

        let seen = reader.find_by(EntityType::Sample, ForeignKey::LabId, 10).await.unwrap();
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn test_conflict_on_delete_of_changed_record() {
        let store = InMemoryStore::with_records([sample(1, 10)]).unwrap();
        let mut deleter = store.begin().await.unwrap();
        deleter.delete(EntityType::Sample, 1).await.unwrap();

        let mut writer = store.begin().await.unwrap();
        let record = writer.get(EntityType::Sample, 1).await.unwrap().unwrap();
        writer.save(record).await.unwrap();
        writer.commit().await.unwrap();

        assert!(deleter.commit().await.is_err());
        assert!(store.record(EntityType::Sample, 1).is_some());
    }

    #[test]
    fn test_json_snapshot_round_trip() {
        let path = std::env::temp_dir().join(format!("labvault-{}.json", uuid::Uuid::new_v4()));
        let store = InMemoryStore::with_records([
            sample(1, 10).with_name("quartz"),
            EntityRecord::new(EntityType::Lab, 10),
        ])
        .unwrap();

        store.save_json(&path).unwrap();
        let loaded = InMemoryStore::load_json(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.records(), store.records());
    }
}
