

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::db::{EntityId, EntityRecord, ForeignKey, StateFilter, StoreError, StoreTransaction};

use super::models::LifecycleError;


#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize, Display, EnumString, IntoStaticStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityType {
    Lab,
    Project,
    Sample,
    Equipment,
    Precursor,
    Procedure,
    Instrument,
    Driver,
    Computer,
    Queue,
    Scan,
    Location,
    Template,
    ScanTemplate,
    QueueTemplate,
    FabricationRun,
    Issue,
    EquipmentIssue,
    DriverIssue,
    Analysis,
    #[serde(rename = "image")]
    #[strum(serialize = "image")]
    EntityImage,
    Attachment,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    pub fn capabilities(self) -> Capabilities {
        Capabilities {
            trashable: true,
            // Locations carry no archive columns.
            archivable: !matches!(self, Self::Location),
        }
    }

    pub fn all() -> impl Iterator<Item = EntityType> {
        Self::iter()
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub trashable: bool,
    pub archivable: bool,
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    Trash,
    Archive,
}

impl std::fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trash => write!(f, "trash"),
            Self::Archive => write!(f, "archive"),
        }
    }
}


/// An entity type proven to support trashing. Only obtainable through the
/// registry, so trash operations cannot be invoked on a type that lacks the
/// lifecycle columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrashableType(EntityType);

impl TrashableType {
    pub fn new(entity_type: EntityType) -> Option<Self> {
        entity_type.capabilities().trashable.then_some(Self(entity_type))
    }

    pub fn from_tag(tag: &str) -> Result<Self, LifecycleError> {
        tag.parse::<EntityType>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| LifecycleError::UnknownEntityType {
                tag: tag.to_string(),
                registry: RegistryKind::Trash,
            })
    }

    pub fn all() -> impl Iterator<Item = TrashableType> {
        EntityType::iter().filter_map(Self::new)
    }

    pub fn entity_type(self) -> EntityType {
        self.0
    }

    pub fn handle<'a>(self, tx: &'a mut dyn StoreTransaction) -> TypeHandle<'a> {
        TypeHandle { entity_type: self.0, tx }
    }
}


/// An entity type proven to support archiving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchivableType(EntityType);

impl ArchivableType {
    pub fn new(entity_type: EntityType) -> Option<Self> {
        entity_type.capabilities().archivable.then_some(Self(entity_type))
    }

    pub fn from_tag(tag: &str) -> Result<Self, LifecycleError> {
        tag.parse::<EntityType>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| LifecycleError::UnknownEntityType {
                tag: tag.to_string(),
                registry: RegistryKind::Archive,
            })
    }

    pub fn all() -> impl Iterator<Item = ArchivableType> {
        EntityType::iter().filter_map(Self::new)
    }

    pub fn entity_type(self) -> EntityType {
        self.0
    }

    pub fn handle<'a>(self, tx: &'a mut dyn StoreTransaction) -> TypeHandle<'a> {
        TypeHandle { entity_type: self.0, tx }
    }
}


/// Storage operations for one entity type inside an open transaction.
pub struct TypeHandle<'a> {
    entity_type: EntityType,
    tx: &'a mut dyn StoreTransaction,
}

impl TypeHandle<'_> {
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub async fn get(&mut self, id: EntityId) -> Result<Option<EntityRecord>, StoreError> {
        self.tx.get(self.entity_type, id).await
    }

    /// Like [`get`](Self::get), but a missing record is a `NotFound` error.
    pub async fn require(&mut self, id: EntityId) -> Result<EntityRecord, LifecycleError> {
        self.get(id).await?.ok_or(LifecycleError::NotFound {
            entity_type: self.entity_type,
            id,
        })
    }

    pub async fn find_by(
        &mut self,
        key: ForeignKey,
        value: EntityId,
    ) -> Result<Vec<EntityRecord>, StoreError> {
        self.tx.find_by(self.entity_type, key, value).await
    }

    pub async fn find_where(&mut self, filter: StateFilter) -> Result<Vec<EntityRecord>, StoreError> {
        self.tx.find_where(self.entity_type, filter).await
    }

    pub async fn save(&mut self, record: EntityRecord) -> Result<(), StoreError> {
        debug_assert_eq!(record.entity_type, self.entity_type);
        self.tx.save(record).await
    }

    pub async fn delete(&mut self, id: EntityId) -> Result<(), StoreError> {
        self.tx.delete(self.entity_type, id).await
    }
}
