

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::toolkit::lifecycle::registry::EntityType;
use crate::toolkit::lifecycle::state::LifecycleState;


pub type EntityId = i64;


/// Foreign keys that cascade rules match on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ForeignKey {
    LabId,
    ProjectId,
    QueueId,
    ParentLocationId,
}


/// The slice of an entity row the lifecycle engine works with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_type: EntityType,
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_location_id: Option<EntityId>,

    #[serde(default)]
    pub lifecycle: LifecycleState,

    /// Bumped by the store on every committed write.
    #[serde(default)]
    pub version: u64,
}

impl EntityRecord {
    pub fn new(entity_type: EntityType, id: EntityId) -> Self {
        Self {
            entity_type,
            id,
            name: None,
            lab_id: None,
            project_id: None,
            queue_id: None,
            parent_location_id: None,
            lifecycle: LifecycleState::default(),
            version: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_lab(mut self, lab_id: EntityId) -> Self {
        self.lab_id = Some(lab_id);
        self
    }

    pub fn with_project(mut self, project_id: EntityId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn with_queue(mut self, queue_id: EntityId) -> Self {
        self.queue_id = Some(queue_id);
        self
    }

    pub fn with_parent_location(mut self, parent_location_id: EntityId) -> Self {
        self.parent_location_id = Some(parent_location_id);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: LifecycleState) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn foreign_key(&self, key: ForeignKey) -> Option<EntityId> {
        match key {
            ForeignKey::LabId => self.lab_id,
            ForeignKey::ProjectId => self.project_id,
            ForeignKey::QueueId => self.queue_id,
            ForeignKey::ParentLocationId => self.parent_location_id,
        }
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("{} #{}", self.entity_type, self.id),
        }
    }
}
