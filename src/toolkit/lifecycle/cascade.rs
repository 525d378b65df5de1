

use std::collections::{BTreeMap, HashSet, VecDeque};

use tracing::debug;
use uuid::Uuid;

use super::models::LifecycleError;
use super::registry::EntityType;
use super::state::LifecycleState;
use crate::db::{EntityId, EntityRecord, ForeignKey, StoreTransaction};


/// One parent -> child edge: children of type `child` whose `key` equals the
/// parent's id follow the parent. Recursive edges are re-applied to every
/// matched child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeRule {
    pub child: EntityType,
    pub key: ForeignKey,
    pub recursive: bool,
}

const fn edge(child: EntityType, key: ForeignKey) -> CascadeRule {
    CascadeRule {
        child,
        key,
        recursive: false,
    }
}

const LAB_RULES: &[CascadeRule] = &[
    edge(EntityType::Project, ForeignKey::LabId),
    edge(EntityType::Sample, ForeignKey::LabId),
    edge(EntityType::Equipment, ForeignKey::LabId),
    edge(EntityType::Precursor, ForeignKey::LabId),
    edge(EntityType::Procedure, ForeignKey::LabId),
    edge(EntityType::Instrument, ForeignKey::LabId),
    edge(EntityType::Location, ForeignKey::LabId),
    edge(EntityType::Computer, ForeignKey::LabId),
    edge(EntityType::Queue, ForeignKey::LabId),
    edge(EntityType::Scan, ForeignKey::LabId),
];

const PROJECT_RULES: &[CascadeRule] = &[
    edge(EntityType::Sample, ForeignKey::ProjectId),
    edge(EntityType::Scan, ForeignKey::ProjectId),
    edge(EntityType::Queue, ForeignKey::ProjectId),
    edge(EntityType::Procedure, ForeignKey::ProjectId),
    edge(EntityType::Precursor, ForeignKey::ProjectId),
];

const QUEUE_RULES: &[CascadeRule] = &[edge(EntityType::Scan, ForeignKey::QueueId)];

const LOCATION_RULES: &[CascadeRule] = &[CascadeRule {
    child: EntityType::Location,
    key: ForeignKey::ParentLocationId,
    recursive: true,
}];

pub fn rules_for(parent: EntityType) -> &'static [CascadeRule] {
    match parent {
        EntityType::Lab => LAB_RULES,
        EntityType::Project => PROJECT_RULES,
        EntityType::Queue => QUEUE_RULES,
        EntityType::Location => LOCATION_RULES,
        _ => &[],
    }
}


/// Sweep order: every type appears after all of its cascade children, so
/// children that expire together with their parent are removed first.
pub const SWEEP_ORDER: [EntityType; 22] = [
    EntityType::Scan,
    EntityType::Sample,
    EntityType::Equipment,
    EntityType::Precursor,
    EntityType::Procedure,
    EntityType::Instrument,
    EntityType::Computer,
    EntityType::Driver,
    EntityType::Template,
    EntityType::ScanTemplate,
    EntityType::QueueTemplate,
    EntityType::FabricationRun,
    EntityType::Issue,
    EntityType::EquipmentIssue,
    EntityType::DriverIssue,
    EntityType::Analysis,
    EntityType::EntityImage,
    EntityType::Attachment,
    EntityType::Queue,
    EntityType::Project,
    EntityType::Location,
    EntityType::Lab,
];


/// Which children a cascade picks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeSelection {
    /// Neither trashed nor archived.
    Active,
    Trashed,
    TrashedInBatch(Uuid),
}

impl CascadeSelection {
    pub fn matches(&self, state: &LifecycleState) -> bool {
        match self {
            Self::Active => state.is_active(),
            Self::Trashed => state.is_trashed(),
            Self::TrashedInBatch(batch) => state.is_trashed() && state.trash_batch == Some(*batch),
        }
    }
}


#[derive(Debug, Clone, Default)]
pub struct CascadePlan {
    /// Matched children in discovery (breadth-first) order.
    pub items: Vec<EntityRecord>,
}

impl CascadePlan {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn by_type(&self) -> BTreeMap<EntityType, Vec<EntityId>> {
        let mut grouped: BTreeMap<EntityType, Vec<EntityId>> = BTreeMap::new();
        for item in &self.items {
            grouped.entry(item.entity_type).or_default().push(item.id);
        }
        grouped
    }
}


#[derive(Debug, Clone, Copy)]
pub struct CascadeResolver {
    max_depth: usize,
}

impl CascadeResolver {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Collects the children that must follow `parent` through a transition.
    ///
    /// Uses a worklist and a visited set, so a cyclic location hierarchy
    /// terminates; a chain longer than `max_depth` is an error.
    pub async fn resolve(
        &self,
        tx: &mut dyn StoreTransaction,
        parent_type: EntityType,
        parent_id: EntityId,
        selection: CascadeSelection,
    ) -> Result<CascadePlan, LifecycleError> {
        let mut plan = CascadePlan::default();
        let mut visited: HashSet<(EntityType, EntityId)> = HashSet::new();
        visited.insert((parent_type, parent_id));

        let mut worklist: VecDeque<(EntityType, EntityId, usize)> = VecDeque::new();
        worklist.push_back((parent_type, parent_id, 0));

        while let Some((entity_type, id, depth)) = worklist.pop_front() {
            let is_root = depth == 0;
            for rule in rules_for(entity_type) {
                if !is_root && !rule.recursive {
                    continue;
                }

                let children = tx.find_by(rule.child, rule.key, id).await?;
                for child in children {
                    if !selection.matches(&child.lifecycle) {
                        continue;
                    }
                    if !visited.insert((child.entity_type, child.id)) {
                        debug!(
                            "Cascade from {} #{} revisited {} #{}, skipping",
                            parent_type, parent_id, child.entity_type, child.id
                        );
                        continue;
                    }
                    if rule.recursive {
                        if depth + 1 > self.max_depth {
                            return Err(LifecycleError::CascadeDepthExceeded {
                                entity_type: parent_type,
                                id: parent_id,
                                max_depth: self.max_depth,
                            });
                        }
                        worklist.push_back((child.entity_type, child.id, depth + 1));
                    }
                    plan.items.push(child);
                }
            }
        }

        debug!(
            "Cascade from {} #{} ({:?}) matched {} records",
            parent_type,
            parent_id,
            selection,
            plan.len()
        );
        Ok(plan)
    }

    /// Records that directly reference `parent` through any cascade edge,
    /// whatever their state.
    pub async fn dependents(
        &self,
        tx: &mut dyn StoreTransaction,
        parent_type: EntityType,
        parent_id: EntityId,
    ) -> Result<Vec<EntityRecord>, LifecycleError> {
        let mut found = Vec::new();
        for rule in rules_for(parent_type) {
            let children = tx.find_by(rule.child, rule.key, parent_id).await?;
            found.extend(
                children
                    .into_iter()
                    .filter(|c| !(c.entity_type == parent_type && c.id == parent_id)),
            );
        }
        Ok(found)
    }
}
