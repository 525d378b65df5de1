

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    Active,
    Trashed,
    Archived,
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Trashed => write!(f, "trashed"),
            Self::Archived => write!(f, "archived"),
        }
    }
}


/// Soft-state columns carried by every lifecycle-managed record.
///
/// `trashed_*` and `archived_*` are only ever set and cleared in pairs, and
/// never both at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trashed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trashed_by: Option<String>,
    /// Identifies the trash operation (root and cascade) that set `trashed_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trash_batch: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_by: Option<String>,
}

impl LifecycleState {
    pub fn status(&self) -> LifecycleStatus {
        if self.trashed_at.is_some() {
            LifecycleStatus::Trashed
        } else if self.archived_at.is_some() {
            LifecycleStatus::Archived
        } else {
            LifecycleStatus::Active
        }
    }

    pub fn is_trashed(&self) -> bool {
        self.trashed_at.is_some()
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.trashed_at.is_none() && self.archived_at.is_none()
    }

    pub fn scheduled_deletion_date(&self, retention: Duration) -> Option<DateTime<Utc>> {
        self.trashed_at.map(|at| deletion_deadline(at, retention))
    }

    /// Whole days left before the retention window closes, floored at zero.
    pub fn days_until_permanent_deletion(
        &self,
        retention: Duration,
        now: DateTime<Utc>,
    ) -> Option<i64> {
        self.scheduled_deletion_date(retention)
            .map(|date| (date - now).num_days().max(0))
    }

    /// True once the record has sat in the trash for longer than `retention`.
    pub fn is_expired(&self, retention: Duration, now: DateTime<Utc>) -> bool {
        self.trashed_at.is_some_and(|at| at < retention_cutoff(now, retention))
    }

    pub(crate) fn mark_trashed(&mut self, at: DateTime<Utc>, by: &str, batch: Uuid) {
        self.trashed_at = Some(at);
        self.trashed_by = Some(by.to_string());
        self.trash_batch = Some(batch);
    }

    pub(crate) fn clear_trash(&mut self) {
        self.trashed_at = None;
        self.trashed_by = None;
        self.trash_batch = None;
    }

    pub(crate) fn mark_archived(&mut self, at: DateTime<Utc>, by: &str) {
        self.archived_at = Some(at);
        self.archived_by = Some(by.to_string());
    }

    pub(crate) fn clear_archive(&mut self) {
        self.archived_at = None;
        self.archived_by = None;
    }
}


/// `at + retention`, pinned to the latest representable instant on overflow.
pub fn deletion_deadline(at: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    at.checked_add_signed(retention).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `now - retention`, pinned to the earliest representable instant on
/// overflow, so nothing counts as expired.
pub fn retention_cutoff(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(retention).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
