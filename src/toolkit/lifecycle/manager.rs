use std::sync::Arc;
use tracing::info;

use crate::core::config::LifecycleConfig;
use crate::db::{EntityId, EntityStore};
use super::archive::ArchiveService;
use super::models::{
    ArchiveOutcome, ArchiveStats, ArchivedItem, DeleteOutcome, LifecycleError, Page,
    RestoreMode, RestoreOutcome, SweepReport, TrashOutcome, TrashStats, TrashedItem,
    UnarchiveOutcome,
};
use super::registry::{ArchivableType, TrashableType};
use super::sweeper::{RetentionSweeper, SweeperHandle};
use super::trash::TrashService;


/// Entry point for callers that address entities by type tag (route
/// handlers, jobs). Tags are checked against the trash or archive registry
/// before anything is read.
#[derive(Clone)]
pub struct LifecycleManager {
    trash: TrashService,
    archive: ArchiveService,
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn EntityStore>, config: LifecycleConfig) -> Self {
        info!(
            "Initializing LifecycleManager (retention {} days)",
            config.retention_days
        );
        let config = Arc::new(config);
        Self {
            trash: TrashService::new(store.clone(), config.clone()),
            archive: ArchiveService::new(store, config),
        }
    }


    pub fn trash_service(&self) -> &TrashService {
        &self.trash
    }


    pub fn archive_service(&self) -> &ArchiveService {
        &self.archive
    }


    pub fn config(&self) -> &LifecycleConfig {
        self.trash.config()
    }


    pub async fn trash(
        &self,
        entity_type: &str,
        entity_id: EntityId,
        actor: Option<&str>,
        cascade: bool,
    ) -> Result<TrashOutcome, LifecycleError> {
        let t = TrashableType::from_tag(entity_type)?;
        self.trash.trash(t, entity_id, actor, cascade).await
    }


    pub async fn restore(
        &self,
        entity_type: &str,
        entity_id: EntityId,
        cascade: bool,
        mode: RestoreMode,
    ) -> Result<RestoreOutcome, LifecycleError> {
        let t = TrashableType::from_tag(entity_type)?;
        self.trash.restore_with_mode(t, entity_id, cascade, mode).await
    }


    pub async fn permanently_delete(
        &self,
        entity_type: &str,
        entity_id: EntityId,
        force: bool,
    ) -> Result<DeleteOutcome, LifecycleError> {
        let t = TrashableType::from_tag(entity_type)?;
        self.trash.permanently_delete(t, entity_id, force).await
    }


    pub async fn list_trashed(
        &self,
        entity_type: Option<&str>,
        page: usize,
        per_page: Option<usize>,
    ) -> Result<Page<TrashedItem>, LifecycleError> {
        let t = entity_type.map(TrashableType::from_tag).transpose()?;
        let per_page = per_page.unwrap_or(self.config().default_page_size);
        self.trash.list_trashed(t, page, per_page).await
    }


    pub async fn trash_stats(&self) -> Result<TrashStats, LifecycleError> {
        self.trash.stats().await
    }


    pub async fn archive(
        &self,
        entity_type: &str,
        entity_id: EntityId,
        actor: Option<&str>,
    ) -> Result<ArchiveOutcome, LifecycleError> {
        let t = ArchivableType::from_tag(entity_type)?;
        self.archive.archive(t, entity_id, actor).await
    }


    pub async fn unarchive(
        &self,
        entity_type: &str,
        entity_id: EntityId,
    ) -> Result<UnarchiveOutcome, LifecycleError> {
        let t = ArchivableType::from_tag(entity_type)?;
        self.archive.unarchive(t, entity_id).await
    }


    pub async fn list_archived(
        &self,
        entity_type: Option<&str>,
        page: usize,
        per_page: Option<usize>,
    ) -> Result<Page<ArchivedItem>, LifecycleError> {
        let t = entity_type.map(ArchivableType::from_tag).transpose()?;
        let per_page = per_page.unwrap_or(self.config().default_page_size);
        self.archive.list_archived(t, page, per_page).await
    }


    pub async fn archive_stats(&self) -> Result<ArchiveStats, LifecycleError> {
        self.archive.stats().await
    }


    pub async fn sweep_expired(&self, dry_run: bool) -> SweepReport {
        if dry_run {
            self.trash.preview_expired().await
        } else {
            self.trash.sweep_expired().await
        }
    }


    /// Starts the in-process sweeper at the configured interval.
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        let interval = self.config().sweep_interval();
        info!("Starting retention sweeper every {:?}", interval);
        RetentionSweeper::new(self.trash.clone()).spawn(interval)
    }
}
