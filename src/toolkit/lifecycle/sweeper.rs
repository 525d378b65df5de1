use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::cascade::{CascadeResolver, SWEEP_ORDER};
use super::models::{LifecycleError, SweepReport};
use super::registry::{EntityType, TrashableType};
use super::state::retention_cutoff;
use super::trash::TrashService;
use super::txn::{finish, with_conflict_retry};
use crate::core::config::LifecycleConfig;
use crate::db::{EntityStore, StateFilter, StoreTransaction};


#[derive(Debug, Default, Clone, Copy)]
struct TypeSweep {
    deleted: usize,
    blocked: usize,
}

/// Deletes every record of `entity_type` trashed before `cutoff` that nothing
/// references any more. Repeats until a pass deletes nothing, so a location
/// subtree that expired as a whole goes in one run.
async fn sweep_type(
    tx: &mut dyn StoreTransaction,
    resolver: &CascadeResolver,
    entity_type: EntityType,
    cutoff: DateTime<Utc>,
) -> Result<TypeSweep, LifecycleError> {
    let mut result = TypeSweep::default();

    loop {
        let expired = tx
            .find_where(entity_type, StateFilter::TrashedBefore(cutoff))
            .await?;

        let mut blocked = 0;
        let mut progressed = false;
        for record in expired {
            let dependents = resolver.dependents(tx, entity_type, record.id).await?;
            if !dependents.is_empty() {
                debug!(
                    "Expired {} #{} still has {} dependents",
                    entity_type,
                    record.id,
                    dependents.len()
                );
                blocked += 1;
                continue;
            }
            tx.delete(entity_type, record.id).await?;
            result.deleted += 1;
            progressed = true;
        }

        if !progressed {
            result.blocked = blocked;
            return Ok(result);
        }
    }
}

fn record_type(report: &mut SweepReport, entity_type: EntityType, outcome: Result<TypeSweep, LifecycleError>) {
    match outcome {
        Ok(swept) => {
            if swept.deleted > 0 {
                report.deleted.insert(entity_type, swept.deleted);
            }
            if swept.blocked > 0 {
                warn!(
                    "{} expired {} record(s) kept: still referenced",
                    swept.blocked, entity_type
                );
                report.blocked.insert(entity_type, swept.blocked);
            }
        }
        Err(e) => {
            error!("Sweep of {} failed: {}", entity_type, e);
            report.failed.insert(entity_type, e.to_string());
        }
    }
}

/// Permanently deletes records trashed longer ago than the retention window,
/// children before parents.
///
/// A real sweep commits each type on its own, so one failing type does not
/// hold back the rest. A dry run walks every type in a single transaction and
/// rolls it back, so parents whose children would go first are counted too.
pub async fn sweep_expired(
    store: &dyn EntityStore,
    resolver: &CascadeResolver,
    config: &LifecycleConfig,
    now: DateTime<Utc>,
    dry_run: bool,
) -> SweepReport {
    let cutoff = retention_cutoff(now, config.retention());
    let mut report = SweepReport::new(cutoff, dry_run);
    let types = SWEEP_ORDER.iter().copied().filter(|t| TrashableType::new(*t).is_some());

    info!(
        "Sweeping records trashed before {}{}",
        cutoff.format("%Y-%m-%d %H:%M:%S"),
        if dry_run { " (dry run)" } else { "" }
    );

    if dry_run {
        let mut tx = match store.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                error!("Dry-run sweep could not open a transaction: {}", e);
                for t in types {
                    report.failed.insert(t, e.to_string());
                }
                return report;
            }
        };
        for t in types {
            let outcome = sweep_type(tx.as_mut(), resolver, t, cutoff).await;
            record_type(&mut report, t, outcome);
        }
        if let Err(e) = tx.rollback().await {
            warn!("Dry-run rollback failed: {}", e);
        }
    } else {
        for t in types {
            let outcome = with_conflict_retry("sweep", config.max_conflict_retries, || async {
                let mut tx = store.begin().await?;
                let result = sweep_type(tx.as_mut(), resolver, t, cutoff).await;
                finish(tx, result).await
            })
            .await;
            record_type(&mut report, t, outcome);
        }
    }

    info!(
        "Sweep finished: {} deleted, {} blocked, {} failed types",
        report.total_deleted(),
        report.blocked.values().sum::<usize>(),
        report.failed.len()
    );
    report
}


/// Runs the retention sweep on a fixed interval inside the current runtime.
#[derive(Clone)]
pub struct RetentionSweeper {
    service: TrashService,
}

impl RetentionSweeper {
    pub fn new(service: TrashService) -> Self {
        Self { service }
    }

    pub async fn run_once(&self) -> SweepReport {
        self.service.sweep_expired().await
    }

    /// Sweeps immediately, then every `interval`, until the handle is shut down.
    pub fn spawn(self, interval: Duration) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.run_once().await;
                        if !report.is_clean() {
                            warn!("Sweep left {} failed types", report.failed.len());
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("Retention sweeper stopping");
                            break;
                        }
                    }
                }
            }
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}


pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the loop. A sweep already in progress finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("Retention sweeper task failed: {}", e);
        }
    }
}
