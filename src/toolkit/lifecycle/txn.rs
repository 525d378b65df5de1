

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::models::LifecycleError;
use crate::db::{StoreError, StoreTransaction};


const INITIAL_RETRY_DELAY_MS: u64 = 10;

const MAX_RETRY_DELAY_MS: u64 = 500;


/// Commits on success, rolls back on failure. A failed rollback is logged and
/// the original error is returned.
pub(crate) async fn finish<T>(
    tx: Box<dyn StoreTransaction>,
    result: Result<T, LifecycleError>,
) -> Result<T, LifecycleError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback after '{}' failed: {}", e, rollback_err);
            }
            Err(e)
        }
    }
}


/// Runs `op` again whenever its commit loses an optimistic-concurrency race.
///
/// Each attempt starts a fresh transaction, so preconditions are re-checked
/// against the winner's state.
pub(crate) async fn with_conflict_retry<T, F, Fut>(
    operation: &str,
    max_retries: u32,
    mut op: F,
) -> Result<T, LifecycleError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LifecycleError>>,
{
    let attempts = max_retries.saturating_add(1);
    let mut delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Err(LifecycleError::Store(StoreError::Conflict { entity_type, id })) => {
                if attempt == attempts {
                    warn!(
                        "{} on {} #{} lost {} commit races, giving up",
                        operation, entity_type, id, attempts
                    );
                    return Err(LifecycleError::Conflict {
                        entity_type,
                        id,
                        attempts,
                    });
                }
                debug!(
                    "{} on {} #{} conflicted (attempt {}), retrying in {:?}",
                    operation, entity_type, id, attempt, delay
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_millis(MAX_RETRY_DELAY_MS));
            }
            other => return other,
        }
    }
}
