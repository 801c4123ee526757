//! Expired Document Reclamation
//!
//! Background task that periodically deletes every document whose expiry has
//! passed, whether or not anyone reads it.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::DocumentCache;

/// Handle to a running reclamation task.
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct ReclaimTask {
    handle: JoinHandle<()>,
}

impl ReclaimTask {
    /// Stops the task. A sweep in flight is abandoned.
    pub fn stop(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ReclaimTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawns a task that calls [`DocumentCache::reclaim_expired`] every `period`,
/// starting immediately.
///
/// The task only holds a weak reference, so it also ends once the cache is
/// dropped. A failed sweep is logged and retried on the next tick.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(DocumentCache::new(store, &config));
/// let reclaimer = spawn_reclaim_task(&cache, Duration::from_secs(100));
/// // Later, during shutdown:
/// reclaimer.stop();
/// ```
pub fn spawn_reclaim_task(cache: &Arc<DocumentCache>, period: Duration) -> ReclaimTask {
    let weak: Weak<DocumentCache> = Arc::downgrade(cache);
    let period = period.max(Duration::from_millis(1));

    let handle = tokio::spawn(async move {
        info!(
            "Starting reclamation task with a period of {} ms",
            period.as_millis()
        );

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(cache) = weak.upgrade() else {
                debug!("Cache dropped, stopping reclamation task");
                break;
            };

            match cache.reclaim_expired().await {
                Ok(0) => debug!("Reclamation: no expired documents found"),
                Ok(removed) => info!("Reclamation: removed {} expired documents", removed),
                Err(err) => warn!(error = %err, "Reclamation sweep failed, retrying next period"),
            }
        }
    });

    ReclaimTask { handle }
}
