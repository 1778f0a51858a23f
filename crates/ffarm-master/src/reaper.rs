//! Background reclaim of work from vanished workers.
//!
//! A worker that stops heartbeating past the liveness window is marked
//! offline and its leased or running jobs revert to pending, attempts
//! preserved, so another worker picks them up. This is the at-least-once
//! half of the lease protocol: the vanished worker may still finish its
//! transcode, but its now-stale reports carry an old attempt and are
//! dropped by the coordinator.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{info, warn};

use crate::metrics;
use crate::registry::WorkerRegistry;
use crate::store::JobStore;

/// Stale-worker reaper service.
pub struct StaleWorkerReaper {
    store: Arc<JobStore>,
    registry: Arc<WorkerRegistry>,
    sweep_interval: Duration,
    liveness_window: chrono::Duration,
}

impl StaleWorkerReaper {
    pub fn new(
        store: Arc<JobStore>,
        registry: Arc<WorkerRegistry>,
        sweep_interval: Duration,
        liveness_window: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            sweep_interval,
            liveness_window: chrono::Duration::from_std(liveness_window)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
        }
    }

    /// Run the sweep loop indefinitely; spawn as a background task.
    pub async fn run(&self) {
        info!(
            "Starting stale-worker reaper (interval: {:?}, window: {}s)",
            self.sweep_interval,
            self.liveness_window.num_seconds()
        );

        let mut ticker = interval(self.sweep_interval);
        loop {
            ticker.tick().await;
            let (expired, released) = self.sweep_once();
            if expired > 0 {
                info!(expired, released, "Stale-worker sweep reclaimed work");
            }

            metrics::set_pending_jobs(self.store.pending_count());
            metrics::set_online_workers(self.registry.online_count());
        }
    }

    /// One sweep: returns `(expired_workers, released_jobs)`.
    pub fn sweep_once(&self) -> (usize, usize) {
        let expired = self.registry.expired_workers(self.liveness_window);
        let mut released_jobs = 0;

        for worker in &expired {
            warn!(
                worker_id = %worker.id,
                name = %worker.name,
                last_seen = %worker.last_seen,
                "Worker missed its liveness window, reclaiming its jobs"
            );
            let released = self.store.release_for_worker(&worker.id);
            released_jobs += released.len();
            if !released.is_empty() {
                metrics::record_jobs_reclaimed(released.len() as u64);
                info!(worker_id = %worker.id, jobs = ?released, "Jobs reverted to pending");
            }
            self.registry.mark_expired(&worker.id);
        }

        (expired.len(), released_jobs)
    }
}
