//! Worker registry with liveness tracking.
//!
//! The registry is the master's source of truth for lease eligibility
//! and fleet visibility. Stop flags set here are sticky: a worker
//! cannot un-cancel itself by racing a stale heartbeat. Side effects
//! are confined to the registry's own map; no I/O happens here.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::{debug, info};

use ffarm_models::{Worker, WorkerStatus};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown worker: {0}")]
    UnknownWorker(String),

    #[error("worker {0} is force-stopping with a job still attributed")]
    ResumeWhileForceStopping(String),
}

/// In-memory map of worker id to worker record.
#[derive(Default)]
pub struct WorkerRegistry {
    inner: Mutex<HashMap<String, Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sign of life from a worker, creating the record on
    /// first contact. Used for both heartbeats and lease requests.
    pub fn touch(&self, worker_id: &str, name: &str) -> Worker {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let worker = inner
            .entry(worker_id.to_string())
            .or_insert_with(|| {
                info!(worker_id, name, "Worker joined the fleet");
                Worker::new(worker_id, name)
            });
        worker.name = name.to_string();
        worker.last_seen = Utc::now();
        worker.clone()
    }

    /// Process a heartbeat and return `(accept_leases, effective_status)`.
    ///
    /// The registry's stop flags win over the worker's self-report; a
    /// drained worker with no running job settles into `Stopped`, and a
    /// previously expired worker that reports back comes online again.
    pub fn upsert_heartbeat(
        &self,
        worker_id: &str,
        name: &str,
        running_job_id: Option<u64>,
        _self_reported_status: WorkerStatus,
    ) -> (bool, WorkerStatus) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let worker = inner
            .entry(worker_id.to_string())
            .or_insert_with(|| {
                info!(worker_id, name, "Worker joined the fleet");
                Worker::new(worker_id, name)
            });
        worker.name = name.to_string();
        worker.last_seen = Utc::now();
        worker.running_job_id = running_job_id;

        match worker.status {
            // Sticky while a job is attributed; cleared only by
            // completion (or an idle acknowledgement) plus explicit
            // resume.
            WorkerStatus::ForceStopping => {
                worker.accept_leases = false;
                if running_job_id.is_none() {
                    debug!(worker_id, "Force stop acknowledged");
                    worker.status = WorkerStatus::Stopped;
                }
            }
            WorkerStatus::Stopping => {
                worker.accept_leases = false;
                if running_job_id.is_none() {
                    debug!(worker_id, "Drain complete");
                    worker.status = WorkerStatus::Stopped;
                }
            }
            WorkerStatus::Stopped => {
                if worker.accept_leases {
                    worker.status = WorkerStatus::Online;
                }
            }
            WorkerStatus::Online => {}
        }

        (worker.accept_leases, worker.status)
    }

    /// Flag a worker for drain (`force = false`) or abort (`force = true`).
    /// Idempotent; a drain may be upgraded to an abort.
    pub fn mark_stopping(&self, worker_id: &str, force: bool) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let worker = inner
            .get_mut(worker_id)
            .ok_or_else(|| RegistryError::UnknownWorker(worker_id.to_string()))?;

        worker.accept_leases = false;
        worker.status = if force {
            WorkerStatus::ForceStopping
        } else if worker.status == WorkerStatus::ForceStopping {
            // Never downgrade an abort to a drain.
            WorkerStatus::ForceStopping
        } else {
            WorkerStatus::Stopping
        };
        info!(worker_id, force, "Worker marked stopping");
        Ok(())
    }

    /// Clear stop state and restore lease eligibility.
    ///
    /// Invalid while the worker is force-stopping with a job still
    /// attributed: that job must complete or be reassigned first.
    pub fn mark_resumed(&self, worker_id: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let worker = inner
            .get_mut(worker_id)
            .ok_or_else(|| RegistryError::UnknownWorker(worker_id.to_string()))?;

        if worker.status == WorkerStatus::ForceStopping && worker.running_job_id.is_some() {
            return Err(RegistryError::ResumeWhileForceStopping(worker_id.to_string()));
        }

        worker.status = WorkerStatus::Online;
        worker.accept_leases = true;
        info!(worker_id, "Worker resumed");
        Ok(())
    }

    pub fn get(&self, worker_id: &str) -> Option<Worker> {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .get(worker_id)
            .cloned()
    }

    /// Fleet snapshot in stable order by id.
    pub fn list(&self) -> Vec<Worker> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        let mut workers: Vec<Worker> = inner.values().cloned().collect();
        workers.sort_by(|a, b| a.id.cmp(&b.id));
        workers
    }

    pub fn online_count(&self) -> usize {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .values()
            .filter(|w| w.status == WorkerStatus::Online)
            .count()
    }

    /// Attribute (or clear) a running job on a worker record.
    pub fn set_running_job(&self, worker_id: &str, job_id: Option<u64>) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        if let Some(worker) = inner.get_mut(worker_id) {
            worker.running_job_id = job_id;
        }
    }

    /// Settle a worker's stop state after its job finished: a stopping
    /// or force-stopping worker with nothing attributed becomes
    /// `Stopped` and stays ineligible until resumed.
    pub fn settle_after_completion(&self, worker_id: &str) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        if let Some(worker) = inner.get_mut(worker_id) {
            worker.running_job_id = None;
            if matches!(
                worker.status,
                WorkerStatus::Stopping | WorkerStatus::ForceStopping
            ) {
                worker.status = WorkerStatus::Stopped;
                worker.accept_leases = false;
            }
        }
    }

    /// Workers with no sign of life inside the liveness window,
    /// excluding those already stopped.
    pub fn expired_workers(&self, window: Duration) -> Vec<Worker> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner
            .values()
            .filter(|w| w.status != WorkerStatus::Stopped && w.is_expired(window))
            .cloned()
            .collect()
    }

    /// Treat a vanished worker as offline.
    pub fn mark_expired(&self, worker_id: &str) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        if let Some(worker) = inner.get_mut(worker_id) {
            worker.status = WorkerStatus::Stopped;
            worker.running_job_id = None;
        }
    }
}
