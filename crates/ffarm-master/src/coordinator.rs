//! Lease coordination.
//!
//! The coordinator is the only component that mutates job and worker
//! records. Every worker call (lease, heartbeat, progress, completion)
//! and every operator action goes through here, so the registry and the
//! store never see conflicting writers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use ffarm_models::{CompletionReport, Job, JobState, ProgressReport, WorkerStatus};

use crate::metrics;
use crate::registry::{RegistryError, WorkerRegistry};
use crate::store::JobStore;

/// Outcome of one lease poll.
#[derive(Debug, Clone)]
pub enum LeaseDecision {
    /// A job was claimed for the caller
    Assign(Job),
    /// Drain: finish the current job, take no more work
    Stop,
    /// Abort the current job immediately
    ForceStop,
    /// Nothing to do; keep polling
    Wait { accept_leases: bool },
}

/// Master-side coordination state: pause flag, registry, job store.
/// Initialized at startup, torn down at shutdown; never ambient.
pub struct LeaseCoordinator {
    store: Arc<JobStore>,
    registry: Arc<WorkerRegistry>,
    paused: AtomicBool,
}

impl LeaseCoordinator {
    pub fn new(store: Arc<JobStore>, registry: Arc<WorkerRegistry>) -> Self {
        Self {
            store,
            registry,
            paused: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn store_arc(&self) -> Arc<JobStore> {
        Arc::clone(&self.store)
    }

    pub fn registry_arc(&self) -> Arc<WorkerRegistry> {
        Arc::clone(&self.registry)
    }

    /// Decide what a polling worker should do next.
    ///
    /// Priority order: force-stop flag, stop flag, global pause, claim.
    /// The claim itself is atomic inside the store; two concurrent
    /// polls can never walk away with the same job.
    pub fn request_lease(&self, worker_id: &str, name: &str) -> LeaseDecision {
        let worker = self.registry.touch(worker_id, name);

        match worker.status {
            // The coordinator does not touch the job record here; the
            // worker's own failed completion report reconciles state.
            WorkerStatus::ForceStopping => return LeaseDecision::ForceStop,
            WorkerStatus::Stopping => {
                return LeaseDecision::Stop;
            }
            _ => {}
        }

        if !worker.accept_leases {
            return LeaseDecision::Wait {
                accept_leases: false,
            };
        }

        // One active lease per worker: a poll from a worker that still
        // has a job attributed gets no second assignment.
        if worker.running_job_id.is_some() {
            return LeaseDecision::Wait { accept_leases: true };
        }

        // Paused means "no new work", not "stop".
        if self.is_paused() {
            return LeaseDecision::Wait { accept_leases: true };
        }

        match self.store.claim_next_pending(worker_id) {
            Some(job) => {
                self.registry.set_running_job(worker_id, Some(job.id));
                metrics::record_lease_granted();
                info!(
                    worker_id,
                    job_id = job.id,
                    attempt = job.attempts,
                    input = %job.input_path,
                    "Job leased"
                );
                LeaseDecision::Assign(job)
            }
            None => LeaseDecision::Wait { accept_leases: true },
        }
    }

    /// Apply a progress report.
    ///
    /// Stale reports (wrong owner, old attempt, terminal job) are
    /// silently absorbed; they are never worker-visible errors.
    pub fn report_progress(&self, job_id: u64, report: &ProgressReport) {
        self.store.with_job(job_id, |job| {
            if job.is_terminal() {
                return;
            }
            if job.worker_id.as_deref() != Some(report.worker_id.as_str())
                || !job.is_current_attempt(report.attempt)
            {
                return;
            }

            if job.state == JobState::Leased && job.state.can_transition_to(JobState::Running) {
                job.state = JobState::Running;
            }
            // Monotone under normal operation; a lower value from a
            // reordered report is ignored.
            job.progress = job.progress.max(report.progress.clamp(0.0, 1.0));
            if report.stdout_tail.is_some() {
                job.stdout_tail = report.stdout_tail.clone();
            }
            if report.stderr_tail.is_some() {
                job.stderr_tail = report.stderr_tail.clone();
            }
        });
    }

    /// Apply a completion report.
    ///
    /// The attempt echo is the lease token: a report whose attempt no
    /// longer matches belongs to a superseded lease and is dropped, so
    /// it can never overwrite a job another worker has since claimed.
    /// On success the job's progress is finalized to exactly 1.0.
    pub fn report_completion(&self, job_id: u64, report: &CompletionReport) {
        let applied = self.store.with_job(job_id, |job| {
            if job.is_terminal() {
                return false;
            }
            if job.worker_id.as_deref() != Some(report.worker_id.as_str())
                || !job.is_current_attempt(report.attempt)
            {
                warn!(
                    job_id,
                    worker_id = %report.worker_id,
                    attempt = report.attempt,
                    current_attempt = job.attempts,
                    "Dropping completion report from a superseded lease"
                );
                return false;
            }

            job.return_code = Some(report.return_code);
            job.stdout_tail = report.stdout_tail.clone();
            job.stderr_tail = report.stderr_tail.clone();
            if report.success {
                job.state = JobState::Succeeded;
                job.progress = 1.0;
                job.error_message = None;
            } else {
                job.state = JobState::Failed;
                job.error_message = Some(
                    report
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "FFmpeg failed".to_string()),
                );
            }
            true
        });

        if applied == Some(true) {
            if report.success {
                metrics::record_job_succeeded();
            } else {
                metrics::record_job_failed();
            }
            info!(
                job_id,
                worker_id = %report.worker_id,
                success = report.success,
                return_code = report.return_code,
                "Job completed"
            );
            self.registry.settle_after_completion(&report.worker_id);
        }
    }

    // Operator surface -----------------------------------------------------

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
        info!(paused, "Queue pause flag changed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn stop_worker(&self, worker_id: &str, force: bool) -> Result<(), RegistryError> {
        self.registry.mark_stopping(worker_id, force)
    }

    pub fn resume_worker(&self, worker_id: &str) -> Result<(), RegistryError> {
        self.registry.mark_resumed(worker_id)
    }

    pub fn reset_failed_jobs(&self) -> usize {
        self.store.reset_failed()
    }

    pub fn delete_succeeded_jobs(&self) -> usize {
        self.store.delete_succeeded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffarm_models::NewJob;

    fn coordinator() -> LeaseCoordinator {
        LeaseCoordinator::new(Arc::new(JobStore::new()), Arc::new(WorkerRegistry::new()))
    }

    fn enqueue(coordinator: &LeaseCoordinator, input: &str) -> Job {
        coordinator.store().insert(NewJob {
            input_path: input.to_string(),
            output_path: format!("encoded/{}.mp4", input),
            profile: "h264_1080p".to_string(),
            ffmpeg_args: vec!["-y".to_string(), "-i".to_string(), input.to_string()],
        })
    }

    fn progress(worker: &str, attempt: u32, fraction: f64) -> ProgressReport {
        ProgressReport {
            worker_id: worker.to_string(),
            attempt,
            progress: fraction,
            stdout_tail: None,
            stderr_tail: None,
        }
    }

    fn completion(worker: &str, attempt: u32, success: bool, rc: i32) -> CompletionReport {
        CompletionReport {
            worker_id: worker.to_string(),
            attempt,
            success,
            return_code: rc,
            stdout_tail: None,
            stderr_tail: Some("tail".to_string()),
            error_message: if success { None } else { Some("exited 1".to_string()) },
        }
    }

    #[test]
    fn test_single_pending_job_goes_to_exactly_one_worker() {
        let coordinator = Arc::new(coordinator());
        enqueue(&coordinator, "input.mov");

        let mut assigns = 0;
        let mut waits = 0;
        let mut handles = Vec::new();
        for i in 0..8 {
            let coordinator = Arc::clone(&coordinator);
            handles.push(std::thread::spawn(move || {
                coordinator.request_lease(&format!("w-{}", i), "Worker")
            }));
        }
        for handle in handles {
            match handle.join().unwrap() {
                LeaseDecision::Assign(_) => assigns += 1,
                LeaseDecision::Wait { .. } => waits += 1,
                other => panic!("unexpected decision: {:?}", other),
            }
        }
        assert_eq!(assigns, 1);
        assert_eq!(waits, 7);
    }

    #[test]
    fn test_force_stopped_worker_never_assigned_until_resumed() {
        let coordinator = coordinator();
        enqueue(&coordinator, "input.mov");
        coordinator.registry().touch("w-1", "Worker");
        coordinator.stop_worker("w-1", true).unwrap();

        assert!(matches!(
            coordinator.request_lease("w-1", "Worker"),
            LeaseDecision::ForceStop
        ));
        // Even after acknowledging, still no work while not resumed.
        coordinator.registry().settle_after_completion("w-1");
        assert!(matches!(
            coordinator.request_lease("w-1", "Worker"),
            LeaseDecision::Wait {
                accept_leases: false
            }
        ));

        coordinator.resume_worker("w-1").unwrap();
        assert!(matches!(
            coordinator.request_lease("w-1", "Worker"),
            LeaseDecision::Assign(_)
        ));
    }

    #[test]
    fn test_stop_flag_yields_stop_without_touching_job() {
        let coordinator = coordinator();
        let job = enqueue(&coordinator, "input.mov");
        let LeaseDecision::Assign(leased) = coordinator.request_lease("w-1", "Worker") else {
            panic!("expected assignment");
        };
        assert_eq!(leased.id, job.id);

        coordinator.stop_worker("w-1", false).unwrap();
        assert!(matches!(
            coordinator.request_lease("w-1", "Worker"),
            LeaseDecision::Stop
        ));
        // The in-flight job keeps its lease.
        let job = coordinator.store().get(job.id).unwrap();
        assert_eq!(job.state, JobState::Leased);
        assert_eq!(job.worker_id.as_deref(), Some("w-1"));
    }

    #[test]
    fn test_pause_means_no_new_work_not_stop() {
        let coordinator = coordinator();
        enqueue(&coordinator, "input.mov");
        coordinator.set_paused(true);

        match coordinator.request_lease("w-1", "Worker") {
            LeaseDecision::Wait { accept_leases } => assert!(accept_leases),
            other => panic!("unexpected decision: {:?}", other),
        }

        coordinator.set_paused(false);
        assert!(matches!(
            coordinator.request_lease("w-1", "Worker"),
            LeaseDecision::Assign(_)
        ));
    }

    #[test]
    fn test_no_second_lease_while_job_attributed() {
        let coordinator = coordinator();
        enqueue(&coordinator, "a.mov");
        enqueue(&coordinator, "b.mov");

        assert!(matches!(
            coordinator.request_lease("w-1", "Worker"),
            LeaseDecision::Assign(_)
        ));
        assert!(matches!(
            coordinator.request_lease("w-1", "Worker"),
            LeaseDecision::Wait { accept_leases: true }
        ));
    }

    #[test]
    fn test_progress_transitions_leased_to_running() {
        let coordinator = coordinator();
        let job = enqueue(&coordinator, "input.mov");
        coordinator.request_lease("w-1", "Worker");

        coordinator.report_progress(job.id, &progress("w-1", 1, 0.1));
        let job = coordinator.store().get(job.id).unwrap();
        assert_eq!(job.state, JobState::Running);
        assert!((job.progress - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_progress_on_terminal_job_is_a_noop() {
        let coordinator = coordinator();
        let job = enqueue(&coordinator, "input.mov");
        coordinator.request_lease("w-1", "Worker");
        coordinator.report_completion(job.id, &completion("w-1", 1, false, 1));

        let before = coordinator.store().get(job.id).unwrap();
        coordinator.report_progress(job.id, &progress("w-1", 1, 0.9));
        let after = coordinator.store().get(job.id).unwrap();
        assert_eq!(after.state, JobState::Failed);
        assert_eq!(after.progress, before.progress);
    }

    #[test]
    fn test_stale_completion_from_old_attempt_is_dropped() {
        let coordinator = coordinator();
        let job = enqueue(&coordinator, "input.mov");
        coordinator.request_lease("w-1", "Worker");

        // w-1 vanishes; the job is reclaimed and re-leased to w-2.
        coordinator.store().release_for_worker("w-1");
        coordinator.registry().set_running_job("w-1", None);
        coordinator.request_lease("w-2", "Worker");

        // w-1's late report carries attempt 1; current attempt is 2.
        coordinator.report_completion(job.id, &completion("w-1", 1, false, 1));
        let job = coordinator.store().get(job.id).unwrap();
        assert_eq!(job.state, JobState::Leased);
        assert_eq!(job.worker_id.as_deref(), Some("w-2"));
    }

    #[test]
    fn test_failed_job_is_retryable_with_attempts_preserved() {
        let coordinator = coordinator();
        let job = enqueue(&coordinator, "input.mov");
        coordinator.request_lease("w-1", "Worker");
        coordinator.report_completion(job.id, &completion("w-1", 1, false, 187));

        let failed = coordinator.store().get(job.id).unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.return_code, Some(187));
        assert_eq!(failed.error_message.as_deref(), Some("exited 1"));

        assert_eq!(coordinator.reset_failed_jobs(), 1);
        let reset = coordinator.store().get(job.id).unwrap();
        assert_eq!(reset.state, JobState::Pending);
        assert_eq!(reset.attempts, 1);
    }

    #[test]
    fn test_two_workers_one_job_full_lifecycle() {
        let coordinator = coordinator();
        let job = enqueue(&coordinator, "input.mov");

        let first = coordinator.request_lease("w-1", "Worker-1");
        let second = coordinator.request_lease("w-2", "Worker-2");
        let LeaseDecision::Assign(assigned) = first else {
            panic!("first poller should win the job");
        };
        assert_eq!(assigned.id, job.id);
        assert!(matches!(second, LeaseDecision::Wait { accept_leases: true }));

        for fraction in [0.1, 0.4, 0.9] {
            coordinator.report_progress(job.id, &progress("w-1", 1, fraction));
        }
        coordinator.report_completion(job.id, &completion("w-1", 1, true, 0));

        let done = coordinator.store().get(job.id).unwrap();
        assert_eq!(done.state, JobState::Succeeded);
        // Pinned design choice: success finalizes progress to 1.0.
        assert_eq!(done.progress, 1.0);

        let worker = coordinator.registry().get("w-1").unwrap();
        assert!(worker.running_job_id.is_none());
    }

    #[test]
    fn test_heartbeat_after_force_stop_reports_force_stopping() {
        let coordinator = coordinator();
        let job = enqueue(&coordinator, "input.mov");
        coordinator.request_lease("w-1", "Worker");
        coordinator.stop_worker("w-1", true).unwrap();

        // Worker self-reports online with its job still running.
        let (accept, status) = coordinator.registry().upsert_heartbeat(
            "w-1",
            "Worker",
            Some(job.id),
            WorkerStatus::Online,
        );
        assert!(!accept);
        assert_eq!(status, WorkerStatus::ForceStopping);
    }

    #[test]
    fn test_completion_settles_force_stopped_worker() {
        let coordinator = coordinator();
        let job = enqueue(&coordinator, "input.mov");
        coordinator.request_lease("w-1", "Worker");
        coordinator.stop_worker("w-1", true).unwrap();

        coordinator.report_completion(job.id, &completion("w-1", 1, false, -1));
        let worker = coordinator.registry().get("w-1").unwrap();
        assert_eq!(worker.status, WorkerStatus::Stopped);
        assert!(worker.running_job_id.is_none());
        // Resume is now valid.
        coordinator.resume_worker("w-1").unwrap();
    }
}
