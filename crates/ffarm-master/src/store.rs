//! In-memory job store.
//!
//! The store stands in for durable storage behind one contract: the
//! claim of the next eligible job is a single critical section, never a
//! read-then-write split. All methods take `&self`; the mutex is held
//! only for the duration of the map operation and never across awaits.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, info};

use ffarm_models::{Job, JobState, NewJob};

#[derive(Default)]
struct StoreInner {
    next_id: u64,
    jobs: BTreeMap<u64, Job>,
}

/// Durable table of jobs, keyed by insertion-ordered id.
#[derive(Default)]
pub struct JobStore {
    inner: Mutex<StoreInner>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a new pending job.
    pub fn insert(&self, params: NewJob) -> Job {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.next_id += 1;
        let job = Job::new(inner.next_id, params);
        debug!(job_id = job.id, input = %job.input_path, "Job enqueued");
        inner.jobs.insert(job.id, job.clone());
        job
    }

    pub fn get(&self, id: u64) -> Option<Job> {
        self.inner.lock().expect("store lock poisoned").jobs.get(&id).cloned()
    }

    /// All jobs in insertion order.
    pub fn list(&self) -> Vec<Job> {
        self.inner
            .lock()
            .expect("store lock poisoned")
            .jobs
            .values()
            .cloned()
            .collect()
    }

    /// Whether a job already exists for this input path (any state).
    pub fn contains_input(&self, input_path: &str) -> bool {
        self.inner
            .lock()
            .expect("store lock poisoned")
            .jobs
            .values()
            .any(|j| j.input_path == input_path)
    }

    pub fn pending_count(&self) -> usize {
        self.inner
            .lock()
            .expect("store lock poisoned")
            .jobs
            .values()
            .filter(|j| j.state == JobState::Pending)
            .count()
    }

    /// Atomically claim the oldest pending job for a worker.
    ///
    /// Transitions it to `Leased`, stamps the worker, increments the
    /// attempt counter, and resets progress. Two concurrent callers can
    /// never receive the same job.
    pub fn claim_next_pending(&self, worker_id: &str) -> Option<Job> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let id = inner
            .jobs
            .values()
            .find(|j| j.state == JobState::Pending)
            .map(|j| j.id)?;

        let job = inner.jobs.get_mut(&id)?;
        job.state = JobState::Leased;
        job.worker_id = Some(worker_id.to_string());
        job.attempts += 1;
        job.progress = 0.0;
        job.return_code = None;
        job.error_message = None;
        job.stdout_tail = None;
        job.stderr_tail = None;
        job.updated_at = Utc::now();
        Some(job.clone())
    }

    /// Run a closure against one job under the store lock.
    ///
    /// This is how the coordinator does its read-check-write sequences
    /// (ownership checks, state transitions) without racing other
    /// requests. Returns `None` for an unknown id.
    pub fn with_job<R>(&self, id: u64, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let job = inner.jobs.get_mut(&id)?;
        let result = f(job);
        job.updated_at = Utc::now();
        Some(result)
    }

    /// Return failed jobs to the queue. Attempt counters survive the
    /// reset so retry history is never lost.
    pub fn reset_failed(&self) -> usize {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let mut count = 0;
        for job in inner.jobs.values_mut() {
            if job.state == JobState::Failed {
                job.state = JobState::Pending;
                job.worker_id = None;
                job.progress = 0.0;
                job.return_code = None;
                job.error_message = None;
                job.updated_at = Utc::now();
                count += 1;
            }
        }
        if count > 0 {
            info!("Reset {} failed jobs to pending", count);
        }
        count
    }

    /// Drop succeeded jobs from the table.
    pub fn delete_succeeded(&self) -> usize {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let before = inner.jobs.len();
        inner.jobs.retain(|_, j| j.state != JobState::Succeeded);
        let count = before - inner.jobs.len();
        if count > 0 {
            info!("Deleted {} succeeded jobs", count);
        }
        count
    }

    /// Revert a vanished worker's in-flight jobs to pending.
    ///
    /// Used by the stale-worker reaper; attempts are preserved so the
    /// next lease is visibly a retry.
    pub fn release_for_worker(&self, worker_id: &str) -> Vec<u64> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let mut released = Vec::new();
        for job in inner.jobs.values_mut() {
            if job.state.is_active() && job.worker_id.as_deref() == Some(worker_id) {
                job.state = JobState::Pending;
                job.worker_id = None;
                job.progress = 0.0;
                job.updated_at = Utc::now();
                released.push(job.id);
            }
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn enqueue(store: &JobStore, input: &str) -> Job {
        store.insert(NewJob {
            input_path: input.to_string(),
            output_path: format!("{}.mp4", input),
            profile: "h264_1080p".to_string(),
            ffmpeg_args: vec!["-y".to_string()],
        })
    }

    #[test]
    fn test_ids_are_insertion_ordered() {
        let store = JobStore::new();
        let a = enqueue(&store, "a.mov");
        let b = enqueue(&store, "b.mov");
        assert!(a.id < b.id);
        let listed: Vec<u64> = store.list().iter().map(|j| j.id).collect();
        assert_eq!(listed, vec![a.id, b.id]);
    }

    #[test]
    fn test_claim_takes_oldest_pending() {
        let store = JobStore::new();
        let a = enqueue(&store, "a.mov");
        enqueue(&store, "b.mov");

        let claimed = store.claim_next_pending("w-1").unwrap();
        assert_eq!(claimed.id, a.id);
        assert_eq!(claimed.state, JobState::Leased);
        assert_eq!(claimed.worker_id.as_deref(), Some("w-1"));
        assert_eq!(claimed.attempts, 1);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let store = JobStore::new();
        enqueue(&store, "only.mov");

        assert!(store.claim_next_pending("w-1").is_some());
        assert!(store.claim_next_pending("w-2").is_none());
    }

    #[test]
    fn test_concurrent_claims_never_share_a_job() {
        let store = Arc::new(JobStore::new());
        for i in 0..8 {
            enqueue(&store, &format!("file{}.mov", i));
        }

        let mut handles = Vec::new();
        for t in 0..16 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store.claim_next_pending(&format!("w-{}", t)).map(|j| j.id)
            }));
        }

        let mut claimed: Vec<u64> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        claimed.sort_unstable();
        let total = claimed.len();
        claimed.dedup();
        assert_eq!(total, 8, "all eight jobs claimed exactly once");
        assert_eq!(claimed.len(), 8, "no job handed to two workers");
    }

    #[test]
    fn test_reset_failed_preserves_attempts() {
        let store = JobStore::new();
        let job = enqueue(&store, "a.mov");
        store.claim_next_pending("w-1").unwrap();
        store.with_job(job.id, |j| {
            j.state = JobState::Failed;
            j.error_message = Some("boom".into());
        });

        assert_eq!(store.reset_failed(), 1);
        let job = store.get(job.id).unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 1);
        assert!(job.worker_id.is_none());
        assert!(job.error_message.is_none());
    }

    #[test]
    fn test_delete_succeeded() {
        let store = JobStore::new();
        let a = enqueue(&store, "a.mov");
        let b = enqueue(&store, "b.mov");
        store.with_job(a.id, |j| j.state = JobState::Succeeded);

        assert_eq!(store.delete_succeeded(), 1);
        assert!(store.get(a.id).is_none());
        assert!(store.get(b.id).is_some());
    }

    #[test]
    fn test_release_for_worker() {
        let store = JobStore::new();
        let job = enqueue(&store, "a.mov");
        store.claim_next_pending("w-1").unwrap();
        store.with_job(job.id, |j| {
            j.state = JobState::Running;
            j.progress = 0.5;
        });

        let released = store.release_for_worker("w-1");
        assert_eq!(released, vec![job.id]);
        let job = store.get(job.id).unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 1, "attempts survive the reclaim");
        assert_eq!(job.progress, 0.0);
    }
}
