//! Transcode job definitions and state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Job state in the queue.
///
/// Transitions are driven exclusively by the master's lease coordinator:
///
/// ```text
/// Pending -> Leased -> Running -> Succeeded
///    ^         |          |
///    |         v          v
///    +------ Failed <-----+
/// ```
///
/// A `Failed` job returns to `Pending` only through an operator reset or
/// a stale-worker reclaim; `Succeeded` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to be leased to a worker
    #[default]
    Pending,
    /// Assigned to a worker, no progress seen yet
    Leased,
    /// Worker has reported progress at least once
    Running,
    /// Transcode finished with exit code 0
    Succeeded,
    /// Transcode failed or was aborted (may be retried)
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Leased => "leased",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }

    /// Terminal states accept no further progress updates.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// Whether the job is currently attributed to a worker.
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Leased | JobState::Running)
    }

    /// Exhaustive transition table.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, Leased)
                | (Leased, Running)
                | (Leased, Succeeded)
                | (Leased, Failed)
                | (Leased, Pending)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Pending)
                | (Failed, Pending)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameters for enqueueing a new job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NewJob {
    /// Source media file
    pub input_path: String,
    /// Destination file the transcode writes
    pub output_path: String,
    /// Encoding profile name
    pub profile: String,
    /// Full FFmpeg argument list (without the executable itself)
    pub ffmpeg_args: Vec<String>,
}

/// A transcode job owned by the master's job store.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Store-assigned id, monotone in insertion order
    pub id: u64,

    /// Source media file
    pub input_path: String,

    /// Destination file the transcode writes
    pub output_path: String,

    /// Encoding profile name
    pub profile: String,

    /// Full FFmpeg argument list (without the executable itself)
    pub ffmpeg_args: Vec<String>,

    /// Current state
    pub state: JobState,

    /// Fractional completion in [0, 1]
    pub progress: f64,

    /// Owner of the current (or last) lease
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,

    /// Lease counter; doubles as the lease token echoed in reports
    pub attempts: u32,

    /// Exit code of the last attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,

    /// Error from the last failed attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Rolling tail of the last attempt's stdout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout_tail: Option<String>,

    /// Rolling tail of the last attempt's stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr_tail: Option<String>,

    /// When the job was enqueued
    pub created_at: DateTime<Utc>,

    /// When any field last changed
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a fresh pending job.
    pub fn new(id: u64, params: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id,
            input_path: params.input_path,
            output_path: params.output_path,
            profile: params.profile,
            ffmpeg_args: params.ffmpeg_args,
            state: JobState::Pending,
            progress: 0.0,
            worker_id: None,
            attempts: 0,
            return_code: None,
            error_message: None,
            stdout_tail: None,
            stderr_tail: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether a report carrying this lease token belongs to the current
    /// attempt. Reports from older attempts are dropped by the coordinator.
    pub fn is_current_attempt(&self, attempt: u32) -> bool {
        self.attempts == attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NewJob {
        NewJob {
            input_path: "/media/input.mov".into(),
            output_path: "/media/encoded/input.mp4".into(),
            profile: "h264_1080p".into(),
            ffmpeg_args: vec!["-y".into(), "-i".into(), "/media/input.mov".into()],
        }
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(1, sample());
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.worker_id.is_none());
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_transition_table() {
        use JobState::*;
        assert!(Pending.can_transition_to(Leased));
        assert!(Leased.can_transition_to(Running));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Pending));
        // Reclaim paths
        assert!(Leased.can_transition_to(Pending));
        assert!(Running.can_transition_to(Pending));
        // Terminal states are final
        assert!(!Succeeded.can_transition_to(Pending));
        assert!(!Succeeded.can_transition_to(Running));
        assert!(!Pending.can_transition_to(Running));
    }

    #[test]
    fn test_attempt_token() {
        let mut job = Job::new(7, sample());
        job.attempts = 2;
        assert!(job.is_current_attempt(2));
        assert!(!job.is_current_attempt(1));
    }

    #[test]
    fn test_state_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobState::Succeeded).unwrap(),
            "\"succeeded\""
        );
        let state: JobState = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(state, JobState::Pending);
    }
}
