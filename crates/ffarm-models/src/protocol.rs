//! JSON wire protocol between workers and the master.
//!
//! All request bodies carry the worker's id; progress and completion
//! reports additionally echo the `attempt` counter that was active when
//! the lease was granted, so the master can drop reports that outlived
//! their lease.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::worker::WorkerStatus;
use crate::Job;

/// What the master tells a polling worker to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeaseAction {
    /// A job is attached; start transcoding
    Assign,
    /// Drain: finish the current job, stop polling for work
    Stop,
    /// Abort the current job immediately
    ForceStop,
    /// Nothing to do; keep polling
    #[default]
    None,
}

/// `POST /api/v1/jobs/lease` request body.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LeaseRequest {
    pub worker_id: String,
    pub name: String,
}

/// `POST /api/v1/jobs/lease` response body.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LeaseResponse {
    pub action: LeaseAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_args: Option<Vec<String>>,
    /// Lease token for the granted attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Whether the worker may keep asking for work
    pub accept_leases: bool,
}

impl LeaseResponse {
    /// Response carrying a job assignment.
    pub fn assign(job: &Job) -> Self {
        Self {
            action: LeaseAction::Assign,
            job_id: Some(job.id),
            input_path: Some(job.input_path.clone()),
            output_path: Some(job.output_path.clone()),
            profile: Some(job.profile.clone()),
            ffmpeg_args: Some(job.ffmpeg_args.clone()),
            attempt: Some(job.attempts),
            accept_leases: true,
        }
    }

    /// Response carrying a stop action, with no job attached.
    pub fn action(action: LeaseAction, accept_leases: bool) -> Self {
        Self {
            action,
            job_id: None,
            input_path: None,
            output_path: None,
            profile: None,
            ffmpeg_args: None,
            attempt: None,
            accept_leases,
        }
    }
}

/// `POST /api/v1/workers/heartbeat` request body.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HeartbeatRequest {
    pub worker_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_job_id: Option<u64>,
    /// The worker's own view of its status; the registry's stop flags
    /// take precedence in the response.
    pub status: WorkerStatus,
}

/// `POST /api/v1/workers/heartbeat` response body.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HeartbeatResponse {
    pub accept_leases: bool,
    pub status: WorkerStatus,
}

/// `POST /api/v1/jobs/{id}/progress` request body. Fire-and-forget.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProgressReport {
    pub worker_id: String,
    pub attempt: u32,
    /// Fractional completion in [0, 1]
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout_tail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr_tail: Option<String>,
}

/// `POST /api/v1/jobs/{id}/complete` request body.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompletionReport {
    pub worker_id: String,
    pub attempt: u32,
    pub success: bool,
    /// Process exit code; -1 when the tool could not be started
    pub return_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout_tail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr_tail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
