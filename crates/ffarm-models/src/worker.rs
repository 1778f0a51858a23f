//! Worker fleet records.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Worker lifecycle status as tracked by the master's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Heartbeating and eligible for leases
    #[default]
    Online,
    /// Draining: finishes its current job, takes no new leases
    Stopping,
    /// Aborting: current job is terminated and reported failed
    ForceStopping,
    /// Not accepting leases and no job attributed
    Stopped,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Online => "online",
            WorkerStatus::Stopping => "stopping",
            WorkerStatus::ForceStopping => "force_stopping",
            WorkerStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A worker as seen by the master. The registry is the sole owner of
/// these records; workers only ever see their own copy in responses.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Worker {
    /// Opaque client-generated id, stable across reconnects
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Effective status (registry stop flags win over self-reports)
    pub status: WorkerStatus,
    /// Whether the worker may be granted new leases
    pub accept_leases: bool,
    /// Job currently attributed to this worker, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_job_id: Option<u64>,
    /// Last heartbeat or lease request
    pub last_seen: DateTime<Utc>,
}

impl Worker {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: WorkerStatus::Online,
            accept_leases: true,
            running_job_id: None,
            last_seen: Utc::now(),
        }
    }

    /// Whether the worker has missed heartbeats for longer than the
    /// liveness window and should be treated as offline.
    pub fn is_expired(&self, liveness_window: Duration) -> bool {
        Utc::now() - self.last_seen > liveness_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_worker_online() {
        let worker = Worker::new("w-1", "Worker-host");
        assert_eq!(worker.status, WorkerStatus::Online);
        assert!(worker.accept_leases);
        assert!(worker.running_job_id.is_none());
    }

    #[test]
    fn test_expiry() {
        let mut worker = Worker::new("w-1", "Worker-host");
        assert!(!worker.is_expired(Duration::seconds(60)));

        worker.last_seen = Utc::now() - Duration::seconds(120);
        assert!(worker.is_expired(Duration::seconds(60)));
    }

    #[test]
    fn test_status_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&WorkerStatus::ForceStopping).unwrap(),
            "\"force_stopping\""
        );
    }
}
