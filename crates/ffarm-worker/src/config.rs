//! Worker configuration.

use std::time::Duration;

use uuid::Uuid;

/// Worker configuration.
///
/// The worker id is stable across reconnects when pinned via
/// `FFARM_WORKER_ID`; otherwise a fresh id is generated per process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base URL of the master
    pub master_url: String,
    /// Opaque worker identity
    pub worker_id: String,
    /// Human-readable name shown in fleet listings
    pub name: String,
    /// How often to poll for a lease while idle
    pub poll_interval: Duration,
    /// How often to heartbeat (independent of the poll cadence)
    pub heartbeat_interval: Duration,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// How long to wait for a running job when shutting down
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            master_url: "http://127.0.0.1:8000".to_string(),
            worker_id: Uuid::new_v4().to_string(),
            name: default_name(),
            poll_interval: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            master_url: std::env::var("FFARM_MASTER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string()),
            worker_id: std::env::var("FFARM_WORKER_ID")
                .unwrap_or_else(|_| Uuid::new_v4().to_string()),
            name: std::env::var("FFARM_WORKER_NAME").unwrap_or_else(|_| default_name()),
            poll_interval: Duration::from_secs(
                std::env::var("FFARM_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            ),
            heartbeat_interval: Duration::from_secs(
                std::env::var("FFARM_HEARTBEAT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            request_timeout: Duration::from_secs(
                std::env::var("FFARM_REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("FFARM_SHUTDOWN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
        }
    }
}

fn default_name() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "local".to_string());
    format!("Worker-{}", host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert!(config.name.starts_with("Worker-"));
        assert!(!config.worker_id.is_empty());
    }
}
