//! Master configuration.

use std::time::Duration;

/// Master server configuration.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Heartbeat silence after which a worker is treated as offline
    pub worker_timeout: Duration,
    /// Interval between stale-worker sweeps
    pub reap_interval: Duration,
    /// Max request body size
    pub max_body_size: usize,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            worker_timeout: Duration::from_secs(60),
            reap_interval: Duration::from_secs(15),
            max_body_size: 1024 * 1024, // 1MB; bodies are small JSON + log tails
        }
    }
}

impl MasterConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("FFARM_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("FFARM_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            worker_timeout: Duration::from_secs(
                std::env::var("FFARM_WORKER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            reap_interval: Duration::from_secs(
                std::env::var("FFARM_REAP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            ),
            max_body_size: std::env::var("FFARM_MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024),
        }
    }
}
