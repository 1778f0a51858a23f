//! Prometheus metrics for the master.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    pub const LEASES_GRANTED_TOTAL: &str = "ffarm_leases_granted_total";
    pub const HEARTBEATS_TOTAL: &str = "ffarm_heartbeats_total";
    pub const JOBS_SUCCEEDED_TOTAL: &str = "ffarm_jobs_succeeded_total";
    pub const JOBS_FAILED_TOTAL: &str = "ffarm_jobs_failed_total";
    pub const JOBS_RECLAIMED_TOTAL: &str = "ffarm_jobs_reclaimed_total";
    pub const JOBS_PENDING: &str = "ffarm_jobs_pending";
    pub const WORKERS_ONLINE: &str = "ffarm_workers_online";
}

pub fn record_lease_granted() {
    counter!(names::LEASES_GRANTED_TOTAL).increment(1);
}

pub fn record_heartbeat() {
    counter!(names::HEARTBEATS_TOTAL).increment(1);
}

pub fn record_job_succeeded() {
    counter!(names::JOBS_SUCCEEDED_TOTAL).increment(1);
}

pub fn record_job_failed() {
    counter!(names::JOBS_FAILED_TOTAL).increment(1);
}

pub fn record_jobs_reclaimed(count: u64) {
    counter!(names::JOBS_RECLAIMED_TOTAL).increment(count);
}

pub fn set_pending_jobs(count: usize) {
    gauge!(names::JOBS_PENDING).set(count as f64);
}

pub fn set_online_workers(count: usize) {
    gauge!(names::WORKERS_ONLINE).set(count as f64);
}
