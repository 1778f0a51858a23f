//! Job-facing handlers: the lease/report cycle workers drive, plus the
//! operator's queue controls.

use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use ffarm_models::{
    CompletionReport, Job, LeaseAction, LeaseRequest, LeaseResponse, ProgressReport,
};

use crate::coordinator::LeaseDecision;
use crate::error::MasterResult;
use crate::profiles;
use crate::scan;
use crate::state::AppState;

/// `POST /api/v1/jobs/lease`
pub async fn lease_job(
    State(state): State<AppState>,
    Json(request): Json<LeaseRequest>,
) -> Json<LeaseResponse> {
    let decision = state
        .coordinator
        .request_lease(&request.worker_id, &request.name);

    let response = match decision {
        LeaseDecision::Assign(job) => LeaseResponse::assign(&job),
        LeaseDecision::Stop => LeaseResponse::action(LeaseAction::Stop, false),
        LeaseDecision::ForceStop => LeaseResponse::action(LeaseAction::ForceStop, false),
        LeaseDecision::Wait { accept_leases } => {
            LeaseResponse::action(LeaseAction::None, accept_leases)
        }
    };
    Json(response)
}

/// `POST /api/v1/jobs/{id}/progress`. Fire-and-forget.
pub async fn report_progress(
    State(state): State<AppState>,
    Path(job_id): Path<u64>,
    Json(report): Json<ProgressReport>,
) -> StatusCode {
    state.coordinator.report_progress(job_id, &report);
    StatusCode::NO_CONTENT
}

/// `POST /api/v1/jobs/{id}/complete`
pub async fn report_completion(
    State(state): State<AppState>,
    Path(job_id): Path<u64>,
    Json(report): Json<CompletionReport>,
) -> StatusCode {
    state.coordinator.report_completion(job_id, &report);
    StatusCode::NO_CONTENT
}

/// `GET /api/v1/jobs`
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<Job>> {
    Json(state.coordinator.store().list())
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub path: String,
    /// Profile to encode with; defaults to the built-in default.
    #[serde(default)]
    pub profile: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub added: usize,
    pub skipped: usize,
}

/// `POST /api/v1/jobs/scan`
pub async fn scan_jobs(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> MasterResult<Json<ScanResponse>> {
    let profile = request
        .profile
        .unwrap_or_else(|| profiles::DEFAULT_PROFILE.to_string());
    let (added, skipped) = scan::scan_folder(
        state.coordinator.store(),
        &PathBuf::from(request.path),
        &profile,
    )?;
    Ok(Json(ScanResponse { added, skipped }))
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: usize,
}

/// `POST /api/v1/jobs/reset-failed`
pub async fn reset_failed(State(state): State<AppState>) -> Json<CountResponse> {
    Json(CountResponse {
        count: state.coordinator.reset_failed_jobs(),
    })
}

/// `DELETE /api/v1/jobs/succeeded`
pub async fn delete_succeeded(State(state): State<AppState>) -> Json<CountResponse> {
    Json(CountResponse {
        count: state.coordinator.delete_succeeded_jobs(),
    })
}

#[derive(Debug, Serialize)]
pub struct QueueStatus {
    pub paused: bool,
}

/// `POST /api/v1/queue/pause`
pub async fn pause_queue(State(state): State<AppState>) -> Json<QueueStatus> {
    state.coordinator.set_paused(true);
    Json(QueueStatus { paused: true })
}

/// `POST /api/v1/queue/resume`
pub async fn resume_queue(State(state): State<AppState>) -> Json<QueueStatus> {
    state.coordinator.set_paused(false);
    Json(QueueStatus { paused: false })
}
