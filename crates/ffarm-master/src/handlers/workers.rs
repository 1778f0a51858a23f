//! Worker-facing handlers: heartbeats and fleet control.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use ffarm_models::{HeartbeatRequest, HeartbeatResponse, Worker};

use crate::error::{MasterError, MasterResult};
use crate::metrics;
use crate::registry::RegistryError;
use crate::state::AppState;

/// `POST /api/v1/workers/heartbeat`
pub async fn heartbeat(
    State(state): State<AppState>,
    Json(request): Json<HeartbeatRequest>,
) -> Json<HeartbeatResponse> {
    let (accept_leases, status) = state.coordinator.registry().upsert_heartbeat(
        &request.worker_id,
        &request.name,
        request.running_job_id,
        request.status,
    );
    metrics::record_heartbeat();
    Json(HeartbeatResponse {
        accept_leases,
        status,
    })
}

/// `GET /api/v1/workers`
pub async fn list_workers(State(state): State<AppState>) -> Json<Vec<Worker>> {
    Json(state.coordinator.registry().list())
}

#[derive(Debug, Deserialize, Default)]
pub struct StopRequest {
    #[serde(default)]
    pub force: bool,
}

/// `POST /api/v1/workers/{id}/stop`
pub async fn stop_worker(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
    Json(request): Json<StopRequest>,
) -> MasterResult<Json<Worker>> {
    state
        .coordinator
        .stop_worker(&worker_id, request.force)
        .map_err(registry_error)?;
    let worker = state
        .coordinator
        .registry()
        .get(&worker_id)
        .ok_or_else(|| MasterError::not_found(format!("worker {}", worker_id)))?;
    Ok(Json(worker))
}

/// `POST /api/v1/workers/{id}/resume`
pub async fn resume_worker(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
) -> MasterResult<Json<Worker>> {
    state
        .coordinator
        .resume_worker(&worker_id)
        .map_err(registry_error)?;
    let worker = state
        .coordinator
        .registry()
        .get(&worker_id)
        .ok_or_else(|| MasterError::not_found(format!("worker {}", worker_id)))?;
    Ok(Json(worker))
}

fn registry_error(err: RegistryError) -> MasterError {
    match err {
        RegistryError::UnknownWorker(id) => MasterError::not_found(format!("worker {}", id)),
        RegistryError::ResumeWhileForceStopping(_) => MasterError::conflict(err.to_string()),
    }
}
