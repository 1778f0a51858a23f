//! API routes.

use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::health::health;
use crate::handlers::jobs::{
    delete_succeeded, lease_job, list_jobs, pause_queue, report_completion, report_progress,
    reset_failed, resume_queue, scan_jobs,
};
use crate::handlers::workers::{heartbeat, list_workers, resume_worker, stop_worker};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    // The cycle worker processes drive.
    let worker_routes = Router::new()
        .route("/jobs/lease", post(lease_job))
        .route("/jobs/:id/progress", post(report_progress))
        .route("/jobs/:id/complete", post(report_completion))
        .route("/workers/heartbeat", post(heartbeat));

    // Operator surface (replaces the old control panel).
    let operator_routes = Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/scan", post(scan_jobs))
        .route("/jobs/reset-failed", post(reset_failed))
        .route("/jobs/succeeded", delete(delete_succeeded))
        .route("/queue/pause", post(pause_queue))
        .route("/queue/resume", post(resume_queue))
        .route("/workers", get(list_workers))
        .route("/workers/:id/stop", post(stop_worker))
        .route("/workers/:id/resume", post(resume_worker));

    let health_routes = Router::new().route("/health", get(health));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api/v1", worker_routes.merge(operator_routes))
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::MasterConfig;
    use ffarm_models::{LeaseAction, LeaseResponse, NewJob};

    fn test_app() -> (AppState, Router) {
        let state = AppState::new(MasterConfig::default());
        let router = create_router(state.clone(), None);
        (state, router)
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_, app) = test_app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_lease_round_trip() {
        let (state, app) = test_app();
        state.coordinator.store().insert(NewJob {
            input_path: "in.mov".into(),
            output_path: "encoded/in.mp4".into(),
            profile: "copy".into(),
            ffmpeg_args: vec!["-y".into()],
        });

        let response = app
            .oneshot(json_post(
                "/api/v1/jobs/lease",
                serde_json::json!({"worker_id": "w-1", "name": "Worker"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let lease: LeaseResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(lease.action, LeaseAction::Assign);
        assert_eq!(lease.job_id, Some(1));
        assert_eq!(lease.attempt, Some(1));
    }

    #[tokio::test]
    async fn test_empty_queue_waits() {
        let (_, app) = test_app();
        let response = app
            .oneshot(json_post(
                "/api/v1/jobs/lease",
                serde_json::json!({"worker_id": "w-1", "name": "Worker"}),
            ))
            .await
            .unwrap();
        let lease: LeaseResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(lease.action, LeaseAction::None);
        assert!(lease.accept_leases);
    }

    #[tokio::test]
    async fn test_progress_returns_no_content() {
        let (state, app) = test_app();
        state.coordinator.store().insert(NewJob {
            input_path: "in.mov".into(),
            output_path: "encoded/in.mp4".into(),
            profile: "copy".into(),
            ffmpeg_args: vec![],
        });
        state.coordinator.request_lease("w-1", "Worker");

        let response = app
            .oneshot(json_post(
                "/api/v1/jobs/1/progress",
                serde_json::json!({"worker_id": "w-1", "attempt": 1, "progress": 0.25}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_heartbeat_reflects_registry_stop_flag() {
        let (state, app) = test_app();
        state.coordinator.registry().touch("w-1", "Worker");
        state.coordinator.stop_worker("w-1", true).unwrap();

        let response = app
            .oneshot(json_post(
                "/api/v1/workers/heartbeat",
                serde_json::json!({
                    "worker_id": "w-1",
                    "name": "Worker",
                    "running_job_id": 3,
                    "status": "online"
                }),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["status"], "force_stopping");
        assert_eq!(body["accept_leases"], false);
    }

    #[tokio::test]
    async fn test_stop_unknown_worker_is_404() {
        let (_, app) = test_app();
        let response = app
            .oneshot(json_post(
                "/api/v1/workers/ghost/stop",
                serde_json::json!({"force": false}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
