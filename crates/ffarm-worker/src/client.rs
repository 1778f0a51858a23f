//! HTTP client for the master's lease/heartbeat/report API.

use std::time::Duration;

use tracing::debug;

use ffarm_models::{
    CompletionReport, HeartbeatRequest, HeartbeatResponse, LeaseRequest, LeaseResponse,
    ProgressReport,
};

use crate::error::{WorkerError, WorkerResult};

/// Client for the master API. Cheap to clone; the underlying
/// connection pool is shared.
#[derive(Debug, Clone)]
pub struct MasterClient {
    http: reqwest::Client,
    base_url: String,
}

impl MasterClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> WorkerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// `POST /api/v1/jobs/lease`
    pub async fn lease(&self, request: &LeaseRequest) -> WorkerResult<LeaseResponse> {
        let url = format!("{}/api/v1/jobs/lease", self.base_url);
        let response = self.http.post(&url).json(request).send().await?;
        Self::check_status("jobs/lease", &response)?;
        Ok(response.json().await?)
    }

    /// `POST /api/v1/workers/heartbeat`
    pub async fn heartbeat(&self, request: &HeartbeatRequest) -> WorkerResult<HeartbeatResponse> {
        let url = format!("{}/api/v1/workers/heartbeat", self.base_url);
        let response = self.http.post(&url).json(request).send().await?;
        Self::check_status("workers/heartbeat", &response)?;
        Ok(response.json().await?)
    }

    /// `POST /api/v1/jobs/{id}/progress`. Fire-and-forget.
    pub async fn report_progress(&self, job_id: u64, report: &ProgressReport) -> WorkerResult<()> {
        let url = format!("{}/api/v1/jobs/{}/progress", self.base_url, job_id);
        let response = self.http.post(&url).json(report).send().await?;
        Self::check_status("jobs/progress", &response)?;
        debug!(job_id, progress = report.progress, "Progress reported");
        Ok(())
    }

    /// `POST /api/v1/jobs/{id}/complete`
    pub async fn report_completion(
        &self,
        job_id: u64,
        report: &CompletionReport,
    ) -> WorkerResult<()> {
        let url = format!("{}/api/v1/jobs/{}/complete", self.base_url, job_id);
        let response = self.http.post(&url).json(report).send().await?;
        Self::check_status("jobs/complete", &response)?;
        Ok(())
    }

    fn check_status(endpoint: &str, response: &reqwest::Response) -> WorkerResult<()> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(WorkerError::UnexpectedStatus {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            })
        }
    }
}
