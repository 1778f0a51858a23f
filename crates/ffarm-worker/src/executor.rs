//! Worker execution loop.
//!
//! One loop per process: heartbeat on its own cadence, poll for leases
//! while idle, run at most one transcode at a time. The transcode runs
//! in a spawned task so heartbeats keep flowing while FFmpeg works; a
//! force-stop arriving on either channel (lease response or heartbeat
//! response) terminates the child through its cancel signal.

use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use ffarm_media::{probe_duration, resolve_ffmpeg, resolve_ffprobe, ProgressUpdate, TranscodeRunner};
use ffarm_models::{
    CompletionReport, HeartbeatRequest, HeartbeatResponse, LeaseAction, LeaseRequest,
    LeaseResponse, ProgressReport, WorkerStatus,
};

use crate::client::MasterClient;
use crate::config::WorkerConfig;
use crate::error::WorkerResult;

/// A lease turned into something runnable.
#[derive(Debug, Clone)]
pub(crate) struct Assignment {
    pub job_id: u64,
    pub attempt: u32,
    pub input_path: String,
    pub output_path: String,
    pub ffmpeg_args: Vec<String>,
}

/// The worker's local view of its own lifecycle. Kept separate from
/// the loop so the transition logic is testable without a master.
#[derive(Debug)]
pub(crate) struct LocalState {
    pub status: WorkerStatus,
    pub accept_leases: bool,
    pub force_stop: bool,
}

impl Default for LocalState {
    fn default() -> Self {
        Self {
            status: WorkerStatus::Online,
            accept_leases: true,
            force_stop: false,
        }
    }
}

impl LocalState {
    /// Whether the loop should ask the master for work.
    pub fn can_request_lease(&self, job_running: bool) -> bool {
        self.accept_leases && !self.force_stop && !job_running
    }

    /// Apply a lease response; returns the assignment when one is attached.
    pub fn apply_lease(&mut self, response: &LeaseResponse, job_running: bool) -> Option<Assignment> {
        match response.action {
            LeaseAction::Assign => {
                self.accept_leases = response.accept_leases;
                Some(Assignment {
                    job_id: response.job_id?,
                    attempt: response.attempt?,
                    input_path: response.input_path.clone()?,
                    output_path: response.output_path.clone()?,
                    ffmpeg_args: response.ffmpeg_args.clone()?,
                })
            }
            LeaseAction::Stop => {
                self.accept_leases = false;
                self.status = if job_running {
                    WorkerStatus::Stopping
                } else {
                    WorkerStatus::Stopped
                };
                None
            }
            LeaseAction::ForceStop => {
                self.accept_leases = false;
                self.force_stop = true;
                self.status = WorkerStatus::ForceStopping;
                None
            }
            LeaseAction::None => {
                self.accept_leases = response.accept_leases;
                None
            }
        }
    }

    /// Apply a heartbeat response. The master's stop flags always win.
    pub fn apply_heartbeat(&mut self, response: &HeartbeatResponse, job_running: bool) {
        match response.status {
            WorkerStatus::ForceStopping => {
                self.accept_leases = false;
                self.force_stop = true;
                self.status = WorkerStatus::ForceStopping;
            }
            WorkerStatus::Stopping => {
                self.accept_leases = false;
                self.status = WorkerStatus::Stopping;
            }
            status => {
                self.accept_leases = response.accept_leases;
                if !job_running {
                    self.status = status;
                }
            }
        }
    }

    /// Settle after a job finished (or a force-stop landed while idle).
    pub fn settle(&mut self) {
        self.force_stop = false;
        self.status = if self.accept_leases {
            WorkerStatus::Online
        } else {
            WorkerStatus::Stopped
        };
    }
}

struct RunningJob {
    job_id: u64,
    cancel_tx: watch::Sender<bool>,
}

/// The worker process's main loop.
pub struct WorkerLoop {
    config: WorkerConfig,
    client: MasterClient,
    ffmpeg_bin: Option<PathBuf>,
    ffprobe_bin: Option<PathBuf>,
    state: LocalState,
    current: Option<RunningJob>,
}

impl WorkerLoop {
    /// Create the loop, resolving tool locations once at startup.
    ///
    /// A missing FFmpeg is not fatal here: each assigned job fails
    /// immediately with a completion report instead.
    pub fn new(config: WorkerConfig) -> WorkerResult<Self> {
        let client = MasterClient::new(&config.master_url, config.request_timeout)?;

        let ffmpeg_bin = resolve_ffmpeg()
            .map_err(|e| warn!("{}", e))
            .ok();
        let ffprobe_bin = resolve_ffprobe()
            .map_err(|e| warn!("{}; duration tracking disabled", e))
            .ok();

        Ok(Self {
            config,
            client,
            ffmpeg_bin,
            ffprobe_bin,
            state: LocalState::default(),
            current: None,
        })
    }

    /// Run until the shutdown signal flips.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> WorkerResult<()> {
        info!(
            worker_id = %self.config.worker_id,
            name = %self.config.name,
            master = %self.config.master_url,
            "Worker loop starting"
        );

        let (done_tx, mut done_rx) = mpsc::channel::<u64>(4);
        let mut heartbeat_due = Instant::now();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            if Instant::now() >= heartbeat_due {
                self.send_heartbeat().await;
                heartbeat_due = Instant::now() + self.config.heartbeat_interval;
            }

            // Propagate a force-stop into the running transcode; with
            // nothing running it just settles into a stopped state.
            if self.state.force_stop {
                match &self.current {
                    Some(running) => {
                        info!(job_id = running.job_id, "Force stop: aborting current job");
                        let _ = running.cancel_tx.send(true);
                    }
                    None => self.state.settle(),
                }
            }

            if self.state.can_request_lease(self.current.is_some()) {
                self.poll_for_lease(&done_tx).await;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                finished = done_rx.recv() => {
                    if let Some(job_id) = finished {
                        debug!(job_id, "Job task finished");
                        self.current = None;
                        self.state.settle();
                        // Re-arm the heartbeat so the fleet view
                        // reflects the transition promptly.
                        heartbeat_due = Instant::now();
                    }
                }
                _ = shutdown_rx.changed() => {}
            }
        }

        self.shutdown(&mut done_rx).await;
        info!("Worker loop stopped");
        Ok(())
    }

    async fn send_heartbeat(&mut self) {
        let request = HeartbeatRequest {
            worker_id: self.config.worker_id.clone(),
            name: self.config.name.clone(),
            running_job_id: self.current.as_ref().map(|r| r.job_id),
            status: self.state.status,
        };
        match self.client.heartbeat(&request).await {
            Ok(response) => {
                self.state.apply_heartbeat(&response, self.current.is_some());
            }
            // Transport failures mean "try again next cycle".
            Err(e) => warn!("Heartbeat failed: {}", e),
        }
    }

    async fn poll_for_lease(&mut self, done_tx: &mpsc::Sender<u64>) {
        let request = LeaseRequest {
            worker_id: self.config.worker_id.clone(),
            name: self.config.name.clone(),
        };
        let response = match self.client.lease(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Lease request failed: {}", e);
                return;
            }
        };

        if let Some(assignment) = self.state.apply_lease(&response, self.current.is_some()) {
            self.start_job(assignment, done_tx.clone());
        }
    }

    fn start_job(&mut self, assignment: Assignment, done_tx: mpsc::Sender<u64>) {
        let job_id = assignment.job_id;
        info!(
            job_id,
            attempt = assignment.attempt,
            input = %assignment.input_path,
            profile_output = %assignment.output_path,
            "Starting job"
        );

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.current = Some(RunningJob { job_id, cancel_tx });

        let client = self.client.clone();
        let worker_id = self.config.worker_id.clone();
        let ffmpeg_bin = self.ffmpeg_bin.clone();
        let ffprobe_bin = self.ffprobe_bin.clone();

        tokio::spawn(async move {
            execute_job(
                client,
                worker_id,
                ffmpeg_bin,
                ffprobe_bin,
                assignment,
                cancel_rx,
            )
            .await;
            let _ = done_tx.send(job_id).await;
        });
    }

    /// Abort any running job and wait briefly for its completion report.
    async fn shutdown(&mut self, done_rx: &mut mpsc::Receiver<u64>) {
        if let Some(running) = &self.current {
            info!(job_id = running.job_id, "Shutdown: aborting current job");
            let _ = running.cancel_tx.send(true);
            let waited =
                tokio::time::timeout(self.config.shutdown_timeout, done_rx.recv()).await;
            if waited.is_err() {
                warn!("Job did not stop within the shutdown timeout");
            }
            self.current = None;
        }
    }
}

/// Run one assigned transcode and report its outcome.
///
/// Never propagates an error into the loop: every failure path ends in
/// a failed completion report (return code -1 when the process could
/// not even start).
async fn execute_job(
    client: MasterClient,
    worker_id: String,
    ffmpeg_bin: Option<PathBuf>,
    ffprobe_bin: Option<PathBuf>,
    assignment: Assignment,
    cancel_rx: watch::Receiver<bool>,
) {
    let job_id = assignment.job_id;
    let attempt = assignment.attempt;

    let Some(ffmpeg_bin) = ffmpeg_bin else {
        error!(job_id, "FFmpeg not available; failing job immediately");
        send_completion(
            &client,
            job_id,
            failed_report(
                &worker_id,
                attempt,
                -1,
                None,
                None,
                "FFmpeg executable not found; set FFARM_FFMPEG or add ffmpeg to PATH",
            ),
        )
        .await;
        return;
    };

    if let Some(parent) = Path::new(&assignment.output_path).parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            debug!("Could not create output directory {}: {}", parent.display(), e);
        }
    }

    // Best-effort: without a duration the job still runs, it just
    // reports no fractional progress.
    let total_duration = match &ffprobe_bin {
        Some(ffprobe) => probe_duration(ffprobe, Path::new(&assignment.input_path))
            .await
            .map_err(|e| warn!(job_id, "Duration probe failed: {}", e))
            .ok(),
        None => None,
    };

    // Let the master know the transcode is underway before the first
    // FFmpeg output arrives.
    send_progress(&client, job_id, &worker_id, attempt, 0.0, None, None).await;

    let (progress_tx, mut progress_rx) = mpsc::channel::<ProgressUpdate>(8);
    let reporter = {
        let client = client.clone();
        let worker_id = worker_id.clone();
        tokio::spawn(async move {
            while let Some(update) = progress_rx.recv().await {
                send_progress(
                    &client,
                    job_id,
                    &worker_id,
                    attempt,
                    update.fraction,
                    update.stdout_tail,
                    update.stderr_tail,
                )
                .await;
            }
        })
    };

    let runner = TranscodeRunner::new(ffmpeg_bin).with_cancel(cancel_rx);
    let result = runner
        .run(&assignment.ffmpeg_args, total_duration, progress_tx)
        .await;
    let _ = reporter.await;

    let report = match result {
        Ok(outcome) => {
            info!(
                job_id,
                return_code = outcome.return_code,
                cancelled = outcome.cancelled,
                "Transcode finished"
            );
            CompletionReport {
                worker_id: worker_id.clone(),
                attempt,
                success: outcome.success(),
                return_code: outcome.return_code,
                stdout_tail: Some(outcome.stdout_tail.clone()).filter(|t| !t.is_empty()),
                stderr_tail: Some(outcome.stderr_tail.clone()).filter(|t| !t.is_empty()),
                error_message: if outcome.success() {
                    None
                } else if outcome.cancelled {
                    Some("Transcode aborted by force stop".to_string())
                } else {
                    Some(format!("FFmpeg exited with code {}", outcome.return_code))
                },
            }
        }
        Err(e) => {
            error!(job_id, "Failed to run FFmpeg: {}", e);
            failed_report(&worker_id, attempt, -1, None, None, &e.to_string())
        }
    };

    send_completion(&client, job_id, report).await;
}

fn failed_report(
    worker_id: &str,
    attempt: u32,
    return_code: i32,
    stdout_tail: Option<String>,
    stderr_tail: Option<String>,
    error: &str,
) -> CompletionReport {
    CompletionReport {
        worker_id: worker_id.to_string(),
        attempt,
        success: false,
        return_code,
        stdout_tail,
        stderr_tail,
        error_message: Some(error.to_string()),
    }
}

async fn send_progress(
    client: &MasterClient,
    job_id: u64,
    worker_id: &str,
    attempt: u32,
    fraction: f64,
    stdout_tail: Option<String>,
    stderr_tail: Option<String>,
) {
    let report = ProgressReport {
        worker_id: worker_id.to_string(),
        attempt,
        progress: fraction,
        stdout_tail,
        stderr_tail,
    };
    if let Err(e) = client.report_progress(job_id, &report).await {
        debug!(job_id, "Failed to send progress update: {}", e);
    }
}

async fn send_completion(client: &MasterClient, job_id: u64, report: CompletionReport) {
    if let Err(e) = client.report_completion(job_id, &report).await {
        error!(job_id, "Failed to send completion report: {}", e);
    }
}
