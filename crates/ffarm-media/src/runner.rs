//! Monitored FFmpeg execution.
//!
//! The runner spawns FFmpeg, reads both output streams concurrently,
//! maintains bounded rolling tails for diagnostics, extracts progress
//! from stderr lines, and supports cooperative cancellation: a kill is
//! issued as soon as the cancel signal flips, and takes effect at the
//! next stream event rather than instantly.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::MediaResult;
use crate::progress::extract_progress;

/// Lines kept per stream for completion diagnostics.
const TAIL_LINES: usize = 50;
/// Lines attached to each in-flight progress update.
const REPORT_TAIL_LINES: usize = 10;

/// One progress observation, emitted per chunk of FFmpeg output.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Fractional completion in [0, 0.99]
    pub fraction: f64,
    pub stdout_tail: Option<String>,
    pub stderr_tail: Option<String>,
}

/// Result of a finished (or aborted) transcode process.
#[derive(Debug, Clone)]
pub struct TranscodeOutcome {
    /// Process exit code; -1 when killed by signal
    pub return_code: i32,
    /// Whether the process was terminated by a cancel signal
    pub cancelled: bool,
    pub stdout_tail: String,
    pub stderr_tail: String,
}

impl TranscodeOutcome {
    pub fn success(&self) -> bool {
        self.return_code == 0 && !self.cancelled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamSource {
    Stdout,
    Stderr,
}

/// Runner for FFmpeg jobs with progress tracking and cancellation.
pub struct TranscodeRunner {
    ffmpeg_bin: PathBuf,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl TranscodeRunner {
    pub fn new(ffmpeg_bin: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            cancel_rx: None,
        }
    }

    /// Attach a cancellation signal. Flipping it to `true` kills the
    /// child process.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Run FFmpeg with the given argument list.
    ///
    /// Each observed stderr chunk may produce one `ProgressUpdate` on
    /// `progress_tx`; updates are dropped rather than queued when the
    /// consumer lags, so a slow reporter never stalls the transcode.
    /// The extracted fraction is monotone non-decreasing for the life
    /// of the process.
    pub async fn run(
        &self,
        args: &[String],
        total_duration: Option<f64>,
        progress_tx: mpsc::Sender<ProgressUpdate>,
    ) -> MediaResult<TranscodeOutcome> {
        debug!("Running FFmpeg: {} {}", self.ffmpeg_bin.display(), args.join(" "));

        let mut child = Command::new(&self.ffmpeg_bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (line_tx, mut line_rx) = mpsc::channel::<(StreamSource, String)>(64);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(read_lines(stdout, StreamSource::Stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(read_lines(stderr, StreamSource::Stderr, line_tx.clone()));
        }
        drop(line_tx);

        // A never-firing cancel channel stands in when none was attached.
        let (_idle_cancel_tx, idle_cancel_rx) = watch::channel(false);
        let mut cancel_rx = self.cancel_rx.clone().unwrap_or(idle_cancel_rx);

        let mut stdout_tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);
        let mut fraction = 0.0_f64;
        let mut cancelled = false;
        let mut cancel_closed = false;

        loop {
            tokio::select! {
                event = line_rx.recv() => {
                    let Some((source, line)) = event else {
                        // Both streams closed; the process is exiting.
                        break;
                    };
                    match source {
                        StreamSource::Stdout => push_tail(&mut stdout_tail, line),
                        StreamSource::Stderr => {
                            if let Some(updated) = extract_progress(&line, total_duration) {
                                fraction = fraction.max(updated);
                            }
                            push_tail(&mut stderr_tail, line);
                            let update = ProgressUpdate {
                                fraction,
                                stdout_tail: join_tail(&stdout_tail, REPORT_TAIL_LINES),
                                stderr_tail: join_tail(&stderr_tail, REPORT_TAIL_LINES),
                            };
                            // Reporter busy means the update is dropped;
                            // the next chunk carries a fresher value.
                            let _ = progress_tx.try_send(update);
                        }
                    }
                }
                changed = cancel_rx.changed(), if !cancel_closed => {
                    match changed {
                        Ok(()) if *cancel_rx.borrow() && !cancelled => {
                            info!("Cancel requested, killing FFmpeg");
                            cancelled = true;
                            if let Err(e) = child.start_kill() {
                                warn!("Failed to kill FFmpeg: {}", e);
                            }
                        }
                        Ok(()) => {}
                        // Sender dropped; stop watching.
                        Err(_) => cancel_closed = true,
                    }
                }
            }
        }

        let status = child.wait().await?;
        let return_code = status.code().unwrap_or(-1);

        // The signal may have flipped after the last stream event.
        if !cancelled {
            if let Some(ref rx) = self.cancel_rx {
                cancelled = *rx.borrow();
            }
        }

        Ok(TranscodeOutcome {
            return_code,
            cancelled,
            stdout_tail: join_tail(&stdout_tail, TAIL_LINES).unwrap_or_default(),
            stderr_tail: join_tail(&stderr_tail, TAIL_LINES).unwrap_or_default(),
        })
    }
}

async fn read_lines<R>(stream: R, source: StreamSource, tx: mpsc::Sender<(StreamSource, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end().to_string();
        if line.is_empty() {
            continue;
        }
        if tx.send((source, line)).await.is_err() {
            break;
        }
    }
}

fn push_tail(tail: &mut VecDeque<String>, line: String) {
    if tail.len() == TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line);
}

fn join_tail(tail: &VecDeque<String>, last: usize) -> Option<String> {
    if tail.is_empty() {
        return None;
    }
    let skip = tail.len().saturating_sub(last);
    Some(
        tail.iter()
            .skip(skip)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n"),
    )
}
