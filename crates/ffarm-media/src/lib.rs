//! FFmpeg process supervision for FFarm workers.
//!
//! This crate provides:
//! - Tool resolution with environment overrides and PATH fallback
//! - Best-effort duration probing via FFprobe
//! - Progress extraction from FFmpeg's diagnostic output
//! - A monitored transcode runner with cancellation and rolling output tails

pub mod error;
pub mod probe;
pub mod progress;
pub mod runner;
pub mod tools;

pub use error::{MediaError, MediaResult};
pub use probe::probe_duration;
pub use progress::extract_progress;
pub use runner::{ProgressUpdate, TranscodeOutcome, TranscodeRunner};
pub use tools::{resolve_ffmpeg, resolve_ffprobe, resolve_tool};
