//! Progress extraction from FFmpeg diagnostic output.
//!
//! FFmpeg writes lines like
//! `frame= 1234 fps= 56 ... time=00:01:30.00 bitrate=...` to stderr.
//! The extractor turns one such line plus a known total duration into a
//! fractional completion estimate. The estimate is capped below 1.0 so
//! "done" is only ever signalled by the completion report.

use std::sync::OnceLock;

use regex::Regex;

/// Progress estimates never reach this value before explicit completion.
pub const PROGRESS_CAP: f64 = 0.99;

fn time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"time=(\d+):(\d+):(\d+(?:\.\d+)?)").expect("valid progress pattern")
    })
}

/// Parse an FFmpeg `time=HH:MM:SS.ss` component out of a diagnostic line.
///
/// Returns the elapsed output time in seconds, or `None` if the line
/// carries no timing information. Malformed input yields `None`, never
/// an error.
pub fn parse_output_time(line: &str) -> Option<f64> {
    let caps = time_pattern().captures(line)?;
    let hours: f64 = caps.get(1)?.as_str().parse().ok()?;
    let minutes: f64 = caps.get(2)?.as_str().parse().ok()?;
    let seconds: f64 = caps.get(3)?.as_str().parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Map one diagnostic line to an updated progress fraction.
///
/// Requires a known total duration; without one fractional progress is
/// disabled and every line yields `None`. The result is clamped to
/// `[0, PROGRESS_CAP]`.
pub fn extract_progress(line: &str, total_duration: Option<f64>) -> Option<f64> {
    let duration = total_duration.filter(|d| *d > 0.0)?;
    let elapsed = parse_output_time(line)?;
    Some((elapsed / duration).clamp(0.0, PROGRESS_CAP))
}
