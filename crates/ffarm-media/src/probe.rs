//! FFprobe duration probing.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Probe a media file for its duration in seconds.
///
/// Best-effort: callers treat a failure as "duration unknown", which
/// disables fractional progress but does not fail the job.
pub async fn probe_duration(ffprobe_bin: &Path, input: &Path) -> MediaResult<f64> {
    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }

    let output = Command::new(ffprobe_bin)
        .args(["-v", "error", "-print_format", "json", "-show_format"])
        .arg(input)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe exited with {:?}", output.status.code()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;

    probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| *d > 0.0)
        .ok_or_else(|| MediaError::InvalidMedia("no duration in probe output".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_output_parsing() {
        let raw = r#"{"format": {"duration": "300.500000", "size": "1024"}}"#;
        let probe: FfprobeOutput = serde_json::from_str(raw).unwrap();
        assert_eq!(probe.format.duration.as_deref(), Some("300.500000"));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let err = probe_duration(Path::new("ffprobe"), Path::new("/no/such/file.mov"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
