//! Executable resolution for FFmpeg and FFprobe.
//!
//! Resolution happens once at worker startup: an environment variable
//! override wins, otherwise the tool is looked up on PATH. A missing
//! tool is a per-job failure, never a crash of the worker loop.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{MediaError, MediaResult};

/// Environment override for the FFmpeg executable.
pub const FFMPEG_ENV: &str = "FFARM_FFMPEG";
/// Environment override for the FFprobe executable.
pub const FFPROBE_ENV: &str = "FFARM_FFPROBE";

/// Resolve a tool: env var override first, then PATH lookup.
///
/// An override that is an absolute path is used as-is when the file
/// exists; any other override value is itself resolved through PATH.
pub fn resolve_tool(env_var: &str, executable: &str) -> Option<PathBuf> {
    if let Ok(override_value) = std::env::var(env_var) {
        if !override_value.is_empty() {
            let candidate = Path::new(&override_value);
            if candidate.is_absolute() && candidate.exists() {
                return Some(candidate.to_path_buf());
            }
            if let Ok(resolved) = which::which(&override_value) {
                return Some(resolved);
            }
            warn!("{}={} is not executable, falling back to PATH", env_var, override_value);
        }
    }

    match which::which(executable) {
        Ok(resolved) => Some(resolved),
        Err(_) => {
            warn!("Executable '{}' not found on PATH", executable);
            None
        }
    }
}

/// Resolve the FFmpeg executable.
pub fn resolve_ffmpeg() -> MediaResult<PathBuf> {
    resolve_tool(FFMPEG_ENV, "ffmpeg").ok_or(MediaError::FfmpegNotFound)
}

/// Resolve the FFprobe executable.
pub fn resolve_ffprobe() -> MediaResult<PathBuf> {
    resolve_tool(FFPROBE_ENV, "ffprobe").ok_or(MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_unknown_tool_is_none() {
        assert!(resolve_tool("FFARM_TEST_NO_SUCH_VAR", "no-such-executable-xyz").is_none());
    }

    #[test]
    fn test_absolute_override_wins() {
        // Process env is global: this variable name is unique to this
        // test and read nowhere else, so parallel test threads never
        // observe the write.
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::env::set_var("FFARM_TEST_TOOL", &path);

        let resolved = resolve_tool("FFARM_TEST_TOOL", "no-such-executable-xyz");
        assert_eq!(resolved, Some(path));

        std::env::remove_var("FFARM_TEST_TOOL");
    }
}
