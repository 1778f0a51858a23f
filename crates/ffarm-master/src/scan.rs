//! Folder scanning for new jobs.
//!
//! Thin enqueue layer: walk one directory (non-recursive), enqueue
//! every media file not yet known to the store, derive the output path
//! under an `encoded/` sibling directory.

use std::path::Path;

use tracing::{debug, info};

use ffarm_models::NewJob;

use crate::error::{MasterError, MasterResult};
use crate::profiles;
use crate::store::JobStore;

/// File extensions treated as transcodable media.
const MEDIA_EXTENSIONS: &[&str] = &["mov", "mp4", "mkv", "avi", "mxf", "m4v", "mts", "webm"];

/// Name of the output directory created next to the scanned folder's files.
const OUTPUT_DIR: &str = "encoded";

/// Scan a folder and enqueue one job per new media file.
///
/// Returns `(added, skipped)`. A file is skipped when it is already in
/// the store, when its output file already exists, or when it is not a
/// media file.
pub fn scan_folder(store: &JobStore, folder: &Path, profile: &str) -> MasterResult<(usize, usize)> {
    if !folder.is_dir() {
        return Err(MasterError::bad_request(format!(
            "not a directory: {}",
            folder.display()
        )));
    }

    let mut entries: Vec<_> = std::fs::read_dir(folder)
        .map_err(|e| MasterError::internal(format!("cannot read {}: {}", folder.display(), e)))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    entries.sort();

    let mut added = 0;
    let mut skipped = 0;

    for path in entries {
        if !path.is_file() || !is_media_file(&path) {
            continue;
        }

        let input_path = path.to_string_lossy().to_string();
        let output_path = output_path_for(&path);

        if store.contains_input(&input_path) || Path::new(&output_path).exists() {
            debug!(input = %input_path, "Skipping already known file");
            skipped += 1;
            continue;
        }

        let Some(ffmpeg_args) = profiles::build_profile_command(profile, &input_path, &output_path)
        else {
            return Err(MasterError::bad_request(format!("unknown profile: {}", profile)));
        };

        store.insert(NewJob {
            input_path,
            output_path,
            profile: profile.to_string(),
            ffmpeg_args,
        });
        added += 1;
    }

    info!(folder = %folder.display(), profile, added, skipped, "Folder scan complete");
    Ok((added, skipped))
}

fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MEDIA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn output_path_for(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let dir = input.parent().unwrap_or_else(|| Path::new("."));
    dir.join(OUTPUT_DIR)
        .join(format!("{}.mp4", stem))
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_extension_detection() {
        assert!(is_media_file(Path::new("/a/clip.MOV")));
        assert!(is_media_file(Path::new("/a/clip.mkv")));
        assert!(!is_media_file(Path::new("/a/notes.txt")));
        assert!(!is_media_file(Path::new("/a/noext")));
    }

    #[test]
    fn test_output_path_lands_in_encoded_subdir() {
        assert_eq!(
            output_path_for(Path::new("/media/in/clip.mov")),
            "/media/in/encoded/clip.mp4"
        );
    }

    #[test]
    fn test_scan_enqueues_new_media_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mov"), b"x").unwrap();
        std::fs::write(dir.path().join("b.mkv"), b"x").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"x").unwrap();

        let store = JobStore::new();
        let (added, skipped) = scan_folder(&store, dir.path(), "copy").unwrap();
        assert_eq!((added, skipped), (2, 0));
        assert_eq!(store.list().len(), 2);

        // Re-scan: everything already known.
        let (added, skipped) = scan_folder(&store, dir.path(), "copy").unwrap();
        assert_eq!((added, skipped), (0, 2));
    }

    #[test]
    fn test_scan_rejects_unknown_profile() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mov"), b"x").unwrap();
        let store = JobStore::new();
        assert!(scan_folder(&store, dir.path(), "not_a_profile").is_err());
    }

    #[test]
    fn test_scan_rejects_missing_dir() {
        let store = JobStore::new();
        assert!(scan_folder(&store, Path::new("/no/such/dir"), "copy").is_err());
    }
}
