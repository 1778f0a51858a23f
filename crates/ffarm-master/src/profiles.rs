//! Encoding profiles.
//!
//! A profile maps a name to the FFmpeg argument list for one job. The
//! master builds the full list at enqueue time so workers stay dumb:
//! they run exactly what the lease hands them.

/// Default profile used when the operator does not name one.
pub const DEFAULT_PROFILE: &str = "h264_1080p";

/// Names of all built-in profiles.
pub fn profile_names() -> &'static [&'static str] {
    &["h264_1080p", "h264_720p", "hevc_1080p", "copy"]
}

/// Build the FFmpeg argument list for a profile.
///
/// Returns `None` for an unknown profile name. The list includes the
/// input/output pair and is complete apart from the executable itself.
pub fn build_profile_command(profile: &str, input: &str, output: &str) -> Option<Vec<String>> {
    let encode_args: &[&str] = match profile {
        "h264_1080p" => &[
            "-c:v", "libx264", "-preset", "medium", "-crf", "20",
            "-vf", "scale=-2:1080", "-c:a", "aac", "-b:a", "192k",
        ],
        "h264_720p" => &[
            "-c:v", "libx264", "-preset", "medium", "-crf", "21",
            "-vf", "scale=-2:720", "-c:a", "aac", "-b:a", "160k",
        ],
        "hevc_1080p" => &[
            "-c:v", "libx265", "-preset", "medium", "-crf", "23",
            "-vf", "scale=-2:1080", "-c:a", "aac", "-b:a", "192k",
        ],
        "copy" => &["-c", "copy"],
        _ => return None,
    };

    let mut args: Vec<String> = vec!["-y".into(), "-i".into(), input.into()];
    args.extend(encode_args.iter().map(|s| s.to_string()));
    args.push(output.into());
    Some(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_profile_builds_full_command() {
        let args = build_profile_command("h264_1080p", "in.mov", "out.mp4").unwrap();
        assert_eq!(args[0], "-y");
        assert_eq!(args[1], "-i");
        assert_eq!(args[2], "in.mov");
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
        assert!(args.contains(&"libx264".to_string()));
    }

    #[test]
    fn test_unknown_profile_is_none() {
        assert!(build_profile_command("vp9_4k", "in.mov", "out.mp4").is_none());
    }

    #[test]
    fn test_all_listed_profiles_build() {
        for name in profile_names() {
            assert!(
                build_profile_command(name, "in.mov", "out.mp4").is_some(),
                "profile {} should build",
                name
            );
        }
    }
}
