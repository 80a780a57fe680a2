//! FFmpeg subprocess invocation.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};
use crate::profile::Profile;

/// Check that ffmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Build the ffmpeg argument list for a profile.
fn build_args(input: &Path, output: &Path, profile: &Profile) -> Vec<String> {
    vec![
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-vf".to_string(),
        format!("scale={}", profile.scale),
        "-c:v".to_string(),
        profile.video_codec.to_string(),
        "-preset".to_string(),
        profile.preset.to_string(),
        "-c:a".to_string(),
        profile.audio_codec.to_string(),
        "-y".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

/// Transcode `input` to `output` using the given profile.
///
/// The subprocess is killed when `cancel` flips to `true`; ffmpeg's stderr is
/// captured and returned inside the error on failure.
pub async fn transcode(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    profile: &Profile,
    mut cancel: watch::Receiver<bool>,
) -> MediaResult<()> {
    check_ffmpeg()?;

    let input = input.as_ref();
    let output = output.as_ref();
    let args = build_args(input, output, profile);
    debug!(profile = profile.name, "Running ffmpeg {}", args.join(" "));

    let mut child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let mut stderr_pipe = child.stderr.take().expect("stderr not captured");
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        let _ = stderr_pipe.read_to_string(&mut buf).await;
        buf
    });

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = cancel.changed() => {
            if *cancel.borrow() {
                info!(profile = profile.name, "Transcode cancelled, killing ffmpeg");
                let _ = child.kill().await;
                return Err(MediaError::Cancelled);
            }
            child.wait().await?
        }
    };

    let stderr = stderr_task.await.unwrap_or_default();

    if status.success() {
        Ok(())
    } else {
        Err(MediaError::FfmpegFailed {
            code: status.code(),
            stderr: stderr.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::profile_for;

    #[test]
    fn test_build_args_shape() {
        let profile = profile_for("480p").unwrap();
        let args = build_args(
            Path::new("/tmp/input.mp4"),
            Path::new("/tmp/out.mp4"),
            &profile,
        );

        assert_eq!(args[0], "-i");
        assert_eq!(args[1], "/tmp/input.mp4");
        assert!(args.contains(&"scale=-2:480".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"-y".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/out.mp4");
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_transcode_missing_input_fails_with_stderr() {
        let profile = profile_for("480p").unwrap();
        let (_tx, rx) = watch::channel(false);

        let err = transcode("/nonexistent/input.mp4", "/tmp/out.mp4", &profile, rx)
            .await
            .unwrap_err();

        match err {
            MediaError::FfmpegFailed { stderr, .. } => assert!(!stderr.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
