//! Media error types.

use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("Unknown resolution profile: {0}")]
    UnknownProfile(String),

    #[error("Transcode cancelled")]
    Cancelled,

    #[error("ffmpeg failed (exit code {code:?}): {stderr}")]
    FfmpegFailed { code: Option<i32>, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
