//! Error types for the `birdcam` crate.
//!
//! [`ExtractError`] is returned by every fallible operation. The three
//! run-level failures are [`SourceUnavailable`](ExtractError::SourceUnavailable),
//! [`DecodeFailure`](ExtractError::DecodeFailure) and
//! [`WriteFailure`](ExtractError::WriteFailure). The remaining variants wrap
//! lower-level causes with enough context to act on them.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `birdcam` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExtractError {
    /// The video source could not be opened (bad path, camera offline,
    /// unreachable stream).
    #[error("Video source {location} is unavailable: {reason}")]
    SourceUnavailable {
        /// Path or URL that was passed in.
        location: String,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The source opened but carries no video stream.
    #[error("No video stream found in source")]
    NoVideoStream,

    /// The stream is corrupt or uses an unsupported codec.
    #[error("Failed to decode video: {0}")]
    DecodeFailure(String),

    /// A frame or the output directory could not be written.
    #[error("Failed to write {path}: {reason}")]
    WriteFailure {
        /// File or directory that could not be written.
        path: PathBuf,
        /// Underlying reason, usually from the OS.
        reason: String,
    },

    /// A sampling interval of zero was provided.
    #[error("Sampling interval must be greater than zero")]
    InvalidInterval,

    /// The run was stopped through a [`CancellationToken`](crate::CancellationToken).
    #[error("Extraction cancelled")]
    Cancelled,

    /// An error from the FFmpeg libraries that does not fit a more
    /// specific variant.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// I/O error outside of frame writing (directory listing, moves).
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate while converting or encoding.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),

    /// A settings file could not be read or parsed.
    #[error("Invalid settings: {0}")]
    Settings(String),
}

impl ExtractError {
    /// Build a [`WriteFailure`](ExtractError::WriteFailure) from an I/O error.
    pub(crate) fn write_failure(path: impl Into<PathBuf>, error: impl ToString) -> Self {
        ExtractError::WriteFailure {
            path: path.into(),
            reason: error.to_string(),
        }
    }

    /// Returns `true` for failures a different decode path might avoid.
    pub fn is_decode_failure(&self) -> bool {
        matches!(self, ExtractError::DecodeFailure(_))
    }
}

impl From<FfmpegError> for ExtractError {
    fn from(error: FfmpegError) -> Self {
        ExtractError::Ffmpeg(error.to_string())
    }
}
