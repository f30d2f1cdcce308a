//! FFmpeg library setup.
//!
//! FFmpeg keeps its own console logger, independent of the Rust
//! [`log`](https://crates.io/crates/log) facade used by this crate. A
//! long-running capture against a flaky RTSP camera can flood stderr with
//! decoder warnings, so the CLI exposes [`set_ffmpeg_log_level`] through
//! `--log-level`.
//!
//! ```no_run
//! use birdcam::FfmpegLogLevel;
//!
//! birdcam::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! ```

use std::str::FromStr;

use ffmpeg_next::util::log::Level;

use crate::error::ExtractError;

/// FFmpeg internal log verbosity, from silent to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print nothing.
    Quiet,
    /// Unrecoverable errors only.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Everything, including decoder internals.
    Debug,
}

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Debug => Level::Debug,
        }
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "quiet" | "off" => Ok(FfmpegLogLevel::Quiet),
            "fatal" => Ok(FfmpegLogLevel::Fatal),
            "error" => Ok(FfmpegLogLevel::Error),
            "warning" | "warn" => Ok(FfmpegLogLevel::Warning),
            "info" => Ok(FfmpegLogLevel::Info),
            "debug" => Ok(FfmpegLogLevel::Debug),
            other => Err(format!("unknown FFmpeg log level: {other}")),
        }
    }
}

/// Set FFmpeg's own console verbosity. Does not affect `log` output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// Initialise the FFmpeg libraries. Safe to call repeatedly.
pub(crate) fn initialize(location: &str) -> Result<(), ExtractError> {
    ffmpeg_next::init().map_err(|error| ExtractError::SourceUnavailable {
        location: location.to_string(),
        reason: format!("FFmpeg initialisation failed: {error}"),
    })
}

#[cfg(test)]
mod tests {
    use super::FfmpegLogLevel;

    #[test]
    fn parses_level_aliases() {
        assert_eq!("WARN".parse::<FfmpegLogLevel>(), Ok(FfmpegLogLevel::Warning));
        assert_eq!("off".parse::<FfmpegLogLevel>(), Ok(FfmpegLogLevel::Quiet));
        assert!("chatty".parse::<FfmpegLogLevel>().is_err());
    }
}
