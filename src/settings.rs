//! JSON settings file.
//!
//! Long-running camera setups keep their paths and encoder choices in a
//! file instead of on the command line. Every section and field is
//! optional; command-line flags override whatever the file sets.
//!
//! ```json
//! {
//!   "paths": { "video_source": "/recordings", "frame_output": "/frames" },
//!   "settings": { "image_format": "jpg", "image_quality": 85, "gpu_decoder": "h264_cuvid" },
//!   "performance": { "worker_processes": "auto" },
//!   "shortlister": { "source_directory": "/frames", "shortlisted_data": "/picked", "frames_to_skip": 4 }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{batch::WorkerCount, configuration::OutputFormat, error::ExtractError};

/// Parsed settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Input and output locations.
    pub paths: PathSettings,
    /// Image encoding and decoder choice.
    pub settings: EncodingSettings,
    /// Batch parallelism.
    pub performance: PerformanceSettings,
    /// Shortlisting.
    pub shortlister: ShortlistSettings,
}

/// `paths` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    /// Video file, stream URL, or directory of videos.
    pub video_source: Option<PathBuf>,
    /// Directory frames are written to.
    pub frame_output: Option<PathBuf>,
}

/// `settings` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingSettings {
    /// `jpg`, `png` or `bmp`.
    pub image_format: Option<String>,
    /// JPEG quality, 1-100.
    pub image_quality: Option<u8>,
    /// FFmpeg decoder name tried first, e.g. `h264_cuvid`.
    pub gpu_decoder: Option<String>,
}

/// `performance` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PerformanceSettings {
    /// `"auto"` or a number of parallel workers.
    pub worker_processes: Option<WorkerSetting>,
}

/// `worker_processes` accepts either a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerSetting {
    /// A fixed worker count.
    Count(usize),
    /// `"auto"`, or a number written as a string.
    Named(String),
}

/// `shortlister` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShortlistSettings {
    /// Directory of extracted frames.
    pub source_directory: Option<PathBuf>,
    /// Directory shortlisted frames are moved into.
    pub shortlisted_data: Option<PathBuf>,
    /// Files skipped between two moved files.
    pub frames_to_skip: Option<usize>,
}

impl Settings {
    /// Read and parse a settings file.
    ///
    /// # Errors
    ///
    /// [`ExtractError::Settings`] if the file cannot be read, is not valid
    /// JSON, or contains unknown keys or bad values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|error| {
            ExtractError::Settings(format!("cannot read {}: {error}", path.display()))
        })?;
        let settings = Self::from_json(&contents).map_err(|error| match error {
            ExtractError::Settings(reason) => {
                ExtractError::Settings(format!("{}: {reason}", path.display()))
            }
            other => other,
        })?;
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Parse settings from a JSON string and validate them.
    pub fn from_json(contents: &str) -> Result<Self, ExtractError> {
        let settings: Settings = serde_json::from_str(contents)
            .map_err(|error| ExtractError::Settings(error.to_string()))?;
        settings.output_format()?;
        settings.workers()?;
        Ok(settings)
    }

    /// The configured output format, when `image_format` is set.
    pub fn output_format(&self) -> Result<Option<OutputFormat>, ExtractError> {
        let quality = self.settings.image_quality.unwrap_or(90);
        self.settings
            .image_format
            .as_deref()
            .map(|name| {
                OutputFormat::from_name(name, quality).ok_or_else(|| {
                    ExtractError::Settings(format!("unsupported image_format '{name}'"))
                })
            })
            .transpose()
    }

    /// The configured worker count, when `worker_processes` is set.
    pub fn workers(&self) -> Result<Option<WorkerCount>, ExtractError> {
        match &self.performance.worker_processes {
            None => Ok(None),
            Some(WorkerSetting::Count(0)) => Err(ExtractError::Settings(
                "worker_processes must be at least 1".to_string(),
            )),
            Some(WorkerSetting::Count(count)) => Ok(Some(WorkerCount::Fixed(*count))),
            Some(WorkerSetting::Named(name)) => name
                .parse::<WorkerCount>()
                .map(Some)
                .map_err(|error| ExtractError::Settings(format!("worker_processes: {error}"))),
        }
    }
}
