//! Source inspection without extracting anything.
//!
//! [`MediaProbe`] opens a file or stream, reads its metadata and closes it
//! again. It is what the CLI's `probe` command prints, and a quick way to
//! check that a camera is reachable before starting a long run.

use std::path::Path;

use crate::{
    configuration::DecodeOptions, decoder::FrameDecoder, error::ExtractError,
    metadata::VideoMetadata, source::FfmpegDecoder,
};

/// What a probe found out about a source.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    /// Path or URL that was probed.
    pub location: String,
    /// Stream metadata.
    pub metadata: VideoMetadata,
    /// Hardware device types compiled into the linked FFmpeg build. Empty
    /// without the `hardware` feature.
    pub hardware_devices: Vec<String>,
}

/// Lightweight source probe.
///
/// # Example
///
/// ```no_run
/// use birdcam::MediaProbe;
///
/// let report = MediaProbe::probe("rtsp://192.168.1.20:554/stream1")?;
/// println!(
///     "{}x{} @ {:.2} fps, live: {}",
///     report.metadata.width,
///     report.metadata.height,
///     report.metadata.frames_per_second,
///     report.metadata.is_live()
/// );
/// # Ok::<(), birdcam::ExtractError>(())
/// ```
pub struct MediaProbe;

impl MediaProbe {
    /// Probe a single source.
    ///
    /// The source is opened with software decoding, so probing never
    /// touches a GPU.
    ///
    /// # Errors
    ///
    /// [`ExtractError::SourceUnavailable`] or
    /// [`ExtractError::NoVideoStream`], as for
    /// [`FfmpegDecoder::open`].
    pub fn probe<P: AsRef<Path>>(source: P) -> Result<ProbeReport, ExtractError> {
        let options = DecodeOptions::default().software();
        let mut decoder = FfmpegDecoder::open(source, &options)?;
        let report = ProbeReport {
            location: decoder.location().to_string(),
            metadata: decoder.metadata().clone(),
            hardware_devices: hardware_device_names(),
        };
        decoder.close();
        Ok(report)
    }

    /// Probe several sources. Failures are returned per entry.
    pub fn probe_many<P: AsRef<Path>>(sources: &[P]) -> Vec<Result<ProbeReport, ExtractError>> {
        sources.iter().map(Self::probe).collect()
    }
}

#[cfg(feature = "hardware")]
fn hardware_device_names() -> Vec<String> {
    crate::hardware_acceleration::available_hardware_devices()
        .into_iter()
        .map(|device| device.name().to_string())
        .collect()
}

#[cfg(not(feature = "hardware"))]
fn hardware_device_names() -> Vec<String> {
    Vec::new()
}
