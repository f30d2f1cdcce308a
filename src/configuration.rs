//! Extraction options.
//!
//! [`ExtractOptions`] is a builder that carries everything a run needs
//! besides the source and output directory: the sampling interval, image
//! encoding, naming, decode tolerance, limits, progress and cancellation.
//! Settings that only concern the decoder are grouped in [`DecodeOptions`]
//! so the fallback chain can rebuild a decoder with a modified copy.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use birdcam::{DecodeTolerance, ExtractOptions, OutputFormat, SamplingInterval};
//!
//! let options = ExtractOptions::new()
//!     .with_sampling(SamplingInterval::Every(Duration::from_secs(2)))
//!     .with_output_format(OutputFormat::Jpeg { quality: 85 })
//!     .with_decode_tolerance(DecodeTolerance::SkipCorrupt { max_consecutive: 50 })
//!     .with_max_frames(500);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ffmpeg_next::format::Pixel;

#[cfg(feature = "hardware")]
use crate::hardware_acceleration::HardwareAccelerationMode;
use crate::{
    naming::FrameNaming,
    progress::{CancellationToken, NoOpProgress, ProgressCallback},
    sampling::SamplingInterval,
};

/// FFmpeg filter used by the last step of the fallback chain for HDR
/// footage that fails to convert directly.
pub const TONEMAP_FILTER: &str = "tonemap=tonemap=hable";

/// Pixel layout of written frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 8-bit RGB. The default.
    #[default]
    Rgb8,
    /// 8-bit grayscale. Roughly a third of the size for night footage.
    Gray8,
}

impl PixelFormat {
    pub(crate) fn to_ffmpeg_pixel(self) -> Pixel {
        match self {
            PixelFormat::Rgb8 => Pixel::RGB24,
            PixelFormat::Gray8 => Pixel::GRAY8,
        }
    }

    pub(crate) fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// Image file format for written frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Baseline JPEG with the given quality (1-100).
    Jpeg {
        /// Encoder quality, clamped to 1-100.
        quality: u8,
    },
    /// Lossless PNG. Quality settings do not apply.
    Png,
    /// Uncompressed BMP, handy when debugging colour conversion.
    Bmp,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Jpeg { quality: 90 }
    }
}

impl OutputFormat {
    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg { .. } => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Bmp => "bmp",
        }
    }

    /// Parse an extension or format name, applying `quality` to JPEG.
    pub fn from_name(name: &str, quality: u8) -> Option<Self> {
        match name.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(OutputFormat::Jpeg {
                quality: quality.clamp(1, 100),
            }),
            "png" => Some(OutputFormat::Png),
            "bmp" => Some(OutputFormat::Bmp),
            _ => None,
        }
    }
}

/// What to do when a segment of the stream fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeTolerance {
    /// Abort the run on the first decode error.
    #[default]
    Strict,
    /// Log and skip corrupt segments. The run still aborts after
    /// `max_consecutive` errors in a row without a good frame in between.
    SkipCorrupt {
        /// Consecutive failures allowed before giving up.
        max_consecutive: u32,
    },
}

/// Resolution and pixel layout of decoded frames.
///
/// When no dimensions are set the source resolution is used. Setting one
/// dimension with `maintain_aspect_ratio` computes the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameOutputOptions {
    /// Output pixel format.
    pub pixel_format: PixelFormat,
    /// Target width. `None` keeps the source width.
    pub width: Option<u32>,
    /// Target height. `None` keeps the source height.
    pub height: Option<u32>,
    /// Derive the missing dimension from the source aspect ratio.
    pub maintain_aspect_ratio: bool,
}

impl Default for FrameOutputOptions {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Rgb8,
            width: None,
            height: None,
            maintain_aspect_ratio: true,
        }
    }
}

impl FrameOutputOptions {
    /// Resolve `(width, height)` for a source of the given size.
    pub fn resolve_dimensions(&self, source_width: u32, source_height: u32) -> (u32, u32) {
        match (self.width, self.height) {
            (Some(width), Some(height)) => (width, height),
            (Some(width), None) if self.maintain_aspect_ratio && source_width > 0 => {
                let ratio = width as f64 / source_width as f64;
                (width, ((source_height as f64 * ratio).round() as u32).max(1))
            }
            (Some(width), None) => (width, source_height),
            (None, Some(height)) if self.maintain_aspect_ratio && source_height > 0 => {
                let ratio = height as f64 / source_height as f64;
                (((source_width as f64 * ratio).round() as u32).max(1), height)
            }
            (None, Some(height)) => (source_width, height),
            (None, None) => (source_width, source_height),
        }
    }
}

/// Settings consumed when opening a decoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Output size and pixel layout.
    pub frame_output: FrameOutputOptions,
    /// Name of a specific FFmpeg decoder (e.g. `h264_cuvid`). Falls back to
    /// the codec's default decoder when it cannot be opened.
    pub decoder_name: Option<String>,
    /// FFmpeg filter graph applied to every decoded frame before
    /// conversion (e.g. [`TONEMAP_FILTER`]).
    pub filter: Option<String>,
    /// Hardware decode mode.
    #[cfg(feature = "hardware")]
    pub hardware: HardwareAccelerationMode,
}

impl DecodeOptions {
    /// A copy forced onto the plain software path.
    pub(crate) fn software(&self) -> Self {
        Self {
            frame_output: self.frame_output.clone(),
            decoder_name: None,
            filter: self.filter.clone(),
            #[cfg(feature = "hardware")]
            hardware: HardwareAccelerationMode::Software,
        }
    }

    /// Whether this configuration asks for anything beyond plain software
    /// decoding.
    pub(crate) fn is_accelerated(&self) -> bool {
        #[cfg(feature = "hardware")]
        if self.hardware != HardwareAccelerationMode::Software {
            return true;
        }
        self.decoder_name.is_some()
    }
}

/// Options for a single extraction run.
///
/// A default-constructed value keeps every decoded frame as a quality-90
/// JPEG, aborts on the first decode error, never overwrites existing files,
/// and retries failed accelerated decoding in software.
#[derive(Clone)]
pub struct ExtractOptions {
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) batch_size: u64,
    pub(crate) sampling: SamplingInterval,
    pub(crate) start: Duration,
    pub(crate) max_frames: Option<u64>,
    pub(crate) max_duration: Option<Duration>,
    pub(crate) output_format: OutputFormat,
    pub(crate) naming: FrameNaming,
    pub(crate) prefix: Option<String>,
    pub(crate) overwrite: bool,
    pub(crate) decode_tolerance: DecodeTolerance,
    pub(crate) fallback: bool,
    pub(crate) decode: DecodeOptions,
}

impl Debug for ExtractOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExtractOptions")
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .field("sampling", &self.sampling)
            .field("start", &self.start)
            .field("max_frames", &self.max_frames)
            .field("max_duration", &self.max_duration)
            .field("output_format", &self.output_format)
            .field("naming", &self.naming)
            .field("prefix", &self.prefix)
            .field("overwrite", &self.overwrite)
            .field("decode_tolerance", &self.decode_tolerance)
            .field("fallback", &self.fallback)
            .field("decode", &self.decode)
            .finish()
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
            sampling: SamplingInterval::default(),
            start: Duration::ZERO,
            max_frames: None,
            max_duration: None,
            output_format: OutputFormat::default(),
            naming: FrameNaming::default(),
            prefix: None,
            overwrite: false,
            decode_tolerance: DecodeTolerance::default(),
            fallback: true,
            decode: DecodeOptions::default(),
        }
    }

    /// Attach a progress callback, fired every
    /// [`batch_size`](ExtractOptions::with_batch_size) written frames.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// How many written frames between progress callbacks. Minimum 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the sampling interval.
    #[must_use]
    pub fn with_sampling(mut self, sampling: SamplingInterval) -> Self {
        self.sampling = sampling;
        self
    }

    /// Skip to `start` before sampling.
    #[must_use]
    pub fn with_start(mut self, start: Duration) -> Self {
        self.start = start;
        self
    }

    /// Stop after writing `count` frames.
    #[must_use]
    pub fn with_max_frames(mut self, count: u64) -> Self {
        self.max_frames = Some(count);
        self
    }

    /// Stop once the stream reaches `start + duration`.
    #[must_use]
    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    /// Set the image format of written frames.
    #[must_use]
    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Set the file naming scheme.
    #[must_use]
    pub fn with_naming(mut self, naming: FrameNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Use `prefix` instead of the label derived from the source.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Allow replacing files left by an earlier run.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Set how decode errors are handled.
    #[must_use]
    pub fn with_decode_tolerance(mut self, tolerance: DecodeTolerance) -> Self {
        self.decode_tolerance = tolerance;
        self
    }

    /// Enable or disable the software/tonemap retry chain.
    #[must_use]
    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    /// Set the output pixel format.
    #[must_use]
    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.decode.frame_output.pixel_format = format;
        self
    }

    /// Scale frames. `None` keeps the source value for that dimension.
    #[must_use]
    pub fn with_resolution(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.decode.frame_output.width = width;
        self.decode.frame_output.height = height;
        self
    }

    /// Request a specific FFmpeg decoder by name.
    #[must_use]
    pub fn with_decoder_name(mut self, name: impl Into<String>) -> Self {
        self.decode.decoder_name = Some(name.into());
        self
    }

    /// Apply an FFmpeg filter graph to decoded frames.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.decode.filter = Some(filter.into());
        self
    }

    /// Set the hardware decode mode. Defaults to
    /// [`HardwareAccelerationMode::Auto`].
    #[cfg(feature = "hardware")]
    #[must_use]
    pub fn with_hardware_acceleration(mut self, mode: HardwareAccelerationMode) -> Self {
        self.decode.hardware = mode;
        self
    }

    /// Decoder settings for this run.
    pub fn decode_options(&self) -> &DecodeOptions {
        &self.decode
    }

    /// The configured sampling interval.
    pub fn sampling(&self) -> SamplingInterval {
        self.sampling
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "rgb8" | "rgb" => Ok(PixelFormat::Rgb8),
            "gray8" | "gray" | "grey" | "grayscale" => Ok(PixelFormat::Gray8),
            other => Err(format!("unsupported pixel format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_dimension_keeps_aspect_ratio() {
        let options = FrameOutputOptions {
            width: Some(640),
            ..FrameOutputOptions::default()
        };
        assert_eq!(options.resolve_dimensions(1920, 1080), (640, 360));

        let options = FrameOutputOptions {
            height: Some(540),
            ..FrameOutputOptions::default()
        };
        assert_eq!(options.resolve_dimensions(1920, 1080), (960, 540));
    }

    #[test]
    fn aspect_ratio_can_be_ignored() {
        let options = FrameOutputOptions {
            width: Some(640),
            maintain_aspect_ratio: false,
            ..FrameOutputOptions::default()
        };
        assert_eq!(options.resolve_dimensions(1920, 1080), (640, 1080));
    }

    #[test]
    fn output_format_names() {
        assert_eq!(
            OutputFormat::from_name(".JPEG", 250),
            Some(OutputFormat::Jpeg { quality: 100 })
        );
        assert_eq!(OutputFormat::from_name("png", 10), Some(OutputFormat::Png));
        assert_eq!(OutputFormat::from_name("webm", 90), None);
        assert_eq!(OutputFormat::default().extension(), "jpg");
    }

    #[test]
    fn software_copy_drops_named_decoder() {
        let options = ExtractOptions::new()
            .with_decoder_name("h264_cuvid")
            .with_filter(TONEMAP_FILTER);
        assert!(options.decode.is_accelerated());

        let software = options.decode.software();
        assert_eq!(software.decoder_name, None);
        assert_eq!(software.filter.as_deref(), Some(TONEMAP_FILTER));
        assert!(!software.is_accelerated());
    }
}
