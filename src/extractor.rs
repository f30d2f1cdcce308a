//! The extraction run: open → decode loop → close.
//!
//! [`FrameExtractor`] drives any [`FrameDecoder`]: every decoded position
//! goes through the [`Sampler`], sampled frames are converted and handed to
//! the writer, and decode errors are either fatal or skipped depending on
//! the configured [`DecodeTolerance`].
//!
//! [`FrameExtractor::extract`] adds the fallback chain on top: the
//! configured decode path first, then plain software decoding, then
//! software decoding through a tonemap filter. A retry only happens when
//! the failed attempt wrote nothing, so frames are never written twice.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};

use crate::{
    configuration::{DecodeOptions, DecodeTolerance, ExtractOptions, TONEMAP_FILTER},
    decoder::FrameDecoder,
    error::ExtractError,
    metadata::VideoMetadata,
    naming::source_label,
    progress::{OperationType, ProgressTracker},
    sampling::Sampler,
    source::FfmpegDecoder,
    writer::FrameWriter,
};

/// Which step of the fallback chain produced the frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePath {
    /// The decoder configuration the caller asked for.
    #[default]
    Configured,
    /// Plain software decoding after the configured path failed.
    Software,
    /// Software decoding through [`TONEMAP_FILTER`].
    SoftwareTonemap,
}

impl Display for DecodePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            DecodePath::Configured => "configured decoder",
            DecodePath::Software => "software decoder",
            DecodePath::SoftwareTonemap => "software decoder with tonemapping",
        })
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Frames the decoder produced, sampled or not.
    pub frames_decoded: u64,
    /// Frames written to disk.
    pub frames_written: u64,
    /// Decode errors skipped under [`DecodeTolerance::SkipCorrupt`].
    pub corrupt_segments_skipped: u64,
    /// Whether frames were decoded on a hardware device.
    pub hardware_active: bool,
    /// Fallback step that produced the output.
    pub decode_path: DecodePath,
    /// Written files in stream order.
    pub written: Vec<PathBuf>,
}

/// Tracks decode errors against the configured tolerance.
struct ErrorBudget {
    tolerance: DecodeTolerance,
    consecutive: u32,
    skipped: u64,
}

impl ErrorBudget {
    fn new(tolerance: DecodeTolerance) -> Self {
        Self {
            tolerance,
            consecutive: 0,
            skipped: 0,
        }
    }

    /// `Ok` when the error may be skipped, otherwise the error that ends
    /// the run.
    fn absorb(&mut self, error: ExtractError) -> Result<(), ExtractError> {
        if !error.is_decode_failure() {
            return Err(error);
        }
        match self.tolerance {
            DecodeTolerance::Strict => Err(error),
            DecodeTolerance::SkipCorrupt { max_consecutive } => {
                self.consecutive += 1;
                if self.consecutive > max_consecutive {
                    return Err(ExtractError::DecodeFailure(format!(
                        "giving up after {} consecutive decode errors, last: {error}",
                        self.consecutive
                    )));
                }
                self.skipped += 1;
                log::warn!("Skipping corrupt segment: {error}");
                Ok(())
            }
        }
    }

    fn recovered(&mut self) {
        self.consecutive = 0;
    }
}

/// Runs one extraction over a [`FrameDecoder`].
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
///
/// use birdcam::{ExtractOptions, FrameExtractor, SamplingInterval};
///
/// let options = ExtractOptions::new()
///     .with_sampling(SamplingInterval::Every(Duration::from_secs(2)));
/// let report = FrameExtractor::extract("feeder.mp4", "frames", &options)?;
/// println!("wrote {} frames", report.frames_written);
/// # Ok::<(), birdcam::ExtractError>(())
/// ```
pub struct FrameExtractor<D: FrameDecoder> {
    decoder: D,
    label: String,
}

impl<D: FrameDecoder> FrameExtractor<D> {
    /// Wrap an opened decoder. `label` is used in output file names.
    pub fn new(decoder: D, label: impl Into<String>) -> Self {
        Self {
            decoder,
            label: label.into(),
        }
    }

    /// Metadata of the underlying stream.
    pub fn metadata(&self) -> &VideoMetadata {
        self.decoder.metadata()
    }

    /// Run the decode loop and write sampled frames into `output_directory`.
    ///
    /// The decoder is closed on every exit path. Frames written before an
    /// error stay on disk.
    ///
    /// # Errors
    ///
    /// - [`ExtractError::InvalidInterval`] for a zero sampling interval.
    /// - [`ExtractError::WriteFailure`] if the directory cannot be created
    ///   or a frame cannot be written.
    /// - [`ExtractError::DecodeFailure`] if decoding fails beyond the
    ///   configured tolerance.
    /// - [`ExtractError::Cancelled`] if the cancellation token fired.
    pub fn run(
        self,
        output_directory: impl AsRef<Path>,
        options: &ExtractOptions,
    ) -> Result<ExtractionReport, ExtractError> {
        let (outcome, report) = self.execute(output_directory.as_ref(), options);
        outcome.map(|()| report)
    }

    fn execute(
        mut self,
        output_directory: &Path,
        options: &ExtractOptions,
    ) -> (Result<(), ExtractError>, ExtractionReport) {
        let mut report = ExtractionReport {
            hardware_active: self.decoder.is_hardware_accelerated(),
            ..ExtractionReport::default()
        };

        let outcome = self.decode_loop(output_directory, options, &mut report);
        self.decoder.close();

        match &outcome {
            Ok(()) => log::info!(
                "Extracted {} of {} decoded frames from {}",
                report.frames_written,
                report.frames_decoded,
                self.label
            ),
            Err(error) => log::info!(
                "Run over {} stopped after {} frames: {error}",
                self.label,
                report.frames_written
            ),
        }
        (outcome, report)
    }

    fn decode_loop(
        &mut self,
        output_directory: &Path,
        options: &ExtractOptions,
        report: &mut ExtractionReport,
    ) -> Result<(), ExtractError> {
        let mut sampler = Sampler::new(options.sampling, options.start)?;
        let mut writer = FrameWriter::prepare(
            output_directory,
            self.label.clone(),
            options.naming,
            options.output_format,
            options.overwrite,
        )?;

        if !options.start.is_zero()
            && let Err(error) = self.decoder.seek(options.start)
        {
            log::warn!("Could not seek to {:?} ({error}); decoding from the start", options.start);
        }

        let metadata = self.decoder.metadata();
        let expected = options.sampling.expected_count(
            metadata.duration,
            metadata.frames_per_second,
            options.start,
        );
        let total = match (expected, options.max_frames) {
            (Some(expected), Some(limit)) => Some(expected.min(limit)),
            (expected, limit) => expected.or(limit),
        };
        let end = options
            .max_duration
            .map(|duration| options.start.saturating_add(duration));
        log::info!(
            "Sampling {} with {:?} into {}",
            self.label,
            options.sampling,
            output_directory.display()
        );

        let mut tracker = ProgressTracker::new(
            options.progress.clone(),
            OperationType::FrameExtraction,
            total,
            options.batch_size,
        );
        let mut budget = ErrorBudget::new(options.decode_tolerance);

        let result = loop {
            if options.is_cancelled() {
                break Err(ExtractError::Cancelled);
            }
            if options
                .max_frames
                .is_some_and(|limit| writer.written_count() >= limit)
            {
                log::debug!("Frame limit reached");
                break Ok(());
            }

            let position = match self.decoder.next_frame() {
                Ok(Some(position)) => position,
                Ok(None) => break Ok(()),
                Err(error) => match budget.absorb(error) {
                    Ok(()) => continue,
                    Err(error) => break Err(error),
                },
            };
            report.frames_decoded += 1;

            if end.is_some_and(|end| position.timestamp >= end) {
                log::debug!("Duration limit reached at {:?}", position.timestamp);
                break Ok(());
            }
            if !sampler.should_emit(&position) {
                budget.recovered();
                continue;
            }

            let image = match self.decoder.current_image() {
                Ok(image) => image,
                Err(error) => match budget.absorb(error) {
                    Ok(()) => continue,
                    Err(error) => break Err(error),
                },
            };
            budget.recovered();

            if let Err(error) = writer.write(&image, &position) {
                break Err(error);
            }
            tracker.advance(Some(position.index), Some(position.timestamp));
        };

        tracker.finish();
        report.frames_written = writer.written_count();
        report.corrupt_segments_skipped = budget.skipped;
        report.hardware_active = self.decoder.is_hardware_accelerated();
        report.written = writer.into_written();
        result
    }
}

impl FrameExtractor<FfmpegDecoder> {
    /// Open `source` with FFmpeg and extract frames into `output_directory`,
    /// retrying with simpler decode paths when nothing could be written.
    ///
    /// The source is opened before the output directory is touched, so an
    /// unreachable source leaves the filesystem unchanged.
    ///
    /// # Errors
    ///
    /// [`ExtractError::SourceUnavailable`] if the source cannot be opened,
    /// otherwise as for [`run`](FrameExtractor::run).
    pub fn extract(
        source: impl AsRef<Path>,
        output_directory: impl AsRef<Path>,
        options: &ExtractOptions,
    ) -> Result<ExtractionReport, ExtractError> {
        let source = source.as_ref();
        let label = options
            .prefix
            .clone()
            .unwrap_or_else(|| source_label(&source.to_string_lossy()));
        Self::extract_with(&label, output_directory.as_ref(), options, |decode| {
            FfmpegDecoder::open(source, decode)
        })
    }
}

impl<D: FrameDecoder> FrameExtractor<D> {
    /// Run the fallback chain with decoders produced by `open`.
    ///
    /// `open` is called once per attempt with the decoder settings for
    /// that step.
    pub fn extract_with<F>(
        label: &str,
        output_directory: &Path,
        options: &ExtractOptions,
        mut open: F,
    ) -> Result<ExtractionReport, ExtractError>
    where
        F: FnMut(&DecodeOptions) -> Result<D, ExtractError>,
    {
        options.sampling.validate()?;

        let mut last_error = None;
        for (path, decode) in fallback_chain(options) {
            if let Some(error) = &last_error {
                log::warn!("Nothing written ({error}); retrying with {path}");
            }

            let decoder = open(&decode)?;
            let (outcome, mut report) =
                FrameExtractor::new(decoder, label).execute(output_directory, options);
            report.decode_path = path;

            match outcome {
                Ok(()) => return Ok(report),
                Err(error) if error.is_decode_failure() && report.frames_written == 0 => {
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ExtractError::DecodeFailure("no decode path produced any frames".to_string())
        }))
    }
}

fn fallback_chain(options: &ExtractOptions) -> Vec<(DecodePath, DecodeOptions)> {
    let mut chain = vec![(DecodePath::Configured, options.decode.clone())];
    if !options.fallback {
        return chain;
    }

    if options.decode.is_accelerated() {
        chain.push((DecodePath::Software, options.decode.software()));
    }
    if options.decode.filter.is_none() {
        let mut tonemapped = options.decode.software();
        tonemapped.filter = Some(TONEMAP_FILTER.to_string());
        chain.push((DecodePath::SoftwareTonemap, tonemapped));
    }
    chain
}

/// Convenience wrapper around [`FrameExtractor::extract`].
pub fn extract_frames(
    source: impl AsRef<Path>,
    output_directory: impl AsRef<Path>,
    options: &ExtractOptions,
) -> Result<ExtractionReport, ExtractError> {
    FrameExtractor::extract(source, output_directory, options)
}
