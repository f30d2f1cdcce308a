//! FFmpeg-backed [`FrameDecoder`].
//!
//! [`FfmpegDecoder`] opens a local file or a network stream (`rtsp://`,
//! `http://`, ...), picks the best video stream and decodes it in order.
//! Network sources are opened over TCP with a ten second socket timeout so
//! an offline camera fails fast with
//! [`SourceUnavailable`](ExtractError::SourceUnavailable) instead of
//! hanging.
//!
//! Accelerated paths (a named decoder such as `h264_cuvid`, or a hardware
//! device under the `hardware` feature) are tried first. If one of them
//! fails before producing a single frame, the decoder reopens the source in
//! software and starts over.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::Path;
use std::time::Duration;

use ffmpeg_next::{
    Dictionary, Error as FfmpegError, Packet, Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input, stream::Stream},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    util::error::EAGAIN,
};
use ffmpeg_sys_next::AV_NOPTS_VALUE;
use image::{DynamicImage, GrayImage, RgbImage};

use crate::{
    configuration::{DecodeOptions, PixelFormat},
    conversion::{
        duration_to_frame_index, duration_to_seek_timestamp, frame_to_buffer, pts_to_duration,
    },
    decoder::{FrameDecoder, FramePosition},
    error::ExtractError,
    filter::FrameFilter,
    metadata::VideoMetadata,
};

/// Socket timeout for network sources, in microseconds.
const NETWORK_TIMEOUT_MICROSECONDS: &str = "10000000";

type ScalerKey = (Pixel, u32, u32);

/// Decodes a video file or stream with the FFmpeg libraries.
///
/// # Example
///
/// ```no_run
/// use birdcam::{DecodeOptions, FfmpegDecoder, FrameDecoder};
///
/// let mut decoder = FfmpegDecoder::open("feeder.mp4", &DecodeOptions::default())?;
/// while let Some(position) = decoder.next_frame()? {
///     if position.index % 100 == 0 {
///         decoder.current_image()?.save(format!("frame_{}.png", position.index))?;
///     }
/// }
/// # Ok::<(), birdcam::ExtractError>(())
/// ```
pub struct FfmpegDecoder {
    location: String,
    options: DecodeOptions,
    input: Option<Input>,
    decoder: Option<VideoDecoder>,
    stream_index: usize,
    time_base: Rational,
    origin_pts: Option<i64>,
    metadata: VideoMetadata,
    decoded: VideoFrame,
    current: VideoFrame,
    converted: VideoFrame,
    scaler: Option<(ScalerKey, ScalingContext)>,
    filter: Option<FrameFilter>,
    filter_flushed: bool,
    hardware: bool,
    accelerated: bool,
    frames_decoded: u64,
    seek_target: Option<Duration>,
    next_index: u64,
    reanchor: bool,
    eof_sent: bool,
    has_current: bool,
}

impl Debug for FfmpegDecoder {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FfmpegDecoder")
            .field("location", &self.location)
            .field("metadata", &self.metadata)
            .field("stream_index", &self.stream_index)
            .field("hardware", &self.hardware)
            .field("frames_decoded", &self.frames_decoded)
            .finish_non_exhaustive()
    }
}

struct OpenedDecoder {
    decoder: VideoDecoder,
    hardware: bool,
    accelerated: bool,
}

impl FfmpegDecoder {
    /// Open `source` for decoding.
    ///
    /// # Errors
    ///
    /// - [`ExtractError::SourceUnavailable`] if the file is missing or the
    ///   stream cannot be reached.
    /// - [`ExtractError::NoVideoStream`] if the source has no video.
    /// - [`ExtractError::Ffmpeg`] if no decoder can be opened for the codec.
    pub fn open<P: AsRef<Path>>(source: P, options: &DecodeOptions) -> Result<Self, ExtractError> {
        let path = source.as_ref();
        let location = path.to_string_lossy().into_owned();
        crate::ffmpeg::initialize(&location)?;

        let input = open_input(&location, path)?;
        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or(ExtractError::NoVideoStream)?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let origin_pts = (stream.start_time() != AV_NOPTS_VALUE).then(|| stream.start_time());
        let frames_per_second = rate_to_f64(stream.avg_frame_rate())
            .or_else(|| rate_to_f64(stream.rate()))
            .unwrap_or(0.0);
        let opened = open_video_decoder(&stream, options)?;

        let duration = if input.duration() > 0 {
            Duration::from_micros(input.duration() as u64)
        } else {
            Duration::ZERO
        };
        let metadata = VideoMetadata {
            width: opened.decoder.width(),
            height: opened.decoder.height(),
            frames_per_second,
            frame_count: (duration.as_secs_f64() * frames_per_second) as u64,
            duration,
            codec: opened
                .decoder
                .codec()
                .map(|codec| codec.name().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            format: input.format().name().to_string(),
        };
        log::debug!(
            "Opened {location}: {}x{} {} @ {:.3} fps, duration {:?}",
            metadata.width,
            metadata.height,
            metadata.codec,
            metadata.frames_per_second,
            metadata.duration,
        );

        let filter = options
            .filter
            .as_deref()
            .map(|description| FrameFilter::new(description, time_base));

        Ok(Self {
            location,
            options: options.clone(),
            input: Some(input),
            decoder: Some(opened.decoder),
            stream_index,
            time_base,
            origin_pts,
            metadata,
            decoded: VideoFrame::empty(),
            current: VideoFrame::empty(),
            converted: VideoFrame::empty(),
            scaler: None,
            filter,
            filter_flushed: false,
            hardware: opened.hardware,
            accelerated: opened.accelerated,
            frames_decoded: 0,
            seek_target: None,
            next_index: 0,
            reanchor: false,
            eof_sent: false,
            has_current: false,
        })
    }

    /// Path or URL this decoder was opened with.
    pub fn location(&self) -> &str {
        &self.location
    }

    fn decode_next(&mut self) -> Result<Option<FramePosition>, ExtractError> {
        loop {
            if let Some(filter) = self.filter.as_mut()
                && filter.pull(&mut self.current)
            {
                return Ok(Some(self.position_of_current()));
            }

            let Some(decoder) = self.decoder.as_mut() else {
                return Ok(None);
            };

            if frame_received(decoder.receive_frame(&mut self.decoded))? {
                #[cfg(feature = "hardware")]
                if self.hardware
                    && let Some(software) =
                        crate::hardware_acceleration::transfer_hardware_frame(&self.decoded)?
                {
                    self.decoded = software;
                }

                match self.filter.as_mut() {
                    Some(filter) => {
                        filter.push(&self.decoded)?;
                        continue;
                    }
                    None => {
                        std::mem::swap(&mut self.decoded, &mut self.current);
                        return Ok(Some(self.position_of_current()));
                    }
                }
            }

            if self.eof_sent {
                if let Some(filter) = self.filter.as_mut()
                    && !self.filter_flushed
                {
                    filter.flush();
                    self.filter_flushed = true;
                    continue;
                }
                self.has_current = false;
                return Ok(None);
            }

            let Some(input) = self.input.as_mut() else {
                return Ok(None);
            };
            let mut packet = Packet::empty();
            match packet.read(input) {
                Ok(()) => {
                    if packet.stream() == self.stream_index {
                        decoder.send_packet(&packet).map_err(|error| {
                            ExtractError::DecodeFailure(format!(
                                "Corrupt packet at pts {:?}: {error}",
                                packet.pts()
                            ))
                        })?;
                    }
                }
                Err(FfmpegError::Eof) => {
                    decoder.send_eof()?;
                    self.eof_sent = true;
                }
                Err(FfmpegError::Other { errno }) if errno == EAGAIN => {}
                Err(error) => {
                    return Err(ExtractError::DecodeFailure(format!(
                        "Failed to read from {}: {error}",
                        self.location
                    )));
                }
            }
        }
    }

    fn position_of_current(&mut self) -> FramePosition {
        let frames_per_second = self.metadata.frames_per_second;
        let timestamp = match self.current.timestamp().or_else(|| self.current.pts()) {
            Some(pts) => {
                let origin = *self.origin_pts.get_or_insert(pts);
                pts_to_duration(pts.saturating_sub(origin), self.time_base)
            }
            None if frames_per_second > 0.0 => {
                Duration::from_secs_f64(self.next_index as f64 / frames_per_second)
            }
            None => Duration::ZERO,
        };

        // After a seek the frame count restarts from the landing position.
        if self.reanchor {
            self.reanchor = false;
            if frames_per_second > 0.0 {
                self.next_index = duration_to_frame_index(timestamp, frames_per_second);
            }
        }

        let index = self.next_index;
        self.next_index += 1;
        self.frames_decoded += 1;
        self.has_current = true;
        FramePosition { index, timestamp }
    }

    fn restart_in_software(&mut self) -> Result<(), ExtractError> {
        let location = self.location.clone();
        let software = self.options.software();
        let seek_target = self.seek_target;
        self.close();
        *self = Self::open(&location, &software)?;

        if let Some(target) = seek_target
            && let Err(error) = self.seek(target)
        {
            log::warn!("Could not seek to {target:?} after restarting ({error})");
        }
        Ok(())
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<FramePosition>, ExtractError> {
        match self.decode_next() {
            Err(error) if restarts_in_software(&error, self.accelerated, self.frames_decoded) => {
                log::warn!(
                    "Accelerated decoding of {} failed before the first frame ({error}); restarting in software",
                    self.location
                );
                self.restart_in_software()?;
                self.decode_next()
            }
            other => other,
        }
    }

    fn current_image(&mut self) -> Result<DynamicImage, ExtractError> {
        if !self.has_current {
            return Err(ExtractError::DecodeFailure(
                "No decoded frame available for conversion".to_string(),
            ));
        }

        let frame_output = &self.options.frame_output;
        let pixel_format = frame_output.pixel_format;
        let source_width = self.current.width();
        let source_height = self.current.height();
        let (width, height) = frame_output.resolve_dimensions(source_width, source_height);
        let key = (self.current.format(), source_width, source_height);

        // Decoders may switch pixel format or size mid-stream.
        if self
            .scaler
            .as_ref()
            .is_none_or(|(existing, _)| *existing != key)
        {
            let context = ScalingContext::get(
                key.0,
                source_width,
                source_height,
                pixel_format.to_ffmpeg_pixel(),
                width,
                height,
                ScalingFlags::BILINEAR,
            )
            .map_err(|error| {
                ExtractError::DecodeFailure(format!(
                    "Cannot convert {:?} frames to {pixel_format:?}: {error}",
                    key.0
                ))
            })?;
            self.scaler = Some((key, context));
        }
        let (_, scaler) = self.scaler.as_mut().ok_or_else(|| {
            ExtractError::DecodeFailure("Pixel format converter unavailable".to_string())
        })?;
        scaler
            .run(&self.current, &mut self.converted)
            .map_err(|error| ExtractError::DecodeFailure(format!("Frame conversion failed: {error}")))?;

        let buffer = frame_to_buffer(&self.converted, width, height, pixel_format.bytes_per_pixel());
        let image = match pixel_format {
            PixelFormat::Rgb8 => RgbImage::from_raw(width, height, buffer).map(DynamicImage::ImageRgb8),
            PixelFormat::Gray8 => {
                GrayImage::from_raw(width, height, buffer).map(DynamicImage::ImageLuma8)
            }
        };
        image.ok_or_else(|| {
            ExtractError::DecodeFailure(
                "Failed to construct image from decoded frame data".to_string(),
            )
        })
    }

    fn seek(&mut self, position: Duration) -> Result<(), ExtractError> {
        let Some(input) = self.input.as_mut() else {
            return Ok(());
        };
        let target = duration_to_seek_timestamp(position);
        input.seek(target, ..target).map_err(|error| {
            ExtractError::DecodeFailure(format!("Seek to {position:?} failed: {error}"))
        })?;

        if let Some(decoder) = self.decoder.as_mut() {
            decoder.flush();
        }
        if let Some(filter) = self.filter.as_mut() {
            filter.reset();
        }
        self.eof_sent = false;
        self.filter_flushed = false;
        self.has_current = false;
        self.reanchor = true;
        self.seek_target = Some(position);
        Ok(())
    }

    fn close(&mut self) {
        if self.input.is_some() {
            log::debug!(
                "Closing {} after {} delivered frames",
                self.location,
                self.frames_decoded
            );
        }
        self.filter = None;
        self.scaler = None;
        self.decoder = None;
        self.input = None;
        self.eof_sent = true;
        self.filter_flushed = true;
        self.has_current = false;
    }

    fn is_hardware_accelerated(&self) -> bool {
        self.hardware
    }
}

fn open_input(location: &str, path: &Path) -> Result<Input, ExtractError> {
    let unavailable = |reason: String| ExtractError::SourceUnavailable {
        location: location.to_string(),
        reason,
    };

    if location.contains("://") {
        let mut options = Dictionary::new();
        if location.starts_with("rtsp") {
            options.set("rtsp_transport", "tcp");
        }
        options.set("timeout", NETWORK_TIMEOUT_MICROSECONDS);
        ffmpeg_next::format::input_with_dictionary(&path, options)
            .map_err(|error| unavailable(error.to_string()))
    } else {
        if !path.exists() {
            return Err(unavailable("no such file".to_string()));
        }
        ffmpeg_next::format::input(&path).map_err(|error| unavailable(error.to_string()))
    }
}

/// `Ok(true)` when a frame was received, `Ok(false)` when the decoder
/// needs more input or is drained.
fn frame_received(result: Result<(), FfmpegError>) -> Result<bool, ExtractError> {
    match result {
        Ok(()) => Ok(true),
        Err(FfmpegError::Eof) => Ok(false),
        Err(FfmpegError::Other { errno }) if errno == EAGAIN => Ok(false),
        Err(error) => Err(ExtractError::DecodeFailure(format!(
            "Failed to decode frame: {error}"
        ))),
    }
}

/// An accelerated decoder that fails before delivering any frame is
/// rebuilt in software.
fn restarts_in_software(error: &ExtractError, accelerated: bool, frames_delivered: u64) -> bool {
    error.is_decode_failure() && accelerated && frames_delivered == 0
}

fn rate_to_f64(rate: Rational) -> Option<f64> {
    (rate.numerator() > 0 && rate.denominator() > 0)
        .then(|| rate.numerator() as f64 / rate.denominator() as f64)
}

fn open_video_decoder(
    stream: &Stream<'_>,
    options: &DecodeOptions,
) -> Result<OpenedDecoder, ExtractError> {
    let parameters = stream.parameters();
    let context = || CodecContext::from_parameters(parameters.clone()).map_err(ExtractError::from);

    if let Some(name) = options.decoder_name.as_deref() {
        match open_named_decoder(context()?, name) {
            Ok(decoder) => {
                log::info!("Using decoder {name}");
                return Ok(OpenedDecoder {
                    decoder,
                    hardware: false,
                    accelerated: true,
                });
            }
            Err(error) => log::warn!("Decoder {name} unavailable ({error}); using the default"),
        }
    }

    open_default_decoder(context, options)
}

fn open_named_decoder(context: CodecContext, name: &str) -> Result<VideoDecoder, ExtractError> {
    let codec = ffmpeg_next::decoder::find_by_name(name)
        .ok_or_else(|| ExtractError::DecodeFailure(format!("FFmpeg has no decoder named {name}")))?;
    Ok(context.decoder().open_as(codec)?.video()?)
}

#[cfg(feature = "hardware")]
fn open_default_decoder(
    context: impl Fn() -> Result<CodecContext, ExtractError>,
    options: &DecodeOptions,
) -> Result<OpenedDecoder, ExtractError> {
    let setup =
        crate::hardware_acceleration::try_create_hardware_decoder(context()?, options.hardware, context)?;
    let hardware = setup.device.is_some();
    Ok(OpenedDecoder {
        decoder: setup.decoder,
        hardware,
        accelerated: hardware,
    })
}

#[cfg(not(feature = "hardware"))]
fn open_default_decoder(
    context: impl Fn() -> Result<CodecContext, ExtractError>,
    _options: &DecodeOptions,
) -> Result<OpenedDecoder, ExtractError> {
    Ok(OpenedDecoder {
        decoder: context()?.decoder().video()?,
        hardware: false,
        accelerated: false,
    })
}
