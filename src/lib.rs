//! # birdcam
//!
//! Sample still frames from security-camera recordings and live feeds, as
//! input for wildlife and bird detection.
//!
//! `birdcam` decodes a video file or stream (`rtsp://...`) with FFmpeg via
//! the [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate, keeps
//! one frame per time or frame interval, and writes the kept frames as
//! image files with deterministic, sortable names.
//!
//! ## Quick Start
//!
//! ### One frame every two seconds
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use birdcam::{ExtractOptions, FrameExtractor, SamplingInterval};
//!
//! let options = ExtractOptions::new()
//!     .with_sampling(SamplingInterval::Every(Duration::from_secs(2)));
//! let report = FrameExtractor::extract("feeder.mp4", "frames", &options)?;
//! println!("{} frames written", report.frames_written);
//! # Ok::<(), birdcam::ExtractError>(())
//! ```
//!
//! ### A live camera, tolerating corrupt packets
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use birdcam::{DecodeTolerance, ExtractOptions, FrameExtractor, SamplingInterval};
//!
//! let options = ExtractOptions::new()
//!     .with_sampling(SamplingInterval::every_seconds(5.0)?)
//!     .with_max_duration(Duration::from_secs(3600))
//!     .with_decode_tolerance(DecodeTolerance::SkipCorrupt { max_consecutive: 100 });
//! FrameExtractor::extract("rtsp://192.168.1.20:554/stream1", "frames", &options)?;
//! # Ok::<(), birdcam::ExtractError>(())
//! ```
//!
//! ### A directory of recordings, then a shortlist
//!
//! ```no_run
//! use birdcam::{BatchExtractor, ExtractOptions, Shortlister};
//!
//! let report = BatchExtractor::new().run("recordings", "frames", &ExtractOptions::new())?;
//! println!("{} videos failed", report.failed.len());
//! Shortlister::new(9).run("frames", "shortlisted")?;
//! # Ok::<(), birdcam::ExtractError>(())
//! ```
//!
//! ## Features
//!
//! - **Time or frame sampling**: one frame per duration on a fixed grid, or
//!   every n-th decoded frame
//! - **Decoder abstraction**: [`FrameDecoder`] lets software, hardware and
//!   synthetic decoders drive the same extraction loop
//! - **Fallback chain**: accelerated decoding, then software, then software
//!   with a tonemap filter for HDR footage
//! - **Decode tolerance**: abort on the first corrupt segment, or skip up
//!   to a limit of consecutive failures
//! - **Limits**: start offset, frame count and duration limits for live
//!   feeds
//! - **Progress & cancellation**: callbacks and [`CancellationToken`]
//! - **Batch mode and shortlisting** for directories of recordings
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `rayon` | Process batch videos in parallel |
//! | `hardware` | Hardware-accelerated decoding (CUDA, VAAPI, DXVA2, D3D11VA, VideoToolbox, QSV) |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod batch;
pub mod configuration;
mod conversion;
pub mod decoder;
pub mod error;
pub mod extractor;
pub mod ffmpeg;
mod filter;
#[cfg(feature = "hardware")]
pub mod hardware_acceleration;
pub mod metadata;
pub mod naming;
pub mod probe;
pub mod progress;
pub mod sampling;
pub mod settings;
pub mod shortlist;
pub mod source;
mod writer;

pub use batch::{BatchExtractor, BatchReport, WorkerCount};
pub use configuration::{
    DecodeOptions, DecodeTolerance, ExtractOptions, FrameOutputOptions, OutputFormat,
    PixelFormat, TONEMAP_FILTER,
};
pub use decoder::{FrameDecoder, FramePosition};
pub use error::ExtractError;
pub use extractor::{DecodePath, ExtractionReport, FrameExtractor, extract_frames};
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
#[cfg(feature = "hardware")]
pub use hardware_acceleration::{
    HardwareAccelerationMode, HardwareDeviceType, available_hardware_devices,
};
pub use metadata::VideoMetadata;
pub use naming::{FrameNaming, source_label};
pub use probe::{MediaProbe, ProbeReport};
pub use progress::{CancellationToken, OperationType, ProgressCallback, ProgressInfo};
pub use sampling::{Sampler, SamplingInterval};
pub use settings::Settings;
pub use shortlist::Shortlister;
pub use source::FfmpegDecoder;
