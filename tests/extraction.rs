//! Extraction loop tests driven by a synthetic decoder.
//!
//! These need no fixture files: frames are generated in memory with exact
//! timestamps, and corrupt segments are injected where a test wants them.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use birdcam::{
    CancellationToken, DecodeOptions, DecodePath, DecodeTolerance, ExtractError, ExtractOptions,
    FrameDecoder, FrameExtractor, FrameNaming, FramePosition, OutputFormat, ProgressCallback,
    ProgressInfo, SamplingInterval, TONEMAP_FILTER, VideoMetadata,
};
use image::{DynamicImage, Rgb, RgbImage};

/// Decodes `frames` frames at `fps`, failing at the listed decode steps.
struct SyntheticDecoder {
    metadata: VideoMetadata,
    steps: Vec<Option<FramePosition>>,
    cursor: usize,
    current: Option<FramePosition>,
    seeks: Arc<Mutex<Vec<Duration>>>,
    closed: Arc<AtomicBool>,
    accelerated: bool,
}

impl SyntheticDecoder {
    fn new(frames: u64, fps: u32) -> Self {
        Self::with_corruption(frames, fps, &[])
    }

    /// `corrupt` lists the step numbers (0-based, counting corrupt steps)
    /// that fail instead of producing a frame.
    fn with_corruption(frames: u64, fps: u32, corrupt: &[usize]) -> Self {
        let frame_interval = Duration::from_secs(1) / fps;
        let mut steps = Vec::new();
        let mut index = 0_u64;
        while index < frames {
            if corrupt.contains(&steps.len()) {
                steps.push(None);
            } else {
                steps.push(Some(FramePosition {
                    index,
                    timestamp: frame_interval * index as u32,
                }));
                index += 1;
            }
        }

        Self {
            metadata: VideoMetadata {
                width: 8,
                height: 8,
                frames_per_second: f64::from(fps),
                frame_count: frames,
                duration: frame_interval * frames as u32,
                codec: "synthetic".to_string(),
                format: "memory".to_string(),
            },
            steps,
            cursor: 0,
            current: None,
            seeks: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            accelerated: false,
        }
    }
}

impl FrameDecoder for SyntheticDecoder {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<FramePosition>, ExtractError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let Some(step) = self.steps.get(self.cursor).copied() else {
            return Ok(None);
        };
        self.cursor += 1;
        match step {
            Some(position) => {
                self.current = Some(position);
                Ok(Some(position))
            }
            None => Err(ExtractError::DecodeFailure(format!(
                "corrupt packet at step {}",
                self.cursor - 1
            ))),
        }
    }

    fn current_image(&mut self) -> Result<DynamicImage, ExtractError> {
        let position = self
            .current
            .ok_or_else(|| ExtractError::DecodeFailure("no current frame".to_string()))?;
        let shade = (position.index % 256) as u8;
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            8,
            8,
            Rgb([shade, 255 - shade, 128]),
        )))
    }

    fn seek(&mut self, position: Duration) -> Result<(), ExtractError> {
        self.seeks.lock().unwrap().push(position);
        // Land one frame early, like a keyframe seek would.
        let target = self
            .steps
            .iter()
            .position(|step| step.is_some_and(|frame| frame.timestamp >= position))
            .unwrap_or(self.steps.len());
        self.cursor = target.saturating_sub(1);
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_hardware_accelerated(&self) -> bool {
        self.accelerated
    }
}

fn file_names(directory: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(directory)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn every(seconds: u64) -> ExtractOptions {
    ExtractOptions::new().with_sampling(SamplingInterval::Every(Duration::from_secs(seconds)))
}

// ── Sampling ───────────────────────────────────────────────────────

#[test]
fn ten_seconds_every_two_seconds_writes_five_frames() {
    let output = tempfile::tempdir().unwrap();
    let report = FrameExtractor::new(SyntheticDecoder::new(250, 25), "cam")
        .run(output.path(), &every(2))
        .unwrap();

    assert_eq!(report.frames_decoded, 250);
    assert_eq!(report.frames_written, 5);
    assert_eq!(report.decode_path, DecodePath::Configured);
    assert_eq!(
        file_names(output.path()),
        vec![
            "f_cam_0000000001.jpg",
            "f_cam_0000000002.jpg",
            "f_cam_0000000003.jpg",
            "f_cam_0000000004.jpg",
            "f_cam_0000000005.jpg",
        ]
    );

    let mut written = report.written.clone();
    written.sort();
    assert_eq!(written, report.written, "written list is in name order");
}

#[test]
fn every_nth_frame_counts_decoded_frames() {
    let output = tempfile::tempdir().unwrap();
    let options = ExtractOptions::new().with_sampling(SamplingInterval::EveryNthFrame(25));
    let report = FrameExtractor::new(SyntheticDecoder::new(250, 25), "cam")
        .run(output.path(), &options)
        .unwrap();

    assert_eq!(report.frames_written, 10);
}

#[test]
fn default_sampling_keeps_every_frame() {
    let output = tempfile::tempdir().unwrap();
    let report = FrameExtractor::new(SyntheticDecoder::new(12, 25), "cam")
        .run(output.path(), &ExtractOptions::new())
        .unwrap();

    assert_eq!(report.frames_written, 12);
}

#[test]
fn zero_interval_is_rejected_before_output_is_created() {
    let output = tempfile::tempdir().unwrap();
    let target = output.path().join("frames");
    let options = ExtractOptions::new().with_sampling(SamplingInterval::Every(Duration::ZERO));

    let result = FrameExtractor::new(SyntheticDecoder::new(10, 25), "cam").run(&target, &options);

    assert!(matches!(result, Err(ExtractError::InvalidInterval)));
    assert!(!target.exists());
}

#[test]
fn runs_are_deterministic() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let options = every(1).with_output_format(OutputFormat::Png);

    for directory in [first.path(), second.path()] {
        FrameExtractor::new(SyntheticDecoder::new(100, 25), "cam")
            .run(directory, &options)
            .unwrap();
    }

    let names = file_names(first.path());
    assert_eq!(names, file_names(second.path()));
    for name in names {
        assert_eq!(
            fs::read(first.path().join(&name)).unwrap(),
            fs::read(second.path().join(&name)).unwrap(),
            "{name} differs between runs"
        );
    }
}

#[test]
fn timestamp_naming_embeds_milliseconds() {
    let output = tempfile::tempdir().unwrap();
    let options = every(2)
        .with_naming(FrameNaming::Timestamp)
        .with_output_format(OutputFormat::Bmp);

    FrameExtractor::new(SyntheticDecoder::new(100, 25), "yard")
        .run(output.path(), &options)
        .unwrap();

    assert_eq!(
        file_names(output.path()),
        vec!["f_yard_0000000000_0000000001.bmp", "f_yard_0000002000_0000000002.bmp"]
    );
}

// ── Limits ─────────────────────────────────────────────────────────

#[test]
fn max_frames_stops_early() {
    let output = tempfile::tempdir().unwrap();
    let report = FrameExtractor::new(SyntheticDecoder::new(250, 25), "cam")
        .run(output.path(), &ExtractOptions::new().with_max_frames(4))
        .unwrap();

    assert_eq!(report.frames_written, 4);
    assert_eq!(file_names(output.path()).len(), 4);
}

#[test]
fn max_duration_bounds_stream_time() {
    let output = tempfile::tempdir().unwrap();
    let options = every(1).with_max_duration(Duration::from_secs(3));
    let report = FrameExtractor::new(SyntheticDecoder::new(250, 25), "cam")
        .run(output.path(), &options)
        .unwrap();

    assert_eq!(report.frames_written, 3);
}

#[test]
fn start_offset_seeks_and_skips_earlier_frames() {
    let output = tempfile::tempdir().unwrap();
    let decoder = SyntheticDecoder::new(250, 25);
    let seeks = decoder.seeks.clone();
    let options = every(2)
        .with_start(Duration::from_secs(4))
        .with_naming(FrameNaming::Timestamp);

    let report = FrameExtractor::new(decoder, "cam")
        .run(output.path(), &options)
        .unwrap();

    assert_eq!(*seeks.lock().unwrap(), vec![Duration::from_secs(4)]);
    assert_eq!(report.frames_written, 3);
    assert_eq!(
        file_names(output.path()),
        vec![
            "f_cam_0000004000_0000000001.jpg",
            "f_cam_0000006000_0000000002.jpg",
            "f_cam_0000008000_0000000003.jpg",
        ]
    );
}

// ── Output directory ───────────────────────────────────────────────

#[test]
fn output_path_that_is_a_file_is_a_write_failure() {
    let output = tempfile::tempdir().unwrap();
    let blocker = output.path().join("frames");
    fs::write(&blocker, b"not a directory").unwrap();

    let decoder = SyntheticDecoder::new(10, 25);
    let closed = decoder.closed.clone();
    let result = FrameExtractor::new(decoder, "cam").run(&blocker, &ExtractOptions::new());

    assert!(matches!(result, Err(ExtractError::WriteFailure { .. })));
    assert!(closed.load(Ordering::SeqCst), "decoder closed on error");
}

#[cfg(unix)]
#[test]
fn read_only_output_directory_is_a_write_failure() {
    use std::os::unix::fs::PermissionsExt;

    let output = tempfile::tempdir().unwrap();
    let frames = output.path().join("frames");
    fs::create_dir(&frames).unwrap();
    fs::set_permissions(&frames, fs::Permissions::from_mode(0o555)).unwrap();

    let decoder = SyntheticDecoder::new(10, 25);
    let closed = decoder.closed.clone();
    let result = FrameExtractor::new(decoder, "cam").run(&frames, &ExtractOptions::new());
    let listing = file_names(&frames);
    fs::set_permissions(&frames, fs::Permissions::from_mode(0o755)).unwrap();

    assert!(matches!(result, Err(ExtractError::WriteFailure { .. })));
    assert!(listing.is_empty());
    assert!(closed.load(Ordering::SeqCst), "decoder closed on error");
}

#[test]
fn existing_frames_are_kept_unless_overwriting() {
    let output = tempfile::tempdir().unwrap();
    FrameExtractor::new(SyntheticDecoder::new(50, 25), "cam")
        .run(output.path(), &every(1))
        .unwrap();

    let again = FrameExtractor::new(SyntheticDecoder::new(50, 25), "cam").run(output.path(), &every(1));
    assert!(matches!(again, Err(ExtractError::WriteFailure { .. })));

    let replaced = FrameExtractor::new(SyntheticDecoder::new(50, 25), "cam")
        .run(output.path(), &every(1).with_overwrite(true))
        .unwrap();
    assert_eq!(replaced.frames_written, 2);
    assert_eq!(file_names(output.path()).len(), 2);
}

#[test]
fn missing_source_leaves_output_untouched() {
    let output = tempfile::tempdir().unwrap();
    let target = output.path().join("frames");

    let result = FrameExtractor::extract("/no/such/feeder.mp4", &target, &ExtractOptions::new());

    assert!(matches!(result, Err(ExtractError::SourceUnavailable { .. })));
    assert!(!target.exists());
}

// ── Decode tolerance ───────────────────────────────────────────────

#[test]
fn strict_tolerance_aborts_but_keeps_written_frames() {
    let output = tempfile::tempdir().unwrap();
    let decoder = SyntheticDecoder::with_corruption(50, 25, &[10]);
    let closed = decoder.closed.clone();

    let result = FrameExtractor::new(decoder, "cam").run(output.path(), &ExtractOptions::new());

    assert!(matches!(result, Err(ExtractError::DecodeFailure(_))));
    assert_eq!(file_names(output.path()).len(), 10);
    assert!(closed.load(Ordering::SeqCst));
}

#[test]
fn skip_corrupt_continues_past_isolated_errors() {
    let output = tempfile::tempdir().unwrap();
    let options = ExtractOptions::new()
        .with_decode_tolerance(DecodeTolerance::SkipCorrupt { max_consecutive: 1 });

    let report = FrameExtractor::new(SyntheticDecoder::with_corruption(30, 25, &[3, 10, 20]), "cam")
        .run(output.path(), &options)
        .unwrap();

    assert_eq!(report.corrupt_segments_skipped, 3);
    assert_eq!(report.frames_decoded, 30);
    assert_eq!(report.frames_written, 30);
}

#[test]
fn skip_corrupt_gives_up_after_too_many_in_a_row() {
    let output = tempfile::tempdir().unwrap();
    let options = ExtractOptions::new()
        .with_decode_tolerance(DecodeTolerance::SkipCorrupt { max_consecutive: 2 });

    let allowed = FrameExtractor::new(SyntheticDecoder::with_corruption(20, 25, &[5, 6]), "a")
        .run(output.path(), &options);
    assert!(allowed.is_ok());

    let exceeded = FrameExtractor::new(SyntheticDecoder::with_corruption(20, 25, &[5, 6, 7]), "b")
        .run(output.path(), &options);
    assert!(matches!(exceeded, Err(ExtractError::DecodeFailure(_))));
    assert_eq!(
        file_names(output.path())
            .iter()
            .filter(|name| name.starts_with("f_b_"))
            .count(),
        5
    );
}

// ── Progress and cancellation ──────────────────────────────────────

struct CancelAfter {
    limit: u64,
    token: CancellationToken,
    seen: Mutex<Vec<u64>>,
}

impl ProgressCallback for CancelAfter {
    fn on_progress(&self, info: &ProgressInfo) {
        self.seen.lock().unwrap().push(info.current);
        if info.current >= self.limit {
            self.token.cancel();
        }
    }
}

#[test]
fn cancellation_stops_the_run_and_keeps_frames() {
    let output = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();
    let callback = Arc::new(CancelAfter {
        limit: 3,
        token: token.clone(),
        seen: Mutex::new(Vec::new()),
    });
    let options = ExtractOptions::new()
        .with_cancellation(token)
        .with_progress(callback.clone());

    let result = FrameExtractor::new(SyntheticDecoder::new(100, 25), "cam").run(output.path(), &options);

    assert!(matches!(result, Err(ExtractError::Cancelled)));
    assert_eq!(file_names(output.path()).len(), 3);
    assert_eq!(*callback.seen.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn progress_reports_written_frames() {
    let output = tempfile::tempdir().unwrap();
    let callback = Arc::new(CancelAfter {
        limit: u64::MAX,
        token: CancellationToken::new(),
        seen: Mutex::new(Vec::new()),
    });
    let options = every(2).with_batch_size(2).with_progress(callback.clone());

    FrameExtractor::new(SyntheticDecoder::new(250, 25), "cam")
        .run(output.path(), &options)
        .unwrap();

    assert_eq!(*callback.seen.lock().unwrap(), vec![2, 4, 5]);
}

// ── Fallback chain ─────────────────────────────────────────────────

/// Fails on the first decode unless the tonemap filter is configured.
fn open_hdr(attempts: &Mutex<Vec<DecodeOptions>>, decode: &DecodeOptions) -> SyntheticDecoder {
    attempts.lock().unwrap().push(decode.clone());
    if decode.filter.as_deref() == Some(TONEMAP_FILTER) {
        SyntheticDecoder::new(50, 25)
    } else {
        SyntheticDecoder::with_corruption(50, 25, &[0])
    }
}

#[test]
fn failed_accelerated_decode_falls_back_to_tonemapped_software() {
    let output = tempfile::tempdir().unwrap();
    let attempts = Mutex::new(Vec::new());
    let options = every(1).with_decoder_name("hevc_cuvid");

    let report = FrameExtractor::extract_with("cam", output.path(), &options, |decode| {
        Ok(open_hdr(&attempts, decode))
    })
    .unwrap();

    let attempts = attempts.into_inner().unwrap();
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[0].decoder_name.as_deref(), Some("hevc_cuvid"));
    assert_eq!(attempts[1].decoder_name, None);
    assert_eq!(attempts[2].filter.as_deref(), Some(TONEMAP_FILTER));
    assert_eq!(report.decode_path, DecodePath::SoftwareTonemap);
    assert_eq!(report.frames_written, 2);
}

#[test]
fn fallback_can_be_disabled() {
    let output = tempfile::tempdir().unwrap();
    let attempts = Mutex::new(Vec::new());
    let options = every(1)
        .with_decoder_name("hevc_cuvid")
        .with_fallback(false);

    let result = FrameExtractor::extract_with("cam", output.path(), &options, |decode| {
        Ok(open_hdr(&attempts, decode))
    });

    assert!(matches!(result, Err(ExtractError::DecodeFailure(_))));
    assert_eq!(attempts.into_inner().unwrap().len(), 1);
}

#[test]
fn no_retry_once_frames_were_written() {
    let output = tempfile::tempdir().unwrap();
    let mut opened = 0;
    let options = ExtractOptions::new().with_decoder_name("h264_cuvid");

    let result = FrameExtractor::extract_with("cam", output.path(), &options, |_| {
        opened += 1;
        Ok(SyntheticDecoder::with_corruption(20, 25, &[5]))
    });

    assert!(matches!(result, Err(ExtractError::DecodeFailure(_))));
    assert_eq!(opened, 1);
    assert_eq!(file_names(output.path()).len(), 5);
}

#[test]
fn user_filter_is_never_replaced_by_tonemap() {
    let output = tempfile::tempdir().unwrap();
    let attempts = Mutex::new(Vec::new());
    let options = every(1).with_filter("hflip");

    let result = FrameExtractor::extract_with("cam", output.path(), &options, |decode| {
        Ok(open_hdr(&attempts, decode))
    });

    assert!(result.is_err());
    assert!(
        attempts
            .into_inner()
            .unwrap()
            .iter()
            .all(|decode| decode.filter.as_deref() == Some("hflip"))
    );
}

#[test]
fn open_errors_are_not_retried() {
    let output = tempfile::tempdir().unwrap();
    let target: PathBuf = output.path().join("frames");
    let mut opened = 0;
    let options = ExtractOptions::new().with_decoder_name("h264_cuvid");

    let result = FrameExtractor::<SyntheticDecoder>::extract_with("cam", &target, &options, |_| {
        opened += 1;
        Err(ExtractError::SourceUnavailable {
            location: "rtsp://camera/stream".to_string(),
            reason: "connection refused".to_string(),
        })
    });

    assert!(matches!(result, Err(ExtractError::SourceUnavailable { .. })));
    assert_eq!(opened, 1);
    assert!(!target.exists());
}

#[test]
fn hardware_flag_is_reported() {
    let output = tempfile::tempdir().unwrap();
    let mut decoder = SyntheticDecoder::new(10, 25);
    decoder.accelerated = true;

    let report = FrameExtractor::new(decoder, "cam")
        .run(output.path(), &every(1))
        .unwrap();

    assert!(report.hardware_active);
}
