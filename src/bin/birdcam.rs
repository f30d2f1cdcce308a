use std::{path::PathBuf, sync::Arc, time::Duration};

use birdcam::{
    BatchExtractor, CancellationToken, DecodeTolerance, ExtractError, ExtractOptions,
    FfmpegLogLevel, FrameExtractor, FrameNaming, MediaProbe, OperationType, OutputFormat,
    PixelFormat, ProgressCallback, ProgressInfo, SamplingInterval, Settings, Shortlister,
    TONEMAP_FILTER, WorkerCount,
};
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

#[cfg(feature = "hardware")]
use birdcam::HardwareAccelerationMode;

const CLI_AFTER_HELP: &str = "Examples:\n  birdcam extract feeder.mp4 --out frames --every-seconds 2\n  birdcam extract rtsp://192.168.1.20:554/stream1 --out frames --every-seconds 5 --skip-corrupt --max-duration 1:00:00\n  birdcam batch recordings --out frames --workers auto --progress\n  birdcam shortlist frames shortlisted --skip 9\n  birdcam probe feeder.mp4 --json\n  birdcam completions zsh > _birdcam";

#[derive(Debug, Parser)]
#[command(
    name = "birdcam",
    version,
    about = "Sample still frames from camera recordings and live feeds",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Show a progress bar.
    #[arg(long, global = true)]
    progress: bool,

    /// Replace frames left by an earlier run.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Hardware decode mode (auto, software, cuda, vaapi, dxva2, d3d11va, videotoolbox, qsv).
    #[arg(long, global = true)]
    hardware: Option<String>,

    /// JSON settings file. Command-line flags take precedence.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum NamingArg {
    /// f_<label>_0000000001.jpg
    Sequence,
    /// f_<label>_<milliseconds>_0000000001.jpg
    Timestamp,
}

#[derive(Debug, Args, Clone, Default)]
struct ExtractArgs {
    /// Keep one frame every S seconds of stream time.
    #[arg(long, conflicts_with = "every_frames")]
    every_seconds: Option<f64>,

    /// Keep every Nth decoded frame (1 keeps all).
    #[arg(long)]
    every_frames: Option<u64>,

    /// Image format (jpg, png, bmp).
    #[arg(long)]
    format: Option<String>,

    /// JPEG quality (1-100).
    #[arg(long)]
    quality: Option<u8>,

    /// File naming scheme.
    #[arg(long, value_enum)]
    naming: Option<NamingArg>,

    /// Label used in file names instead of the source name.
    #[arg(long)]
    prefix: Option<String>,

    /// Start offset (seconds, MM:SS or HH:MM:SS).
    #[arg(long)]
    start: Option<String>,

    /// Stop after writing N frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Stop after this much stream time (seconds, MM:SS or HH:MM:SS).
    #[arg(long)]
    max_duration: Option<String>,

    /// Skip corrupt segments instead of aborting.
    #[arg(long)]
    skip_corrupt: bool,

    /// With --skip-corrupt, give up after this many errors in a row.
    #[arg(long, default_value_t = 50)]
    max_consecutive_errors: u32,

    /// FFmpeg decoder to try first (e.g. h264_cuvid).
    #[arg(long)]
    decoder: Option<String>,

    /// FFmpeg filter graph applied before conversion.
    #[arg(long, conflicts_with = "tonemap")]
    filter: Option<String>,

    /// Tonemap HDR footage to SDR.
    #[arg(long)]
    tonemap: bool,

    /// Do not retry in software when the configured decoder fails.
    #[arg(long)]
    no_fallback: bool,

    /// Output width in pixels.
    #[arg(long)]
    width: Option<u32>,

    /// Output height in pixels.
    #[arg(long)]
    height: Option<u32>,

    /// Write grayscale frames.
    #[arg(long)]
    gray: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract frames from one video file or stream.
    #[command(
        after_help = "Examples:\n  birdcam extract feeder.mp4 --out frames --every-seconds 2\n  birdcam extract feeder.mp4 --out frames --every-frames 25 --format png --naming timestamp"
    )]
    Extract {
        /// Video path or stream URL. Defaults to paths.video_source.
        source: Option<String>,
        /// Output directory. Defaults to paths.frame_output.
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        args: ExtractArgs,
    },

    /// Extract frames from every video in a directory.
    #[command(
        after_help = "Examples:\n  birdcam batch recordings --out frames\n  birdcam batch recordings --out frames --ext mkv --workers 4"
    )]
    Batch {
        /// Directory of videos. Defaults to paths.video_source.
        directory: Option<PathBuf>,
        /// Output directory. Defaults to paths.frame_output.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Video file extension.
        #[arg(long, default_value = "mp4")]
        ext: String,
        /// Parallel videos ("auto" or a number). Needs the rayon feature.
        #[arg(long)]
        workers: Option<String>,
        #[command(flatten)]
        args: ExtractArgs,
    },

    /// Print stream metadata.
    #[command(visible_alias = "info")]
    Probe {
        /// Video path or stream URL.
        source: String,
        /// Machine-readable output.
        #[arg(long)]
        json: bool,
    },

    /// Move every (skip+1)-th frame into another directory.
    Shortlist {
        /// Frame directory. Defaults to shortlister.source_directory.
        source: Option<PathBuf>,
        /// Destination. Defaults to shortlister.shortlisted_data.
        destination: Option<PathBuf>,
        /// Frames skipped between two kept frames.
        #[arg(long)]
        skip: Option<usize>,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(Duration::try_from_secs_f64(seconds.max(0.0))?);
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    Ok(Duration::try_from_secs_f64(total_seconds.max(0.0))?)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn load_settings(global: &GlobalOptions) -> Result<Settings, Box<dyn std::error::Error>> {
    match &global.config {
        Some(path) => Ok(Settings::load(path)?),
        None => Ok(Settings::default()),
    }
}

fn sampling_from(args: &ExtractArgs) -> Result<SamplingInterval, ExtractError> {
    match (args.every_seconds, args.every_frames) {
        (Some(seconds), _) => SamplingInterval::every_seconds(seconds),
        (None, Some(0)) => Err(ExtractError::InvalidInterval),
        (None, Some(frames)) => Ok(SamplingInterval::EveryNthFrame(frames)),
        (None, None) => Ok(SamplingInterval::default()),
    }
}

fn output_format_from(
    args: &ExtractArgs,
    settings: &Settings,
) -> Result<OutputFormat, Box<dyn std::error::Error>> {
    let quality = args
        .quality
        .or(settings.settings.image_quality)
        .unwrap_or(90);
    match args
        .format
        .as_deref()
        .or(settings.settings.image_format.as_deref())
    {
        Some(name) => Ok(OutputFormat::from_name(name, quality)
            .ok_or(format!("unsupported --format: {name}"))?),
        None => Ok(OutputFormat::Jpeg {
            quality: quality.clamp(1, 100),
        }),
    }
}

fn build_options(
    global: &GlobalOptions,
    args: &ExtractArgs,
    settings: &Settings,
    cancellation: &CancellationToken,
) -> Result<ExtractOptions, Box<dyn std::error::Error>> {
    let mut options = ExtractOptions::new()
        .with_sampling(sampling_from(args)?)
        .with_output_format(output_format_from(args, settings)?)
        .with_overwrite(global.overwrite)
        .with_fallback(!args.no_fallback)
        .with_cancellation(cancellation.clone())
        .with_resolution(args.width, args.height);

    if let Some(naming) = args.naming {
        options = options.with_naming(match naming {
            NamingArg::Sequence => FrameNaming::Sequence,
            NamingArg::Timestamp => FrameNaming::Timestamp,
        });
    }
    if let Some(prefix) = &args.prefix {
        options = options.with_prefix(birdcam::naming::sanitize_label(prefix));
    }
    if let Some(start) = &args.start {
        options = options.with_start(parse_timecode(start)?);
    }
    if let Some(limit) = args.max_frames {
        options = options.with_max_frames(limit);
    }
    if let Some(duration) = &args.max_duration {
        options = options.with_max_duration(parse_timecode(duration)?);
    }
    if args.skip_corrupt {
        options = options.with_decode_tolerance(DecodeTolerance::SkipCorrupt {
            max_consecutive: args.max_consecutive_errors,
        });
    }
    if let Some(decoder) = args
        .decoder
        .as_ref()
        .or(settings.settings.gpu_decoder.as_ref())
    {
        options = options.with_decoder_name(decoder.clone());
    }
    if args.tonemap {
        options = options.with_filter(TONEMAP_FILTER);
    } else if let Some(filter) = &args.filter {
        options = options.with_filter(filter.clone());
    }
    if args.gray {
        options = options.with_pixel_format(PixelFormat::Gray8);
    }

    #[cfg(feature = "hardware")]
    if let Some(hardware) = &global.hardware {
        let mode = hardware
            .parse::<HardwareAccelerationMode>()
            .map_err(|error| format!("unsupported --hardware mode: {error}"))?;
        options = options.with_hardware_acceleration(mode);
    }

    if global.progress {
        options = options.with_progress(Arc::new(TerminalProgress::new()));
    }

    Ok(options)
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(level) = &global.log_level {
        let parsed = level
            .parse::<FfmpegLogLevel>()
            .map_err(|error| format!("unsupported --log-level: {error}"))?;
        birdcam::set_ffmpeg_log_level(parsed);
    }

    #[cfg(not(feature = "hardware"))]
    if global.hardware.is_some() {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            "--hardware requires building with the `hardware` feature".yellow()
        );
    }

    Ok(())
}

fn install_interrupt_handler() -> Result<CancellationToken, Box<dyn std::error::Error>> {
    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!("{}", "interrupted, finishing the current frame".yellow());
        handler_token.cancel();
    })?;
    Ok(token)
}

fn required<T>(value: Option<T>, what: &str) -> Result<T, Box<dyn std::error::Error>> {
    value.ok_or_else(|| format!("{what} is required (on the command line or in --config)").into())
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Self {
        let bar = ProgressBar::no_length();
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("##-"));
        }
        Self { bar }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        let message = match (info.operation, info.current_timestamp) {
            (OperationType::FrameExtraction, Some(timestamp)) => {
                format!("t={:.1}s", timestamp.as_secs_f64())
            }
            (OperationType::BatchExtraction, _) => "videos".to_string(),
            _ => String::new(),
        };
        self.bar.set_message(message);
    }
}

impl Drop for TerminalProgress {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);
    apply_global_options(&cli.global)?;
    let settings = load_settings(&cli.global)?;

    match cli.command {
        Commands::Extract { source, out, args } => {
            let source = required(
                source.or_else(|| {
                    settings
                        .paths
                        .video_source
                        .as_ref()
                        .map(|path| path.to_string_lossy().into_owned())
                }),
                "a video source",
            )?;
            let out = required(out.or(settings.paths.frame_output.clone()), "--out")?;
            let cancellation = install_interrupt_handler()?;
            let options = build_options(&cli.global, &args, &settings, &cancellation)?;

            let report = FrameExtractor::extract(&source, &out, &options)?;
            if report.hardware_active {
                eprintln!("{}", "decoded on hardware".cyan());
            }
            println!(
                "{} {}",
                "success:".green().bold(),
                format!(
                    "Extracted {} of {} decoded frame(s) to {} ({})",
                    report.frames_written,
                    report.frames_decoded,
                    out.display(),
                    report.decode_path
                )
                .green()
            );
            if report.corrupt_segments_skipped > 0 {
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!("skipped {} corrupt segment(s)", report.corrupt_segments_skipped)
                        .yellow()
                );
            }
        }
        Commands::Batch {
            directory,
            out,
            ext,
            workers,
            args,
        } => {
            let directory = required(directory.or(settings.paths.video_source.clone()), "a directory")?;
            let out = required(out.or(settings.paths.frame_output.clone()), "--out")?;
            let workers = match workers {
                Some(value) => value.parse::<WorkerCount>()?,
                None => settings.workers()?.unwrap_or_default(),
            };
            let cancellation = install_interrupt_handler()?;
            let options = build_options(&cli.global, &args, &settings, &cancellation)?;

            let report = BatchExtractor::new()
                .with_extension(ext)
                .with_workers(workers)
                .run(&directory, &out, &options)?;

            for (path, reason) in &report.failed {
                eprintln!("{} {}: {reason}", "failed:".red().bold(), path.display());
            }
            println!(
                "{} {}",
                "success:".green().bold(),
                format!(
                    "{} video(s) processed, {} failed, {} frame(s) written to {}",
                    report.succeeded.len(),
                    report.failed.len(),
                    report.frames_written(),
                    out.display()
                )
                .green()
            );
            if !report.is_complete() {
                return Err(format!("{} video(s) failed", report.failed.len()).into());
            }
        }
        Commands::Probe { source, json } => {
            let report = MediaProbe::probe(&source)?;
            let metadata = &report.metadata;
            if json {
                let payload = json!({
                    "location": report.location,
                    "format": metadata.format,
                    "codec": metadata.codec,
                    "width": metadata.width,
                    "height": metadata.height,
                    "fps": metadata.frames_per_second,
                    "frame_count": metadata.frame_count,
                    "duration_seconds": metadata.duration.as_secs_f64(),
                    "live": metadata.is_live(),
                    "hardware_devices": report.hardware_devices,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Source: {}", report.location);
                println!("Format: {}", metadata.format);
                if metadata.is_live() {
                    println!("Duration: live");
                } else {
                    println!("Duration: {:?}", metadata.duration);
                }
                println!(
                    "Video: {}x{} @ {:.2} fps [{}], ~{} frames",
                    metadata.width,
                    metadata.height,
                    metadata.frames_per_second,
                    metadata.codec,
                    metadata.frame_count,
                );
                if report.hardware_devices.is_empty() {
                    println!("Hardware decoders: none");
                } else {
                    println!("Hardware decoders: {}", report.hardware_devices.join(", "));
                }
            }
        }
        Commands::Shortlist {
            source,
            destination,
            skip,
        } => {
            let source = required(
                source.or(settings.shortlister.source_directory.clone()),
                "a source directory",
            )?;
            let destination = required(
                destination.or(settings.shortlister.shortlisted_data.clone()),
                "a destination directory",
            )?;
            let skip = required(skip.or(settings.shortlister.frames_to_skip), "--skip")?;

            let mut shortlister = Shortlister::new(skip);
            if cli.global.progress {
                shortlister = shortlister.with_progress(Arc::new(TerminalProgress::new()));
            }
            let moved = shortlister.run(&source, &destination)?;
            println!(
                "{} {}",
                "success:".green().bold(),
                format!("Moved {moved} image(s) to {}", destination.display()).green()
            );
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "birdcam", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        if matches!(
            error.downcast_ref::<ExtractError>(),
            Some(ExtractError::Cancelled)
        ) {
            eprintln!(
                "{} {}",
                "cancelled:".yellow().bold(),
                "frames written so far were kept".yellow()
            );
        } else {
            eprintln!("{} {error}", "error:".red().bold());
        }
        std::process::exit(1);
    }
}
