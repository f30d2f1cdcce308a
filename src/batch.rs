//! Extracting frames from every video in a directory.
//!
//! All frames land in one shared output directory; the per-video label in
//! each file name keeps them apart. A failing video is recorded in the
//! [`BatchReport`] and the batch carries on with the next one.
//!
//! With the `rayon` feature, videos are processed in parallel on a pool of
//! [`WorkerCount`] threads, each with its own decoder. Without it they run
//! one after another.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::{
    configuration::ExtractOptions,
    error::ExtractError,
    extractor::{ExtractionReport, FrameExtractor},
    naming::{sanitize_label, source_label},
    progress::{NoOpProgress, OperationType, ProgressTracker},
};

/// How many videos to process at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerCount {
    /// One worker per available CPU.
    #[default]
    Auto,
    /// A fixed number of workers (at least one).
    Fixed(usize),
}

impl WorkerCount {
    /// The concrete number of workers.
    pub fn resolve(self) -> usize {
        match self {
            WorkerCount::Auto => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            WorkerCount::Fixed(count) => count.max(1),
        }
    }
}

impl FromStr for WorkerCount {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("auto") {
            return Ok(WorkerCount::Auto);
        }
        match value.parse::<usize>() {
            Ok(0) | Err(_) => Err(format!("expected 'auto' or a positive number, got '{value}'")),
            Ok(count) => Ok(WorkerCount::Fixed(count)),
        }
    }
}

impl Display for WorkerCount {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            WorkerCount::Auto => f.write_str("auto"),
            WorkerCount::Fixed(count) => write!(f, "{count}"),
        }
    }
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Videos that were fully processed, in file-name order.
    pub succeeded: Vec<(PathBuf, ExtractionReport)>,
    /// Videos that failed, with the error message, in file-name order.
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    /// Frames written across all successful videos.
    pub fn frames_written(&self) -> u64 {
        self.succeeded
            .iter()
            .map(|(_, report)| report.frames_written)
            .sum()
    }

    /// Whether every video succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs [`FrameExtractor::extract`] over a directory of videos.
///
/// ```no_run
/// use birdcam::{BatchExtractor, ExtractOptions, WorkerCount};
///
/// let report = BatchExtractor::new()
///     .with_extension("mkv")
///     .with_workers(WorkerCount::Fixed(4))
///     .run("recordings", "frames", &ExtractOptions::new())?;
/// for (path, reason) in &report.failed {
///     eprintln!("{}: {reason}", path.display());
/// }
/// # Ok::<(), birdcam::ExtractError>(())
/// ```
#[derive(Debug, Clone)]
pub struct BatchExtractor {
    extension: String,
    workers: WorkerCount,
}

impl Default for BatchExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchExtractor {
    /// Process `.mp4` files with one worker per CPU.
    pub fn new() -> Self {
        Self {
            extension: "mp4".to_string(),
            workers: WorkerCount::Auto,
        }
    }

    /// Only process files with this extension (case-insensitive, leading
    /// dot optional).
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    /// Set the number of parallel workers.
    #[must_use]
    pub fn with_workers(mut self, workers: WorkerCount) -> Self {
        self.workers = workers;
        self
    }

    /// Matching files in `directory`, sorted by name.
    ///
    /// # Errors
    ///
    /// [`ExtractError::SourceUnavailable`] if the directory cannot be read.
    pub fn collect_sources(&self, directory: &Path) -> Result<Vec<PathBuf>, ExtractError> {
        let entries = fs::read_dir(directory).map_err(|error| ExtractError::SourceUnavailable {
            location: directory.display().to_string(),
            reason: error.to_string(),
        })?;

        let mut sources: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .is_some_and(|extension| extension.eq_ignore_ascii_case(&self.extension))
            })
            .collect();
        sources.sort();
        Ok(sources)
    }

    /// Extract frames from every matching video in `source_directory`.
    ///
    /// # Errors
    ///
    /// - [`ExtractError::SourceUnavailable`] if the directory cannot be read.
    /// - [`ExtractError::Cancelled`] if the cancellation token fired.
    ///
    /// Per-video failures are reported in [`BatchReport::failed`].
    pub fn run(
        &self,
        source_directory: impl AsRef<Path>,
        output_directory: impl AsRef<Path>,
        options: &ExtractOptions,
    ) -> Result<BatchReport, ExtractError> {
        let source_directory = source_directory.as_ref();
        let output_directory = output_directory.as_ref();
        let sources = self.collect_sources(source_directory)?;

        if sources.is_empty() {
            log::warn!(
                "No .{} files found in {}",
                self.extension,
                source_directory.display()
            );
            return Ok(BatchReport::default());
        }
        log::info!(
            "Processing {} videos from {} with {} workers",
            sources.len(),
            source_directory.display(),
            self.workers
        );

        let tracker = Mutex::new(ProgressTracker::new(
            options.progress.clone(),
            OperationType::BatchExtraction,
            Some(sources.len() as u64),
            1,
        ));
        let outcomes = self.process_all(&sources, output_directory, options, &tracker);
        if let Ok(mut tracker) = tracker.lock() {
            tracker.finish();
        }

        if options.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let mut report = BatchReport::default();
        for (source, outcome) in sources.into_iter().zip(outcomes) {
            match outcome {
                Ok(extraction) => report.succeeded.push((source, extraction)),
                Err(error) => {
                    log::warn!("{} failed: {error}", source.display());
                    report.failed.push((source, error.to_string()));
                }
            }
        }
        Ok(report)
    }

    #[cfg(feature = "rayon")]
    fn process_all(
        &self,
        sources: &[PathBuf],
        output_directory: &Path,
        options: &ExtractOptions,
        tracker: &Mutex<ProgressTracker>,
    ) -> Vec<Result<ExtractionReport, ExtractError>> {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

        let work = || {
            sources
                .par_iter()
                .map(|source| process_one(source, output_directory, options, tracker))
                .collect::<Vec<_>>()
        };

        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers.resolve())
            .build()
        {
            Ok(pool) => pool.install(work),
            Err(error) => {
                log::warn!("Could not build worker pool ({error}); using the global pool");
                work()
            }
        }
    }

    #[cfg(not(feature = "rayon"))]
    fn process_all(
        &self,
        sources: &[PathBuf],
        output_directory: &Path,
        options: &ExtractOptions,
        tracker: &Mutex<ProgressTracker>,
    ) -> Vec<Result<ExtractionReport, ExtractError>> {
        if self.workers.resolve() > 1 {
            log::debug!("Built without the rayon feature; processing videos sequentially");
        }
        sources
            .iter()
            .map(|source| process_one(source, output_directory, options, tracker))
            .collect()
    }
}

fn process_one(
    source: &Path,
    output_directory: &Path,
    options: &ExtractOptions,
    tracker: &Mutex<ProgressTracker>,
) -> Result<ExtractionReport, ExtractError> {
    if options.is_cancelled() {
        return Err(ExtractError::Cancelled);
    }

    // Frame-level progress from parallel runs would interleave; the batch
    // reports per video instead.
    let mut video_options = options.clone().with_progress(Arc::new(NoOpProgress));
    let label = source_label(&source.to_string_lossy());
    if let Some(prefix) = &options.prefix {
        video_options = video_options.with_prefix(sanitize_label(&format!("{prefix}_{label}")));
    }

    let outcome = FrameExtractor::extract(source, output_directory, &video_options);
    if let Ok(mut tracker) = tracker.lock() {
        tracker.advance(None, None);
    }
    outcome
}
