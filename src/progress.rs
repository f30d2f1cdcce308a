//! Progress reporting and cancellation.
//!
//! [`ProgressCallback`] observes a run, [`CancellationToken`] stops it.
//! Both are attached through [`ExtractOptions`](crate::ExtractOptions).
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use birdcam::{ExtractOptions, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{:?}: {} frames written", info.operation, info.current);
//!     }
//! }
//!
//! let options = ExtractOptions::new()
//!     .with_progress(Arc::new(PrintProgress))
//!     .with_batch_size(25);
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// The kind of work being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Writing sampled frames from a single source.
    FrameExtraction,
    /// Processing every video in a directory.
    BatchExtraction,
    /// Moving a subset of frames into a shortlist directory.
    Shortlisting,
}

/// A snapshot of progress, delivered to [`ProgressCallback::on_progress`].
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// Items completed so far (frames written, files processed).
    pub current: u64,
    /// Total items expected, when known. Live streams have no total.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time since the operation started.
    pub elapsed: Duration,
    /// Decoded frame index of the item just completed.
    pub current_frame: Option<u64>,
    /// Stream timestamp of the item just completed.
    pub current_timestamp: Option<Duration>,
}

/// Receives progress updates.
///
/// Callbacks are infallible and may be called from batch worker threads,
/// hence `Send + Sync`. To stop a run use a [`CancellationToken`].
pub trait ProgressCallback: Send + Sync {
    /// Called every `batch_size` completed items, and once at the end.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Default callback that ignores everything.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation flag shared between clones.
///
/// ```
/// use birdcam::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts completed items and fires the callback every `batch_size`.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    current: u64,
    batch_size: u64,
    start_time: Instant,
    since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            current: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            since_last_report: 0,
        }
    }

    pub(crate) fn advance(&mut self, frame_index: Option<u64>, timestamp: Option<Duration>) {
        self.current += 1;
        self.since_last_report += 1;

        if self.since_last_report >= self.batch_size {
            self.report(frame_index, timestamp);
            self.since_last_report = 0;
        }
    }

    /// Emit a final report unless the last advance already did.
    pub(crate) fn finish(&mut self) {
        if self.since_last_report > 0 || self.current == 0 {
            self.report(None, None);
        }
    }

    fn report(&self, frame_index: Option<u64>, timestamp: Option<Duration>) {
        let percentage = self
            .total
            .filter(|&total| total > 0)
            .map(|total| (self.current as f32 / total as f32 * 100.0).min(100.0));

        self.callback.on_progress(&ProgressInfo {
            operation: self.operation,
            current: self.current,
            total: self.total,
            percentage,
            elapsed: self.start_time.elapsed(),
            current_frame: frame_index,
            current_timestamp: timestamp,
        });
    }
}
