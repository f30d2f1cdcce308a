//! Thinning a directory of extracted frames.
//!
//! Consecutive frames from a camera are near duplicates. [`Shortlister`]
//! walks a directory in file-name order, moves the first file, skips the
//! next `frames_to_skip`, moves the one after, and so on. With the
//! zero-padded names the extractor writes, name order is stream order.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{
    error::ExtractError,
    progress::{NoOpProgress, OperationType, ProgressCallback, ProgressTracker},
};

/// Moves every `(frames_to_skip + 1)`-th file into a shortlist directory.
///
/// ```no_run
/// use birdcam::Shortlister;
///
/// let moved = Shortlister::new(4).run("frames", "shortlisted")?;
/// println!("moved {moved} frames");
/// # Ok::<(), birdcam::ExtractError>(())
/// ```
#[derive(Clone)]
pub struct Shortlister {
    frames_to_skip: usize,
    progress: Arc<dyn ProgressCallback>,
}

impl Shortlister {
    /// Keep one file, then skip `frames_to_skip`. Zero moves everything.
    pub fn new(frames_to_skip: usize) -> Self {
        Self {
            frames_to_skip,
            progress: Arc::new(NoOpProgress),
        }
    }

    /// Report every moved file to `callback`.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Files that would be moved from `source_directory`, in order.
    ///
    /// # Errors
    ///
    /// [`ExtractError::SourceUnavailable`] if the directory cannot be read.
    pub fn select(&self, source_directory: &Path) -> Result<Vec<PathBuf>, ExtractError> {
        let entries =
            fs::read_dir(source_directory).map_err(|error| ExtractError::SourceUnavailable {
                location: source_directory.display().to_string(),
                reason: error.to_string(),
            })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();

        Ok(files
            .into_iter()
            .step_by(self.frames_to_skip.saturating_add(1))
            .collect())
    }

    /// Move the selected files into `destination_directory`, creating it
    /// when missing. Returns the number of files moved.
    ///
    /// # Errors
    ///
    /// - [`ExtractError::SourceUnavailable`] if the source cannot be read.
    /// - [`ExtractError::WriteFailure`] if the destination cannot be created.
    /// - [`ExtractError::Io`] if a move fails. Files moved before the failure
    ///   stay moved.
    pub fn run(
        &self,
        source_directory: impl AsRef<Path>,
        destination_directory: impl AsRef<Path>,
    ) -> Result<usize, ExtractError> {
        let source_directory = source_directory.as_ref();
        let destination_directory = destination_directory.as_ref();

        let selected = self.select(source_directory)?;
        fs::create_dir_all(destination_directory)
            .map_err(|error| ExtractError::write_failure(destination_directory, error))?;

        let mut tracker = ProgressTracker::new(
            self.progress.clone(),
            OperationType::Shortlisting,
            Some(selected.len() as u64),
            1,
        );
        for source in &selected {
            let Some(name) = source.file_name() else {
                continue;
            };
            move_file(source, &destination_directory.join(name))?;
            tracker.advance(None, None);
        }
        tracker.finish();

        log::info!(
            "Moved {} images to {}",
            selected.len(),
            destination_directory.display()
        );
        Ok(selected.len())
    }
}

/// Rename, or copy and delete when the destination is on another
/// filesystem.
fn move_file(source: &Path, destination: &Path) -> Result<(), ExtractError> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == ErrorKind::NotFound => Err(error.into()),
        Err(error) => {
            log::debug!(
                "rename {} failed ({error}); copying instead",
                source.display()
            );
            fs::copy(source, destination)?;
            fs::remove_file(source)?;
            Ok(())
        }
    }
}
