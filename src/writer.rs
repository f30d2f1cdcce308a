//! Persisting sampled frames.
//!
//! [`FrameWriter`] owns the output directory for one run. It checks that
//! the directory is usable before the first frame is decoded, encodes each
//! frame in the configured format, and keeps the list of files it wrote.
//! Existing files are never replaced unless overwriting is enabled.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, codecs::jpeg::JpegEncoder};

use crate::{
    configuration::OutputFormat, decoder::FramePosition, error::ExtractError, naming::FrameNaming,
};

pub(crate) struct FrameWriter {
    directory: PathBuf,
    label: String,
    naming: FrameNaming,
    format: OutputFormat,
    overwrite: bool,
    written: Vec<PathBuf>,
}

impl FrameWriter {
    /// Create the output directory if needed and make sure it can be
    /// written to.
    pub(crate) fn prepare(
        directory: &Path,
        label: String,
        naming: FrameNaming,
        format: OutputFormat,
        overwrite: bool,
    ) -> Result<Self, ExtractError> {
        if directory.exists() && !directory.is_dir() {
            return Err(ExtractError::write_failure(directory, "not a directory"));
        }
        fs::create_dir_all(directory)
            .map_err(|error| ExtractError::write_failure(directory, error))?;

        let permissions = fs::metadata(directory)
            .map_err(|error| ExtractError::write_failure(directory, error))?
            .permissions();
        if permissions.readonly() {
            return Err(ExtractError::write_failure(directory, "directory is read-only"));
        }

        log::debug!("Writing frames to {} as f_{label}_*", directory.display());
        Ok(Self {
            directory: directory.to_path_buf(),
            label,
            naming,
            format,
            overwrite,
            written: Vec::new(),
        })
    }

    /// Encode `image` as the next frame of the run.
    pub(crate) fn write(
        &mut self,
        image: &DynamicImage,
        position: &FramePosition,
    ) -> Result<(), ExtractError> {
        let sequence = self.written.len() as u64 + 1;
        let name = self.naming.file_name(&self.label, sequence, position, self.format);
        let path = self.directory.join(name);

        let file = self.create(&path)?;
        if let Err(error) = self.encode(file, image) {
            let _ = fs::remove_file(&path);
            return Err(ExtractError::write_failure(&path, error));
        }

        log::trace!("Wrote {} (t={:?})", path.display(), position.timestamp);
        self.written.push(path);
        Ok(())
    }

    pub(crate) fn written_count(&self) -> u64 {
        self.written.len() as u64
    }

    pub(crate) fn into_written(self) -> Vec<PathBuf> {
        self.written
    }

    fn create(&self, path: &Path) -> Result<File, ExtractError> {
        let mut options = OpenOptions::new();
        options.write(true);
        if self.overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        options.open(path).map_err(|error| {
            if error.kind() == std::io::ErrorKind::AlreadyExists {
                ExtractError::write_failure(path, "file exists from an earlier run (use overwrite)")
            } else {
                ExtractError::write_failure(path, error)
            }
        })
    }

    fn encode(&self, file: File, image: &DynamicImage) -> Result<(), ExtractError> {
        let mut writer = BufWriter::new(file);
        match self.format {
            OutputFormat::Jpeg { quality } => {
                let encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
                image.write_with_encoder(encoder)?;
            }
            OutputFormat::Png => image.write_to(&mut writer, ImageFormat::Png)?,
            OutputFormat::Bmp => image.write_to(&mut writer, ImageFormat::Bmp)?,
        }
        writer.flush()?;
        Ok(())
    }
}
