//! Archive and extract collaborators backed by external OS processes.
//!
//! Artifact folders travel as tar archives produced and consumed by the
//! system `tar` binary, with `pigz` as the parallel compressor on the
//! archive side. Extraction lets tar detect the compression itself. The
//! trait seam exists so the cache layers can be exercised without spawning
//! processes.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

use crate::error::{CacheError, Result};

/// Folder archiving and extraction capability.
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Archive `folder` into `destination_file`.
    ///
    /// `folder` is a path relative to `destination_file`'s parent
    /// directory, which keeps the archive's internal paths rooted at the
    /// folder name rather than at an absolute path.
    async fn archive(&self, folder: &str, destination_file: &Path) -> Result<()>;

    /// Extract `archive_file` into `destination`, creating it first. The
    /// archive's single top-level directory is stripped, so the folder's
    /// contents land directly in `destination`.
    async fn extract(&self, archive_file: &Path, destination: &Path) -> Result<()>;
}

/// [`Archiver`] over the system `tar` binary.
#[derive(Debug, Clone)]
pub struct TarArchiver {
    /// External compressor for archiving (`tar --use-compress-program`).
    /// `None` produces an uncompressed archive; extraction is unaffected
    /// since tar detects compression when reading.
    compress_program: Option<String>,
}

impl Default for TarArchiver {
    fn default() -> Self {
        Self {
            compress_program: Some("pigz".to_string()),
        }
    }
}

impl TarArchiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Archive without an external compressor.
    pub fn uncompressed() -> Self {
        Self {
            compress_program: None,
        }
    }
}

#[async_trait]
impl Archiver for TarArchiver {
    async fn archive(&self, folder: &str, destination_file: &Path) -> Result<()> {
        let work_dir = destination_file.parent().ok_or_else(|| {
            CacheError::Archive(format!(
                "archive destination has no parent directory: {}",
                destination_file.display()
            ))
        })?;
        let archive_name = destination_file.file_name().ok_or_else(|| {
            CacheError::Archive(format!(
                "archive destination has no file name: {}",
                destination_file.display()
            ))
        })?;

        let mut command = Command::new("tar");
        if let Some(program) = &self.compress_program {
            command.arg(format!("--use-compress-program={program}"));
        }
        command
            .arg("-cf")
            .arg(archive_name)
            .arg(folder)
            .current_dir(work_dir);

        debug!(folder = %folder, destination = %destination_file.display(), "Archiving folder");
        run_tar(command).await
    }

    async fn extract(&self, archive_file: &Path, destination: &Path) -> Result<()> {
        fs::create_dir_all(destination).await?;

        let mut command = Command::new("tar");
        command
            .arg("xf")
            .arg(archive_file)
            .arg("--strip")
            .arg("1")
            .current_dir(destination);

        debug!(archive = %archive_file.display(), destination = %destination.display(), "Extracting archive");
        run_tar(command).await
    }
}

async fn run_tar(mut command: Command) -> Result<()> {
    let status = command.status().await?;
    if !status.success() {
        return Err(CacheError::Archive(format!("tar failed: {status}")));
    }
    Ok(())
}
