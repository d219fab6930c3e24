//! Cache backend: the three-operation contract over one object store.
//!
//! Composes the chunked transfer engine with the archive collaborator into
//! `exists` / `retrieve_file` / `store_file`. Operations deal in remote
//! filenames; the object store maps those onto full keys. Mode enforcement
//! happens here for stores (read-only refuses loudly); write-only is a
//! retrieval concern and is short-circuited above this layer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::archive::Archiver;
use crate::client::ObjectStore;
use crate::config::{AccessMode, TransferConfig};
use crate::download::download_object;
use crate::error::{CacheError, Result};
use crate::timing::PhaseTimings;
use crate::upload::upload_object;

pub struct CacheBackend {
    store: Arc<dyn ObjectStore>,
    archiver: Arc<dyn Archiver>,
    transfer: TransferConfig,
    mode: AccessMode,
}

impl CacheBackend {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        archiver: Arc<dyn Archiver>,
        transfer: TransferConfig,
        mode: AccessMode,
    ) -> Self {
        Self {
            store,
            archiver,
            transfer,
            mode,
        }
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Probe the remote object, normalizing "not found" and "access denied"
    /// to `false`. Other failures propagate.
    pub async fn exists(&self, filename: &str) -> Result<bool> {
        match self.store.head_object(filename).await {
            Ok(length) => Ok(length.is_some()),
            Err(e) if e.is_absence() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Download the remote archive `filename` and extract it into
    /// `destination`. Returns the destination path and the recorded
    /// `download` / `extract` phase timings.
    pub async fn retrieve_file(
        &self,
        filename: &str,
        destination: &Path,
    ) -> Result<(PathBuf, PhaseTimings)> {
        // Staging directory is removed on drop, failed downloads included.
        let staging = tempfile::tempdir()?;
        let archive_path = staging.path().join(filename);

        let mut timings = PhaseTimings::new();
        timings
            .measure(
                "download",
                download_object(self.store.as_ref(), filename, &archive_path, &self.transfer),
            )
            .await?;
        timings
            .measure(
                "extract",
                self.archiver.extract(&archive_path, destination),
            )
            .await?;

        debug!(filename = %filename, destination = %destination.display(), "Retrieved remote archive");
        Ok((destination.to_path_buf(), timings))
    }

    /// Archive `folder` into `archive_path`, then upload the archive under
    /// its file name. Returns the archive path and the recorded `compress`
    /// / `upload` phase timings.
    ///
    /// `folder` is resolved by the archiver relative to `archive_path`'s
    /// parent directory.
    pub async fn store_file(
        &self,
        archive_path: &Path,
        folder: &str,
    ) -> Result<(PathBuf, PhaseTimings)> {
        if !self.mode.allows_store() {
            return Err(CacheError::ReadOnly);
        }
        let filename = archive_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                CacheError::Archive(format!(
                    "archive path has no file name: {}",
                    archive_path.display()
                ))
            })?;

        let mut timings = PhaseTimings::new();
        timings
            .measure("compress", self.archiver.archive(folder, archive_path))
            .await?;
        timings
            .measure(
                "upload",
                upload_object(self.store.as_ref(), filename, archive_path, &self.transfer),
            )
            .await?;

        debug!(filename = %filename, folder = %folder, "Stored archive remotely");
        Ok((archive_path.to_path_buf(), timings))
    }
}
