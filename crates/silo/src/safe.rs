//! Failure containment around the cache backend.
//!
//! [`SafeCache`] is the single boundary where cache-infrastructure errors
//! stop: every backend operation is wrapped so that a failure is logged and
//! converted into an absent result instead of propagating. A backend that
//! cannot even be constructed (bad options, missing credentials) degrades
//! the same way: [`SafeCache::setup`] returns `None` and the caller
//! proceeds as if no remote cache were configured.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::archive::TarArchiver;
use crate::backend::CacheBackend;
use crate::config::{CacheConfig, CacheOptions};
use crate::error::{CacheError, Result};
use crate::s3::S3Store;

pub struct SafeCache {
    backend: CacheBackend,
    name: String,
    verbose: bool,
    silent: bool,
}

impl SafeCache {
    pub fn new(backend: CacheBackend, name: String, verbose: bool, silent: bool) -> Self {
        Self {
            backend,
            name,
            verbose,
            silent,
        }
    }

    /// Resolve options and wire up the S3-backed cache. Any failure here is
    /// logged and yields `None`: no remote cache, the build continues on
    /// local caching alone.
    pub fn setup(options: &CacheOptions) -> Option<Self> {
        let verbose = options.verbose.unwrap_or(false);
        match Self::try_setup(options) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(error = %e, "Failed to setup remote cache. Check your cache options.");
                if verbose {
                    debug!(error = ?e, "Setup failure detail");
                }
                None
            }
        }
    }

    fn try_setup(options: &CacheOptions) -> Result<Self> {
        let config = options.resolve()?;
        Self::from_config(&config)
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let store = S3Store::new(config)?;
        let backend = CacheBackend::new(
            Arc::new(store),
            Arc::new(TarArchiver::default()),
            config.transfer.clone(),
            config.mode,
        );
        Ok(Self::new(
            backend,
            config.name.clone(),
            config.verbose,
            config.silent,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_write_only(&self) -> bool {
        !self.backend.mode().allows_retrieve()
    }

    /// Existence probe. `None` means the probe itself failed; `Some(false)`
    /// means the store definitively reported the object absent.
    pub async fn file_exists(&self, filename: &str) -> Option<bool> {
        match self.backend.exists(filename).await {
            Ok(present) => Some(present),
            Err(e) => {
                warn!(
                    name = %self.name,
                    file = %filename,
                    error = %e,
                    "Failed to check if cache file exists"
                );
                self.failure_detail(&e);
                None
            }
        }
    }

    pub async fn retrieve_file(&self, filename: &str, destination: &Path) -> Option<PathBuf> {
        match self.backend.retrieve_file(filename, destination).await {
            Ok((path, timings)) => {
                if !self.silent {
                    info!(
                        name = %self.name,
                        file = %filename,
                        timings = %timings,
                        "Remote cache hit"
                    );
                }
                Some(path)
            }
            Err(e) => {
                warn!(
                    name = %self.name,
                    file = %filename,
                    error = %e,
                    "Failed to retrieve cache"
                );
                self.failure_detail(&e);
                None
            }
        }
    }

    pub async fn store_file(&self, archive_path: &Path, folder: &str) -> Option<PathBuf> {
        let display_name = archive_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| archive_path.display().to_string());

        match self.backend.store_file(archive_path, folder).await {
            Ok((path, timings)) => {
                if !self.silent {
                    info!(
                        name = %self.name,
                        file = %display_name,
                        timings = %timings,
                        "Stored to remote cache"
                    );
                }
                Some(path)
            }
            Err(e) => {
                warn!(
                    name = %self.name,
                    file = %display_name,
                    error = %e,
                    "Failed to store cache"
                );
                self.failure_detail(&e);
                None
            }
        }
    }

    fn failure_detail(&self, e: &CacheError) {
        if self.verbose {
            debug!(error = ?e, "Failure detail");
        }
    }
}
