//! Cache protocol facade: the retrieve/store entry points consumed by the
//! build runner.
//!
//! Both operations answer with a plain hit/success boolean. Everything that
//! can go wrong below this layer has already been contained by
//! [`SafeCache`], so a broken or unconfigured remote cache looks like a
//! miss here and the caller's build carries on.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::warn;

use crate::config::CacheOptions;
use crate::safe::SafeCache;

const COMMIT_FILE_EXTENSION: &str = ".commit";
const COMMIT_FILE_CONTENT: &str = "true";

/// Remote object filename for a cache key. Pure; distinct hashes map to
/// distinct filenames.
pub fn filename_from_hash(hash: &str) -> String {
    format!("{hash}.tar.gz")
}

pub struct RemoteCache {
    implementation: Option<SafeCache>,
}

impl RemoteCache {
    /// Wrap an already-constructed implementation; `None` behaves as "no
    /// remote cache configured".
    pub fn new(implementation: Option<SafeCache>) -> Self {
        Self { implementation }
    }

    /// Resolve options and set up the S3-backed cache. Setup failures have
    /// been logged and leave this facade answering every call with a miss.
    pub fn from_options(options: &CacheOptions) -> Self {
        Self::new(SafeCache::setup(options))
    }

    /// Fetch the artifact for `hash` into `<cache_directory>/<hash>/` and
    /// mark it committed. Returns `true` only once the artifact is fully
    /// extracted and the commit marker is on disk.
    ///
    /// Write-only caches miss immediately, before any remote call.
    pub async fn retrieve(&self, hash: &str, cache_directory: &Path) -> bool {
        let Some(implementation) = &self.implementation else {
            return false;
        };
        if implementation.is_write_only() {
            return false;
        }

        let filename = filename_from_hash(hash);
        if implementation.file_exists(&filename).await != Some(true) {
            return false;
        }

        let destination = cache_directory.join(hash);
        let Some(path) = implementation.retrieve_file(&filename, &destination).await else {
            return false;
        };

        write_commit_marker(&path).await
    }

    /// Archive `<cache_directory>/<hash>/` and upload it under the hash's
    /// remote filename. The archive file itself is left in
    /// `cache_directory`, alongside the folder it was built from.
    pub async fn store(&self, hash: &str, cache_directory: &Path) -> bool {
        let Some(implementation) = &self.implementation else {
            return false;
        };

        let filename = filename_from_hash(hash);
        let archive_path = cache_directory.join(&filename);
        implementation.store_file(&archive_path, hash).await.is_some()
    }

    /// Probe whether the artifact for `hash` is present remotely.
    pub async fn exists(&self, hash: &str) -> bool {
        let Some(implementation) = &self.implementation else {
            return false;
        };
        implementation.file_exists(&filename_from_hash(hash)).await == Some(true)
    }

    pub fn name(&self) -> Option<&str> {
        self.implementation.as_ref().map(SafeCache::name)
    }
}

/// Write the sentinel that marks `destination` as fully retrieved. A marker
/// that cannot be written leaves the retrieval reported as a miss; without
/// the marker, consumers must treat the artifact as not yet retrieved.
async fn write_commit_marker(destination: &Path) -> bool {
    let mut marker = destination.as_os_str().to_os_string();
    marker.push(COMMIT_FILE_EXTENSION);
    let marker = PathBuf::from(marker);

    match fs::write(&marker, COMMIT_FILE_CONTENT).await {
        Ok(()) => true,
        Err(e) => {
            warn!(marker = %marker.display(), error = %e, "Failed to write commit marker");
            false
        }
    }
}
