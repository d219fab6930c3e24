//! Object-storage capability consumed by the transfer engine.
//!
//! The engine depends only on this trait; the shipped implementation is
//! [`crate::s3::S3Store`]. Bucket and key prefix are fixed when the client
//! is constructed: callers pass bare remote filenames and the client maps
//! them onto full object keys itself.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// One finished multipart part, identified for the completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number assigned at upload time.
    pub part_number: u32,
    /// Integrity tag returned by the store for this part.
    pub etag: String,
}

/// Low-level object-store operations.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Probe an object's metadata, returning its size in bytes.
    ///
    /// Returns `Ok(None)` when the store definitively reports the object as
    /// absent. Unreadable objects (access denied) and transport failures are
    /// errors, not absence.
    async fn head_object(&self, key: &str) -> Result<Option<u64>>;

    /// Fetch exactly the inclusive byte range `start..=end` of an object.
    async fn get_object_range(&self, key: &str, start: u64, end: u64) -> Result<Bytes>;

    /// Upload a complete object in a single request.
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()>;

    /// Open a multipart upload session, returning its upload id.
    async fn create_multipart(&self, key: &str) -> Result<String>;

    /// Upload one part within a session, returning the part's etag.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String>;

    /// Finalize a session from its parts, which must be sorted by ascending
    /// part number.
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()>;

    /// Discard a session and any parts uploaded under it.
    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<()>;
}
