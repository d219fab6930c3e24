//! Chunk planning for parallel transfers.
//!
//! A transfer job splits an object into fixed-size byte ranges that are
//! fetched or uploaded concurrently. Planning is pure arithmetic over the
//! object length; the same plan drives download write ordering and multipart
//! part numbering.

/// Default chunk size for downloads (10 MiB).
pub const DOWNLOAD_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Default chunk size for uploads (7 MiB).
///
/// Must stay at or above [`MIN_PART_SIZE`]; S3-compatible stores reject
/// multipart parts below that limit (except the final part).
pub const UPLOAD_CHUNK_SIZE: u64 = 7 * 1024 * 1024;

/// Minimum multipart part size accepted by S3-compatible stores (5 MiB).
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

const _: () = assert!(UPLOAD_CHUNK_SIZE >= MIN_PART_SIZE);

/// Maximum concurrent range fetches per download job.
pub const DOWNLOAD_CONCURRENCY: usize = 100;

/// Maximum concurrent part uploads per store job.
pub const UPLOAD_CONCURRENCY: usize = 30;

/// One contiguous byte range of an object, transferred as a unit.
///
/// `end` is inclusive, matching the HTTP `Range: bytes=start-end` form.
/// `index` orders chunks for reassembly; multipart part numbers are
/// `index + 1` since S3 part numbering starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl ChunkSpec {
    /// Number of bytes covered by this chunk.
    pub fn byte_len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Multipart part number for this chunk (1-based).
    pub fn part_number(&self) -> u32 {
        self.index as u32 + 1
    }
}

/// Split `total_len` bytes into `ceil(total_len / chunk_size)` contiguous,
/// non-overlapping chunks covering `[0, total_len)`.
///
/// A zero-length object yields no chunks; callers handle that case without
/// issuing any range requests.
pub fn plan_chunks(total_len: u64, chunk_size: u64) -> Vec<ChunkSpec> {
    debug_assert!(chunk_size > 0);
    if total_len == 0 {
        return Vec::new();
    }

    let count = total_len.div_ceil(chunk_size);
    (0..count)
        .map(|i| {
            let start = i * chunk_size;
            let end = ((i + 1) * chunk_size - 1).min(total_len - 1);
            ChunkSpec {
                index: i as usize,
                start,
                end,
            }
        })
        .collect()
}
