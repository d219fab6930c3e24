//! Parallel chunked download with in-order reassembly.
//!
//! The object is fetched as fixed-size byte ranges running concurrently
//! under a cap. Range fetches complete in arbitrary order; completed chunks
//! whose predecessors are still in flight are parked in a reorder buffer
//! keyed by chunk index and drained to the output file strictly in index
//! order, so the file on disk is always an exact byte-for-byte
//! reconstruction of the remote object.

use std::collections::BTreeMap;
use std::path::Path;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::chunk::{ChunkSpec, plan_chunks};
use crate::client::ObjectStore;
use crate::config::TransferConfig;
use crate::error::{CacheError, Result};

/// Download the object at `key` into `save_path`, creating parent
/// directories as needed. Returns the number of bytes written.
///
/// Fails with [`CacheError::ObjectNotFound`] when the metadata probe reports
/// the object absent. Any chunk failure aborts the whole job; remaining
/// in-flight fetches are dropped and the partially written file is left for
/// the caller to clean up. A range response shorter than the requested
/// range is a [`CacheError::Transfer`]; a silent skip would truncate the
/// reconstruction.
pub async fn download_object(
    store: &dyn ObjectStore,
    key: &str,
    save_path: &Path,
    config: &TransferConfig,
) -> Result<u64> {
    let total_len = store
        .head_object(key)
        .await?
        .ok_or_else(|| CacheError::ObjectNotFound(key.to_string()))?;

    if let Some(parent) = save_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await?;
    }
    let mut output = File::create(save_path).await?;

    let chunks = plan_chunks(total_len, config.download_chunk_size);
    debug!(
        key = %key,
        total_len,
        chunk_count = chunks.len(),
        "Starting chunked download"
    );

    let mut chunk_iter = chunks.into_iter();
    let mut in_flight = FuturesUnordered::new();
    // Completed chunks waiting for their predecessors to be written.
    let mut reorder_buffer: BTreeMap<usize, Bytes> = BTreeMap::new();
    let mut next_index_to_write: usize = 0;
    let mut bytes_written: u64 = 0;

    loop {
        // Admit fetches while the combined in-flight and parked count is
        // below the cap; parked chunks hold their bytes, so counting them
        // keeps the memory bound at cap x chunk size.
        while in_flight.len() + reorder_buffer.len() < config.download_concurrency {
            let Some(chunk) = chunk_iter.next() else {
                break;
            };
            in_flight.push(fetch_chunk(store, key, chunk));
        }

        let Some(completed) = in_flight.next().await else {
            // Nothing in flight and nothing left to admit.
            break;
        };
        let (index, data) = completed?;
        reorder_buffer.insert(index, data);

        // Drain every chunk that is now contiguous with the write cursor.
        while let Some(data) = reorder_buffer.remove(&next_index_to_write) {
            output.write_all(&data).await?;
            bytes_written += data.len() as u64;
            next_index_to_write += 1;
        }
    }

    output.flush().await?;
    debug!(key = %key, bytes_written, "Chunked download complete");
    Ok(bytes_written)
}

async fn fetch_chunk(
    store: &dyn ObjectStore,
    key: &str,
    chunk: ChunkSpec,
) -> Result<(usize, Bytes)> {
    let data = store.get_object_range(key, chunk.start, chunk.end).await?;
    if data.len() as u64 != chunk.byte_len() {
        return Err(CacheError::Transfer(format!(
            "range {}-{} of {} returned {} bytes, expected {}",
            chunk.start,
            chunk.end,
            key,
            data.len(),
            chunk.byte_len()
        )));
    }
    Ok((chunk.index, data))
}
