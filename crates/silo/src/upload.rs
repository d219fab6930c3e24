//! Parallel multipart upload with single-request bypass.
//!
//! Files that fit in one chunk are uploaded with a plain put, skipping the
//! multipart session and its per-operation overhead.
//! Larger files run one multipart session: parts are read from the file by
//! byte range and uploaded concurrently under a cap, then the session is
//! completed with the part list sorted by part number. If anything fails
//! after the session was created, the session is aborted exactly once
//! before the original error propagates, so no orphaned partial upload is
//! left accruing storage on the remote side.

use std::io::SeekFrom;
use std::path::Path;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

use crate::chunk::{ChunkSpec, plan_chunks};
use crate::client::{CompletedPart, ObjectStore};
use crate::config::TransferConfig;
use crate::error::Result;

/// Upload the file at `file_path` to the object `key`.
pub async fn upload_object(
    store: &dyn ObjectStore,
    key: &str,
    file_path: &Path,
    config: &TransferConfig,
) -> Result<()> {
    let file_len = fs::metadata(file_path).await?.len();
    let chunks = plan_chunks(file_len, config.upload_chunk_size);

    if chunks.len() <= 1 {
        debug!(key = %key, file_len, "Uploading with single put");
        let data = Bytes::from(fs::read(file_path).await?);
        return store.put_object(key, data).await;
    }

    debug!(
        key = %key,
        file_len,
        part_count = chunks.len(),
        "Starting multipart upload"
    );
    let upload_id = store.create_multipart(key).await?;

    match run_multipart(store, key, &upload_id, file_path, chunks, config).await {
        Ok(()) => {
            debug!(key = %key, upload_id = %upload_id, "Multipart upload complete");
            Ok(())
        }
        Err(err) => {
            // Abort so the remote store drops the partial parts; the
            // original failure is the one worth reporting.
            if let Err(abort_err) = store.abort_multipart(key, &upload_id).await {
                warn!(
                    key = %key,
                    upload_id = %upload_id,
                    error = %abort_err,
                    "Failed to abort multipart upload"
                );
            }
            Err(err)
        }
    }
}

async fn run_multipart(
    store: &dyn ObjectStore,
    key: &str,
    upload_id: &str,
    file_path: &Path,
    chunks: Vec<ChunkSpec>,
    config: &TransferConfig,
) -> Result<()> {
    let mut parts = Vec::with_capacity(chunks.len());
    let mut chunk_iter = chunks.into_iter();
    let mut in_flight = FuturesUnordered::new();

    loop {
        while in_flight.len() < config.upload_concurrency {
            let Some(chunk) = chunk_iter.next() else {
                break;
            };
            in_flight.push(upload_one_part(store, key, upload_id, file_path, chunk));
        }

        let Some(completed) = in_flight.next().await else {
            break;
        };
        parts.push(completed?);
    }

    // Completions arrive in network order; the completion call requires
    // ascending part numbers.
    parts.sort_by_key(|part: &CompletedPart| part.part_number);
    store.complete_multipart(key, upload_id, &parts).await
}

async fn upload_one_part(
    store: &dyn ObjectStore,
    key: &str,
    upload_id: &str,
    file_path: &Path,
    chunk: ChunkSpec,
) -> Result<CompletedPart> {
    let data = read_file_range(file_path, chunk.start, chunk.byte_len()).await?;
    let etag = store
        .upload_part(key, upload_id, chunk.part_number(), data)
        .await?;
    Ok(CompletedPart {
        part_number: chunk.part_number(),
        etag,
    })
}

async fn read_file_range(path: &Path, start: u64, len: u64) -> Result<Bytes> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(start)).await?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf).await?;
    Ok(buf.into())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::error::CacheError;
    use crate::init_test_tracing;
    use crate::test_utils::{MemoryStore, patterned_bytes};

    fn small_transfer_config() -> TransferConfig {
        TransferConfig {
            upload_chunk_size: 4,
            upload_concurrency: 2,
            ..TransferConfig::default()
        }
    }

    async fn write_fixture(dir: &tempfile::TempDir, name: &str, len: usize) -> PathBuf {
        let path = dir.path().join(name);
        tokio::fs::write(&path, patterned_bytes(len)).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_small_file_uses_single_put() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "small", 3).await;

        upload_object(&store, "small", &path, &small_transfer_config())
            .await
            .unwrap();

        assert_eq!(store.put_calls(), vec!["small".to_string()]);
        assert!(store.created_sessions().is_empty());
        assert_eq!(store.object("small").unwrap(), patterned_bytes(3));
    }

    #[tokio::test]
    async fn test_exact_chunk_size_file_uses_single_put() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "exact", 4).await;

        upload_object(&store, "exact", &path, &small_transfer_config())
            .await
            .unwrap();
        assert!(store.created_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_empty_file_uses_single_put() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "empty", 0).await;

        upload_object(&store, "empty", &path, &small_transfer_config())
            .await
            .unwrap();
        assert_eq!(store.object("empty").unwrap().len(), 0);
        assert!(store.created_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_single_put_failure_propagates() {
        let store = MemoryStore::new();
        store.fail_put();
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "small", 3).await;

        let err = upload_object(&store, "small", &path, &small_transfer_config())
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Transfer(_)));
        assert!(store.created_sessions().is_empty());
        assert!(store.object("small").is_none());
    }

    #[tokio::test]
    async fn test_large_file_runs_one_multipart_session() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "large", 11).await;

        upload_object(&store, "large", &path, &small_transfer_config())
            .await
            .unwrap();

        assert!(store.put_calls().is_empty());
        assert_eq!(store.created_sessions().len(), 1);
        let completed = store.completed_uploads();
        assert_eq!(completed.len(), 1);
        let (key, _, parts) = &completed[0];
        assert_eq!(key, "large");
        let numbers: Vec<u32> = parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(store.object("large").unwrap(), patterned_bytes(11));
        assert!(store.aborted_uploads().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_part_completion_still_completes_sorted() {
        let store = MemoryStore::new();
        store.set_part_delay(1, Duration::from_millis(50));
        store.set_part_delay(2, Duration::from_millis(30));
        store.set_part_delay(3, Duration::from_millis(10));
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "shuffled", 12).await;

        upload_object(&store, "shuffled", &path, &small_transfer_config())
            .await
            .unwrap();

        let completed = store.completed_uploads();
        let numbers: Vec<u32> = completed[0].2.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(store.object("shuffled").unwrap(), patterned_bytes(12));
    }

    #[tokio::test]
    async fn test_part_failure_aborts_session_once_and_reraises() {
        let store = MemoryStore::new();
        store.fail_part(2);
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "doomed", 12).await;

        let err = upload_object(&store, "doomed", &path, &small_transfer_config())
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Transfer(_)));
        let sessions = store.created_sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(store.aborted_uploads(), sessions);
        assert!(store.completed_uploads().is_empty());
        assert!(store.object("doomed").is_none());
    }

    #[tokio::test]
    async fn test_failed_abort_still_reports_original_error() {
        init_test_tracing!();
        let store = MemoryStore::new();
        store.fail_part(2);
        store.fail_abort();
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "doomed", 12).await;

        let err = upload_object(&store, "doomed", &path, &small_transfer_config())
            .await
            .unwrap_err();

        // The part failure comes back, not the abort failure.
        let message = err.to_string();
        assert!(message.contains("part failure"), "unexpected error: {message}");
        assert!(store.aborted_uploads().is_empty());
        assert!(store.completed_uploads().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_respects_concurrency_cap() {
        let store = MemoryStore::new();
        for part in 1..=5u32 {
            store.set_part_delay(part, Duration::from_millis(10));
        }
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "wide", 18).await;

        upload_object(&store, "wide", &path, &small_transfer_config())
            .await
            .unwrap();

        assert!(store.max_concurrent_parts() <= 2);
        assert_eq!(store.object("wide").unwrap(), patterned_bytes(18));
    }

    #[tokio::test]
    async fn test_complete_failure_aborts_session() {
        let store = MemoryStore::new();
        store.fail_complete();
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "half", 9).await;

        let err = upload_object(&store, "half", &path, &small_transfer_config())
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Transfer(_)));
        assert_eq!(store.aborted_uploads().len(), 1);
    }

    #[tokio::test]
    async fn test_create_failure_does_not_abort() {
        let store = MemoryStore::new();
        store.fail_create();
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "unstarted", 9).await;

        let err = upload_object(&store, "unstarted", &path, &small_transfer_config())
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Transfer(_)));
        assert!(store.aborted_uploads().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let store = MemoryStore::new();
        let err = upload_object(
            &store,
            "ghost",
            Path::new("/nonexistent/ghost.tar.gz"),
            &small_transfer_config(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CacheError::Io(_)));
    }
}
