//! Test doubles for the cache stack.
//!
//! [`MemoryStore`] stands in for the object-storage client and
//! [`RecordingArchiver`] for the external tar processes, so the transfer
//! engine and cache layers can be exercised hermetically: every remote call
//! is recorded, failures are injectable per operation, and range/part
//! completion order is steerable through artificial delays.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::time::sleep;

use crate::archive::Archiver;
use crate::client::{CompletedPart, ObjectStore};
use crate::error::{CacheError, Result};

/// Macro to initialize tracing for tests
///
/// Usage:
/// - `init_test_tracing!()` - uses DEBUG level (default)
/// - `init_test_tracing!(INFO)` - uses specified level
#[macro_export]
macro_rules! init_test_tracing {
    () => {
        init_test_tracing!(DEBUG);
    };
    ($level:ident) => {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::$level)
            .with_test_writer()
            .try_init();
    };
}

pub use crate::init_test_tracing;

/// Deterministic filler bytes for fixtures.
pub fn patterned_bytes(len: usize) -> Bytes {
    (0..len)
        .map(|i| (i.wrapping_mul(31).wrapping_add(7)) as u8)
        .collect::<Vec<u8>>()
        .into()
}

#[derive(Default)]
struct PendingUpload {
    key: String,
    etags: HashMap<u32, String>,
    parts: HashMap<u32, Bytes>,
}

#[derive(Default)]
struct StoreState {
    objects: HashMap<String, Bytes>,
    sessions: HashMap<String, PendingUpload>,
    created: Vec<String>,
    completed: Vec<(String, String, Vec<CompletedPart>)>,
    aborted: Vec<String>,
    put_keys: Vec<String>,
    head_keys: Vec<String>,
    range_log: Vec<(u64, u64)>,
    range_delays: HashMap<u64, Duration>,
    part_delays: HashMap<u32, Duration>,
    failed_ranges: HashSet<u64>,
    truncated_ranges: HashSet<u64>,
    failed_parts: HashSet<u32>,
    fail_put: bool,
    fail_create: bool,
    fail_complete: bool,
    fail_abort: bool,
    deny_head: bool,
    fail_head: bool,
    next_upload: u64,
    active_ranges: usize,
    max_active_ranges: usize,
    active_parts: usize,
    max_active_parts: usize,
}

/// In-memory [`ObjectStore`] with call recording and fault injection.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_object(&self, key: &str, data: Bytes) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(key.to_string(), data);
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    /// Delay the range fetch starting at byte `start`.
    pub fn set_range_delay(&self, start: u64, delay: Duration) {
        self.state.lock().unwrap().range_delays.insert(start, delay);
    }

    /// Delay the upload of part `part_number`.
    pub fn set_part_delay(&self, part_number: u32, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .part_delays
            .insert(part_number, delay);
    }

    /// Fail the range fetch starting at byte `start` with a transfer error.
    pub fn fail_range_at(&self, start: u64) {
        self.state.lock().unwrap().failed_ranges.insert(start);
    }

    /// Return one byte short for the range starting at byte `start`.
    pub fn truncate_range_at(&self, start: u64) {
        self.state.lock().unwrap().truncated_ranges.insert(start);
    }

    pub fn fail_part(&self, part_number: u32) {
        self.state.lock().unwrap().failed_parts.insert(part_number);
    }

    pub fn fail_put(&self) {
        self.state.lock().unwrap().fail_put = true;
    }

    pub fn fail_create(&self) {
        self.state.lock().unwrap().fail_create = true;
    }

    pub fn fail_complete(&self) {
        self.state.lock().unwrap().fail_complete = true;
    }

    /// Make session aborts fail with a transfer error.
    pub fn fail_abort(&self) {
        self.state.lock().unwrap().fail_abort = true;
    }

    /// Make metadata probes fail with access denied.
    pub fn deny_head(&self) {
        self.state.lock().unwrap().deny_head = true;
    }

    /// Make metadata probes fail with a transfer error.
    pub fn fail_head(&self) {
        self.state.lock().unwrap().fail_head = true;
    }

    pub fn head_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().head_keys.clone()
    }

    pub fn put_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().put_keys.clone()
    }

    pub fn range_requests(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().range_log.clone()
    }

    pub fn max_concurrent_ranges(&self) -> usize {
        self.state.lock().unwrap().max_active_ranges
    }

    pub fn max_concurrent_parts(&self) -> usize {
        self.state.lock().unwrap().max_active_parts
    }

    pub fn created_sessions(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn completed_uploads(&self) -> Vec<(String, String, Vec<CompletedPart>)> {
        self.state.lock().unwrap().completed.clone()
    }

    pub fn aborted_uploads(&self) -> Vec<String> {
        self.state.lock().unwrap().aborted.clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head_object(&self, key: &str) -> Result<Option<u64>> {
        let mut state = self.state.lock().unwrap();
        state.head_keys.push(key.to_string());
        if state.deny_head {
            return Err(CacheError::AccessDenied(key.to_string()));
        }
        if state.fail_head {
            return Err(CacheError::Transfer("simulated head failure".to_string()));
        }
        Ok(state.objects.get(key).map(|data| data.len() as u64))
    }

    async fn get_object_range(&self, key: &str, start: u64, end: u64) -> Result<Bytes> {
        let (delay, outcome) = {
            let mut state = self.state.lock().unwrap();
            state.range_log.push((start, end));
            state.active_ranges += 1;
            state.max_active_ranges = state.max_active_ranges.max(state.active_ranges);
            let delay = state.range_delays.get(&start).copied();

            let outcome = if state.failed_ranges.contains(&start) {
                Err(CacheError::Transfer(format!(
                    "simulated range failure at {start}"
                )))
            } else {
                match state.objects.get(key) {
                    None => Err(CacheError::ObjectNotFound(key.to_string())),
                    Some(data) => match data.get(start as usize..=end as usize) {
                        None => Err(CacheError::Transfer(format!(
                            "range {start}-{end} outside object of {} bytes",
                            data.len()
                        ))),
                        Some(slice) => {
                            let mut slice = Bytes::copy_from_slice(slice);
                            if state.truncated_ranges.contains(&start) {
                                slice.truncate(slice.len().saturating_sub(1));
                            }
                            Ok(slice)
                        }
                    },
                }
            };
            (delay, outcome)
        };

        if let Some(delay) = delay {
            sleep(delay).await;
        }
        self.state.lock().unwrap().active_ranges -= 1;
        outcome
    }

    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.put_keys.push(key.to_string());
        if state.fail_put {
            return Err(CacheError::Transfer("simulated put failure".to_string()));
        }
        state.objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn create_multipart(&self, key: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create {
            return Err(CacheError::Transfer(
                "simulated create-multipart failure".to_string(),
            ));
        }
        state.next_upload += 1;
        let upload_id = format!("upload-{}", state.next_upload);
        state.created.push(upload_id.clone());
        state.sessions.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                ..PendingUpload::default()
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            if !state.sessions.contains_key(upload_id) {
                return Err(CacheError::Transfer(format!(
                    "upload part for unknown session {upload_id}"
                )));
            }
            state.active_parts += 1;
            state.max_active_parts = state.max_active_parts.max(state.active_parts);
            state.part_delays.get(&part_number).copied()
        };
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.active_parts -= 1;
        if state.failed_parts.contains(&part_number) {
            return Err(CacheError::Transfer(format!(
                "simulated part failure for part {part_number} of {key}"
            )));
        }
        let etag = format!("etag-{part_number}");
        if let Some(session) = state.sessions.get_mut(upload_id) {
            session.etags.insert(part_number, etag.clone());
            session.parts.insert(part_number, data);
        }
        Ok(etag)
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_complete {
            return Err(CacheError::Transfer(
                "simulated complete-multipart failure".to_string(),
            ));
        }
        let session = state.sessions.remove(upload_id).ok_or_else(|| {
            CacheError::Transfer(format!("complete for unknown session {upload_id}"))
        })?;

        if !parts.is_sorted_by_key(|part| part.part_number) {
            return Err(CacheError::Transfer(
                "completed part list is not sorted by part number".to_string(),
            ));
        }
        let mut assembled = Vec::new();
        for part in parts {
            let expected = session.etags.get(&part.part_number);
            if expected != Some(&part.etag) {
                return Err(CacheError::Transfer(format!(
                    "etag mismatch for part {}",
                    part.part_number
                )));
            }
            if let Some(data) = session.parts.get(&part.part_number) {
                assembled.extend_from_slice(data);
            }
        }

        state.objects.insert(session.key, assembled.into());
        state
            .completed
            .push((key.to_string(), upload_id.to_string(), parts.to_vec()));
        Ok(())
    }

    async fn abort_multipart(&self, _key: &str, upload_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_abort {
            return Err(CacheError::Transfer(format!(
                "simulated abort failure for {upload_id}"
            )));
        }
        state.sessions.remove(upload_id);
        state.aborted.push(upload_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct ArchiverState {
    archived: Vec<(String, PathBuf)>,
    extracted: Vec<(PathBuf, PathBuf)>,
    fail_archive: bool,
    fail_extract: bool,
}

/// [`Archiver`] double: copies bytes instead of spawning tar.
///
/// `archive` writes `archive:<folder>` into the destination file; `extract`
/// copies the archive bytes to `<destination>/contents`.
#[derive(Default)]
pub struct RecordingArchiver {
    state: Mutex<ArchiverState>,
}

impl RecordingArchiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_archive(&self) {
        self.state.lock().unwrap().fail_archive = true;
    }

    pub fn fail_extract(&self) {
        self.state.lock().unwrap().fail_extract = true;
    }

    pub fn archived(&self) -> Vec<(String, PathBuf)> {
        self.state.lock().unwrap().archived.clone()
    }

    pub fn extracted(&self) -> Vec<(PathBuf, PathBuf)> {
        self.state.lock().unwrap().extracted.clone()
    }
}

#[async_trait]
impl Archiver for RecordingArchiver {
    async fn archive(&self, folder: &str, destination_file: &Path) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if state.fail_archive {
                return Err(CacheError::Archive(
                    "simulated archive failure".to_string(),
                ));
            }
            state
                .archived
                .push((folder.to_string(), destination_file.to_path_buf()));
        }
        fs::write(destination_file, format!("archive:{folder}")).await?;
        Ok(())
    }

    async fn extract(&self, archive_file: &Path, destination: &Path) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if state.fail_extract {
                return Err(CacheError::Archive(
                    "simulated extract failure".to_string(),
                ));
            }
            state
                .extracted
                .push((archive_file.to_path_buf(), destination.to_path_buf()));
        }
        fs::create_dir_all(destination).await?;
        let data = fs::read(archive_file).await?;
        fs::write(destination.join("contents"), data).await?;
        Ok(())
    }
}
