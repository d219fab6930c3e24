//! # Silo
//!
//! Remote build-artifact cache engine over S3-compatible object storage.
//! Build outputs are archived, stored under their content hash, and
//! retrieved later to avoid rebuilding.
//!
//! ## Features
//!
//! - Chunked parallel downloads with in-order reassembly
//! - Multipart uploads with session cleanup on partial failure
//! - Failure containment: cache problems degrade to misses, never abort
//!   the caller's build
//! - Read-only / write-only access modes
//! - Works against AWS S3 and compatible stores (MinIO, Ceph RGW)

pub mod archive;
pub mod backend;
pub mod cache;
pub mod chunk;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod s3;
pub mod safe;
pub mod test_utils;
pub mod timing;
pub mod upload;

// Re-export the runner-facing surface
pub use cache::{RemoteCache, filename_from_hash};
pub use config::{AccessMode, CacheConfig, CacheOptions, TransferConfig};
pub use error::CacheError;

// Re-export the composition seams
pub use archive::{Archiver, TarArchiver};
pub use backend::CacheBackend;
pub use client::{CompletedPart, ObjectStore};
pub use s3::S3Store;
pub use safe::SafeCache;

// Re-export the transfer engine
pub use chunk::{ChunkSpec, plan_chunks};
pub use download::download_object;
pub use timing::PhaseTimings;
pub use upload::upload_object;
