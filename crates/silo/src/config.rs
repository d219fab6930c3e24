//! Cache configuration: user-facing options and their one-time resolution.
//!
//! Options arrive from a JSON options file, CLI flags, or code; environment
//! variables override individual fields. Resolution runs once at startup
//! (environment override, then explicit option, then default) and produces
//! an immutable [`CacheConfig`] that is threaded through the system;
//! nothing below this layer reads the process environment.

use serde::Deserialize;

use crate::chunk::{
    DOWNLOAD_CHUNK_SIZE, DOWNLOAD_CONCURRENCY, UPLOAD_CHUNK_SIZE, UPLOAD_CONCURRENCY,
};
use crate::error::{CacheError, Result};

pub const ENV_BUCKET: &str = "SILO_S3_BUCKET";
pub const ENV_PREFIX: &str = "SILO_S3_PREFIX";
pub const ENV_ENDPOINT: &str = "SILO_S3_ENDPOINT";
pub const ENV_REGION: &str = "SILO_S3_REGION";
pub const ENV_FORCE_PATH_STYLE: &str = "SILO_S3_FORCE_PATH_STYLE";
pub const ENV_READ_ONLY: &str = "SILO_READ_ONLY";
pub const ENV_WRITE_ONLY: &str = "SILO_WRITE_ONLY";
pub const ENV_NAME: &str = "SILO_NAME";

const DEFAULT_NAME: &str = "S3";

/// Access restriction applied to the cache implementation.
///
/// Validated at resolution time; asking for read-only and write-only at
/// once is a configuration error rather than a silently tolerated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

impl AccessMode {
    pub fn allows_store(&self) -> bool {
        !matches!(self, Self::ReadOnly)
    }

    pub fn allows_retrieve(&self) -> bool {
        !matches!(self, Self::WriteOnly)
    }

    fn from_flags(read_only: bool, write_only: bool) -> Result<Self> {
        match (read_only, write_only) {
            (true, true) => Err(CacheError::Config(
                "cache cannot be both read-only and write-only".to_string(),
            )),
            (true, false) => Ok(Self::ReadOnly),
            (false, true) => Ok(Self::WriteOnly),
            (false, false) => Ok(Self::ReadWrite),
        }
    }
}

/// Transfer tuning shared by the downloader and uploader.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Byte range size per download fetch.
    pub download_chunk_size: u64,

    /// Maximum concurrent range fetches per download job.
    pub download_concurrency: usize,

    /// Part size for multipart uploads.
    pub upload_chunk_size: u64,

    /// Maximum concurrent part uploads per store job.
    pub upload_concurrency: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_chunk_size: DOWNLOAD_CHUNK_SIZE,
            download_concurrency: DOWNLOAD_CONCURRENCY,
            upload_chunk_size: UPLOAD_CHUNK_SIZE,
            upload_concurrency: UPLOAD_CONCURRENCY,
        }
    }
}

/// User-facing cache options before resolution.
///
/// Field names mirror the JSON options file, so `forcePathStyle` in JSON
/// lands on `force_path_style` here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheOptions {
    /// Bucket holding the cache objects. Required (here or via env).
    pub bucket: Option<String>,

    /// Optional key prefix, prepended verbatim to every remote filename.
    pub prefix: Option<String>,

    /// Custom endpoint URL for S3-compatible services.
    pub endpoint: Option<String>,

    /// Bucket region. Defaults to `us-east-1` when unset.
    pub region: Option<String>,

    /// Force path-style addressing (`endpoint/bucket/key`).
    pub force_path_style: Option<bool>,

    /// Refuse store operations.
    pub read_only: Option<bool>,

    /// Short-circuit retrieve operations to a miss.
    pub write_only: Option<bool>,

    /// Display name used in cache hit/store log lines.
    pub name: Option<String>,

    /// Log full error detail on failures.
    pub verbose: Option<bool>,

    /// Suppress success log lines.
    pub silent: Option<bool>,
}

/// Resolved, immutable cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub bucket: String,
    pub prefix: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub force_path_style: bool,
    pub mode: AccessMode,
    pub name: String,
    pub verbose: bool,
    pub silent: bool,
    pub transfer: TransferConfig,
}

impl CacheOptions {
    /// Resolve against the process environment.
    pub fn resolve(&self) -> Result<CacheConfig> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolution core with an injectable environment, so tests never have
    /// to mutate process-wide state.
    pub(crate) fn resolve_with<F>(&self, env: F) -> Result<CacheConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bucket = string_field(&env, ENV_BUCKET, self.bucket.as_deref())
            .ok_or_else(|| CacheError::Config(format!("missing bucket ({ENV_BUCKET})")))?;
        let prefix = string_field(&env, ENV_PREFIX, self.prefix.as_deref()).unwrap_or_default();
        let endpoint = string_field(&env, ENV_ENDPOINT, self.endpoint.as_deref());
        let region = string_field(&env, ENV_REGION, self.region.as_deref());
        let force_path_style =
            bool_field(&env, ENV_FORCE_PATH_STYLE, self.force_path_style).unwrap_or(false);
        let read_only = bool_field(&env, ENV_READ_ONLY, self.read_only).unwrap_or(false);
        let write_only = bool_field(&env, ENV_WRITE_ONLY, self.write_only).unwrap_or(false);
        let name = string_field(&env, ENV_NAME, self.name.as_deref())
            .unwrap_or_else(|| DEFAULT_NAME.to_string());

        Ok(CacheConfig {
            bucket,
            prefix,
            endpoint,
            region,
            force_path_style,
            mode: AccessMode::from_flags(read_only, write_only)?,
            name,
            verbose: self.verbose.unwrap_or(false),
            silent: self.silent.unwrap_or(false),
            transfer: TransferConfig::default(),
        })
    }
}

fn string_field<F>(env: &F, var: &str, option: Option<&str>) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    env(var)
        .filter(|value| !value.is_empty())
        .or_else(|| option.map(str::to_string))
}

/// Boolean override parsing: `"true"`/`"false"` in any case wins over the
/// option; anything else falls through.
fn bool_field<F>(env: &F, var: &str, option: Option<bool>) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match env(var).map(|value| value.to_lowercase()) {
        Some(value) if value == "true" => Some(true),
        Some(value) if value == "false" => Some(false),
        _ => option,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn options_with_bucket() -> CacheOptions {
        CacheOptions {
            bucket: Some("artifacts".to_string()),
            ..CacheOptions::default()
        }
    }

    #[test]
    fn test_resolve_defaults() {
        let config = options_with_bucket().resolve_with(no_env).unwrap();
        assert_eq!(config.bucket, "artifacts");
        assert_eq!(config.prefix, "");
        assert_eq!(config.endpoint, None);
        assert!(!config.force_path_style);
        assert_eq!(config.mode, AccessMode::ReadWrite);
        assert_eq!(config.name, "S3");
        assert!(!config.verbose);
        assert!(!config.silent);
    }

    #[test]
    fn test_missing_bucket_is_config_error() {
        let err = CacheOptions::default().resolve_with(no_env).unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[test]
    fn test_env_overrides_option() {
        let options = CacheOptions {
            bucket: Some("from-options".to_string()),
            prefix: Some("opt/".to_string()),
            name: Some("Option Cache".to_string()),
            ..CacheOptions::default()
        };
        let config = options
            .resolve_with(|name| match name {
                ENV_BUCKET => Some("from-env".to_string()),
                ENV_NAME => Some("Env Cache".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.bucket, "from-env");
        assert_eq!(config.prefix, "opt/");
        assert_eq!(config.name, "Env Cache");
    }

    #[test]
    fn test_bool_env_parsing_is_case_insensitive() {
        let options = CacheOptions {
            read_only: Some(false),
            ..options_with_bucket()
        };
        let config = options
            .resolve_with(|name| (name == ENV_READ_ONLY).then(|| "TRUE".to_string()))
            .unwrap();
        assert_eq!(config.mode, AccessMode::ReadOnly);
    }

    #[test]
    fn test_unparseable_bool_env_falls_back_to_option() {
        let options = CacheOptions {
            read_only: Some(true),
            ..options_with_bucket()
        };
        let config = options
            .resolve_with(|name| (name == ENV_READ_ONLY).then(|| "yes".to_string()))
            .unwrap();
        assert_eq!(config.mode, AccessMode::ReadOnly);
    }

    #[test]
    fn test_env_false_overrides_option_true() {
        let options = CacheOptions {
            read_only: Some(true),
            ..options_with_bucket()
        };
        let config = options
            .resolve_with(|name| (name == ENV_READ_ONLY).then(|| "false".to_string()))
            .unwrap();
        assert_eq!(config.mode, AccessMode::ReadWrite);
    }

    #[test]
    fn test_read_only_and_write_only_rejected() {
        let options = CacheOptions {
            read_only: Some(true),
            write_only: Some(true),
            ..options_with_bucket()
        };
        let err = options.resolve_with(no_env).unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[test]
    fn test_write_only_mode() {
        let options = CacheOptions {
            write_only: Some(true),
            ..options_with_bucket()
        };
        let config = options.resolve_with(no_env).unwrap();
        assert_eq!(config.mode, AccessMode::WriteOnly);
        assert!(config.mode.allows_store());
        assert!(!config.mode.allows_retrieve());
    }

    #[test]
    fn test_options_deserialize_from_json() {
        let options: CacheOptions = serde_json::from_str(
            r#"{
                "bucket": "artifacts",
                "prefix": "ci/",
                "endpoint": "http://localhost:9000",
                "forcePathStyle": true,
                "readOnly": true,
                "name": "MinIO"
            }"#,
        )
        .unwrap();
        let config = options.resolve_with(no_env).unwrap();
        assert_eq!(config.prefix, "ci/");
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
        assert!(config.force_path_style);
        assert_eq!(config.mode, AccessMode::ReadOnly);
        assert_eq!(config.name, "MinIO");
    }

    #[test]
    fn test_empty_env_value_ignored() {
        let config = options_with_bucket()
            .resolve_with(|name| (name == ENV_PREFIX).then(String::new))
            .unwrap();
        assert_eq!(config.prefix, "");
    }
}
