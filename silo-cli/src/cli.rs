use std::path::PathBuf;

use clap::{Parser, Subcommand};
use silo_engine::CacheOptions;

use crate::error::AppError;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    version,
    about = "Remote build-artifact cache over S3-compatible object storage",
    long_about = "Stores compressed build outputs keyed by content hash and retrieves\n\
                  them later to avoid rebuilding.\n\
                  \n\
                  Cache options come from a JSON options file, command-line flags, and\n\
                  environment variables (SILO_*), in rising order of precedence.\n\
                  Credentials are read from the conventional AWS_* variables; a .env\n\
                  file in the working directory is loaded first.\n\
                  \n\
                  Commands answer through their exit code: 0 for a hit/success, 1 for\n\
                  a miss or a contained failure."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// JSON file holding cache options
    #[arg(long, global = true, help = "Path to a JSON file with cache options")]
    pub options: Option<PathBuf>,

    /// Bucket holding the cache objects
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Key prefix prepended to every remote filename
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    /// Endpoint URL for S3-compatible services
    #[arg(long, global = true, help = "Custom endpoint URL, e.g. http://localhost:9000")]
    pub endpoint: Option<String>,

    /// Bucket region
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Display name used in cache log lines
    #[arg(long, global = true)]
    pub name: Option<String>,

    /// Force path-style addressing
    #[arg(long, global = true)]
    pub force_path_style: bool,

    /// Refuse store operations
    #[arg(long, global = true)]
    pub read_only: bool,

    /// Short-circuit retrieve operations to a miss
    #[arg(long, global = true)]
    pub write_only: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Suppress success log lines
    #[arg(long, global = true)]
    pub silent: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Fetch the artifact for a hash into the cache directory
    Retrieve {
        /// Content hash identifying the artifact
        hash: String,

        /// Local cache directory the artifact is extracted into
        #[arg(long)]
        cache_dir: PathBuf,
    },

    /// Archive a cached folder and upload it under its hash
    Store {
        /// Content hash identifying the artifact
        hash: String,

        /// Local cache directory holding the `<hash>` folder
        #[arg(long)]
        cache_dir: PathBuf,
    },

    /// Probe whether the artifact for a hash is present remotely
    Exists {
        /// Content hash identifying the artifact
        hash: String,
    },
}

impl CliArgs {
    /// Merge the options file with command-line flags. Flags win over file
    /// values; boolean flags only switch their option on, never off.
    pub fn cache_options(&self) -> Result<CacheOptions, AppError> {
        let mut options = match &self.options {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                serde_json::from_str(&text)
                    .map_err(|e| AppError::Options(format!("{}: {e}", path.display())))?
            }
            None => CacheOptions::default(),
        };

        if let Some(bucket) = &self.bucket {
            options.bucket = Some(bucket.clone());
        }
        if let Some(prefix) = &self.prefix {
            options.prefix = Some(prefix.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            options.endpoint = Some(endpoint.clone());
        }
        if let Some(region) = &self.region {
            options.region = Some(region.clone());
        }
        if let Some(name) = &self.name {
            options.name = Some(name.clone());
        }
        if self.force_path_style {
            options.force_path_style = Some(true);
        }
        if self.read_only {
            options.read_only = Some(true);
        }
        if self.write_only {
            options.write_only = Some(true);
        }
        if self.verbose {
            options.verbose = Some(true);
        }
        if self.silent {
            options.silent = Some(true);
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_flags_override_options_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"bucket": "from-file", "prefix": "ci/", "readOnly": true}}"#
        )
        .unwrap();

        let args = CliArgs::try_parse_from([
            "silo",
            "--options",
            file.path().to_str().unwrap(),
            "--bucket",
            "from-flag",
            "exists",
            "abc123",
        ])
        .unwrap();

        let options = args.cache_options().unwrap();
        assert_eq!(options.bucket.as_deref(), Some("from-flag"));
        assert_eq!(options.prefix.as_deref(), Some("ci/"));
        assert_eq!(options.read_only, Some(true));
    }

    #[test]
    fn test_boolean_flags_only_switch_on() {
        let args = CliArgs::try_parse_from(["silo", "--bucket", "artifacts", "exists", "abc123"])
            .unwrap();
        let options = args.cache_options().unwrap();
        assert_eq!(options.read_only, None);
        assert_eq!(options.force_path_style, None);
    }

    #[test]
    fn test_retrieve_requires_cache_dir() {
        let result = CliArgs::try_parse_from(["silo", "retrieve", "abc123"]);
        assert!(result.is_err());

        let args = CliArgs::try_parse_from([
            "silo",
            "retrieve",
            "abc123",
            "--cache-dir",
            "/tmp/cache",
        ])
        .unwrap();
        match args.command {
            Command::Retrieve { hash, cache_dir } => {
                assert_eq!(hash, "abc123");
                assert_eq!(cache_dir, PathBuf::from("/tmp/cache"));
            }
            _ => panic!("expected retrieve command"),
        }
    }

    #[test]
    fn test_malformed_options_file_is_options_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let args = CliArgs::try_parse_from([
            "silo",
            "--options",
            file.path().to_str().unwrap(),
            "exists",
            "abc123",
        ])
        .unwrap();
        assert!(matches!(args.cache_options(), Err(AppError::Options(_))));
    }
}
