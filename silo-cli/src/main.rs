use clap::Parser;
use mimalloc::MiMalloc;
use silo_engine::RemoteCache;
use tracing::{Level, debug, error};
use tracing_subscriber::{FmtSubscriber, filter::EnvFilter};

mod cli;
mod error;

use cli::{CliArgs, Command};
use error::AppError;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() {
    match bootstrap() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            error!(error = ?e, "Cache command failed");
            std::process::exit(1);
        }
    }
}

/// Runs the requested cache command. `Ok(false)` is a miss or a contained
/// failure, mapped to a non-zero exit code without the error banner.
#[tokio::main]
async fn bootstrap() -> Result<bool, AppError> {
    // Credentials and SILO_* overrides may live in a local .env file.
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    let options = args.cache_options()?;
    let cache = RemoteCache::from_options(&options);
    if let Some(name) = cache.name() {
        debug!(name = %name, "Remote cache ready");
    }

    let outcome = match &args.command {
        Command::Retrieve { hash, cache_dir } => cache.retrieve(hash, cache_dir).await,
        Command::Store { hash, cache_dir } => cache.store(hash, cache_dir).await,
        Command::Exists { hash } => cache.exists(hash).await,
    };
    Ok(outcome)
}
