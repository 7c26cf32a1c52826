//! drivelfs agent entry point.
//!
//! git-lfs spawns this process in the repository root and speaks the
//! custom transfer protocol over its stdin/stdout. All diagnostics go to
//! stderr (or the configured log file); stdout belongs to the protocol.

mod config;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use drivelfs_engine::{Engine, EngineError};
use drivelfs_protocol::ErrorCode;
use drivelfs_store::{DriveStore, RemoteStore};
use drivelfs_transfer::TempAllocator;

use crate::config::Config;

const CONFIG_CODE: i32 = ErrorCode::ConfigFile.code();

fn main() -> anyhow::Result<()> {
    let path = config::locate(std::env::args().nth(1));
    let config = Config::load(&path)
        .map_err(|err| anyhow::anyhow!("configuration error (code {CONFIG_CODE}): {err}"))?;
    config
        .validate()
        .map_err(|err| anyhow::anyhow!("configuration error (code {CONFIG_CODE}): {err}"))?;

    init_logging(&config)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %path.display(),
        "starting drivelfs agent"
    );
    if !config.client_email.is_empty() {
        tracing::info!(account = %config.client_email, "using service account");
    }

    let token = config::resolve_access_token(&config).ok_or_else(|| {
        anyhow::anyhow!(
            "configuration error (code {CONFIG_CODE}): no access token \
             (set {} or the access_token config field)",
            config::TOKEN_ENV
        )
    })?;
    let store = DriveStore::new(&token, &config.drive_id)
        .map_err(|err| anyhow::anyhow!("configuration error (code {CONFIG_CODE}): {err}"))?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_agent(store))?;

    tracing::info!("agent shut down cleanly");
    Ok(())
}

/// Runs the command loop over the process's standard streams.
async fn run_agent<S: RemoteStore>(store: S) -> Result<(), EngineError> {
    let staging = TempAllocator::in_current_dir()?;
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    Engine::new(store, staging).run(stdin, stdout).await
}

/// Structured logging to stderr, or to the configured log file.
fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if config.log_path.is_empty() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_path)
            .with_context(|| format!("cannot open log file {}", config.log_path))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
    }
    Ok(())
}
