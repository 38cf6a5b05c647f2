pub mod api;
pub mod application;
pub mod domain;
pub mod infrastructure;

use application::state::AppState;
use infrastructure::config::load_env_settings;
use infrastructure::error::InfraError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "chronoflow=info,tower_http=info";
const LOG_FILE_PREFIX: &str = "chronoflow.log";

/// Human-readable logs on stdout plus a daily-rotated JSON file in
/// `logs_dir`. The guard must live as long as the process.
pub fn init_tracing(logs_dir: &Path) -> Result<WorkerGuard, InfraError> {
    let file_appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(fmt::layer())
        .with(fmt::layer().json().with_writer(file_writer))
        .try_init()
        .map_err(|error| InfraError::InvalidConfig(format!("failed to install tracing: {error}")))?;
    Ok(guard)
}

fn workspace_root() -> Result<PathBuf, InfraError> {
    match std::env::var_os("CHRONOFLOW_WORKSPACE") {
        Some(path) => Ok(PathBuf::from(path)),
        None => Ok(std::env::current_dir()?),
    }
}

pub async fn run() -> Result<(), InfraError> {
    dotenvy::dotenv().ok();

    let env = load_env_settings()?;
    let bind_address = env.bind_address.clone();
    let state = Arc::new(AppState::new(workspace_root()?, env)?);
    let _log_guard = init_tracing(state.logs_dir())?;

    tracing::info!(
        workspace = %state.workspace_root().display(),
        database = %state.database_path().display(),
        google_enabled = state.google_enabled(),
        "workspace ready"
    );

    let app = api::app(Arc::clone(&state))?;
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "chronoflow listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown requested");
}
