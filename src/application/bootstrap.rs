use crate::infrastructure::config::{ensure_default_configs, load_app_settings, AppSettings};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

const DATABASE_FILE: &str = "chronoflow.sqlite";

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
    pub settings: AppSettings,
}

/// Creates `config/`, `state/` and `logs/`, writes default config files and
/// applies the database schema. Safe to run on every start.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join(DATABASE_FILE);

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let settings = load_app_settings(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        logs_dir,
        database_path,
        settings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_creates_layout_and_is_idempotent() {
        let dir = tempfile::tempdir().expect("temp dir");
        let first = bootstrap_workspace(dir.path()).expect("first bootstrap");
        assert!(first.config_dir.join("app.json").is_file());
        assert!(first.logs_dir.is_dir());
        assert!(first.database_path.is_file());
        assert_eq!(first.settings, AppSettings::default());

        let second = bootstrap_workspace(dir.path()).expect("second bootstrap");
        assert_eq!(second.database_path, first.database_path);
    }
}
