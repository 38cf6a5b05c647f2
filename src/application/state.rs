use crate::application::bootstrap::bootstrap_workspace;
use crate::application::oauth::{NowProvider, OAuthConfig, OAuthManager};
use crate::domain::timer::TimerSession;
use crate::infrastructure::config::{AppSettings, EnvSettings, GoogleClientSettings};
use crate::infrastructure::credential_store::{CredentialStore, SqliteCredentialStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_time_repository::SqliteEventTimeRepository;
use crate::infrastructure::google_calendar_client::{GoogleCalendarClient, ReqwestGoogleCalendarClient};
use crate::infrastructure::oauth_client::{OAuthHttpClient, ReqwestOAuthClient};
use crate::infrastructure::task_repository::SqliteTaskRepository;
use crate::infrastructure::user_repository::SqliteUserRepository;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

#[derive(Debug, Clone)]
pub(crate) struct PendingOAuthState {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

pub struct AppState {
    workspace_root: PathBuf,
    logs_dir: PathBuf,
    database_path: PathBuf,
    settings: AppSettings,
    jwt_secret: String,
    google: Option<GoogleClientSettings>,
    pub(crate) users: SqliteUserRepository,
    pub(crate) tasks: SqliteTaskRepository,
    pub(crate) event_times: SqliteEventTimeRepository,
    credential_store: Arc<dyn CredentialStore>,
    oauth_client: Arc<dyn OAuthHttpClient>,
    pub(crate) calendar_client: Arc<dyn GoogleCalendarClient>,
    timers: Mutex<HashMap<String, TimerSession>>,
    pending_oauth_states: Mutex<HashMap<String, PendingOAuthState>>,
    now_provider: NowProvider,
}

impl AppState {
    pub fn new(workspace_root: PathBuf, env: EnvSettings) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let http = reqwest::Client::new();
        let credential_store = Arc::new(SqliteCredentialStore::new(&bootstrap.database_path));

        Ok(Self {
            workspace_root: bootstrap.workspace_root,
            logs_dir: bootstrap.logs_dir,
            users: SqliteUserRepository::new(&bootstrap.database_path),
            tasks: SqliteTaskRepository::new(&bootstrap.database_path),
            event_times: SqliteEventTimeRepository::new(&bootstrap.database_path),
            database_path: bootstrap.database_path,
            settings: bootstrap.settings,
            jwt_secret: env.jwt_secret,
            google: env.google,
            credential_store,
            oauth_client: Arc::new(ReqwestOAuthClient::new(http.clone())),
            calendar_client: Arc::new(ReqwestGoogleCalendarClient::new(http)),
            timers: Mutex::new(HashMap::new()),
            pending_oauth_states: Mutex::new(HashMap::new()),
            now_provider: Arc::new(Utc::now),
        })
    }

    /// Swaps the Google HTTP clients, e.g. for in-memory fakes.
    pub fn with_google_clients(
        mut self,
        oauth_client: Arc<dyn OAuthHttpClient>,
        calendar_client: Arc<dyn GoogleCalendarClient>,
    ) -> Self {
        self.oauth_client = oauth_client;
        self.calendar_client = calendar_client;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub(crate) fn jwt_secret(&self) -> &str {
        &self.jwt_secret
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    pub fn google_enabled(&self) -> bool {
        self.google.is_some()
    }

    pub(crate) fn oauth_manager(&self) -> Result<OAuthManager, InfraError> {
        let settings = self.google.clone().ok_or_else(|| {
            InfraError::InvalidConfig("Google Calendar integration is not configured".to_string())
        })?;
        Ok(OAuthManager::new(
            OAuthConfig::from(settings),
            Arc::clone(&self.credential_store),
            Arc::clone(&self.oauth_client),
        )
        .with_now_provider(Arc::clone(&self.now_provider)))
    }

    pub(crate) fn timers(&self) -> Result<MutexGuard<'_, HashMap<String, TimerSession>>, InfraError> {
        self.timers
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("timer sessions: {error}")))
    }

    pub(crate) fn pending_oauth_states(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<String, PendingOAuthState>>, InfraError> {
        self.pending_oauth_states
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("oauth states: {error}")))
    }

    pub fn command_error(&self, command: &str, error: &InfraError) {
        match error {
            InfraError::Validation(_)
            | InfraError::NotFound(_)
            | InfraError::Unauthorized(_)
            | InfraError::Conflict(_)
            | InfraError::ReauthenticationRequired => {
                tracing::warn!(command, error = %error, "command rejected");
            }
            _ => tracing::error!(command, error = %error, "command failed"),
        }
    }
}
