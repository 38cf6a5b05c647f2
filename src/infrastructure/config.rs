use crate::infrastructure::error::InfraError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const MIN_JWT_SECRET_LEN: usize = 16;
const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5000";
const DEFAULT_REDIRECT_URI: &str =
    "http://localhost:5000/api/integrations/google-calendar/callback";
const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

fn default_app_json() -> serde_json::Value {
    serde_json::json!({
        "schema": 1,
        "appName": "ChronoFlow",
        "frontendUrl": "http://localhost:5173",
        "cookieSecure": false,
        "googleCalendarId": "primary",
        "syncWindowDays": 30,
        "eventsWindowDays": 30
    })
}

/// Non-secret settings read from `config/app.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub app_name: String,
    pub frontend_url: String,
    pub cookie_secure: bool,
    pub google_calendar_id: String,
    pub sync_window_days: u32,
    pub events_window_days: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            app_name: "ChronoFlow".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            cookie_secure: false,
            google_calendar_id: "primary".to_string(),
            sync_window_days: 30,
            events_window_days: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleClientSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

/// Settings that come from the process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSettings {
    pub bind_address: String,
    pub jwt_secret: String,
    pub google: Option<GoogleClientSettings>,
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_app_json())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_app_settings(config_dir: &Path) -> Result<AppSettings, InfraError> {
    let raw = read_config(&config_dir.join(APP_JSON))?;
    let mut settings: AppSettings = serde_json::from_value(raw)?;
    settings.frontend_url = settings.frontend_url.trim().trim_end_matches('/').to_string();
    if settings.frontend_url.is_empty() {
        return Err(InfraError::InvalidConfig(
            "frontendUrl must not be empty".to_string(),
        ));
    }
    if settings.google_calendar_id.trim().is_empty() {
        settings.google_calendar_id = AppSettings::default().google_calendar_id;
    }
    settings.sync_window_days = settings.sync_window_days.max(1);
    settings.events_window_days = settings.events_window_days.max(1);
    Ok(settings)
}

pub fn load_env_settings() -> Result<EnvSettings, InfraError> {
    load_env_settings_from_lookup(|key| std::env::var(key).ok())
}

pub fn load_env_settings_from_lookup<F>(lookup: F) -> Result<EnvSettings, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let jwt_secret = required_lookup_value(&lookup, &["CHRONOFLOW_JWT_SECRET", "JWT_SECRET"], "jwt secret")?;
    if jwt_secret.len() < MIN_JWT_SECRET_LEN {
        return Err(InfraError::InvalidConfig(format!(
            "jwt secret must be at least {MIN_JWT_SECRET_LEN} characters"
        )));
    }
    let bind_address = optional_lookup_value(&lookup, &["CHRONOFLOW_BIND"])
        .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

    Ok(EnvSettings {
        bind_address,
        jwt_secret,
        google: load_google_client_settings(&lookup)?,
    })
}

/// Google integration is optional: no client id means it stays disabled, but
/// a client id without its secret is a configuration mistake.
fn load_google_client_settings<F>(lookup: &F) -> Result<Option<GoogleClientSettings>, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(client_id) = optional_lookup_value(lookup, &["CHRONOFLOW_GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_ID"])
    else {
        return Ok(None);
    };
    let client_secret = required_lookup_value(
        lookup,
        &["CHRONOFLOW_GOOGLE_CLIENT_SECRET", "GOOGLE_CLIENT_SECRET"],
        "google client secret",
    )?;
    let redirect_uri = optional_lookup_value(
        lookup,
        &["CHRONOFLOW_GOOGLE_REDIRECT_URI", "GOOGLE_REDIRECT_URI"],
    )
    .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
    let scopes = optional_lookup_value(lookup, &["CHRONOFLOW_GOOGLE_SCOPES", "GOOGLE_SCOPES"])
        .map(|raw| parse_scope_list(&raw))
        .filter(|scopes| !scopes.is_empty())
        .unwrap_or_else(|| vec![DEFAULT_SCOPE.to_string()]);

    Ok(Some(GoogleClientSettings {
        client_id,
        client_secret,
        redirect_uri,
        scopes,
    }))
}

fn required_lookup_value<F>(lookup: &F, keys: &[&str], field_name: &str) -> Result<String, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    optional_lookup_value(lookup, keys).ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "missing {} (set one of: {})",
            field_name,
            keys.join(", ")
        ))
    })
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn parse_scope_list(raw: &str) -> Vec<String> {
    raw.split([',', ' ', '\n', '\t'])
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
