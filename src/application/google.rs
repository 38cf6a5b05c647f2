use crate::application::state::{AppState, PendingOAuthState};
use crate::application::tasks::{resolve_window, TimeWindowQuery};
use crate::domain::calendar::ExternalEvent;
use crate::domain::models::{GoogleEventTime, GOOGLE_EVENT_PREFIX};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{encode_task_event, to_external_event};
use crate::infrastructure::storage::run_blocking;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const OAUTH_STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SyncSummary {
    pub synced: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventTimeRequest {
    pub event_id: String,
    #[serde(default)]
    pub duration_seconds: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_finished: bool,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchEventTimeRequest {
    pub duration_seconds: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_finished: Option<bool>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Accepts both raw Google ids and the `gcal-` form used by the calendar view.
fn normalize_event_id(raw: &str) -> Result<String, InfraError> {
    let trimmed = raw.trim();
    let id = trimmed.strip_prefix(GOOGLE_EVENT_PREFIX).unwrap_or(trimmed);
    if id.is_empty() {
        return Err(InfraError::Validation("eventId must not be empty".to_string()));
    }
    Ok(id.to_string())
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Builds the consent URL and remembers which user the `state` belongs to.
pub fn authorization_url_impl(state: &AppState, user_id: &str) -> Result<String, InfraError> {
    let manager = state.oauth_manager()?;
    let oauth_state = uuid::Uuid::new_v4().to_string();
    let url = manager.build_authorization_url(&oauth_state)?;

    let now = state.now();
    let mut pending = state.pending_oauth_states()?;
    pending.retain(|_, entry| now - entry.created_at < Duration::minutes(OAUTH_STATE_TTL_MINUTES));
    pending.insert(
        oauth_state,
        PendingOAuthState {
            user_id: user_id.to_string(),
            created_at: now,
        },
    );
    Ok(url)
}

/// Always yields a redirect target; failures are logged and reported to the
/// frontend as `google=error`.
pub async fn oauth_callback_impl(state: &AppState, query: OAuthCallbackQuery) -> String {
    let dashboard = format!("{}/dashboard", state.settings().frontend_url);
    match complete_oauth(state, query).await {
        Ok(user_id) => {
            tracing::info!(user_id = %user_id, "google calendar connected");
            format!("{dashboard}?google=connected")
        }
        Err(error) => {
            state.command_error("google_callback", &error);
            format!("{dashboard}?google=error")
        }
    }
}

async fn complete_oauth(state: &AppState, query: OAuthCallbackQuery) -> Result<String, InfraError> {
    if let Some(error) = query.error {
        return Err(InfraError::OAuth(format!("consent denied: {error}")));
    }
    let oauth_state = non_empty(query.state)
        .ok_or_else(|| InfraError::OAuth("callback is missing state".to_string()))?;
    let code = non_empty(query.code)
        .ok_or_else(|| InfraError::OAuth("callback is missing code".to_string()))?;

    let pending = state.pending_oauth_states()?.remove(&oauth_state);
    let pending = pending
        .filter(|entry| state.now() - entry.created_at < Duration::minutes(OAUTH_STATE_TTL_MINUTES))
        .ok_or_else(|| InfraError::OAuth("unknown or expired oauth state".to_string()))?;

    state
        .oauth_manager()?
        .authenticate_with_code(&pending.user_id, &code)
        .await?;
    Ok(pending.user_id)
}

pub(crate) async fn access_token_for(state: &AppState, user_id: &str) -> Result<String, InfraError> {
    state
        .oauth_manager()?
        .ensure_access_token(user_id)
        .await?
        .into_access_token()
}

/// Pushes the user's tasks in the sync window into Google Calendar. A task
/// that fails to insert is logged and counted, the rest still go through.
pub async fn sync_tasks_impl(state: &AppState, user_id: &str) -> Result<SyncSummary, InfraError> {
    let access_token = access_token_for(state, user_id).await?;
    let settings = state.settings();
    let window = resolve_window(None, None, state.now(), settings.sync_window_days)?;
    let repository = state.tasks.clone();
    let owner = user_id.to_string();
    let tasks = run_blocking(move || repository.list(&owner, Some(window))).await?;

    let mut summary = SyncSummary { synced: 0, failed: 0 };
    for task in &tasks {
        let created = state
            .calendar_client
            .create_event(&access_token, &settings.google_calendar_id, &encode_task_event(task))
            .await;
        match created {
            Ok(event_id) => {
                tracing::debug!(user_id, task_id = %task.id, event_id = %event_id, "task synced");
                summary.synced += 1;
            }
            Err(InfraError::ReauthenticationRequired) => return Err(InfraError::ReauthenticationRequired),
            Err(error) => {
                tracing::warn!(user_id, task_id = %task.id, error = %error, "task sync failed");
                summary.failed += 1;
            }
        }
    }

    tracing::info!(user_id, synced = summary.synced, failed = summary.failed, "calendar sync finished");
    Ok(summary)
}

pub async fn list_events_impl(
    state: &AppState,
    user_id: &str,
    window: TimeWindowQuery,
) -> Result<Vec<ExternalEvent>, InfraError> {
    let (from, to) = resolve_window(
        window.from,
        window.to,
        state.now(),
        state.settings().events_window_days,
    )?;
    fetch_external_events(state, user_id, from, to).await
}

pub(crate) async fn fetch_external_events(
    state: &AppState,
    user_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<ExternalEvent>, InfraError> {
    let access_token = access_token_for(state, user_id).await?;
    let events = state
        .calendar_client
        .list_events(&access_token, &state.settings().google_calendar_id, from, to)
        .await?;

    let mut external = Vec::with_capacity(events.len());
    for event in events.iter().filter(|event| !event.is_cancelled()) {
        match to_external_event(event) {
            Ok(mapped) => external.push(mapped),
            Err(error) => {
                tracing::warn!(user_id, event_id = ?event.id, error = %error, "skipping calendar event");
            }
        }
    }
    Ok(external)
}

pub fn disconnect_impl(state: &AppState, user_id: &str) -> Result<(), InfraError> {
    state.oauth_manager()?.clear_stored_token(user_id)?;
    tracing::info!(user_id, "google calendar disconnected");
    Ok(())
}

pub fn list_event_times_impl(state: &AppState, user_id: &str) -> Result<Vec<GoogleEventTime>, InfraError> {
    state.event_times.list(user_id)
}

pub fn get_event_time_impl(
    state: &AppState,
    user_id: &str,
    event_id: &str,
) -> Result<GoogleEventTime, InfraError> {
    let event_id = normalize_event_id(event_id)?;
    state
        .event_times
        .get(user_id, &event_id)?
        .ok_or_else(|| InfraError::NotFound(format!("event time not found: {event_id}")))
}

/// Creates or replaces the annotation for `(user, event)`.
pub fn upsert_event_time_impl(
    state: &AppState,
    user_id: &str,
    request: CreateEventTimeRequest,
) -> Result<GoogleEventTime, InfraError> {
    let event_time = GoogleEventTime {
        user_id: user_id.to_string(),
        event_id: normalize_event_id(&request.event_id)?,
        duration_seconds: request.duration_seconds,
        title: non_empty(request.title),
        description: non_empty(request.description),
        is_finished: request.is_finished,
        start: request.start,
        end: request.end,
        updated_at: state.now(),
    };
    event_time.validate().map_err(InfraError::Validation)?;
    state.event_times.upsert(&event_time)?;
    Ok(event_time)
}

pub fn patch_event_time_impl(
    state: &AppState,
    user_id: &str,
    event_id: &str,
    request: PatchEventTimeRequest,
) -> Result<GoogleEventTime, InfraError> {
    let mut event_time = get_event_time_impl(state, user_id, event_id)?;
    if let Some(duration_seconds) = request.duration_seconds {
        event_time.duration_seconds = duration_seconds;
    }
    if let Some(title) = request.title {
        event_time.title = non_empty(Some(title));
    }
    if let Some(description) = request.description {
        event_time.description = non_empty(Some(description));
    }
    if let Some(is_finished) = request.is_finished {
        event_time.is_finished = is_finished;
    }
    if request.start.is_some() {
        event_time.start = request.start;
    }
    if request.end.is_some() {
        event_time.end = request.end;
    }
    event_time.updated_at = state.now();
    event_time.validate().map_err(InfraError::Validation)?;
    state.event_times.upsert(&event_time)?;
    Ok(event_time)
}

pub fn delete_event_time_impl(state: &AppState, user_id: &str, event_id: &str) -> Result<(), InfraError> {
    let event_id = normalize_event_id(event_id)?;
    if !state.event_times.delete(user_id, &event_id)? {
        return Err(InfraError::NotFound(format!("event time not found: {event_id}")));
    }
    Ok(())
}
