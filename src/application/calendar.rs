use crate::application::google::fetch_external_events;
use crate::application::state::AppState;
use crate::application::tasks::{resolve_window, TimeWindowQuery};
use crate::domain::calendar::{merge_entries, with_layout, CalendarEntry};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::run_blocking;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarView {
    pub entries: Vec<CalendarEntry>,
    pub google_connected: bool,
    /// Set when Google is connected but its events could not be loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_error: Option<String>,
}

/// Tasks and Google events in the window, merged and laid out. Google
/// problems never hide the user's own tasks; they drop the external half
/// of the view and, unless the user must reconnect, fill `google_error`.
pub async fn calendar_view_impl(
    state: &AppState,
    user_id: &str,
    window: TimeWindowQuery,
) -> Result<CalendarView, InfraError> {
    let (from, to) = resolve_window(window.from, window.to, state.now(), 7)?;
    let repository = state.tasks.clone();
    let owner = user_id.to_string();
    let tasks = run_blocking(move || repository.list(&owner, Some((from, to)))).await?;

    let (google_events, google_connected, google_error) = if state.google_enabled() {
        match fetch_external_events(state, user_id, from, to).await {
            Ok(events) => (events, true, None),
            Err(InfraError::ReauthenticationRequired) => (Vec::new(), false, None),
            Err(error) => {
                tracing::warn!(user_id, error = %error, "google events unavailable for calendar view");
                (Vec::new(), true, Some(error.to_string()))
            }
        }
    } else {
        (Vec::new(), false, None)
    };
    let event_times = if google_events.is_empty() {
        Vec::new()
    } else {
        let repository = state.event_times.clone();
        let owner = user_id.to_string();
        run_blocking(move || repository.list(&owner)).await?
    };

    Ok(CalendarView {
        entries: with_layout(merge_entries(&tasks, &google_events, &event_times)),
        google_connected,
        google_error,
    })
}
