use crate::application::state::{next_id, AppState};
use crate::domain::models::{Task, DEFAULT_TASK_COLOR};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_finished: bool,
    #[serde(default)]
    pub duration_seconds: i64,
}

/// Fields left out are kept as they are.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub color: Option<String>,
    pub is_finished: Option<bool>,
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeWindowQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

fn normalized_description(raw: Option<String>) -> Option<String> {
    raw.as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

pub fn create_task_impl(
    state: &AppState,
    user_id: &str,
    request: CreateTaskRequest,
) -> Result<Task, InfraError> {
    let task = Task {
        id: next_id("tsk"),
        user_id: user_id.to_string(),
        title: request.title.trim().to_string(),
        description: normalized_description(request.description),
        start: request.start,
        end: request.end,
        color: request
            .color
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_TASK_COLOR.to_string()),
        is_finished: request.is_finished,
        duration_seconds: request.duration_seconds,
    };
    task.validate().map_err(InfraError::Validation)?;
    state.tasks.insert(&task, state.now())?;

    tracing::info!(user_id, task_id = %task.id, "created task");
    Ok(task)
}

pub fn list_tasks_impl(
    state: &AppState,
    user_id: &str,
    window: TimeWindowQuery,
) -> Result<Vec<Task>, InfraError> {
    let window = match (window.from, window.to) {
        (None, None) => None,
        (from, to) => Some(resolve_window(from, to, state.now(), 1)?),
    };
    state.tasks.list(user_id, window)
}

pub fn get_task_impl(state: &AppState, user_id: &str, task_id: &str) -> Result<Task, InfraError> {
    state
        .tasks
        .get(user_id, task_id.trim())?
        .ok_or_else(|| task_not_found(task_id))
}

pub fn update_task_impl(
    state: &AppState,
    user_id: &str,
    task_id: &str,
    request: UpdateTaskRequest,
) -> Result<Task, InfraError> {
    let mut task = get_task_impl(state, user_id, task_id)?;

    if let Some(title) = request.title {
        task.title = title.trim().to_string();
    }
    if let Some(description) = request.description {
        task.description = normalized_description(Some(description));
    }
    if let Some(start) = request.start {
        task.start = start;
    }
    if let Some(end) = request.end {
        task.end = end;
    }
    if let Some(color) = request.color {
        task.color = color.trim().to_string();
    }
    if let Some(is_finished) = request.is_finished {
        task.is_finished = is_finished;
    }
    if let Some(duration_seconds) = request.duration_seconds {
        task.duration_seconds = duration_seconds;
    }
    task.validate().map_err(InfraError::Validation)?;

    if !state.tasks.update(&task)? {
        return Err(task_not_found(task_id));
    }
    tracing::info!(user_id, task_id = %task.id, "updated task");
    Ok(task)
}

pub fn delete_task_impl(state: &AppState, user_id: &str, task_id: &str) -> Result<(), InfraError> {
    if !state.tasks.delete(user_id, task_id.trim())? {
        return Err(task_not_found(task_id));
    }
    tracing::info!(user_id, task_id, "deleted task");
    Ok(())
}

pub fn export_tasks_csv_impl(state: &AppState, user_id: &str) -> Result<String, InfraError> {
    let tasks = state.tasks.list(user_id, None)?;
    Ok(tasks_to_csv(&tasks))
}

pub fn tasks_to_csv(tasks: &[Task]) -> String {
    let mut out = String::from("id,title,description,start,end,color,isFinished,durationSeconds\n");
    for task in tasks {
        let row = [
            csv_escape(&task.id),
            csv_escape(&task.title),
            csv_escape(task.description.as_deref().unwrap_or("")),
            task.start.to_rfc3339(),
            task.end.to_rfc3339(),
            csv_escape(&task.color),
            task.is_finished.to_string(),
            task.duration_seconds.to_string(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn csv_escape(value: &str) -> String {
    let needs_quote = value.contains([',', '"', '\n', '\r']);
    if !needs_quote {
        return value.to_string();
    }
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn task_not_found(task_id: &str) -> InfraError {
    InfraError::NotFound(format!("task not found: {}", task_id.trim()))
}

/// Parses a `from`/`to` pair. A missing `from` means today 00:00 UTC and a
/// missing `to` means `default_days` after `from`.
pub(crate) fn resolve_window(
    from: Option<String>,
    to: Option<String>,
    now: DateTime<Utc>,
    default_days: u32,
) -> Result<(DateTime<Utc>, DateTime<Utc>), InfraError> {
    let start = match from {
        Some(raw) => parse_datetime_input(&raw, "from")?,
        None => now.date_naive().and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
    };
    let end = match to {
        Some(raw) => parse_datetime_input(&raw, "to")?,
        None => start + chrono::Duration::days(i64::from(default_days)),
    };
    if end <= start {
        return Err(InfraError::Validation("to must be after from".to_string()));
    }
    Ok((start, end))
}

fn parse_datetime_input(value: &str, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc());
    }
    Err(InfraError::Validation(format!(
        "{field_name} must be RFC3339 or YYYY-MM-DD"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::state::tests::TempWorkspace;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn create_user(state: &AppState, id: &str) {
        state
            .users
            .create(id, &format!("{id}@example.com"), id, "hash", Utc::now())
            .expect("create user");
    }

    fn request(title: &str, start: &str, end: &str) -> CreateTaskRequest {
        CreateTaskRequest {
            title: title.to_string(),
            description: Some("  ".to_string()),
            start: fixed_time(start),
            end: fixed_time(end),
            color: None,
            is_finished: false,
            duration_seconds: 0,
        }
    }

    #[test]
    fn create_applies_defaults_and_validates() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        create_user(&state, "usr-1");

        let task = create_task_impl(
            &state,
            "usr-1",
            request(" Write report ", "2026-02-16T09:00:00Z", "2026-02-16T10:00:00Z"),
        )
        .expect("create task");
        assert_eq!(task.title, "Write report");
        assert_eq!(task.color, DEFAULT_TASK_COLOR);
        assert_eq!(task.description, None);

        let empty_title = create_task_impl(
            &state,
            "usr-1",
            request("   ", "2026-02-16T09:00:00Z", "2026-02-16T10:00:00Z"),
        );
        assert!(matches!(empty_title, Err(InfraError::Validation(_))));

        let reversed = create_task_impl(
            &state,
            "usr-1",
            request("Backwards", "2026-02-16T10:00:00Z", "2026-02-16T09:00:00Z"),
        );
        assert!(matches!(reversed, Err(InfraError::Validation(_))));
    }

    #[test]
    fn tasks_are_invisible_to_other_users() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        create_user(&state, "usr-1");
        create_user(&state, "usr-2");

        let task = create_task_impl(
            &state,
            "usr-1",
            request("Mine", "2026-02-16T09:00:00Z", "2026-02-16T10:00:00Z"),
        )
        .expect("create task");

        assert!(matches!(
            get_task_impl(&state, "usr-2", &task.id),
            Err(InfraError::NotFound(_))
        ));
        assert!(matches!(
            update_task_impl(&state, "usr-2", &task.id, UpdateTaskRequest::default()),
            Err(InfraError::NotFound(_))
        ));
        assert!(matches!(
            delete_task_impl(&state, "usr-2", &task.id),
            Err(InfraError::NotFound(_))
        ));
        assert!(list_tasks_impl(&state, "usr-2", TimeWindowQuery::default())
            .expect("list")
            .is_empty());
    }

    #[test]
    fn update_is_partial_and_revalidates() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        create_user(&state, "usr-1");
        let task = create_task_impl(
            &state,
            "usr-1",
            request("Draft", "2026-02-16T09:00:00Z", "2026-02-16T10:00:00Z"),
        )
        .expect("create task");

        let updated = update_task_impl(
            &state,
            "usr-1",
            &task.id,
            UpdateTaskRequest {
                is_finished: Some(true),
                color: Some("#ff0000".to_string()),
                ..UpdateTaskRequest::default()
            },
        )
        .expect("update");
        assert!(updated.is_finished);
        assert_eq!(updated.title, "Draft");
        assert_eq!(updated.color, "#ff0000");

        let invalid = update_task_impl(
            &state,
            "usr-1",
            &task.id,
            UpdateTaskRequest {
                duration_seconds: Some(-5),
                ..UpdateTaskRequest::default()
            },
        );
        assert!(matches!(invalid, Err(InfraError::Validation(_))));

        delete_task_impl(&state, "usr-1", &task.id).expect("delete");
        assert!(matches!(
            get_task_impl(&state, "usr-1", &task.id),
            Err(InfraError::NotFound(_))
        ));
    }

    #[test]
    fn list_accepts_dates_and_rejects_inverted_windows() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        create_user(&state, "usr-1");
        create_task_impl(
            &state,
            "usr-1",
            request("Monday", "2026-02-16T09:00:00Z", "2026-02-16T10:00:00Z"),
        )
        .expect("create");
        create_task_impl(
            &state,
            "usr-1",
            request("Wednesday", "2026-02-18T09:00:00Z", "2026-02-18T10:00:00Z"),
        )
        .expect("create");

        let monday = list_tasks_impl(
            &state,
            "usr-1",
            TimeWindowQuery {
                from: Some("2026-02-16".to_string()),
                to: None,
            },
        )
        .expect("list");
        assert_eq!(monday.len(), 1);
        assert_eq!(monday[0].title, "Monday");

        let inverted = list_tasks_impl(
            &state,
            "usr-1",
            TimeWindowQuery {
                from: Some("2026-02-18".to_string()),
                to: Some("2026-02-16".to_string()),
            },
        );
        assert!(matches!(inverted, Err(InfraError::Validation(_))));
    }

    #[test]
    fn csv_export_escapes_fields() {
        let task = Task {
            id: "tsk-1".to_string(),
            user_id: "usr-1".to_string(),
            title: "Review, then \"ship\"".to_string(),
            description: Some("line one\nline two".to_string()),
            start: fixed_time("2026-02-16T09:00:00Z"),
            end: fixed_time("2026-02-16T10:00:00Z"),
            color: DEFAULT_TASK_COLOR.to_string(),
            is_finished: true,
            duration_seconds: 1800,
        };
        let csv = tasks_to_csv(&[task]);
        let mut lines = csv.splitn(2, '\n');
        assert_eq!(
            lines.next(),
            Some("id,title,description,start,end,color,isFinished,durationSeconds")
        );
        let row = lines.next().expect("data row");
        assert!(row.starts_with("tsk-1,\"Review, then \"\"ship\"\"\",\"line one\nline two\","));
        assert!(row.trim_end().ends_with("#3b82f6,true,1800"));
    }
}
