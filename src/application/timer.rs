use crate::application::state::AppState;
use crate::domain::models::{validate_tracked_seconds, TimerTarget};
use crate::domain::timer::{TimerCommand, TimerSession, TimerStatus, Transition};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTimerRequest {
    /// A task id, or `gcal-<eventId>` for a Google event.
    pub task_id: String,
    #[serde(default)]
    pub initial_seconds: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTimerRequest {
    #[serde(default)]
    pub finish: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub status: TimerStatus,
    pub elapsed_seconds: i64,
    pub task_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_seconds: Option<i64>,
}

impl TimerSnapshot {
    fn of(session: &TimerSession, now: DateTime<Utc>) -> Self {
        Self {
            status: session.status(),
            elapsed_seconds: session.elapsed_seconds(now),
            task_id: session.target().map(TimerTarget::calendar_id),
            started_at: session.started_at(),
            saved_seconds: None,
        }
    }
}

pub fn get_timer_impl(state: &AppState, user_id: &str) -> Result<TimerSnapshot, InfraError> {
    let now = state.now();
    let session = current_session(state, user_id)?;
    Ok(TimerSnapshot::of(&session, now))
}

/// Seeds the session with the target's stored duration so that stopping
/// persists the cumulative total.
pub fn start_timer_impl(
    state: &AppState,
    user_id: &str,
    request: StartTimerRequest,
) -> Result<TimerSnapshot, InfraError> {
    let target = TimerTarget::from_calendar_id(&request.task_id)
        .ok_or_else(|| InfraError::Validation("taskId must not be empty".to_string()))?;
    if let Some(seconds) = request.initial_seconds {
        validate_tracked_seconds(seconds, "initialSeconds").map_err(InfraError::Validation)?;
    }

    let stored_seconds = match &target {
        TimerTarget::Task { task_id } => state
            .tasks
            .get(user_id, task_id)?
            .map(|task| task.duration_seconds)
            .ok_or_else(|| InfraError::NotFound(format!("task not found: {task_id}")))?,
        TimerTarget::GoogleEvent { event_id } => state
            .event_times
            .get(user_id, event_id)?
            .map(|event_time| event_time.duration_seconds)
            .unwrap_or(0),
    };
    let initial_seconds = request.initial_seconds.unwrap_or(stored_seconds);

    let now = state.now();
    let transition = apply(state, user_id, |session| {
        session.start_from(Some(target.clone()), initial_seconds, now)
    })?;
    if transition.changed {
        tracing::info!(user_id, target = %target.calendar_id(), initial_seconds, "timer started");
    }
    Ok(TimerSnapshot::of(&transition.session, now))
}

pub fn pause_timer_impl(state: &AppState, user_id: &str) -> Result<TimerSnapshot, InfraError> {
    let now = state.now();
    let transition = apply(state, user_id, |session| session.pause(now))?;
    Ok(TimerSnapshot::of(&transition.session, now))
}

pub fn resume_timer_impl(state: &AppState, user_id: &str) -> Result<TimerSnapshot, InfraError> {
    let now = state.now();
    let transition = apply(state, user_id, |session| session.resume(now))?;
    Ok(TimerSnapshot::of(&transition.session, now))
}

/// The total is persisted before the session is reset, so a failed write
/// leaves the timer running or paused.
pub fn stop_timer_impl(
    state: &AppState,
    user_id: &str,
    request: StopTimerRequest,
) -> Result<TimerSnapshot, InfraError> {
    let now = state.now();
    let current = current_session(state, user_id)?;
    let transition = current.stop(now);

    let mut saved_seconds = None;
    for command in &transition.commands {
        saved_seconds = execute_command(state, user_id, command, request.finish, now)?.or(saved_seconds);
    }
    if transition.changed {
        let mut timers = state.timers()?;
        // Leave a session another request changed in the meantime.
        if timers.get(user_id) == Some(&current) {
            timers.remove(user_id);
        }
    }

    let mut snapshot = TimerSnapshot::of(&transition.session, now);
    snapshot.saved_seconds = saved_seconds;
    Ok(snapshot)
}

fn current_session(state: &AppState, user_id: &str) -> Result<TimerSession, InfraError> {
    Ok(state.timers()?.get(user_id).cloned().unwrap_or_default())
}

/// Runs a command-free transition against the user's session and stores the
/// result.
fn apply<F>(state: &AppState, user_id: &str, step: F) -> Result<Transition, InfraError>
where
    F: FnOnce(&TimerSession) -> Transition,
{
    let mut timers = state.timers()?;
    let current = timers.get(user_id).cloned().unwrap_or_default();
    let transition = step(&current);
    if transition.session.status() == TimerStatus::Idle {
        timers.remove(user_id);
    } else {
        timers.insert(user_id.to_string(), transition.session.clone());
    }
    Ok(transition)
}

fn execute_command(
    state: &AppState,
    user_id: &str,
    command: &TimerCommand,
    finish: bool,
    now: DateTime<Utc>,
) -> Result<Option<i64>, InfraError> {
    match command {
        TimerCommand::PersistDuration {
            target: TimerTarget::Task { task_id },
            total_seconds,
        } => {
            let saved = state
                .tasks
                .set_duration(user_id, task_id, *total_seconds, finish)?;
            if saved.is_none() {
                tracing::warn!(
                    user_id,
                    task_id = %task_id,
                    total_seconds,
                    "timer stopped for a task that no longer exists"
                );
                return Ok(None);
            }
            tracing::info!(user_id, task_id = %task_id, total_seconds, finish, "saved task duration");
            Ok(Some(*total_seconds))
        }
        TimerCommand::PersistDuration {
            target: TimerTarget::GoogleEvent { event_id },
            total_seconds,
        } => {
            state
                .event_times
                .set_duration(user_id, event_id, *total_seconds, finish, now)?;
            tracing::info!(user_id, event_id = %event_id, total_seconds, finish, "saved google event duration");
            Ok(Some(*total_seconds))
        }
        TimerCommand::DiscardUnattached { total_seconds } => {
            tracing::warn!(user_id, total_seconds, "timer stopped without a target; duration discarded");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::state::tests::TempWorkspace;
    use crate::application::tasks::{create_task_impl, get_task_impl, CreateTaskRequest};
    use crate::domain::models::MAX_TRACKED_SECONDS;
    use crate::infrastructure::storage::open_connection;
    use chrono::Duration;
    use std::sync::{Arc, Mutex};

    struct Clock(Arc<Mutex<DateTime<Utc>>>);

    impl Clock {
        fn new(start: &str) -> Self {
            let start = DateTime::parse_from_rfc3339(start)
                .expect("valid datetime")
                .with_timezone(&Utc);
            Self(Arc::new(Mutex::new(start)))
        }

        fn advance(&self, seconds: i64) {
            let mut now = self.0.lock().expect("clock lock");
            *now += Duration::seconds(seconds);
        }

        fn attach(&self, workspace: &TempWorkspace) -> AppState {
            let shared = Arc::clone(&self.0);
            workspace
                .app_state()
                .with_now_provider(Arc::new(move || *shared.lock().expect("clock lock")))
        }
    }

    fn seeded_task(state: &AppState, duration_seconds: i64) -> String {
        state
            .users
            .create("usr-1", "ana@example.com", "Ana", "hash", Utc::now())
            .expect("create user");
        let now = state.now();
        create_task_impl(
            state,
            "usr-1",
            CreateTaskRequest {
                title: "Deep work".to_string(),
                description: None,
                start: now,
                end: now + Duration::hours(1),
                color: None,
                is_finished: false,
                duration_seconds,
            },
        )
        .expect("create task")
        .id
    }

    #[test]
    fn pause_resume_stop_persists_running_intervals() {
        let workspace = TempWorkspace::new();
        let clock = Clock::new("2026-02-16T09:00:00Z");
        let state = clock.attach(&workspace);
        let task_id = seeded_task(&state, 0);

        let started = start_timer_impl(
            &state,
            "usr-1",
            StartTimerRequest {
                task_id: task_id.clone(),
                initial_seconds: None,
            },
        )
        .expect("start");
        assert_eq!(started.status, TimerStatus::Running);
        assert_eq!(started.task_id.as_deref(), Some(task_id.as_str()));

        clock.advance(5);
        let paused = pause_timer_impl(&state, "usr-1").expect("pause");
        assert_eq!(paused.elapsed_seconds, 5);
        assert_eq!(paused.started_at, None);

        clock.advance(3);
        assert_eq!(get_timer_impl(&state, "usr-1").expect("get").elapsed_seconds, 5);
        resume_timer_impl(&state, "usr-1").expect("resume");

        clock.advance(3);
        let stopped = stop_timer_impl(&state, "usr-1", StopTimerRequest { finish: true }).expect("stop");
        assert_eq!(stopped.status, TimerStatus::Idle);
        assert_eq!(stopped.saved_seconds, Some(8));

        let task = get_task_impl(&state, "usr-1", &task_id).expect("task");
        assert_eq!(task.duration_seconds, 8);
        assert!(task.is_finished);
    }

    #[test]
    fn start_continues_from_stored_duration() {
        let workspace = TempWorkspace::new();
        let clock = Clock::new("2026-02-16T09:00:00Z");
        let state = clock.attach(&workspace);
        let task_id = seeded_task(&state, 100);

        start_timer_impl(
            &state,
            "usr-1",
            StartTimerRequest {
                task_id: task_id.clone(),
                initial_seconds: None,
            },
        )
        .expect("start");
        clock.advance(20);
        stop_timer_impl(&state, "usr-1", StopTimerRequest::default()).expect("stop");

        let task = get_task_impl(&state, "usr-1", &task_id).expect("task");
        assert_eq!(task.duration_seconds, 120);
        assert!(!task.is_finished);
    }

    #[test]
    fn google_event_durations_go_to_the_side_table() {
        let workspace = TempWorkspace::new();
        let clock = Clock::new("2026-02-16T09:00:00Z");
        let state = clock.attach(&workspace);
        seeded_task(&state, 0);

        start_timer_impl(
            &state,
            "usr-1",
            StartTimerRequest {
                task_id: "gcal-evt-1".to_string(),
                initial_seconds: Some(60),
            },
        )
        .expect("start");
        clock.advance(30);
        stop_timer_impl(&state, "usr-1", StopTimerRequest::default()).expect("stop");

        let event_time = state
            .event_times
            .get("usr-1", "evt-1")
            .expect("get")
            .expect("annotation created");
        assert_eq!(event_time.duration_seconds, 90);
    }

    #[test]
    fn idle_and_repeated_transitions_are_no_ops() {
        let workspace = TempWorkspace::new();
        let clock = Clock::new("2026-02-16T09:00:00Z");
        let state = clock.attach(&workspace);
        let task_id = seeded_task(&state, 0);

        let stopped = stop_timer_impl(&state, "usr-1", StopTimerRequest::default()).expect("stop idle");
        assert_eq!(stopped.status, TimerStatus::Idle);
        assert_eq!(stopped.saved_seconds, None);
        assert_eq!(pause_timer_impl(&state, "usr-1").expect("pause idle").status, TimerStatus::Idle);

        let request = StartTimerRequest {
            task_id,
            initial_seconds: None,
        };
        start_timer_impl(&state, "usr-1", request.clone()).expect("start");
        clock.advance(4);
        let again = start_timer_impl(&state, "usr-1", request).expect("start again");
        assert_eq!(again.elapsed_seconds, 4);
        assert_eq!(get_timer_impl(&state, "usr-2").expect("other user").status, TimerStatus::Idle);
    }

    #[test]
    fn start_rejects_unknown_task_and_negative_seed() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        seeded_task(&state, 0);

        let missing = start_timer_impl(
            &state,
            "usr-1",
            StartTimerRequest {
                task_id: "tsk-missing".to_string(),
                initial_seconds: None,
            },
        );
        assert!(matches!(missing, Err(InfraError::NotFound(_))));

        let negative = start_timer_impl(
            &state,
            "usr-1",
            StartTimerRequest {
                task_id: "gcal-evt".to_string(),
                initial_seconds: Some(-1),
            },
        );
        assert!(matches!(negative, Err(InfraError::Validation(_))));
    }

    #[test]
    fn oversized_durations_are_rejected_and_timers_stay_usable() {
        let workspace = TempWorkspace::new();
        let clock = Clock::new("2026-02-16T09:00:00Z");
        let state = clock.attach(&workspace);
        let task_id = seeded_task(&state, MAX_TRACKED_SECONDS);

        let now = state.now();
        let oversized = create_task_impl(
            &state,
            "usr-1",
            CreateTaskRequest {
                title: "Forever".to_string(),
                description: None,
                start: now,
                end: now + Duration::hours(1),
                color: None,
                is_finished: false,
                duration_seconds: i64::MAX / 100,
            },
        );
        assert!(matches!(oversized, Err(InfraError::Validation(_))));

        let oversized_seed = start_timer_impl(
            &state,
            "usr-1",
            StartTimerRequest {
                task_id: task_id.clone(),
                initial_seconds: Some(i64::MAX / 100),
            },
        );
        assert!(matches!(oversized_seed, Err(InfraError::Validation(_))));

        start_timer_impl(
            &state,
            "usr-1",
            StartTimerRequest {
                task_id,
                initial_seconds: None,
            },
        )
        .expect("start at the bound");
        clock.advance(1);
        let snapshot = get_timer_impl(&state, "usr-1").expect("get");
        assert_eq!(snapshot.elapsed_seconds, MAX_TRACKED_SECONDS + 1);
        assert_eq!(get_timer_impl(&state, "usr-2").expect("other user").status, TimerStatus::Idle);
    }

    #[test]
    fn failed_persist_keeps_the_session() {
        let workspace = TempWorkspace::new();
        let clock = Clock::new("2026-02-16T09:00:00Z");
        let state = clock.attach(&workspace);
        let task_id = seeded_task(&state, 0);

        start_timer_impl(
            &state,
            "usr-1",
            StartTimerRequest {
                task_id,
                initial_seconds: None,
            },
        )
        .expect("start");
        clock.advance(10);

        open_connection(state.database_path())
            .expect("open db")
            .execute_batch("DROP TABLE tasks")
            .expect("drop tasks");

        let stopped = stop_timer_impl(&state, "usr-1", StopTimerRequest::default());
        assert!(matches!(stopped, Err(InfraError::Sqlite(_))));

        let snapshot = get_timer_impl(&state, "usr-1").expect("get");
        assert_eq!(snapshot.status, TimerStatus::Running);
        assert_eq!(snapshot.elapsed_seconds, 10);
    }
}
