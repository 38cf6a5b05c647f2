use crate::domain::layout::{compute_layout, LayoutEvent, LayoutSlot};
use crate::domain::models::{GoogleEventTime, Task, TimerTarget};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

pub const GOOGLE_EVENT_COLOR: &str = "#4285f4";

/// A Google Calendar event reduced to what the calendar view needs.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalEvent {
    pub event_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    Task,
    Google,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEntry {
    pub id: String,
    pub source: EntrySource,
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub color: String,
    pub is_finished: bool,
    pub duration_seconds: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutSlot>,
}

pub fn merge_entries(
    tasks: &[Task],
    google_events: &[ExternalEvent],
    event_times: &[GoogleEventTime],
) -> Vec<CalendarEntry> {
    let annotations = event_times
        .iter()
        .map(|annotation| (annotation.event_id.as_str(), annotation))
        .collect::<HashMap<_, _>>();

    let local = tasks.iter().map(|task| CalendarEntry {
        id: task.id.clone(),
        source: EntrySource::Task,
        title: task.title.clone(),
        description: task.description.clone(),
        start: task.start,
        end: task.end,
        color: task.color.clone(),
        is_finished: task.is_finished,
        duration_seconds: task.duration_seconds,
        layout: None,
    });

    let external = google_events.iter().map(|event| {
        let annotation = annotations.get(event.event_id.as_str());
        CalendarEntry {
            id: TimerTarget::GoogleEvent {
                event_id: event.event_id.clone(),
            }
            .calendar_id(),
            source: EntrySource::Google,
            title: annotation
                .and_then(|value| value.title.clone())
                .filter(|title| !title.trim().is_empty())
                .unwrap_or_else(|| event.title.clone()),
            description: annotation
                .and_then(|value| value.description.clone())
                .or_else(|| event.description.clone()),
            start: event.start,
            end: event.end,
            color: GOOGLE_EVENT_COLOR.to_string(),
            is_finished: annotation.map(|value| value.is_finished).unwrap_or(false),
            duration_seconds: annotation.map(|value| value.duration_seconds).unwrap_or(0),
            layout: None,
        }
    });

    let mut entries = local.chain(external).collect::<Vec<_>>();
    entries.sort_by(|left, right| left.start.cmp(&right.start));
    entries
}

pub fn with_layout(mut entries: Vec<CalendarEntry>) -> Vec<CalendarEntry> {
    let events = entries
        .iter()
        .map(|entry| LayoutEvent::new(entry.id.clone(), entry.start, entry.end))
        .collect::<Vec<_>>();
    let layout = compute_layout(&events);
    for entry in &mut entries {
        entry.layout = layout.get(&entry.id).copied();
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::DEFAULT_TASK_COLOR;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_task(id: &str, start: &str, end: &str) -> Task {
        Task {
            id: id.to_string(),
            user_id: "usr-1".to_string(),
            title: format!("Task {id}"),
            description: None,
            start: fixed_time(start),
            end: fixed_time(end),
            color: DEFAULT_TASK_COLOR.to_string(),
            is_finished: false,
            duration_seconds: 42,
        }
    }

    fn sample_event(id: &str, start: &str, end: &str) -> ExternalEvent {
        ExternalEvent {
            event_id: id.to_string(),
            title: "Standup".to_string(),
            description: Some("daily".to_string()),
            start: fixed_time(start),
            end: fixed_time(end),
        }
    }

    #[test]
    fn merge_prefixes_google_ids_and_sorts_by_start() {
        let entries = merge_entries(
            &[sample_task("tsk-1", "2026-02-16T10:00:00Z", "2026-02-16T11:00:00Z")],
            &[sample_event("evt-1", "2026-02-16T09:00:00Z", "2026-02-16T09:15:00Z")],
            &[],
        );
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "gcal-evt-1");
        assert_eq!(entries[0].source, EntrySource::Google);
        assert_eq!(entries[0].duration_seconds, 0);
        assert_eq!(entries[1].id, "tsk-1");
        assert_eq!(entries[1].duration_seconds, 42);
    }

    #[test]
    fn merge_overlays_local_annotations() {
        let annotation = GoogleEventTime {
            user_id: "usr-1".to_string(),
            event_id: "evt-1".to_string(),
            duration_seconds: 900,
            title: Some("Standup (tracked)".to_string()),
            description: None,
            is_finished: true,
            start: None,
            end: None,
            updated_at: fixed_time("2026-02-16T09:20:00Z"),
        };
        let entries = merge_entries(
            &[],
            &[sample_event("evt-1", "2026-02-16T09:00:00Z", "2026-02-16T09:15:00Z")],
            &[annotation],
        );
        assert_eq!(entries[0].title, "Standup (tracked)");
        assert_eq!(entries[0].description.as_deref(), Some("daily"));
        assert!(entries[0].is_finished);
        assert_eq!(entries[0].duration_seconds, 900);
    }

    #[test]
    fn layout_spans_tasks_and_google_events() {
        let entries = with_layout(merge_entries(
            &[sample_task("tsk-1", "2026-02-16T09:00:00Z", "2026-02-16T10:00:00Z")],
            &[sample_event("evt-1", "2026-02-16T09:30:00Z", "2026-02-16T10:30:00Z")],
            &[],
        ));
        let task = entries.iter().find(|entry| entry.id == "tsk-1").expect("task entry");
        let google = entries
            .iter()
            .find(|entry| entry.id == "gcal-evt-1")
            .expect("google entry");
        assert_eq!(task.layout.map(|slot| slot.left_percent), Some(0.0));
        assert_eq!(google.layout.map(|slot| slot.left_percent), Some(50.0));
    }
}
