use crate::domain::calendar::ExternalEvent;
use crate::domain::models::Task;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;

const KEY_TASK_ID: &str = "chronoflow_task_id";

/// Either `dateTime` (timed events) or `date` (all-day events) is set.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventDateTime {
    #[serde(rename = "dateTime", default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventExtendedProperties {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub private: HashMap<String, String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct GoogleCalendarEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub start: CalendarEventDateTime,
    #[serde(default)]
    pub end: CalendarEventDateTime,
    #[serde(rename = "extendedProperties", default, skip_serializing_if = "Option::is_none")]
    pub extended_properties: Option<CalendarEventExtendedProperties>,
}

impl GoogleCalendarEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }
}

pub fn encode_task_event(task: &Task) -> GoogleCalendarEvent {
    let mut private = HashMap::new();
    private.insert(KEY_TASK_ID.to_string(), task.id.clone());

    GoogleCalendarEvent {
        id: None,
        summary: Some(task.title.clone()),
        description: task.description.clone(),
        status: Some("confirmed".to_string()),
        start: CalendarEventDateTime {
            date_time: Some(task.start.to_rfc3339()),
            ..CalendarEventDateTime::default()
        },
        end: CalendarEventDateTime {
            date_time: Some(task.end.to_rfc3339()),
            ..CalendarEventDateTime::default()
        },
        extended_properties: Some(CalendarEventExtendedProperties { private }),
    }
}

/// Reduces a Google event to the calendar view's shape. All-day events
/// start at midnight UTC of their date.
pub fn to_external_event(event: &GoogleCalendarEvent) -> Result<ExternalEvent, InfraError> {
    let event_id = event
        .id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| InfraError::OAuth("calendar event has no id".to_string()))?;

    let start = parse_event_time(&event.start, "start")?;
    let end = parse_event_time(&event.end, "end")?;
    if end < start {
        return Err(InfraError::OAuth(format!(
            "calendar event {event_id} ends before it starts"
        )));
    }

    Ok(ExternalEvent {
        event_id: event_id.to_string(),
        title: event
            .summary
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("(no title)")
            .to_string(),
        description: event.description.clone(),
        start,
        end,
    })
}

fn parse_event_time(value: &CalendarEventDateTime, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    if let Some(date_time) = value.date_time.as_deref() {
        return DateTime::parse_from_rfc3339(date_time)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|error| {
                InfraError::OAuth(format!(
                    "invalid calendar event {field_name}.dateTime '{date_time}': {error}"
                ))
            });
    }
    if let Some(date) = value.date.as_deref() {
        let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|error| {
            InfraError::OAuth(format!("invalid calendar event {field_name}.date '{date}': {error}"))
        })?;
        return Ok(parsed.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc());
    }
    Err(InfraError::OAuth(format!(
        "calendar event {field_name} has neither dateTime nor date"
    )))
}
