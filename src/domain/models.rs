use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TASK_COLOR: &str = "#3b82f6";
pub const GOOGLE_EVENT_PREFIX: &str = "gcal-";
/// Upper bound for any tracked duration: one hundred years.
pub const MAX_TRACKED_SECONDS: i64 = 100 * 366 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub google_connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub color: String,
    pub is_finished: bool,
    pub duration_seconds: i64,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.user_id, "task.userId")?;
        validate_non_empty(&self.title, "task.title")?;
        validate_color(&self.color, "task.color")?;
        if self.end < self.start {
            return Err("task.end must not be before task.start".to_string());
        }
        validate_tracked_seconds(self.duration_seconds, "task.durationSeconds")?;
        Ok(())
    }

    pub fn overlaps_window(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.start < to && self.end > from
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEventTime {
    pub user_id: String,
    pub event_id: String,
    pub duration_seconds: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_finished: bool,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl GoogleEventTime {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.user_id, "eventTime.userId")?;
        validate_non_empty(&self.event_id, "eventTime.eventId")?;
        validate_tracked_seconds(self.duration_seconds, "eventTime.durationSeconds")?;
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if end < start {
                return Err("eventTime.end must not be before eventTime.start".to_string());
            }
        }
        Ok(())
    }
}

/// What a running timer is attached to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimerTarget {
    Task { task_id: String },
    GoogleEvent { event_id: String },
}

impl TimerTarget {
    /// Calendar ids prefixed with `gcal-` refer to Google events; anything
    /// else is a local task id.
    pub fn from_calendar_id(raw: &str) -> Option<Self> {
        let id = raw.trim();
        if id.is_empty() {
            return None;
        }
        match id.strip_prefix(GOOGLE_EVENT_PREFIX) {
            Some(event_id) if !event_id.is_empty() => Some(Self::GoogleEvent {
                event_id: event_id.to_string(),
            }),
            Some(_) => None,
            None => Some(Self::Task {
                task_id: id.to_string(),
            }),
        }
    }

    pub fn calendar_id(&self) -> String {
        match self {
            Self::Task { task_id } => task_id.clone(),
            Self::GoogleEvent { event_id } => format!("{GOOGLE_EVENT_PREFIX}{event_id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub token_type: String,
    pub scope: Option<String>,
}

impl OAuthToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        self.expires_at > now + chrono::Duration::seconds(leeway_seconds)
            && !self.access_token.trim().is_empty()
    }
}

pub fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

pub fn validate_tracked_seconds(value: i64, field_name: &str) -> Result<(), String> {
    if !(0..=MAX_TRACKED_SECONDS).contains(&value) {
        return Err(format!(
            "{field_name} must be between 0 and {MAX_TRACKED_SECONDS}"
        ));
    }
    Ok(())
}

pub fn validate_color(value: &str, field_name: &str) -> Result<(), String> {
    let Some(hex) = value.strip_prefix('#') else {
        return Err(format!("{field_name} must be #RRGGBB"));
    };
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("{field_name} must be #RRGGBB"));
    }
    Ok(())
}

pub fn validate_email(value: &str) -> Result<(), String> {
    let value = value.trim();
    let Some((local, domain)) = value.split_once('@') else {
        return Err("email must be a valid address".to_string());
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || value.contains(' ') {
        return Err("email must be a valid address".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_task() -> Task {
        Task {
            id: "tsk-1".to_string(),
            user_id: "usr-1".to_string(),
            title: "Write report".to_string(),
            description: Some("quarterly numbers".to_string()),
            start: fixed_time("2026-02-16T09:00:00Z"),
            end: fixed_time("2026-02-16T10:00:00Z"),
            color: DEFAULT_TASK_COLOR.to_string(),
            is_finished: false,
            duration_seconds: 0,
        }
    }

    #[test]
    fn task_validate_accepts_valid_task() {
        assert!(sample_task().validate().is_ok());
    }

    #[test]
    fn task_validate_rejects_reverse_range_and_negative_duration() {
        let mut task = sample_task();
        task.end = fixed_time("2026-02-16T08:00:00Z");
        assert!(task.validate().is_err());

        let mut task = sample_task();
        task.duration_seconds = -1;
        assert!(task.validate().is_err());
    }

    #[test]
    fn tracked_durations_are_bounded() {
        let mut task = sample_task();
        task.duration_seconds = MAX_TRACKED_SECONDS;
        assert!(task.validate().is_ok());
        task.duration_seconds = i64::MAX / 100;
        assert!(task.validate().is_err());

        let event_time = GoogleEventTime {
            user_id: "usr-1".to_string(),
            event_id: "evt-1".to_string(),
            duration_seconds: MAX_TRACKED_SECONDS + 1,
            title: None,
            description: None,
            is_finished: false,
            start: None,
            end: None,
            updated_at: fixed_time("2026-02-16T09:00:00Z"),
        };
        assert!(event_time.validate().is_err());
    }

    #[test]
    fn task_validate_rejects_bad_color() {
        let mut task = sample_task();
        task.color = "blue".to_string();
        assert!(task.validate().is_err());
        task.color = "#12345g".to_string();
        assert!(task.validate().is_err());
    }

    #[test]
    fn task_overlap_window_is_exclusive_at_edges() {
        let task = sample_task();
        assert!(task.overlaps_window(
            fixed_time("2026-02-16T09:30:00Z"),
            fixed_time("2026-02-16T11:00:00Z")
        ));
        assert!(!task.overlaps_window(
            fixed_time("2026-02-16T10:00:00Z"),
            fixed_time("2026-02-16T11:00:00Z")
        ));
    }

    #[test]
    fn timer_target_parses_calendar_ids() {
        assert_eq!(
            TimerTarget::from_calendar_id("gcal-abc123"),
            Some(TimerTarget::GoogleEvent {
                event_id: "abc123".to_string()
            })
        );
        assert_eq!(
            TimerTarget::from_calendar_id(" tsk-9 "),
            Some(TimerTarget::Task {
                task_id: "tsk-9".to_string()
            })
        );
        assert_eq!(TimerTarget::from_calendar_id("gcal-"), None);
        assert_eq!(TimerTarget::from_calendar_id("  "), None);
        assert_eq!(
            TimerTarget::GoogleEvent {
                event_id: "abc".to_string()
            }
            .calendar_id(),
            "gcal-abc"
        );
    }

    #[test]
    fn email_validation() {
        assert!(validate_email("ana@example.com").is_ok());
        assert!(validate_email("ana@example").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("no-at-sign").is_err());
    }

    #[test]
    fn task_serializes_with_camel_case_fields() {
        let json = serde_json::to_value(sample_task()).expect("serialize task");
        assert_eq!(json["isFinished"], false);
        assert_eq!(json["durationSeconds"], 0);
        assert_eq!(json["userId"], "usr-1");
    }
}
