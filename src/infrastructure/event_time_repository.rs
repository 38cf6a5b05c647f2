use crate::domain::models::GoogleEventTime;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{
    format_stored_time, open_connection, parse_optional_time, parse_stored_time,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

const EVENT_TIME_COLUMNS: &str = "user_id, event_id, duration_seconds, title, description, \
     is_finished, start_at, end_at, updated_at";

/// Local annotations on Google events, keyed by `(user_id, event_id)`.
#[derive(Debug, Clone)]
pub struct SqliteEventTimeRepository {
    db_path: PathBuf,
}

impl SqliteEventTimeRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }

    pub fn list(&self, user_id: &str) -> Result<Vec<GoogleEventTime>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {EVENT_TIME_COLUMNS} FROM google_event_times
             WHERE user_id = ?1 ORDER BY event_id"
        ))?;
        let rows = statement.query_map(params![user_id], raw_event_time)?;
        let mut event_times = Vec::new();
        for row in rows {
            event_times.push(row?.into_event_time()?);
        }
        Ok(event_times)
    }

    pub fn get(&self, user_id: &str, event_id: &str) -> Result<Option<GoogleEventTime>, InfraError> {
        let connection = self.connect()?;
        let raw = connection
            .query_row(
                &format!(
                    "SELECT {EVENT_TIME_COLUMNS} FROM google_event_times
                     WHERE user_id = ?1 AND event_id = ?2"
                ),
                params![user_id, event_id],
                raw_event_time,
            )
            .optional()?;
        raw.map(RawEventTime::into_event_time).transpose()
    }

    pub fn upsert(&self, event_time: &GoogleEventTime) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            &format!(
                "INSERT INTO google_event_times ({EVENT_TIME_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(user_id, event_id) DO UPDATE SET
                   duration_seconds = excluded.duration_seconds,
                   title = excluded.title,
                   description = excluded.description,
                   is_finished = excluded.is_finished,
                   start_at = excluded.start_at,
                   end_at = excluded.end_at,
                   updated_at = excluded.updated_at"
            ),
            params![
                event_time.user_id,
                event_time.event_id,
                event_time.duration_seconds,
                event_time.title,
                event_time.description,
                event_time.is_finished,
                event_time.start.map(format_stored_time),
                event_time.end.map(format_stored_time),
                format_stored_time(event_time.updated_at)
            ],
        )?;
        Ok(())
    }

    /// Writes a timer result, creating the annotation on first use.
    pub fn set_duration(
        &self,
        user_id: &str,
        event_id: &str,
        duration_seconds: i64,
        mark_finished: bool,
        now: DateTime<Utc>,
    ) -> Result<GoogleEventTime, InfraError> {
        let mut event_time = self
            .get(user_id, event_id)?
            .unwrap_or_else(|| GoogleEventTime {
                user_id: user_id.to_string(),
                event_id: event_id.to_string(),
                duration_seconds: 0,
                title: None,
                description: None,
                is_finished: false,
                start: None,
                end: None,
                updated_at: now,
            });
        event_time.duration_seconds = duration_seconds.max(0);
        event_time.is_finished |= mark_finished;
        event_time.updated_at = now;
        self.upsert(&event_time)?;
        Ok(event_time)
    }

    pub fn delete(&self, user_id: &str, event_id: &str) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let deleted = connection.execute(
            "DELETE FROM google_event_times WHERE user_id = ?1 AND event_id = ?2",
            params![user_id, event_id],
        )?;
        Ok(deleted > 0)
    }
}

struct RawEventTime {
    user_id: String,
    event_id: String,
    duration_seconds: i64,
    title: Option<String>,
    description: Option<String>,
    is_finished: bool,
    start: Option<String>,
    end: Option<String>,
    updated_at: String,
}

impl RawEventTime {
    fn into_event_time(self) -> Result<GoogleEventTime, InfraError> {
        Ok(GoogleEventTime {
            start: parse_optional_time(self.start, "google_event_times.start_at")?,
            end: parse_optional_time(self.end, "google_event_times.end_at")?,
            updated_at: parse_stored_time(&self.updated_at, "google_event_times.updated_at")?,
            user_id: self.user_id,
            event_id: self.event_id,
            duration_seconds: self.duration_seconds,
            title: self.title,
            description: self.description,
            is_finished: self.is_finished,
        })
    }
}

fn raw_event_time(row: &Row<'_>) -> rusqlite::Result<RawEventTime> {
    Ok(RawEventTime {
        user_id: row.get(0)?,
        event_id: row.get(1)?,
        duration_seconds: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        is_finished: row.get(5)?,
        start: row.get(6)?,
        end: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
