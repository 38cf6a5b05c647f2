use crate::domain::models::Task;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{format_stored_time, open_connection, parse_stored_time};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

const TASK_COLUMNS: &str =
    "id, user_id, title, description, start_at, end_at, color, is_finished, duration_seconds";

#[derive(Debug, Clone)]
pub struct SqliteTaskRepository {
    db_path: PathBuf,
}

impl SqliteTaskRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }

    pub fn insert(&self, task: &Task, created_at: DateTime<Utc>) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            &format!(
                "INSERT INTO tasks ({TASK_COLUMNS}, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                task.id,
                task.user_id,
                task.title,
                task.description,
                format_stored_time(task.start),
                format_stored_time(task.end),
                task.color,
                task.is_finished,
                task.duration_seconds,
                format_stored_time(created_at)
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, user_id: &str, task_id: &str) -> Result<Option<Task>, InfraError> {
        let connection = self.connect()?;
        let raw = connection
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1 AND id = ?2"),
                params![user_id, task_id],
                raw_task,
            )
            .optional()?;
        raw.map(RawTask::into_task).transpose()
    }

    /// Tasks ordered by start. With a window, only tasks overlapping it.
    pub fn list(
        &self,
        user_id: &str,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<Task>, InfraError> {
        let (from, to) = match window {
            Some((from, to)) => (Some(format_stored_time(from)), Some(format_stored_time(to))),
            None => (None, None),
        };
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE user_id = ?1 AND (?2 IS NULL OR (start_at < ?3 AND end_at > ?2))
             ORDER BY start_at, created_at"
        ))?;
        let rows = statement.query_map(params![user_id, from, to], raw_task)?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?.into_task()?);
        }
        Ok(tasks)
    }

    pub fn update(&self, task: &Task) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let updated = connection.execute(
            "UPDATE tasks SET
               title = ?3, description = ?4, start_at = ?5, end_at = ?6,
               color = ?7, is_finished = ?8, duration_seconds = ?9
             WHERE user_id = ?1 AND id = ?2",
            params![
                task.user_id,
                task.id,
                task.title,
                task.description,
                format_stored_time(task.start),
                format_stored_time(task.end),
                task.color,
                task.is_finished,
                task.duration_seconds
            ],
        )?;
        Ok(updated > 0)
    }

    /// Overwrites the tracked duration; last write wins.
    pub fn set_duration(
        &self,
        user_id: &str,
        task_id: &str,
        duration_seconds: i64,
        mark_finished: bool,
    ) -> Result<Option<Task>, InfraError> {
        let connection = self.connect()?;
        let updated = connection.execute(
            "UPDATE tasks SET
               duration_seconds = ?3,
               is_finished = CASE WHEN ?4 THEN 1 ELSE is_finished END
             WHERE user_id = ?1 AND id = ?2",
            params![user_id, task_id, duration_seconds.max(0), mark_finished],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        drop(connection);
        self.get(user_id, task_id)
    }

    pub fn delete(&self, user_id: &str, task_id: &str) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let deleted = connection.execute(
            "DELETE FROM tasks WHERE user_id = ?1 AND id = ?2",
            params![user_id, task_id],
        )?;
        Ok(deleted > 0)
    }
}

struct RawTask {
    id: String,
    user_id: String,
    title: String,
    description: Option<String>,
    start: String,
    end: String,
    color: String,
    is_finished: bool,
    duration_seconds: i64,
}

impl RawTask {
    fn into_task(self) -> Result<Task, InfraError> {
        Ok(Task {
            start: parse_stored_time(&self.start, "tasks.start_at")?,
            end: parse_stored_time(&self.end, "tasks.end_at")?,
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            color: self.color,
            is_finished: self.is_finished,
            duration_seconds: self.duration_seconds,
        })
    }
}

fn raw_task(row: &Row<'_>) -> rusqlite::Result<RawTask> {
    Ok(RawTask {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        start: row.get(4)?,
        end: row.get(5)?,
        color: row.get(6)?,
        is_finished: row.get(7)?,
        duration_seconds: row.get(8)?,
    })
}
