use crate::infrastructure::error::InfraError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = open_connection(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

pub fn open_connection(path: &Path) -> Result<Connection, InfraError> {
    let connection = Connection::open(path)?;
    connection.busy_timeout(Duration::from_secs(5))?;
    connection.pragma_update(None, "foreign_keys", "ON")?;
    Ok(connection)
}

/// Runs blocking SQLite or hashing work off the async executor.
pub async fn run_blocking<F, R>(work: F) -> Result<R, InfraError>
where
    F: FnOnce() -> Result<R, InfraError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|error| InfraError::Background(format!("blocking task failed: {error}")))?
}

/// Fixed-width UTC text, so SQLite string comparison matches time order.
pub(crate) fn format_stored_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_stored_time(raw: &str, column: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| InfraError::InvalidConfig(format!("invalid {column} '{raw}': {error}")))
}

pub(crate) fn parse_optional_time(
    raw: Option<String>,
    column: &str,
) -> Result<Option<DateTime<Utc>>, InfraError> {
    raw.map(|value| parse_stored_time(&value, column)).transpose()
}
