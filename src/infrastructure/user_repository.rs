use crate::domain::models::User;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{format_stored_time, open_connection, parse_stored_time};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::{Path, PathBuf};

const USER_COLUMNS: &str =
    "id, email, name, created_at, google_access_token IS NOT NULL AS google_connected";

#[derive(Debug, Clone)]
pub struct StoredCredentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct SqliteUserRepository {
    db_path: PathBuf,
}

impl SqliteUserRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }

    pub fn create(
        &self,
        id: &str,
        email: &str,
        name: &str,
        password_hash: &str,
        created_at: DateTime<Utc>,
    ) -> Result<User, InfraError> {
        let connection = self.connect()?;
        let inserted = connection.execute(
            "INSERT INTO users (id, email, name, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, email, name, password_hash, format_stored_time(created_at)],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                return Err(InfraError::Conflict(format!(
                    "an account with email {email} already exists"
                )));
            }
            Err(error) => return Err(error.into()),
        }

        Ok(User {
            id: id.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            created_at,
            google_connected: false,
        })
    }

    pub fn get(&self, user_id: &str) -> Result<Option<User>, InfraError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![user_id],
                raw_user,
            )
            .optional()?;
        row.map(RawUser::into_user).transpose()
    }

    pub fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<StoredCredentials>, InfraError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = ?1"),
                params![email],
                |row| Ok((raw_user(row)?, row.get::<_, String>(5)?)),
            )
            .optional()?;

        let Some((raw, password_hash)) = row else {
            return Ok(None);
        };
        Ok(Some(StoredCredentials {
            user: raw.into_user()?,
            password_hash,
        }))
    }
}

struct RawUser {
    id: String,
    email: String,
    name: String,
    created_at: String,
    google_connected: bool,
}

impl RawUser {
    fn into_user(self) -> Result<User, InfraError> {
        Ok(User {
            id: self.id,
            email: self.email,
            name: self.name,
            created_at: parse_stored_time(&self.created_at, "users.created_at")?,
            google_connected: self.google_connected,
        })
    }
}

fn raw_user(row: &Row<'_>) -> rusqlite::Result<RawUser> {
    Ok(RawUser {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
        google_connected: row.get(4)?,
    })
}
