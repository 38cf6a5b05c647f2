use crate::domain::models::OAuthToken;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{format_stored_time, open_connection, parse_stored_time};
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Per-user storage for Google OAuth tokens.
pub trait CredentialStore: Send + Sync {
    fn save_token(&self, user_id: &str, token: &OAuthToken) -> Result<(), InfraError>;
    fn load_token(&self, user_id: &str) -> Result<Option<OAuthToken>, InfraError>;
    fn delete_token(&self, user_id: &str) -> Result<(), InfraError>;
}

/// Keeps the token on the user's row.
#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    db_path: PathBuf,
}

impl SqliteCredentialStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn save_token(&self, user_id: &str, token: &OAuthToken) -> Result<(), InfraError> {
        let connection = open_connection(&self.db_path)?;
        let updated = connection.execute(
            "UPDATE users SET
               google_access_token = ?2,
               google_refresh_token = ?3,
               google_expires_at = ?4,
               google_token_type = ?5,
               google_scope = ?6
             WHERE id = ?1",
            params![
                user_id,
                token.access_token,
                token.refresh_token,
                format_stored_time(token.expires_at),
                token.token_type,
                token.scope
            ],
        )?;
        if updated == 0 {
            return Err(InfraError::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }

    fn load_token(&self, user_id: &str) -> Result<Option<OAuthToken>, InfraError> {
        let connection = open_connection(&self.db_path)?;
        let row: Option<(Option<String>, Option<String>, Option<String>, Option<String>, Option<String>)> =
            connection
                .query_row(
                    "SELECT google_access_token, google_refresh_token, google_expires_at,
                            google_token_type, google_scope
                     FROM users WHERE id = ?1",
                    params![user_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
                )
                .optional()?;

        let Some((Some(access_token), refresh_token, Some(expires_at), token_type, scope)) = row else {
            return Ok(None);
        };
        Ok(Some(OAuthToken {
            access_token,
            refresh_token,
            expires_at: parse_stored_time(&expires_at, "users.google_expires_at")?,
            token_type: token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope,
        }))
    }

    fn delete_token(&self, user_id: &str) -> Result<(), InfraError> {
        let connection = open_connection(&self.db_path)?;
        connection.execute(
            "UPDATE users SET
               google_access_token = NULL,
               google_refresh_token = NULL,
               google_expires_at = NULL,
               google_token_type = NULL,
               google_scope = NULL
             WHERE id = ?1",
            params![user_id],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    tokens: Mutex<HashMap<String, OAuthToken>>,
}

impl InMemoryCredentialStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, OAuthToken>>, InfraError> {
        self.tokens
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("in-memory credential store: {error}")))
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_token(&self, user_id: &str, token: &OAuthToken) -> Result<(), InfraError> {
        self.lock()?.insert(user_id.to_string(), token.clone());
        Ok(())
    }

    fn load_token(&self, user_id: &str) -> Result<Option<OAuthToken>, InfraError> {
        Ok(self.lock()?.get(user_id).cloned())
    }

    fn delete_token(&self, user_id: &str) -> Result<(), InfraError> {
        self.lock()?.remove(user_id);
        Ok(())
    }
}
