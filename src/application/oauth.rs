use crate::domain::models::OAuthToken;
use crate::infrastructure::config::GoogleClientSettings;
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::oauth_client::{
    OAuthClientCredentials, OAuthHttpClient, OAuthTokenResponse, TokenGrant,
};
use crate::infrastructure::storage::run_blocking;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use url::Url;

const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const REFRESH_LEEWAY_SECONDS: i64 = 60;

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub credentials: OAuthClientCredentials,
    pub scopes: Vec<String>,
    pub authorization_endpoint: String,
}

impl From<GoogleClientSettings> for OAuthConfig {
    fn from(settings: GoogleClientSettings) -> Self {
        Self {
            credentials: OAuthClientCredentials {
                client_id: settings.client_id,
                client_secret: settings.client_secret,
                redirect_uri: settings.redirect_uri,
            },
            scopes: settings.scopes,
            authorization_endpoint: AUTHORIZATION_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureTokenResult {
    Existing(OAuthToken),
    Refreshed(OAuthToken),
    ReauthenticationRequired,
}

impl EnsureTokenResult {
    pub fn into_access_token(self) -> Result<String, InfraError> {
        match self {
            Self::Existing(token) | Self::Refreshed(token) => Ok(token.access_token),
            Self::ReauthenticationRequired => Err(InfraError::ReauthenticationRequired),
        }
    }
}

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Google OAuth for many users; each user's token lives in the credential
/// store under their id.
pub struct OAuthManager {
    config: OAuthConfig,
    credential_store: Arc<dyn CredentialStore>,
    oauth_client: Arc<dyn OAuthHttpClient>,
    now_provider: NowProvider,
}

impl OAuthManager {
    pub fn new(
        config: OAuthConfig,
        credential_store: Arc<dyn CredentialStore>,
        oauth_client: Arc<dyn OAuthHttpClient>,
    ) -> Self {
        Self {
            config,
            credential_store,
            oauth_client,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn build_authorization_url(&self, state: &str) -> Result<String, InfraError> {
        if state.trim().is_empty() {
            return Err(InfraError::OAuth("state must not be empty".to_string()));
        }
        if self.config.scopes.is_empty() {
            return Err(InfraError::OAuth("at least one scope is required".to_string()));
        }

        let mut url = Url::parse(&self.config.authorization_endpoint)
            .map_err(|error| InfraError::OAuth(format!("invalid authorization endpoint: {error}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.credentials.client_id)
            .append_pair("redirect_uri", &self.config.credentials.redirect_uri)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);

        Ok(url.to_string())
    }

    pub async fn authenticate_with_code(
        &self,
        user_id: &str,
        authorization_code: &str,
    ) -> Result<OAuthToken, InfraError> {
        if authorization_code.trim().is_empty() {
            return Err(InfraError::OAuth("authorization code must not be empty".to_string()));
        }

        let response = self
            .oauth_client
            .request_token(
                &self.config.credentials,
                TokenGrant::AuthorizationCode(authorization_code.trim().to_string()),
            )
            .await?;

        // Google omits the refresh token on re-consent; keep the old one.
        let previous_refresh = self
            .load_token(user_id)
            .await?
            .and_then(|token| token.refresh_token);
        let token = self.token_from_response(response, previous_refresh);
        self.save_token(user_id, token.clone()).await?;
        Ok(token)
    }

    pub async fn ensure_access_token(&self, user_id: &str) -> Result<EnsureTokenResult, InfraError> {
        let Some(stored_token) = self.load_token(user_id).await? else {
            return Ok(EnsureTokenResult::ReauthenticationRequired);
        };

        if stored_token.is_valid_at((self.now_provider)(), REFRESH_LEEWAY_SECONDS) {
            return Ok(EnsureTokenResult::Existing(stored_token));
        }

        let Some(refresh_token) = stored_token.refresh_token.clone() else {
            return Ok(EnsureTokenResult::ReauthenticationRequired);
        };

        let refreshed = self
            .oauth_client
            .request_token(&self.config.credentials, TokenGrant::RefreshToken(refresh_token))
            .await;
        match refreshed {
            Ok(response) => {
                let token = self.token_from_response(response, stored_token.refresh_token);
                self.save_token(user_id, token.clone()).await?;
                Ok(EnsureTokenResult::Refreshed(token))
            }
            Err(InfraError::OAuth(message)) => {
                tracing::warn!(user_id, error = %message, "google token refresh failed");
                Ok(EnsureTokenResult::ReauthenticationRequired)
            }
            Err(InfraError::ReauthenticationRequired) => Ok(EnsureTokenResult::ReauthenticationRequired),
            Err(error) => Err(error),
        }
    }

    pub fn clear_stored_token(&self, user_id: &str) -> Result<(), InfraError> {
        self.credential_store.delete_token(user_id)
    }

    async fn load_token(&self, user_id: &str) -> Result<Option<OAuthToken>, InfraError> {
        let store = Arc::clone(&self.credential_store);
        let user_id = user_id.to_string();
        run_blocking(move || store.load_token(&user_id)).await
    }

    async fn save_token(&self, user_id: &str, token: OAuthToken) -> Result<(), InfraError> {
        let store = Arc::clone(&self.credential_store);
        let user_id = user_id.to_string();
        run_blocking(move || store.save_token(&user_id, &token)).await
    }

    fn token_from_response(
        &self,
        response: OAuthTokenResponse,
        fallback_refresh_token: Option<String>,
    ) -> OAuthToken {
        OAuthToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(fallback_refresh_token),
            expires_at: (self.now_provider)() + Duration::seconds(response.expires_in.max(0)),
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: response.scope,
        }
    }
}
