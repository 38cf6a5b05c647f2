use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;

pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone)]
pub struct OAuthClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// One request to the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    AuthorizationCode(String),
    RefreshToken(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

#[async_trait]
pub trait OAuthHttpClient: Send + Sync {
    async fn request_token(
        &self,
        credentials: &OAuthClientCredentials,
        grant: TokenGrant,
    ) -> Result<OAuthTokenResponse, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestOAuthClient {
    client: Client,
    token_endpoint: String,
}

impl Default for ReqwestOAuthClient {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

#[derive(Debug, serde::Deserialize)]
struct TokenPayload {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ReqwestOAuthClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            token_endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
        }
    }
}

fn grant_form(credentials: &OAuthClientCredentials, grant: TokenGrant) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("client_id", credentials.client_id.clone()),
        ("client_secret", credentials.client_secret.clone()),
    ];
    match grant {
        TokenGrant::AuthorizationCode(code) => {
            form.push(("grant_type", "authorization_code".to_string()));
            form.push(("redirect_uri", credentials.redirect_uri.clone()));
            form.push(("code", code));
        }
        TokenGrant::RefreshToken(refresh_token) => {
            form.push(("grant_type", "refresh_token".to_string()));
            form.push(("refresh_token", refresh_token));
        }
    }
    form
}

/// `invalid_grant` means the refresh token was revoked or expired, so the
/// user has to connect again.
fn parse_token_payload(status: u16, body: &str) -> Result<OAuthTokenResponse, InfraError> {
    let parsed = serde_json::from_str::<TokenPayload>(body)
        .map_err(|error| InfraError::OAuth(format!("invalid token response payload: {error}")))?;

    if let Some(code) = parsed.error.as_deref() {
        if code == "invalid_grant" {
            return Err(InfraError::ReauthenticationRequired);
        }
        let detail = parsed.error_description.as_deref().unwrap_or("");
        return Err(InfraError::OAuth(format!("token endpoint error: {code}; {detail}")));
    }
    if !(200..300).contains(&status) {
        return Err(InfraError::OAuth(format!("token endpoint returned http {status}")));
    }
    let access_token = parsed
        .access_token
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| InfraError::OAuth("token response has no access_token".to_string()))?;

    Ok(OAuthTokenResponse {
        access_token,
        refresh_token: parsed.refresh_token,
        expires_in: parsed.expires_in.unwrap_or(0).max(0),
        token_type: parsed.token_type,
        scope: parsed.scope,
    })
}

#[async_trait]
impl OAuthHttpClient for ReqwestOAuthClient {
    async fn request_token(
        &self,
        credentials: &OAuthClientCredentials,
        grant: TokenGrant,
    ) -> Result<OAuthTokenResponse, InfraError> {
        let response = self
            .client
            .post(&self.token_endpoint)
            .form(&grant_form(credentials, grant))
            .send()
            .await
            .map_err(|error| InfraError::OAuth(format!("request failed: {error}")))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::OAuth(format!("failed reading token response: {error}")))?;
        parse_token_payload(status, &body)
    }
}
