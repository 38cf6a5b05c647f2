use crate::application::state::{next_id, AppState};
use crate::domain::models::{validate_email, User};
use crate::infrastructure::error::InfraError;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

pub const AUTH_COOKIE: &str = "token";
pub const SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// A user together with the session token issued for them.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

pub fn hash_password(password: &str) -> Result<String, InfraError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| InfraError::InvalidConfig(format!("password hashing failed: {error}")))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn issue_token(user_id: &str, secret: &str, now: DateTime<Utc>) -> Result<String, InfraError> {
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::seconds(SESSION_TTL_SECONDS)).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|error| InfraError::InvalidConfig(format!("token signing failed: {error}")))
}

/// Checks the signature, then expiry against `now`.
pub fn verify_token(token: &str, secret: &str, now: DateTime<Utc>) -> Result<Claims, InfraError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|_| InfraError::Unauthorized("invalid session token".to_string()))?;
    if data.claims.exp <= now.timestamp() {
        return Err(InfraError::Unauthorized("session expired".to_string()));
    }
    Ok(data.claims)
}

pub fn session_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{AUTH_COOKIE}={token}; HttpOnly; SameSite=Strict; Path=/; Max-Age={SESSION_TTL_SECONDS}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_session_cookie(secure: bool) -> String {
    let mut cookie = format!("{AUTH_COOKIE}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Finds the session token in a raw `Cookie` header.
pub fn token_from_cookie_header(header: &str) -> Option<&str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == AUTH_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

pub fn signup_impl(state: &AppState, request: SignupRequest) -> Result<AuthSession, InfraError> {
    let email = request.email.trim().to_lowercase();
    validate_email(&email).map_err(InfraError::Validation)?;
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(InfraError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let name = request
        .name
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    let password_hash = hash_password(&request.password)?;
    let now = state.now();
    let user = state
        .users
        .create(&next_id("usr"), &email, &name, &password_hash, now)?;
    let token = issue_token(&user.id, state.jwt_secret(), now)?;

    tracing::info!(user_id = %user.id, "user signed up");
    Ok(AuthSession { user, token })
}

pub fn login_impl(state: &AppState, request: LoginRequest) -> Result<AuthSession, InfraError> {
    let email = request.email.trim().to_lowercase();
    let invalid = || InfraError::Unauthorized("invalid email or password".to_string());

    let credentials = state.users.find_credentials_by_email(&email)?.ok_or_else(invalid)?;
    if !verify_password(&request.password, &credentials.password_hash) {
        return Err(invalid());
    }
    let token = issue_token(&credentials.user.id, state.jwt_secret(), state.now())?;

    tracing::info!(user_id = %credentials.user.id, "user logged in");
    Ok(AuthSession {
        user: credentials.user,
        token,
    })
}

/// Resolves a session token to its user; a token for a deleted user is
/// rejected like any other invalid token.
pub fn authenticate_token(state: &AppState, token: &str) -> Result<User, InfraError> {
    let claims = verify_token(token, state.jwt_secret(), state.now())?;
    state
        .users
        .get(&claims.sub)?
        .ok_or_else(|| InfraError::Unauthorized("unknown user".to_string()))
}
