use crate::application::auth::{
    authenticate_token, clear_session_cookie, login_impl, session_cookie, signup_impl,
    token_from_cookie_header, AuthSession, LoginRequest, SignupRequest,
};
use crate::application::calendar::calendar_view_impl;
use crate::application::google::{
    authorization_url_impl, delete_event_time_impl, disconnect_impl, get_event_time_impl,
    list_event_times_impl, list_events_impl, oauth_callback_impl, patch_event_time_impl,
    sync_tasks_impl, upsert_event_time_impl, CreateEventTimeRequest, OAuthCallbackQuery,
    PatchEventTimeRequest,
};
use crate::application::state::AppState;
use crate::application::tasks::{
    create_task_impl, delete_task_impl, export_tasks_csv_impl, get_task_impl, list_tasks_impl,
    update_task_impl, CreateTaskRequest, TimeWindowQuery, UpdateTaskRequest,
};
use crate::application::timer::{
    get_timer_impl, pause_timer_impl, resume_timer_impl, start_timer_impl, stop_timer_impl,
    StartTimerRequest, StopTimerRequest,
};
use crate::domain::models::User;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::run_blocking;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub type SharedState = Arc<AppState>;

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<InfraError> for ApiError {
    fn from(error: InfraError) -> Self {
        let message = error.to_string();
        match error {
            InfraError::Validation(_) => ApiError::BadRequest(message),
            InfraError::Unauthorized(_) | InfraError::ReauthenticationRequired => {
                ApiError::Unauthorized(message)
            }
            InfraError::NotFound(_) => ApiError::NotFound(message),
            InfraError::Conflict(_) => ApiError::Conflict(message),
            _ => ApiError::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

fn fail(state: &AppState, command: &str, error: InfraError) -> ApiError {
    state.command_error(command, &error);
    ApiError::from(error)
}

/// Runs a synchronous command (SQLite, password hashing) on the blocking
/// pool and logs its failure under `command`.
async fn blocking<T, F>(state: &SharedState, command: &str, work: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppState) -> Result<T, InfraError> + Send + 'static,
    T: Send + 'static,
{
    let shared = Arc::clone(state);
    run_blocking(move || work(&shared))
        .await
        .map_err(|error| fail(state, command, error))
}

// ── Authentication ────────────────────────────────────────────────────

/// The user behind the request's `token` cookie.
pub struct AuthUser(pub User);

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(token_from_cookie_header)
            .map(str::to_owned);
        let Some(token) = token else {
            let error = InfraError::Unauthorized("not authenticated".to_string());
            return Err(fail(state, "authenticate", error));
        };
        blocking(state, "authenticate", move |state| authenticate_token(state, &token))
            .await
            .map(AuthUser)
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/signup", post(signup))
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/me", get(me))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/export.csv", get(export_tasks_csv))
        .route(
            "/api/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/timer", get(get_timer))
        .route("/api/timer/start", post(start_timer))
        .route("/api/timer/pause", post(pause_timer))
        .route("/api/timer/resume", post(resume_timer))
        .route("/api/timer/stop", post(stop_timer))
        .route("/api/calendar", get(calendar_view))
        .route("/api/integrations/google-calendar/auth", get(google_auth))
        .route("/api/integrations/google-calendar/callback", get(google_callback))
        .route("/api/integrations/google-calendar/sync", post(google_sync))
        .route("/api/integrations/google-calendar/events", get(google_events))
        .route("/api/integrations/google-calendar/disconnect", post(google_disconnect))
        .route(
            "/api/integrations/google-calendar/event-times",
            get(list_event_times).post(upsert_event_time),
        )
        .route(
            "/api/integrations/google-calendar/event-times/{event_id}",
            get(get_event_time)
                .patch(patch_event_time)
                .delete(delete_event_time),
        )
        .route("/health", get(health_check))
}

/// The full application: routes, request tracing and CORS for the frontend.
pub fn app(state: SharedState) -> Result<Router, InfraError> {
    let origin = state
        .settings()
        .frontend_url
        .parse::<HeaderValue>()
        .map_err(|error| InfraError::InvalidConfig(format!("invalid frontendUrl: {error}")))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE]);

    Ok(api_router()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

fn session_response(state: &AppState, status: StatusCode, session: AuthSession) -> Response {
    let cookie = session_cookie(&session.token, state.settings().cookie_secure);
    (
        status,
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({"user": session.user})),
    )
        .into_response()
}

async fn signup(
    State(state): State<SharedState>,
    Json(request): Json<SignupRequest>,
) -> Result<Response, ApiError> {
    let session = blocking(&state, "signup", move |state| signup_impl(state, request)).await?;
    Ok(session_response(&state, StatusCode::CREATED, session))
}

async fn login(
    State(state): State<SharedState>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let session = blocking(&state, "login", move |state| login_impl(state, request)).await?;
    Ok(session_response(&state, StatusCode::OK, session))
}

async fn logout(State(state): State<SharedState>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, clear_session_cookie(state.settings().cookie_secure))],
        Json(serde_json::json!({"ok": true})),
    )
}

async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

async fn list_tasks(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Query(window): Query<TimeWindowQuery>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, "list_tasks", move |state| list_tasks_impl(state, &user.id, window))
        .await
        .map(Json)
}

async fn create_task(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task = blocking(&state, "create_task", move |state| {
        create_task_impl(state, &user.id, request)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, "get_task", move |state| get_task_impl(state, &user.id, &id))
        .await
        .map(Json)
}

async fn update_task(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, "update_task", move |state| {
        update_task_impl(state, &user.id, &id, request)
    })
    .await
    .map(Json)
}

async fn delete_task(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, "delete_task", move |state| delete_task_impl(state, &user.id, &id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn export_tasks_csv(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let csv = blocking(&state, "export_tasks_csv", move |state| {
        export_tasks_csv_impl(state, &user.id)
    })
    .await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"tasks.csv\""),
        ],
        csv,
    ))
}

async fn get_timer(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    get_timer_impl(&state, &user.id)
        .map(Json)
        .map_err(|error| fail(&state, "get_timer", error))
}

async fn start_timer(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Json(request): Json<StartTimerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, "start_timer", move |state| start_timer_impl(state, &user.id, request))
        .await
        .map(Json)
}

async fn pause_timer(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    pause_timer_impl(&state, &user.id)
        .map(Json)
        .map_err(|error| fail(&state, "pause_timer", error))
}

async fn resume_timer(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    resume_timer_impl(&state, &user.id)
        .map(Json)
        .map_err(|error| fail(&state, "resume_timer", error))
}

/// The body is optional; an empty POST stops without finishing the task.
async fn stop_timer(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    request: Option<Json<StopTimerRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    blocking(&state, "stop_timer", move |state| stop_timer_impl(state, &user.id, request))
        .await
        .map(Json)
}

async fn calendar_view(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Query(window): Query<TimeWindowQuery>,
) -> Result<impl IntoResponse, ApiError> {
    calendar_view_impl(&state, &user.id, window)
        .await
        .map(Json)
        .map_err(|error| fail(&state, "calendar_view", error))
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

async fn google_auth(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> Result<Response, ApiError> {
    let url = authorization_url_impl(&state, &user.id)
        .map_err(|error| fail(&state, "google_auth", error))?;
    Ok(found(&url))
}

async fn google_callback(
    State(state): State<SharedState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response {
    found(&oauth_callback_impl(&state, query).await)
}

async fn google_sync(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    sync_tasks_impl(&state, &user.id)
        .await
        .map(Json)
        .map_err(|error| fail(&state, "google_sync", error))
}

async fn google_events(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Query(window): Query<TimeWindowQuery>,
) -> Result<impl IntoResponse, ApiError> {
    list_events_impl(&state, &user.id, window)
        .await
        .map(Json)
        .map_err(|error| fail(&state, "google_events", error))
}

async fn google_disconnect(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, "google_disconnect", move |state| disconnect_impl(state, &user.id)).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

async fn list_event_times(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, "list_event_times", move |state| list_event_times_impl(state, &user.id))
        .await
        .map(Json)
}

async fn upsert_event_time(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateEventTimeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, "upsert_event_time", move |state| {
        upsert_event_time_impl(state, &user.id, request)
    })
    .await
    .map(Json)
}

async fn get_event_time(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, "get_event_time", move |state| {
        get_event_time_impl(state, &user.id, &event_id)
    })
    .await
    .map(Json)
}

async fn patch_event_time(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(event_id): Path<String>,
    Json(request): Json<PatchEventTimeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, "patch_event_time", move |state| {
        patch_event_time_impl(state, &user.id, &event_id, request)
    })
    .await
    .map(Json)
}

async fn delete_event_time(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(event_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, "delete_event_time", move |state| {
        delete_event_time_impl(state, &user.id, &event_id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
