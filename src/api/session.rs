use axum::{
    extract::{Path, State},
    http::header::SET_COOKIE,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::dto::{CurrentUser, Envelope};
use super::{ok, ok_empty, ApiResult};
use crate::auth::extractors::{SessionAware, SessionRequired};
use crate::auth::oauth::google_login_url;
use crate::auth::services::{expired_session_cookie, logout};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/session.user", get(get_current_user))
        .route("/api/session/:key", get(get_session_value).post(set_session_value))
        .route("/api/logout", post(api_logout))
}

#[instrument(skip_all)]
pub async fn get_current_user(
    State(state): State<AppState>,
    SessionAware(session): SessionAware,
) -> ApiResult<CurrentUser> {
    match session {
        Some(session) => ok(CurrentUser::logged_in(&session.user)),
        None => ok(CurrentUser::logged_out(google_login_url(&state.config)?)),
    }
}

#[instrument(skip(state, session), fields(user_id = session.user_id))]
pub async fn get_session_value(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Path(key): Path<String>,
) -> ApiResult<String> {
    let value = state
        .sessions
        .state_value(&session.session_id, &key)
        .await
        .ok_or(AppError::NotFound)?;
    ok(value)
}

#[instrument(skip(state, session, value), fields(user_id = session.user_id))]
pub async fn set_session_value(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Path(key): Path<String>,
    value: String,
) -> ApiResult<()> {
    if !state.sessions.set_state_value(&session.session_id, &key, value).await {
        return Err(AppError::NotAuthorized);
    }
    ok_empty()
}

#[instrument(skip_all)]
pub async fn api_logout(
    State(state): State<AppState>,
    SessionAware(session): SessionAware,
) -> AppResult<impl IntoResponse> {
    if let Some(session) = session {
        logout(&state, &session).await?;
    }
    Ok(([(SET_COOKIE, expired_session_cookie())], Json(Envelope::empty())))
}
