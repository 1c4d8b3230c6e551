use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Redirect},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use super::extractors::SessionAware;
use super::services::{expired_session_cookie, finish_oauth_login, logout, session_cookie};
use crate::api::dto::CurrentUser;
use crate::error::{AppError, AppResult};
use crate::model::slack_team::{self, SlackTeam};
use crate::model::user_auth::{PROVIDER_FACEBOOK, PROVIDER_GOOGLE};
use crate::state::AppState;

pub fn oauth_routes() -> Router<AppState> {
    Router::new()
        .route("/oauth/google", get(oauth_google))
        .route("/oauth/facebook", get(oauth_facebook))
        .route("/oauth/slack", get(oauth_slack))
        .route("/logout", get(logout_redirect).post(logout_redirect))
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: Option<String>,
}

fn require_code(params: &OAuthCallback) -> AppResult<&str> {
    params
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::bad_request("`code` parameter missing, cannot continue"))
}

async fn complete_login(state: &AppState, provider: &str, profile: super::oauth::OAuthProfile) -> AppResult<impl IntoResponse> {
    let login = finish_oauth_login(state, provider, &profile).await?;
    let cookie = session_cookie(state, &login.token);
    Ok(([(header::SET_COOKIE, cookie)], Json(CurrentUser::logged_in(&login.user))))
}

#[instrument(skip(state, params))]
pub async fn oauth_google(
    State(state): State<AppState>,
    Query(params): Query<OAuthCallback>,
) -> AppResult<impl IntoResponse> {
    let code = require_code(&params)?;
    let profile = state.oauth.google_profile(code).await.map_err(|e| {
        warn!(error = %e, "google oauth failed");
        AppError::NotAuthorized
    })?;
    complete_login(&state, PROVIDER_GOOGLE, profile).await
}

#[instrument(skip(state, params))]
pub async fn oauth_facebook(
    State(state): State<AppState>,
    Query(params): Query<OAuthCallback>,
) -> AppResult<impl IntoResponse> {
    let code = require_code(&params)?;
    let profile = state.oauth.facebook_profile(code).await.map_err(|e| {
        warn!(error = %e, "facebook oauth failed");
        AppError::NotAuthorized
    })?;
    complete_login(&state, PROVIDER_FACEBOOK, profile).await
}

/// Registers the installing workspace the first time it is seen.
#[instrument(skip(state, params))]
pub async fn oauth_slack(
    State(state): State<AppState>,
    Query(params): Query<OAuthCallback>,
) -> AppResult<Redirect> {
    let code = require_code(&params)?;
    let install = state.oauth.slack_install(code).await?;

    if slack_team::by_team_id(&state.db, &install.team_id).await?.is_none() {
        let team = SlackTeam::new(&install.team_id, &install.team_name, &install.user_id, &install.user_name);
        slack_team::create(&state.db, &team).await?;
        info!(team_id = %team.team_id, "slack team registered");
    }
    Ok(Redirect::to("/slack/complete"))
}

#[instrument(skip(state, session))]
pub async fn logout_redirect(
    State(state): State<AppState>,
    SessionAware(session): SessionAware,
) -> AppResult<impl IntoResponse> {
    if let Some(session) = session {
        logout(&state, &session).await?;
    }
    Ok(([(header::SET_COOKIE, expired_session_cookie())], Redirect::to("/")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_code_is_a_bad_request() {
        let params = OAuthCallback { code: None };
        assert!(matches!(require_code(&params), Err(AppError::BadRequest(_))));
        let params = OAuthCallback { code: Some(String::new()) };
        assert!(matches!(require_code(&params), Err(AppError::BadRequest(_))));
        let params = OAuthCallback { code: Some("abc".into()) };
        assert_eq!(require_code(&params).unwrap(), "abc");
    }
}
