use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use super::dto::UpdateTeam;
use super::{ok, page_bounds, require_admin, ApiResult};
use crate::auth::extractors::SessionRequired;
use crate::error::AppError;
use crate::model::content_rating;
use crate::model::error_log::{self, ErrorRecord};
use crate::model::search_history::{self, SearchHistory};
use crate::model::slack_team::{self, SlackTeam};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/search.history/pages/:count/:offset", get(get_search_history))
        .route("/api/errors/:limit/:offset", get(get_errors))
        .route("/api/teams", get(get_teams))
        .route("/api/team/:team_id", get(get_team).put(update_team))
}

#[instrument(skip(state, session))]
pub async fn get_search_history(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Path((count, offset)): Path<(i64, i64)>,
) -> ApiResult<Vec<SearchHistory>> {
    require_admin(&session)?;
    let (count, offset) = page_bounds(count, offset)?;
    ok(search_history::page(&state.db, count, offset).await?)
}

#[instrument(skip(state, session))]
pub async fn get_errors(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Path((limit, offset)): Path<(i64, i64)>,
) -> ApiResult<Vec<ErrorRecord>> {
    require_admin(&session)?;
    let (limit, offset) = page_bounds(limit, offset)?;
    ok(error_log::page(&state.db, limit, offset).await?)
}

#[instrument(skip(state, session))]
pub async fn get_teams(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
) -> ApiResult<Vec<SlackTeam>> {
    require_admin(&session)?;
    ok(slack_team::all(&state.db).await?)
}

#[instrument(skip(state, session))]
pub async fn get_team(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Path(team_id): Path<String>,
) -> ApiResult<SlackTeam> {
    require_admin(&session)?;
    ok(slack_team::by_team_id(&state.db, &team_id).await?.ok_or(AppError::NotFound)?)
}

#[instrument(skip(state, session, posted), fields(admin_id = session.user_id))]
pub async fn update_team(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Path(team_id): Path<String>,
    Json(posted): Json<UpdateTeam>,
) -> ApiResult<SlackTeam> {
    require_admin(&session)?;
    if !content_rating::is_valid(posted.content_rating) {
        return Err(AppError::bad_request(format!(
            "invalid content rating `{}`",
            posted.content_rating
        )));
    }
    let existing = slack_team::by_team_id(&state.db, &team_id).await?.ok_or(AppError::NotFound)?;
    slack_team::update_settings(&state.db, &existing.team_id, posted.is_enabled, posted.content_rating).await?;

    info!(team_id = %existing.team_id, is_enabled = posted.is_enabled, "slack team updated");
    ok(SlackTeam {
        is_enabled: posted.is_enabled,
        content_rating: posted.content_rating,
        ..existing
    })
}
