use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use time::{Duration, OffsetDateTime};
use tracing::instrument;

use super::{ok, page_bounds, ApiResult};
use crate::model::moderation::{self, Moderation};
use crate::model::stats::{self, SiteStats};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/moderation.log/recent", get(get_recent_moderation))
        .route("/api/moderation.log/pages/:count/:offset", get(get_moderation_page))
        .route("/api/stats", get(get_site_stats))
}

#[instrument(skip(state))]
pub async fn get_recent_moderation(State(state): State<AppState>) -> ApiResult<Vec<Moderation>> {
    let since = OffsetDateTime::now_utc() - Duration::hours(24);
    ok(moderation::since(&state.db, since).await?)
}

#[instrument(skip(state))]
pub async fn get_moderation_page(
    State(state): State<AppState>,
    Path((count, offset)): Path<(i64, i64)>,
) -> ApiResult<Vec<Moderation>> {
    let (count, offset) = page_bounds(count, offset)?;
    ok(moderation::page(&state.db, count, offset).await?)
}

#[instrument(skip(state))]
pub async fn get_site_stats(State(state): State<AppState>) -> ApiResult<SiteStats> {
    ok(stats::site_stats(&state.db).await?)
}
