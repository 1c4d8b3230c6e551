use axum::{
    extract::{Path, State},
    routing::{get, post},
    Router,
};
use tracing::instrument;

use super::{ok, require_admin, ApiResult};
use crate::auth::extractors::SessionRequired;
use crate::error::AppError;
use crate::jobs::JobStatus;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/jobs", get(get_jobs))
        .route("/api/job/:job_id", post(run_job))
}

#[instrument(skip(state, session))]
pub async fn get_jobs(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
) -> ApiResult<Vec<JobStatus>> {
    require_admin(&session)?;
    ok(state.jobs.statuses().await)
}

#[instrument(skip(state, session), fields(admin_id = session.user_id))]
pub async fn run_job(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Path(job_id): Path<String>,
) -> ApiResult<JobStatus> {
    require_admin(&session)?;
    let jobs = state.jobs.clone();
    ok(jobs.run(&state, &job_id).await.ok_or(AppError::NotFound)?)
}
