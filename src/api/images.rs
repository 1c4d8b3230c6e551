use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use super::dto::{SearchParams, UpdateImage};
use super::{ok, ok_empty, page_size, require_moderator, ApiResult};
use crate::auth::extractors::SessionRequired;
use crate::error::AppError;
use crate::images::handlers::{read_multipart, single_file};
use crate::images::services::{upload_image, MAX_IMAGE_SIZE};
use crate::model::content_rating;
use crate::model::image::{self, Image};
use crate::model::moderation::{self, NewModeration, OBJECT_IMAGE, VERB_DELETE};
use crate::model::search;
use crate::model::stats::{self, ImageStats};
use crate::model::tag::{self, Tag};
use crate::model::vote_summary::{self, VoteSummary};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/images",
            get(get_images)
                .post(post_image)
                .layer(DefaultBodyLimit::max(MAX_IMAGE_SIZE + 1024 * 1024)),
        )
        .route("/api/images/random/:count", get(get_random_images))
        .route("/api/images.search", get(search_images))
        .route("/api/images.search/random/:count", get(search_images_random))
        .route("/api/image/:image_id", get(get_image).put(update_image).delete(delete_image))
        .route("/api/image.tags/:image_id", get(get_image_tags))
        .route("/api/image.votes/:image_id", get(get_image_votes))
        .route("/api/image.stats/:image_id", get(get_image_stats))
}

pub(crate) async fn load_image(state: &AppState, uuid: &str) -> Result<Image, AppError> {
    image::by_uuid(&state.db, uuid).await?.ok_or(AppError::NotFound)
}

#[instrument(skip(state))]
pub async fn get_images(State(state): State<AppState>) -> ApiResult<Vec<Image>> {
    ok(image::all(&state.db).await?)
}

#[instrument(skip(state, session, mp), fields(user_id = session.user_id))]
pub async fn post_image(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    mp: Multipart,
) -> ApiResult<Image> {
    let posted = read_multipart(mp).await?;
    let item = single_file(posted.files)?;
    ok(upload_image(&state, &session.user, item).await?)
}

#[instrument(skip(state))]
pub async fn get_random_images(State(state): State<AppState>, Path(count): Path<i64>) -> ApiResult<Vec<Image>> {
    ok(image::random(&state.db, page_size(count)?).await?)
}

#[instrument(skip(state))]
pub async fn search_images(State(state): State<AppState>, Query(params): Query<SearchParams>) -> ApiResult<Vec<Image>> {
    ok(search::search_images(&state.db, &params.query, content_rating::FILTER_DEFAULT).await?)
}

/// Up to `count` matches, drawn at random with better scoring images more likely.
#[instrument(skip(state))]
pub async fn search_images_random(
    State(state): State<AppState>,
    Path(count): Path<i64>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<Image>> {
    let count = page_size(count)? as usize;
    ok(search::search_images_weighted_random(&state.db, &params.query, content_rating::FILTER_DEFAULT, count).await?)
}

#[instrument(skip(state))]
pub async fn get_image(State(state): State<AppState>, Path(image_id): Path<String>) -> ApiResult<Image> {
    ok(load_image(&state, &image_id).await?)
}

#[instrument(skip(state, session, posted), fields(user_id = session.user_id))]
pub async fn update_image(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Path(image_id): Path<String>,
    Json(posted): Json<UpdateImage>,
) -> ApiResult<Image> {
    require_moderator(&session)?;
    if let Some(rating) = posted.content_rating.filter(|r| !content_rating::is_valid(*r)) {
        return Err(AppError::bad_request(format!("invalid content rating `{}`", rating)));
    }
    let existing = load_image(&state, &image_id).await?;

    let mut tx = state.db.begin().await?;
    if let Some(name) = posted.display_name.as_deref().filter(|n| !n.is_empty()) {
        image::update_display_name(&mut *tx, existing.id, name).await?;
    }
    if let Some(rating) = posted.content_rating {
        image::update_content_rating(&mut *tx, existing.id, rating).await?;
    }
    tx.commit().await?;

    info!(image_id = existing.id, "image updated");
    ok(load_image(&state, &image_id).await?)
}

#[instrument(skip(state, session), fields(user_id = session.user_id))]
pub async fn delete_image(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Path(image_id): Path<String>,
) -> ApiResult<()> {
    let existing = load_image(&state, &image_id).await?;
    if !session.user.can_moderate() && existing.created_by != session.user_id {
        return Err(AppError::NotAuthorized);
    }

    state.storage.delete_object(&existing.s3_key).await?;

    let mut tx = state.db.begin().await?;
    image::delete_by_id(&mut *tx, existing.id).await?;
    moderation::create(
        &mut *tx,
        &NewModeration::new(session.user_id, VERB_DELETE, OBJECT_IMAGE, existing.uuid.clone()),
    )
    .await?;
    tx.commit().await?;

    info!(image_id = existing.id, "image deleted");
    ok_empty()
}

#[instrument(skip(state))]
pub async fn get_image_tags(State(state): State<AppState>, Path(image_id): Path<String>) -> ApiResult<Vec<Tag>> {
    let existing = image::id_for_uuid(&state.db, &image_id).await?.ok_or(AppError::NotFound)?;
    ok(tag::for_image(&state.db, existing).await?)
}

#[instrument(skip(state))]
pub async fn get_image_votes(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> ApiResult<Vec<VoteSummary>> {
    let existing = image::id_for_uuid(&state.db, &image_id).await?.ok_or(AppError::NotFound)?;
    ok(vote_summary::for_image(&state.db, existing).await?)
}

#[instrument(skip(state))]
pub async fn get_image_stats(State(state): State<AppState>, Path(image_id): Path<String>) -> ApiResult<ImageStats> {
    let existing = image::id_for_uuid(&state.db, &image_id).await?.ok_or(AppError::NotFound)?;
    ok(stats::image_stats(&state.db, existing).await?.ok_or(AppError::NotFound)?)
}
