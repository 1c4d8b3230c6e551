use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Router,
};
use tracing::{info, instrument};

use super::{ok, ok_empty, ApiResult};
use crate::auth::extractors::SessionRequired;
use crate::auth::session::Session;
use crate::error::AppError;
use crate::model::image;
use crate::model::moderation::{self, NewModeration, OBJECT_LINK, VERB_CREATE, VERB_DELETE};
use crate::model::tag::{self, Tag};
use crate::model::vote::{self, Vote};
use crate::model::vote_summary;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/vote.up/:image_id/:tag_id", post(upvote))
        .route("/api/vote.down/:image_id/:tag_id", post(downvote))
        .route("/api/user.vote/:image_id/:tag_id", delete(delete_user_vote))
        .route("/api/link/:image_id/:tag_id", delete(delete_link))
        .route("/api/user.votes.image/:image_id", get(get_user_votes_for_image))
        .route("/api/user.votes.tag/:tag_id", get(get_user_votes_for_tag))
}

/// Image id and tag for a link's uuids; either missing is a 404.
async fn load_link(state: &AppState, image_uuid: &str, tag_uuid: &str) -> Result<(i64, Tag), AppError> {
    let image_id = image::id_for_uuid(&state.db, image_uuid).await?.ok_or(AppError::NotFound)?;
    let found = tag::by_uuid(&state.db, tag_uuid).await?.ok_or(AppError::NotFound)?;
    Ok((image_id, found))
}

async fn cast_vote(
    state: &AppState,
    session: &Session,
    image_uuid: &str,
    tag_uuid: &str,
    is_upvote: bool,
) -> ApiResult<()> {
    let (image_id, voted_tag) = load_link(state, image_uuid, tag_uuid).await?;

    if vote::get(&state.db, session.user_id, image_id, voted_tag.id).await?.is_some() {
        return ok_empty();
    }

    let mut tx = state.db.begin().await?;
    let did_create =
        vote_summary::create_or_update_vote(&mut *tx, session.user_id, image_id, voted_tag.id, is_upvote).await?;
    if did_create {
        moderation::create(
            &mut *tx,
            &NewModeration::new(session.user_id, VERB_CREATE, OBJECT_LINK, image_uuid).with_secondary(tag_uuid),
        )
        .await?;
    }
    tx.commit().await?;

    info!(image_id, tag_id = voted_tag.id, is_upvote, did_create, "vote recorded");
    ok_empty()
}

#[instrument(skip(state, session), fields(user_id = session.user_id))]
pub async fn upvote(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Path((image_id, tag_id)): Path<(String, String)>,
) -> ApiResult<()> {
    cast_vote(&state, &session, &image_id, &tag_id, true).await
}

#[instrument(skip(state, session), fields(user_id = session.user_id))]
pub async fn downvote(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Path((image_id, tag_id)): Path<(String, String)>,
) -> ApiResult<()> {
    cast_vote(&state, &session, &image_id, &tag_id, false).await
}

#[instrument(skip(state, session), fields(user_id = session.user_id))]
pub async fn delete_user_vote(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Path((image_uuid, tag_uuid)): Path<(String, String)>,
) -> ApiResult<()> {
    let (image_id, voted_tag) = load_link(&state, &image_uuid, &tag_uuid).await?;

    let mut tx = state.db.begin().await?;
    let removed = vote_summary::delete_user_vote(&mut *tx, session.user_id, image_id, voted_tag.id).await?;
    if !removed {
        return Err(AppError::NotFound);
    }
    tx.commit().await?;
    ok_empty()
}

#[instrument(skip(state, session), fields(user_id = session.user_id))]
pub async fn delete_link(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Path((image_uuid, tag_uuid)): Path<(String, String)>,
) -> ApiResult<()> {
    let (image_id, linked_tag) = load_link(&state, &image_uuid, &tag_uuid).await?;
    if !session.user.can_moderate() && linked_tag.created_by != session.user_id {
        return Err(AppError::NotAuthorized);
    }

    vote_summary::delete(&state.db, image_id, linked_tag.id).await?;
    moderation::create(
        &state.db,
        &NewModeration::new(session.user_id, VERB_DELETE, OBJECT_LINK, image_uuid).with_secondary(tag_uuid),
    )
    .await?;

    info!(image_id, tag_id = linked_tag.id, "link deleted");
    ok_empty()
}

#[instrument(skip(state, session), fields(user_id = session.user_id))]
pub async fn get_user_votes_for_image(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Path(image_uuid): Path<String>,
) -> ApiResult<Vec<Vote>> {
    let image_id = image::id_for_uuid(&state.db, &image_uuid).await?.ok_or(AppError::NotFound)?;
    ok(vote::for_user_and_image(&state.db, session.user_id, image_id).await?)
}

#[instrument(skip(state, session), fields(user_id = session.user_id))]
pub async fn get_user_votes_for_tag(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Path(tag_uuid): Path<String>,
) -> ApiResult<Vec<Vote>> {
    let found = tag::by_uuid(&state.db, &tag_uuid).await?.ok_or(AppError::NotFound)?;
    ok(vote::for_user_and_tag(&state.db, session.user_id, found.id).await?)
}
