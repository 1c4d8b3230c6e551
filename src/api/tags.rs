use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use super::dto::{CreateTagArgs, SearchParams};
use super::{ok, ok_empty, page_size, ApiResult};
use crate::auth::extractors::SessionRequired;
use crate::error::AppError;
use crate::model::image::{self, Image};
use crate::model::moderation::{self, NewModeration, OBJECT_TAG, VERB_CREATE, VERB_DELETE};
use crate::model::tag::{self, clean_tag_value, Tag, MAX_TAG_VALUE_LEN};
use crate::model::vote_summary::{self, VoteSummary};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/tags", get(get_tags).post(create_tags))
        .route("/api/tags/random/:count", get(get_random_tags))
        .route("/api/tags.search", get(search_tags))
        .route("/api/tag/:tag_id", get(get_tag).delete(delete_tag))
        .route("/api/tag.images/:tag_id", get(get_tag_images))
        .route("/api/tag.votes/:tag_id", get(get_tag_votes))
}

/// Resolves a tag by uuid, then by value.
pub(crate) async fn load_tag(state: &AppState, id_or_value: &str) -> Result<Tag, AppError> {
    if let Some(found) = tag::by_uuid(&state.db, id_or_value).await? {
        return Ok(found);
    }
    tag::by_value(&state.db, id_or_value).await?.ok_or(AppError::NotFound)
}

/// Cleans every posted value, rejecting the batch if any comes out empty or too long.
pub fn clean_values(values: Vec<String>) -> Result<Vec<String>, AppError> {
    values
        .into_iter()
        .map(|v| {
            let cleaned = clean_tag_value(&v);
            if cleaned.is_empty() {
                Err(AppError::bad_request(format!("`{}` is not a valid tag", v)))
            } else if cleaned.chars().count() > MAX_TAG_VALUE_LEN {
                Err(AppError::bad_request(format!(
                    "tags must be at most {} characters",
                    MAX_TAG_VALUE_LEN
                )))
            } else {
                Ok(cleaned)
            }
        })
        .collect()
}

#[instrument(skip(state))]
pub async fn get_tags(State(state): State<AppState>) -> ApiResult<Vec<Tag>> {
    ok(tag::all(&state.db).await?)
}

#[instrument(skip(state))]
pub async fn get_random_tags(State(state): State<AppState>, Path(count): Path<i64>) -> ApiResult<Vec<Tag>> {
    ok(tag::random(&state.db, page_size(count)?).await?)
}

#[instrument(skip(state))]
pub async fn search_tags(State(state): State<AppState>, Query(params): Query<SearchParams>) -> ApiResult<Vec<Tag>> {
    ok(tag::search(&state.db, &params.query).await?)
}

#[instrument(skip(state, session, args), fields(user_id = session.user_id))]
pub async fn create_tags(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Json(args): Json<CreateTagArgs>,
) -> ApiResult<Vec<Tag>> {
    let values = clean_values(args.into_values())?;

    let mut tags = Vec::with_capacity(values.len());
    for value in values {
        if let Some(existing) = tag::by_value(&state.db, &value).await? {
            tags.push(existing);
            continue;
        }

        let mut tx = state.db.begin().await?;
        let created = tag::create(&mut *tx, &Tag::new(session.user_id, &value)).await?;
        moderation::create(
            &mut *tx,
            &NewModeration::new(session.user_id, VERB_CREATE, OBJECT_TAG, created.uuid.clone()),
        )
        .await?;
        tx.commit().await?;

        info!(tag_id = created.id, tag = %created.tag_value, "tag created");
        tags.push(created);
    }
    ok(tags)
}

#[instrument(skip(state))]
pub async fn get_tag(State(state): State<AppState>, Path(tag_id): Path<String>) -> ApiResult<Tag> {
    ok(load_tag(&state, &tag_id).await?)
}

#[instrument(skip(state, session), fields(user_id = session.user_id))]
pub async fn delete_tag(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Path(tag_id): Path<String>,
) -> ApiResult<()> {
    let existing = tag::by_uuid(&state.db, &tag_id).await?.ok_or(AppError::NotFound)?;
    if !session.user.can_moderate() && existing.created_by != session.user_id {
        return Err(AppError::NotAuthorized);
    }

    let mut tx = state.db.begin().await?;
    tag::delete_with_votes(&mut *tx, existing.id).await?;
    moderation::create(
        &mut *tx,
        &NewModeration::new(session.user_id, VERB_DELETE, OBJECT_TAG, existing.uuid.clone()),
    )
    .await?;
    tx.commit().await?;

    info!(tag_id = existing.id, "tag deleted");
    ok_empty()
}

#[instrument(skip(state))]
pub async fn get_tag_images(State(state): State<AppState>, Path(tag_id): Path<String>) -> ApiResult<Vec<Image>> {
    let existing = load_tag(&state, &tag_id).await?;
    ok(image::for_tag(&state.db, existing.id).await?)
}

#[instrument(skip(state))]
pub async fn get_tag_votes(State(state): State<AppState>, Path(tag_id): Path<String>) -> ApiResult<Vec<VoteSummary>> {
    let existing = load_tag(&state, &tag_id).await?;
    ok(vote_summary::for_tag(&state.db, existing.id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_cleaned_before_lookup() {
        let cleaned = clean_values(vec!["  Funny Cats!".into(), "LOL".into()]).unwrap();
        assert_eq!(cleaned, vec!["funny cats", "lol"]);
    }

    #[test]
    fn overlong_values_are_rejected() {
        let longest = "a".repeat(MAX_TAG_VALUE_LEN);
        assert_eq!(clean_values(vec![longest.clone()]).unwrap(), vec![longest]);
        assert!(matches!(
            clean_values(vec!["a".repeat(MAX_TAG_VALUE_LEN + 1)]),
            Err(AppError::BadRequest(_))
        ));
        // Punctuation does not count towards the limit.
        let padded = format!("{}!!!", "é".repeat(MAX_TAG_VALUE_LEN));
        assert!(clean_values(vec![padded]).is_ok());
    }

    #[test]
    fn punctuation_only_values_are_rejected() {
        assert!(matches!(
            clean_values(vec!["ok".into(), "?!".into()]),
            Err(AppError::BadRequest(_))
        ));
    }
}
