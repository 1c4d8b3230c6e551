use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use super::dto::{SearchParams, UpdateUser};
use super::{ok, page_bounds, require_admin, require_moderator, ApiResult};
use crate::auth::extractors::SessionRequired;
use crate::error::AppError;
use crate::model::image::{self, Image};
use crate::model::moderation::{
    self, Moderation, NewModeration, OBJECT_USER, VERB_BAN, VERB_DEMOTE_MODERATOR, VERB_PROMOTE_MODERATOR,
    VERB_UNBAN,
};
use crate::model::user::{self, User};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(get_users))
        .route("/api/users/pages/:count/:offset", get(get_users_page))
        .route("/api/users.search", get(search_users))
        .route("/api/user/:user_id", get(get_user).put(update_user))
        .route("/api/user.images/:user_id", get(get_user_images))
        .route("/api/user.moderation/:user_id", get(get_user_moderation))
}

async fn load_user(state: &AppState, uuid: &str) -> Result<User, AppError> {
    user::by_uuid(&state.db, uuid).await?.ok_or(AppError::NotFound)
}

#[instrument(skip(state))]
pub async fn get_users(State(state): State<AppState>) -> ApiResult<Vec<User>> {
    ok(user::all(&state.db).await?)
}

#[instrument(skip(state))]
pub async fn get_users_page(
    State(state): State<AppState>,
    Path((count, offset)): Path<(i64, i64)>,
) -> ApiResult<Vec<User>> {
    let (count, offset) = page_bounds(count, offset)?;
    ok(user::page(&state.db, count, offset).await?)
}

#[instrument(skip(state))]
pub async fn search_users(State(state): State<AppState>, Query(params): Query<SearchParams>) -> ApiResult<Vec<User>> {
    ok(user::search(&state.db, &params.query).await?)
}

#[instrument(skip(state))]
pub async fn get_user(State(state): State<AppState>, Path(user_id): Path<String>) -> ApiResult<User> {
    ok(load_user(&state, &user_id).await?)
}

/// Moderation entries a role or ban change produces.
pub fn flag_changes(before: &User, after: &User) -> Vec<&'static str> {
    let mut verbs = Vec::new();
    if !before.is_moderator && after.is_moderator {
        verbs.push(VERB_PROMOTE_MODERATOR);
    } else if before.is_moderator && !after.is_moderator {
        verbs.push(VERB_DEMOTE_MODERATOR);
    }
    if !before.is_banned && after.is_banned {
        verbs.push(VERB_BAN);
    } else if before.is_banned && !after.is_banned {
        verbs.push(VERB_UNBAN);
    }
    verbs
}

/// Rejects admin changes made through the API.
pub fn check_user_update(before: &User, after: &User) -> Result<(), AppError> {
    if !before.is_admin && after.is_admin {
        return Err(AppError::bad_request(
            "Cannot promote user to admin through the UI; this must be done in the db directly.",
        ));
    }
    if before.is_admin && !after.is_admin {
        return Err(AppError::bad_request(
            "Cannot demote user from admin through the UI; this must be done in the db directly.",
        ));
    }
    if after.is_admin && after.is_banned {
        return Err(AppError::bad_request("Cannot ban admins."));
    }
    Ok(())
}

#[instrument(skip(state, session, posted), fields(admin_id = session.user_id))]
pub async fn update_user(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Path(user_id): Path<String>,
    Json(posted): Json<UpdateUser>,
) -> ApiResult<User> {
    require_admin(&session)?;
    let existing = load_user(&state, &user_id).await?;
    let updated = posted.apply_to(&existing);
    check_user_update(&existing, &updated)?;

    let mut tx = state.db.begin().await?;
    for verb in flag_changes(&existing, &updated) {
        moderation::create(&mut *tx, &NewModeration::new(session.user_id, verb, OBJECT_USER, updated.uuid.clone())).await?;
    }
    user::update(&mut *tx, &updated).await?;
    tx.commit().await?;

    state.sessions.update_user(&updated).await;
    info!(user_id = updated.id, "user updated");
    ok(updated)
}

#[instrument(skip(state))]
pub async fn get_user_images(State(state): State<AppState>, Path(user_id): Path<String>) -> ApiResult<Vec<Image>> {
    let owner = load_user(&state, &user_id).await?;
    ok(image::for_user(&state.db, owner.id).await?)
}

#[instrument(skip(state, session))]
pub async fn get_user_moderation(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<Moderation>> {
    require_moderator(&session)?;
    let target = load_user(&state, &user_id).await?;
    ok(moderation::for_user(&state.db, target.id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_flags_cannot_change() {
        let plain = User::new("a");
        let mut admin = User::new("a");
        admin.is_admin = true;

        assert!(matches!(check_user_update(&plain, &admin), Err(AppError::BadRequest(_))));
        assert!(matches!(check_user_update(&admin, &plain), Err(AppError::BadRequest(_))));

        let mut banned_admin = admin.clone();
        banned_admin.is_banned = true;
        assert!(matches!(check_user_update(&admin, &banned_admin), Err(AppError::BadRequest(_))));
        assert!(check_user_update(&plain, &plain).is_ok());
    }

    #[test]
    fn role_and_ban_changes_are_logged() {
        let plain = User::new("a");
        let mut promoted_banned = plain.clone();
        promoted_banned.is_moderator = true;
        promoted_banned.is_banned = true;

        assert_eq!(flag_changes(&plain, &promoted_banned), vec![VERB_PROMOTE_MODERATOR, VERB_BAN]);
        assert_eq!(flag_changes(&promoted_banned, &plain), vec![VERB_DEMOTE_MODERATOR, VERB_UNBAN]);
        assert!(flag_changes(&plain, &plain).is_empty());
    }
}
