use axum::{Json, Router};

use crate::auth::session::Session;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub mod admin;
pub mod dto;
pub mod images;
pub mod jobs;
pub mod moderation;
pub mod session;
pub mod tags;
pub mod users;
pub mod votes;

use dto::Envelope;

pub type ApiResult<T> = AppResult<Json<Envelope<T>>>;

pub fn ok<T>(response: T) -> ApiResult<T> {
    Ok(Json(Envelope::ok(response)))
}

pub fn ok_empty() -> ApiResult<()> {
    Ok(Json(Envelope::empty()))
}

pub(crate) fn require_admin(session: &Session) -> AppResult<()> {
    if session.user.is_admin {
        Ok(())
    } else {
        Err(AppError::NotAuthorized)
    }
}

pub(crate) fn require_moderator(session: &Session) -> AppResult<()> {
    if session.user.can_moderate() {
        Ok(())
    } else {
        Err(AppError::NotAuthorized)
    }
}

/// Largest list any count or page route returns.
pub const MAX_PAGE_SIZE: i64 = 1000;

/// Caps a requested count; negative counts are rejected.
pub(crate) fn page_size(count: i64) -> AppResult<i64> {
    if count < 0 {
        return Err(AppError::bad_request(format!("count must not be negative, got {}", count)));
    }
    Ok(count.min(MAX_PAGE_SIZE))
}

pub(crate) fn page_bounds(count: i64, offset: i64) -> AppResult<(i64, i64)> {
    if offset < 0 {
        return Err(AppError::bad_request(format!("offset must not be negative, got {}", offset)));
    }
    Ok((page_size(count)?, offset))
}

/// Every `/api` route.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(users::routes())
        .merge(images::routes())
        .merge(tags::routes())
        .merge(votes::routes())
        .merge(moderation::routes())
        .merge(admin::routes())
        .merge(session::routes())
        .merge(jobs::routes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_capped_and_never_negative() {
        assert_eq!(page_size(25).unwrap(), 25);
        assert_eq!(page_size(0).unwrap(), 0);
        assert_eq!(page_size(1_000_000).unwrap(), MAX_PAGE_SIZE);
        assert!(matches!(page_size(-1), Err(AppError::BadRequest(_))));
        assert_eq!(page_bounds(10, 40).unwrap(), (10, 40));
        assert!(matches!(page_bounds(10, -5), Err(AppError::BadRequest(_))));
    }
}
