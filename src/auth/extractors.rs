use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use tracing::{debug, warn};

use super::jwt::JwtKeys;
use super::session::Session;
use crate::error::AppError;
use crate::model::{user, user_session};
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "giffy";

/// Reads one cookie value out of the `Cookie` headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

/// The session token, from the cookie or an `Authorization: Bearer` header.
fn session_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = cookie_value(headers, SESSION_COOKIE) {
        return Some(token);
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer ").or_else(|| auth.strip_prefix("bearer ")))
}

/// Resolves a session id through the cache, falling back to the database.
pub async fn verify_session(state: &AppState, session_id: &str) -> Result<Option<Session>, AppError> {
    if let Some(session) = state.sessions.get(session_id).await {
        return Ok(Some(session));
    }

    let Some(stored) = user_session::by_session_id(&state.db, session_id).await? else {
        return Ok(None);
    };
    let Some(user) = user::by_id(&state.db, stored.user_id).await? else {
        return Ok(None);
    };

    debug!(user_id = user.id, "session restored from database");
    let mut session = Session::new(&stored.session_id, user);
    session.created_utc = stored.timestamp_utc;
    state.sessions.add(session.clone()).await;
    Ok(Some(session))
}

async fn resolve(parts: &Parts, state: &AppState) -> Result<Option<Session>, AppError> {
    let Some(token) = session_token(&parts.headers) else {
        return Ok(None);
    };
    let keys = JwtKeys::from_ref(state);
    let claims = match keys.verify(token) {
        Ok(c) => c,
        Err(_) => {
            warn!("invalid or expired session token");
            return Ok(None);
        }
    };
    verify_session(state, &claims.sid).await
}

/// Rejects the request with 403 unless a live, unbanned session is present.
pub struct SessionRequired(pub Session);

#[async_trait]
impl FromRequestParts<AppState> for SessionRequired {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match resolve(parts, state).await? {
            Some(session) if !session.user.is_banned => Ok(SessionRequired(session)),
            _ => Err(AppError::NotAuthorized),
        }
    }
}

/// The session when there is one; never rejects for a missing or bad token.
pub struct SessionAware(pub Option<Session>);

#[async_trait]
impl FromRequestParts<AppState> for SessionAware {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(SessionAware(resolve(parts, state).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn finds_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("a=1; giffy=tok.en.sig; b=2"));
        assert_eq!(cookie_value(&headers, "giffy"), Some("tok.en.sig"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn bearer_header_is_a_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(session_token(&headers), Some("abc"));

        headers.insert(header::COOKIE, HeaderValue::from_static("giffy=fromcookie"));
        assert_eq!(session_token(&headers), Some("fromcookie"));
    }

    #[tokio::test]
    async fn cached_sessions_resolve_without_database() {
        let state = AppState::fake();
        let mut u = user::User::new("test@example.com");
        u.id = 42;
        state.sessions.add(Session::new("cached", u)).await;

        let session = verify_session(&state, "cached").await.unwrap().unwrap();
        assert_eq!(session.user_id, 42);
    }
}
