use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use super::extractors::SESSION_COOKIE;
use super::jwt::JwtKeys;
use super::oauth::OAuthProfile;
use super::session::Session;
use crate::error::{AppError, AppResult};
use crate::model::user::{self, User};
use crate::model::user_auth::{self, UserAuth};
use crate::model::user_session::{self, UserSession};
use crate::state::AppState;

/// A freshly logged in user and the signed token for their cookie.
pub struct LoginResult {
    pub user: User,
    pub session_id: String,
    pub token: String,
}

/// Providers hand back an email that becomes the username; refuse anything else.
pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Finds or creates the user for a provider profile, stores the provider token
/// and opens a session.
#[instrument(skip(state, profile), fields(email = %profile.email))]
pub async fn finish_oauth_login(state: &AppState, provider: &str, profile: &OAuthProfile) -> AppResult<LoginResult> {
    if !is_valid_email(&profile.email) {
        warn!(provider = %provider, "provider returned an unusable email");
        return Err(AppError::bad_request("the login provider did not return a valid email address"));
    }

    let user = match user::by_username(&state.db, &profile.email).await? {
        Some(existing) => existing,
        None => {
            let mut prototype = profile.to_user();
            if !state.config.admin_user_email.is_empty()
                && prototype.username.eq_ignore_ascii_case(&state.config.admin_user_email)
            {
                prototype.is_admin = true;
                prototype.is_moderator = true;
            }
            let created = user::create(&state.db, &prototype).await?;
            info!(user_id = created.id, "user created");
            created
        }
    };

    let credentials = UserAuth::new(
        user.id,
        provider,
        &profile.access_token,
        None,
        &state.config.encryption_key,
    )?;
    let stored_session = UserSession::new(user.id);

    let mut tx = state.db.begin().await?;
    user_auth::delete_for_provider(&mut *tx, user.id, provider).await?;
    user_auth::create(&mut *tx, &credentials).await?;
    user_session::create(&mut *tx, &stored_session).await?;
    tx.commit().await?;

    let mut session = Session::new(&stored_session.session_id, user.clone());
    session.created_utc = stored_session.timestamp_utc;
    state.sessions.add(session).await;

    let token = JwtKeys::from_ref(state).sign_session(&stored_session.session_id, &user.uuid)?;
    info!(user_id = user.id, provider = %provider, "user logged in");
    Ok(LoginResult {
        user,
        session_id: stored_session.session_id,
        token,
    })
}

/// Drops the session from the cache and the database.
#[instrument(skip(state, session), fields(user_id = session.user_id))]
pub async fn logout(state: &AppState, session: &Session) -> AppResult<()> {
    state.sessions.expire(&session.session_id).await;
    user_session::delete(&state.db, session.user_id, &session.session_id).await?;
    info!("user logged out");
    Ok(())
}

/// `Set-Cookie` value for a new session.
pub fn session_cookie(state: &AppState, token: &str) -> String {
    let max_age = JwtKeys::from_ref(state).ttl_seconds();
    let secure = if state.config.is_production() { "; Secure" } else { "" };
    format!("{SESSION_COOKIE}={token}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax{secure}")
}

/// `Set-Cookie` value that clears the session cookie.
pub fn expired_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_emails_are_checked() {
        assert!(is_valid_email("someone@example.com"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("two words@example.com"));
    }

    #[tokio::test]
    async fn session_cookie_shape() {
        let state = AppState::fake();
        let cookie = session_cookie(&state, "abc.def.ghi");
        assert!(cookie.starts_with("giffy=abc.def.ghi; Path=/"));
        assert!(cookie.contains("Max-Age=300"));
        assert!(cookie.contains("HttpOnly"));
        assert!(!cookie.contains("Secure"));
        assert!(expired_session_cookie().contains("Max-Age=0"));
    }
}
