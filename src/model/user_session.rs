use anyhow::Context;
use sqlx::{FromRow, PgExecutor};
use time::OffsetDateTime;

use crate::crypto::random_string;

pub const SESSION_ID_LEN: usize = 32;

#[derive(Debug, Clone, FromRow)]
pub struct UserSession {
    pub session_id: String,
    pub user_id: i64,
    pub timestamp_utc: OffsetDateTime,
}

impl UserSession {
    pub fn new(user_id: i64) -> Self {
        Self {
            session_id: random_string(SESSION_ID_LEN),
            user_id,
            timestamp_utc: OffsetDateTime::now_utc(),
        }
    }
}

pub async fn create(db: impl PgExecutor<'_>, session: &UserSession) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO user_session (session_id, user_id, timestamp_utc) VALUES ($1, $2, $3)")
        .bind(&session.session_id)
        .bind(session.user_id)
        .bind(session.timestamp_utc)
        .execute(db)
        .await
        .context("insert user session")?;
    Ok(())
}

pub async fn by_session_id(db: impl PgExecutor<'_>, session_id: &str) -> anyhow::Result<Option<UserSession>> {
    sqlx::query_as::<_, UserSession>(
        "SELECT session_id, user_id, timestamp_utc FROM user_session WHERE session_id = $1",
    )
    .bind(session_id)
    .fetch_optional(db)
    .await
    .context("select user session")
}

pub async fn delete(db: impl PgExecutor<'_>, user_id: i64, session_id: &str) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM user_session WHERE user_id = $1 AND session_id = $2")
        .bind(user_id)
        .bind(session_id)
        .execute(db)
        .await
        .context("delete user session")?;
    Ok(())
}
