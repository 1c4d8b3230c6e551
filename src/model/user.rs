use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use time::OffsetDateTime;

use crate::crypto::new_uuid;

pub(crate) const USER_COLUMNS: &str = "id, uuid, created_utc, username, first_name, last_name, \
     email_address, is_email_verified, is_admin, is_moderator, is_banned";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct User {
    #[serde(skip)]
    pub id: i64,
    pub uuid: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_utc: OffsetDateTime,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_address: Option<String>,
    pub is_email_verified: bool,
    pub is_admin: bool,
    pub is_moderator: bool,
    pub is_banned: bool,
}

impl User {
    /// Unsaved user; `id` stays 0 until `create` returns the stored row.
    pub fn new(username: &str) -> Self {
        Self {
            id: 0,
            uuid: new_uuid(),
            created_utc: OffsetDateTime::now_utc(),
            username: username.to_string(),
            first_name: None,
            last_name: None,
            email_address: None,
            is_email_verified: false,
            is_admin: false,
            is_moderator: false,
            is_banned: false,
        }
    }

    pub fn can_moderate(&self) -> bool {
        self.is_admin || self.is_moderator
    }
}

pub async fn create(db: impl PgExecutor<'_>, user: &User) -> anyhow::Result<User> {
    let q = format!(
        r#"
        INSERT INTO users (uuid, created_utc, username, first_name, last_name, email_address,
                           is_email_verified, is_admin, is_moderator, is_banned)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {USER_COLUMNS}
        "#
    );
    sqlx::query_as::<_, User>(&q)
        .bind(&user.uuid)
        .bind(user.created_utc)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email_address)
        .bind(user.is_email_verified)
        .bind(user.is_admin)
        .bind(user.is_moderator)
        .bind(user.is_banned)
        .fetch_one(db)
        .await
        .context("insert user")
}

/// Writes every mutable column back; `uuid` and `created_utc` never change.
pub async fn update(db: impl PgExecutor<'_>, user: &User) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE users SET
            username = $2, first_name = $3, last_name = $4, email_address = $5,
            is_email_verified = $6, is_admin = $7, is_moderator = $8, is_banned = $9
        WHERE id = $1
        "#,
    )
    .bind(user.id)
    .bind(&user.username)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.email_address)
    .bind(user.is_email_verified)
    .bind(user.is_admin)
    .bind(user.is_moderator)
    .bind(user.is_banned)
    .execute(db)
    .await
    .context("update user")?;
    Ok(())
}

pub async fn all(db: impl PgExecutor<'_>) -> anyhow::Result<Vec<User>> {
    let q = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
    sqlx::query_as::<_, User>(&q)
        .fetch_all(db)
        .await
        .context("select users")
}

pub async fn page(db: impl PgExecutor<'_>, count: i64, offset: i64) -> anyhow::Result<Vec<User>> {
    let q = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_utc DESC LIMIT $1 OFFSET $2");
    sqlx::query_as::<_, User>(&q)
        .bind(count)
        .bind(offset)
        .fetch_all(db)
        .await
        .context("select users page")
}

pub async fn by_id(db: impl PgExecutor<'_>, id: i64) -> anyhow::Result<Option<User>> {
    let q = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    sqlx::query_as::<_, User>(&q)
        .bind(id)
        .fetch_optional(db)
        .await
        .context("select user by id")
}

pub async fn by_uuid(db: impl PgExecutor<'_>, uuid: &str) -> anyhow::Result<Option<User>> {
    let q = format!("SELECT {USER_COLUMNS} FROM users WHERE uuid = $1");
    sqlx::query_as::<_, User>(&q)
        .bind(uuid)
        .fetch_optional(db)
        .await
        .context("select user by uuid")
}

pub async fn by_username(db: impl PgExecutor<'_>, username: &str) -> anyhow::Result<Option<User>> {
    let q = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
    sqlx::query_as::<_, User>(&q)
        .bind(username)
        .fetch_optional(db)
        .await
        .context("select user by username")
}

/// Substring match on username, names and email.
pub async fn search(db: impl PgExecutor<'_>, query: &str) -> anyhow::Result<Vec<User>> {
    let q = format!(
        "SELECT {USER_COLUMNS} FROM users \
         WHERE username ILIKE $1 OR first_name ILIKE $1 OR last_name ILIKE $1 OR email_address ILIKE $1"
    );
    sqlx::query_as::<_, User>(&q)
        .bind(format!("%{}%", query))
        .fetch_all(db)
        .await
        .context("search users")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_has_fresh_identity_and_no_privileges() {
        let u = User::new("someone@example.com");
        assert_eq!(u.id, 0);
        assert_eq!(u.uuid.len(), 32);
        assert!(!u.is_admin && !u.is_moderator && !u.is_banned);
        assert!(!u.can_moderate());
    }

    #[test]
    fn json_hides_internal_id() {
        let mut u = User::new("someone");
        u.id = 42;
        let v = serde_json::to_value(&u).unwrap();
        assert!(v.get("id").is_none());
        assert_eq!(v["username"], "someone");
        assert_eq!(v["is_banned"], false);
    }
}
