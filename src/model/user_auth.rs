use anyhow::Context;
use sqlx::{FromRow, PgExecutor};
use time::OffsetDateTime;

use crate::crypto::{self, CryptoError};

pub const PROVIDER_GOOGLE: &str = "google";
pub const PROVIDER_SLACK: &str = "slack";
pub const PROVIDER_FACEBOOK: &str = "facebook";

/// A provider's access token for a user, stored encrypted and looked up by HMAC.
#[derive(Debug, Clone, FromRow)]
pub struct UserAuth {
    pub user_id: i64,
    pub provider: String,
    pub timestamp_utc: OffsetDateTime,
    pub auth_token: Vec<u8>,
    pub auth_token_hash: Vec<u8>,
    pub auth_secret: Option<Vec<u8>>,
}

impl UserAuth {
    pub fn new(
        user_id: i64,
        provider: &str,
        token: &str,
        secret: Option<&str>,
        key: &[u8],
    ) -> Result<Self, CryptoError> {
        let auth_secret = match secret.filter(|s| !s.is_empty()) {
            Some(s) => Some(crypto::encrypt(key, s.as_bytes())?),
            None => None,
        };
        Ok(Self {
            user_id,
            provider: provider.to_string(),
            timestamp_utc: OffsetDateTime::now_utc(),
            auth_token: crypto::encrypt(key, token.as_bytes())?,
            auth_token_hash: crypto::hmac512(key, token.as_bytes())?,
            auth_secret,
        })
    }

    pub fn token(&self, key: &[u8]) -> Result<String, CryptoError> {
        let plain = crypto::decrypt(key, &self.auth_token)?;
        String::from_utf8(plain).map_err(|_| CryptoError::InvalidCiphertext)
    }
}

pub async fn create(db: impl PgExecutor<'_>, auth: &UserAuth) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user_auth (user_id, provider, timestamp_utc, auth_token, auth_token_hash, auth_secret)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(auth.user_id)
    .bind(&auth.provider)
    .bind(auth.timestamp_utc)
    .bind(&auth.auth_token)
    .bind(&auth.auth_token_hash)
    .bind(&auth.auth_secret)
    .execute(db)
    .await
    .context("insert user auth")?;
    Ok(())
}

pub async fn delete_for_provider(db: impl PgExecutor<'_>, user_id: i64, provider: &str) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM user_auth WHERE user_id = $1 AND provider = $2")
        .bind(user_id)
        .bind(provider)
        .execute(db)
        .await
        .context("delete user auth")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_encrypted_and_recoverable() {
        let key = [3u8; 32];
        let auth = UserAuth::new(1, PROVIDER_GOOGLE, "ya29.token", Some(""), &key).unwrap();
        assert_ne!(auth.auth_token, b"ya29.token");
        assert!(auth.auth_secret.is_none());
        assert_eq!(auth.auth_token_hash, crypto::hmac512(&key, b"ya29.token").unwrap());
        assert_eq!(auth.token(&key).unwrap(), "ya29.token");
    }

    #[test]
    fn missing_key_is_an_error() {
        assert!(matches!(
            UserAuth::new(1, PROVIDER_SLACK, "t", None, &[]),
            Err(CryptoError::MissingKey)
        ));
    }
}
