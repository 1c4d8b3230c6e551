use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// Custom S3 endpoint (MinIO, localstack). Path style addressing is used when set.
    pub endpoint: Option<String>,
    pub bucket: String,
    pub cloudfront_dns: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackConfig {
    pub client_id: String,
    pub client_secret: String,
    pub verification_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub environment: String,
    pub database_url: String,
    pub base_url: String,
    pub static_dir: String,
    pub admin_user_email: String,
    /// Raw 32 byte key for token encryption; empty when unset.
    pub encryption_key: Vec<u8>,
    pub session: SessionConfig,
    pub aws: AwsConfig,
    pub google: OAuthClientConfig,
    pub facebook: OAuthClientConfig,
    pub slack: SlackConfig,
    pub jobs_enabled: bool,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn var_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = var_or("GIFFY_ENV", "dev");
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let encryption_key = match var_opt("ENCRYPTION_KEY") {
            Some(encoded) => STANDARD
                .decode(encoded.trim())
                .context("ENCRYPTION_KEY must be base64")?,
            None => Vec::new(),
        };

        let session = SessionConfig {
            secret: std::env::var("SESSION_SECRET").context("SESSION_SECRET must be set")?,
            issuer: var_or("SESSION_ISSUER", "giffy"),
            audience: var_or("SESSION_AUDIENCE", "giffy-web"),
            ttl_minutes: std::env::var("SESSION_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 30),
        };

        let aws = AwsConfig {
            region: var_or("AWS_REGION", "us-east-1"),
            access_key_id: var_or("AWS_ACCESS_KEY_ID", ""),
            secret_access_key: var_or("AWS_SECRET_ACCESS_KEY", ""),
            session_token: var_opt("AWS_SESSION_TOKEN"),
            endpoint: var_opt("S3_ENDPOINT"),
            bucket: var_opt("S3_BUCKET").unwrap_or_else(|| format!("giffy-{}", environment)),
            cloudfront_dns: var_opt("CLOUDFRONT_DNS"),
        };

        Ok(Self {
            database_url,
            base_url: var_or("BASE_URL", "http://localhost:8080"),
            static_dir: var_or("STATIC_DIR", "_client/dist"),
            admin_user_email: var_or("ADMIN_USER_EMAIL", ""),
            encryption_key,
            session,
            aws,
            google: OAuthClientConfig {
                client_id: var_or("GOOGLE_CLIENT_ID", ""),
                client_secret: var_or("GOOGLE_CLIENT_SECRET", ""),
            },
            facebook: OAuthClientConfig {
                client_id: var_or("FACEBOOK_CLIENT_ID", ""),
                client_secret: var_or("FACEBOOK_CLIENT_SECRET", ""),
            },
            slack: SlackConfig {
                client_id: var_or("SLACK_CLIENT_ID", ""),
                client_secret: var_or("SLACK_CLIENT_SECRET", ""),
                verification_token: var_or("SLACK_VERIFICATION_TOKEN", ""),
            },
            jobs_enabled: var_opt("JOBS_DISABLED").is_none(),
            environment,
        })
    }

    pub fn is_production(&self) -> bool {
        matches!(self.environment.as_str(), "prod" | "production")
    }

    pub fn google_redirect_uri(&self) -> String {
        format!("{}/oauth/google", self.base_url)
    }

    pub fn facebook_redirect_uri(&self) -> String {
        format!("{}/oauth/facebook", self.base_url)
    }

    pub fn slack_redirect_uri(&self) -> String {
        format!("{}/oauth/slack", self.base_url)
    }

    /// Public URL an uploaded object can be read from.
    pub fn read_url(&self, bucket: &str, key: &str) -> String {
        match &self.aws.cloudfront_dns {
            Some(dns) => format!("https://{}/{}", dns, key),
            None => format!("https://s3-{}.amazonaws.com/{}/{}", self.aws.region, bucket, key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;

    #[tokio::test]
    async fn read_url_prefers_cloudfront() {
        let state = AppState::fake();
        let mut cfg = (*state.config).clone();
        cfg.aws.cloudfront_dns = None;
        assert_eq!(
            cfg.read_url("giffy-test", "abc.gif"),
            "https://s3-us-east-1.amazonaws.com/giffy-test/abc.gif"
        );
        cfg.aws.cloudfront_dns = Some("d123.cloudfront.net".into());
        assert_eq!(cfg.read_url("giffy-test", "abc.gif"), "https://d123.cloudfront.net/abc.gif");
    }

    #[tokio::test]
    async fn redirect_uris_hang_off_base_url() {
        let state = AppState::fake();
        assert_eq!(state.config.google_redirect_uri(), "http://localhost:8080/oauth/google");
        assert_eq!(state.config.slack_redirect_uri(), "http://localhost:8080/oauth/slack");
    }
}
