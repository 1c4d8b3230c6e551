use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::AppConfig;
use crate::model::user::User;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URL: &str = "https://accounts.google.com/o/oauth2/token";
const GOOGLE_PROFILE_URL: &str = "https://www.googleapis.com/oauth2/v1/userinfo";
const GOOGLE_SCOPES: &str =
    "https://www.googleapis.com/auth/userinfo.email https://www.googleapis.com/auth/userinfo.profile";

const FACEBOOK_AUTH_URL: &str = "https://www.facebook.com/dialog/oauth";
const FACEBOOK_TOKEN_URL: &str = "https://graph.facebook.com/v2.3/oauth/access_token";
const FACEBOOK_PROFILE_URL: &str = "https://graph.facebook.com/v2.5/me";

const SLACK_AUTH_URL: &str = "https://slack.com/oauth/authorize";
const SLACK_TOKEN_URL: &str = "https://slack.com/api/oauth.access";
const SLACK_AUTH_TEST_URL: &str = "https://slack.com/api/auth.test";
const SLACK_SCOPES: &str = "commands,chat:write.public,chat:write.customize,chat:write";

/// Who logged in, as reported by the provider.
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub access_token: String,
    pub email: String,
    pub is_email_verified: bool,
    pub first_name: String,
    pub last_name: String,
}

impl OAuthProfile {
    /// Unsaved user keyed by email.
    pub fn to_user(&self) -> User {
        let mut user = User::new(&self.email);
        user.email_address = Some(self.email.clone());
        user.is_email_verified = self.is_email_verified;
        user.first_name = Some(self.first_name.clone()).filter(|s| !s.is_empty());
        user.last_name = Some(self.last_name.clone()).filter(|s| !s.is_empty());
        user
    }
}

/// The workspace and installing user from a Slack app install.
#[derive(Debug, Clone)]
pub struct SlackInstall {
    pub team_id: String,
    pub team_name: String,
    pub user_id: String,
    pub user_name: String,
}

/// Code exchange and profile lookup for each provider.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    async fn google_profile(&self, code: &str) -> anyhow::Result<OAuthProfile>;
    async fn facebook_profile(&self, code: &str) -> anyhow::Result<OAuthProfile>;
    async fn slack_install(&self, code: &str) -> anyhow::Result<SlackInstall>;
}

fn with_query(base: &str, params: &[(&str, &str)]) -> anyhow::Result<String> {
    let url = reqwest::Url::parse_with_params(base, params).context("build oauth url")?;
    Ok(url.to_string())
}

pub fn google_login_url(config: &AppConfig) -> anyhow::Result<String> {
    with_query(
        GOOGLE_AUTH_URL,
        &[
            ("response_type", "code"),
            ("client_id", config.google.client_id.as_str()),
            ("redirect_uri", config.google_redirect_uri().as_str()),
            ("scope", GOOGLE_SCOPES),
        ],
    )
}

pub fn slack_install_url(config: &AppConfig) -> anyhow::Result<String> {
    with_query(
        SLACK_AUTH_URL,
        &[
            ("client_id", config.slack.client_id.as_str()),
            ("scope", SLACK_SCOPES),
            ("redirect_uri", config.slack_redirect_uri().as_str()),
        ],
    )
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleProfile {
    email: String,
    #[serde(default)]
    verified_email: bool,
    #[serde(default)]
    given_name: String,
    #[serde(default)]
    family_name: String,
}

#[derive(Debug, Deserialize)]
struct FacebookProfile {
    #[serde(default)]
    email: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

#[derive(Debug, Deserialize)]
struct SlackTokenResponse {
    ok: bool,
    #[serde(default)]
    error: String,
    #[serde(default)]
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SlackAuthTest {
    ok: bool,
    #[serde(default)]
    error: String,
    #[serde(default)]
    team: String,
    #[serde(default)]
    team_id: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    user_id: String,
}

pub struct HttpOAuthClient {
    http: reqwest::Client,
    config: Arc<AppConfig>,
}

impl HttpOAuthClient {
    pub fn new(http: reqwest::Client, config: Arc<AppConfig>) -> Self {
        Self { http, config }
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(&self, url: &str, form: &[(&str, &str)]) -> anyhow::Result<T> {
        let res = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .with_context(|| format!("post {}", url))?
            .error_for_status()
            .with_context(|| format!("post {}", url))?;
        res.json::<T>().await.with_context(|| format!("decode {}", url))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str, query: &[(&str, &str)]) -> anyhow::Result<T> {
        let res = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("get {}", url))?
            .error_for_status()
            .with_context(|| format!("get {}", url))?;
        res.json::<T>().await.with_context(|| format!("decode {}", url))
    }
}

#[async_trait]
impl OAuthClient for HttpOAuthClient {
    async fn google_profile(&self, code: &str) -> anyhow::Result<OAuthProfile> {
        let redirect = self.config.google_redirect_uri();
        let token: TokenResponse = self
            .post_form(
                GOOGLE_TOKEN_URL,
                &[
                    ("client_id", self.config.google.client_id.as_str()),
                    ("client_secret", self.config.google.client_secret.as_str()),
                    ("grant_type", "authorization_code"),
                    ("redirect_uri", redirect.as_str()),
                    ("code", code),
                ],
            )
            .await?;
        let profile: GoogleProfile = self
            .get_json(
                GOOGLE_PROFILE_URL,
                &[("alt", "json"), ("access_token", token.access_token.as_str())],
            )
            .await?;
        debug!(email = %profile.email, "google profile fetched");
        Ok(OAuthProfile {
            access_token: token.access_token,
            email: profile.email,
            is_email_verified: profile.verified_email,
            first_name: profile.given_name,
            last_name: profile.family_name,
        })
    }

    async fn facebook_profile(&self, code: &str) -> anyhow::Result<OAuthProfile> {
        let redirect = self.config.facebook_redirect_uri();
        let token: TokenResponse = self
            .post_form(
                FACEBOOK_TOKEN_URL,
                &[
                    ("client_id", self.config.facebook.client_id.as_str()),
                    ("client_secret", self.config.facebook.client_secret.as_str()),
                    ("redirect_uri", redirect.as_str()),
                    ("code", code),
                ],
            )
            .await?;
        let profile: FacebookProfile = self
            .get_json(
                FACEBOOK_PROFILE_URL,
                &[
                    ("access_token", token.access_token.as_str()),
                    ("fields", "email,first_name,last_name"),
                ],
            )
            .await?;
        if profile.email.is_empty() {
            bail!("facebook profile has no email");
        }
        Ok(OAuthProfile {
            access_token: token.access_token,
            email: profile.email,
            is_email_verified: true,
            first_name: profile.first_name,
            last_name: profile.last_name,
        })
    }

    async fn slack_install(&self, code: &str) -> anyhow::Result<SlackInstall> {
        let redirect = self.config.slack_redirect_uri();
        let token: SlackTokenResponse = self
            .post_form(
                SLACK_TOKEN_URL,
                &[
                    ("client_id", self.config.slack.client_id.as_str()),
                    ("client_secret", self.config.slack.client_secret.as_str()),
                    ("redirect_uri", redirect.as_str()),
                    ("code", code),
                ],
            )
            .await?;
        if !token.ok {
            bail!("slack error: {}", token.error);
        }
        let auth: SlackAuthTest = self
            .post_form(SLACK_AUTH_TEST_URL, &[("token", token.access_token.as_str())])
            .await?;
        if !auth.ok {
            bail!("slack error: {}", auth.error);
        }
        Ok(SlackInstall {
            team_id: auth.team_id,
            team_name: auth.team,
            user_id: auth.user_id,
            user_name: auth.user,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;

    #[tokio::test]
    async fn google_login_url_carries_client_and_redirect() {
        let state = AppState::fake();
        let url = google_login_url(&state.config).unwrap();
        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id=google-client"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Foauth%2Fgoogle"));
        assert!(url.contains("response_type=code"));
    }

    #[tokio::test]
    async fn slack_install_url_lists_scopes() {
        let state = AppState::fake();
        let url = slack_install_url(&state.config).unwrap();
        assert!(url.contains("scope=commands%2Cchat%3Awrite.public"));
    }

    #[test]
    fn profile_maps_to_user() {
        let profile = OAuthProfile {
            access_token: "t".into(),
            email: "a@b.com".into(),
            is_email_verified: true,
            first_name: "A".into(),
            last_name: String::new(),
        };
        let user = profile.to_user();
        assert_eq!(user.username, "a@b.com");
        assert_eq!(user.email_address.as_deref(), Some("a@b.com"));
        assert_eq!(user.first_name.as_deref(), Some("A"));
        assert_eq!(user.last_name, None);
        assert!(user.is_email_verified);
    }
}
