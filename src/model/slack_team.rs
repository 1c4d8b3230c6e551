use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};
use time::OffsetDateTime;

use crate::model::content_rating;

/// A Slack workspace that installed the integration.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SlackTeam {
    pub team_id: String,
    pub team_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_utc: OffsetDateTime,
    pub is_enabled: bool,
    pub created_by_id: String,
    pub created_by_name: String,
    pub content_rating: i32,
}

impl SlackTeam {
    /// Enabled, searching everything up to the default filter.
    pub fn new(team_id: &str, team_name: &str, user_id: &str, user_name: &str) -> Self {
        Self {
            team_id: team_id.to_string(),
            team_name: team_name.to_string(),
            created_utc: OffsetDateTime::now_utc(),
            is_enabled: true,
            created_by_id: user_id.to_string(),
            created_by_name: user_name.to_string(),
            content_rating: content_rating::FILTER_DEFAULT,
        }
    }
}

const TEAM_COLUMNS: &str =
    "team_id, team_name, created_utc, is_enabled, created_by_id, created_by_name, content_rating";

pub async fn create(db: impl PgExecutor<'_>, team: &SlackTeam) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO slack_team (team_id, team_name, created_utc, is_enabled, created_by_id,
                                created_by_name, content_rating)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&team.team_id)
    .bind(&team.team_name)
    .bind(team.created_utc)
    .bind(team.is_enabled)
    .bind(&team.created_by_id)
    .bind(&team.created_by_name)
    .bind(team.content_rating)
    .execute(db)
    .await
    .context("insert slack team")?;
    Ok(())
}

pub async fn all(db: impl PgExecutor<'_>) -> anyhow::Result<Vec<SlackTeam>> {
    let q = format!("SELECT {TEAM_COLUMNS} FROM slack_team ORDER BY team_name ASC");
    sqlx::query_as::<_, SlackTeam>(&q)
        .fetch_all(db)
        .await
        .context("select slack teams")
}

pub async fn by_team_id(db: impl PgExecutor<'_>, team_id: &str) -> anyhow::Result<Option<SlackTeam>> {
    let q = format!("SELECT {TEAM_COLUMNS} FROM slack_team WHERE team_id = $1");
    sqlx::query_as::<_, SlackTeam>(&q)
        .bind(team_id)
        .fetch_optional(db)
        .await
        .context("select slack team")
}

pub async fn update_settings(
    db: impl PgExecutor<'_>,
    team_id: &str,
    is_enabled: bool,
    content_rating: i32,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE slack_team SET is_enabled = $2, content_rating = $3 WHERE team_id = $1")
        .bind(team_id)
        .bind(is_enabled)
        .bind(content_rating)
        .execute(db)
        .await
        .context("update slack team")?;
    Ok(())
}
