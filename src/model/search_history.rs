use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};
use time::OffsetDateTime;

pub const SOURCE_SLACK: &str = "slack";

#[derive(Debug, Clone, Default)]
pub struct NewSearchHistory {
    pub source: String,
    pub source_team_identifier: Option<String>,
    pub source_team_name: Option<String>,
    pub source_channel_identifier: Option<String>,
    pub source_channel_name: Option<String>,
    pub source_user_identifier: Option<String>,
    pub source_user_name: Option<String>,
    pub search_query: String,
    pub did_find_match: bool,
    pub image_id: Option<i64>,
    pub tag_id: Option<i64>,
}

/// A search with the image and tag it resolved to, when they still exist.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SearchHistory {
    pub source: String,
    pub source_team_identifier: Option<String>,
    pub source_team_name: Option<String>,
    pub source_channel_identifier: Option<String>,
    pub source_channel_name: Option<String>,
    pub source_user_identifier: Option<String>,
    pub source_user_name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp_utc: OffsetDateTime,
    pub search_query: String,
    pub did_find_match: bool,
    #[serde(skip)]
    pub image_id: Option<i64>,
    pub image_uuid: Option<String>,
    pub image_s3_read_url: Option<String>,
    #[serde(skip)]
    pub tag_id: Option<i64>,
    pub tag_uuid: Option<String>,
    pub tag_value: Option<String>,
}

pub async fn create(db: impl PgExecutor<'_>, entry: &NewSearchHistory) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO search_history (source, source_team_identifier, source_team_name,
            source_channel_identifier, source_channel_name, source_user_identifier,
            source_user_name, timestamp_utc, search_query, did_find_match, image_id, tag_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(&entry.source)
    .bind(&entry.source_team_identifier)
    .bind(&entry.source_team_name)
    .bind(&entry.source_channel_identifier)
    .bind(&entry.source_channel_name)
    .bind(&entry.source_user_identifier)
    .bind(&entry.source_user_name)
    .bind(OffsetDateTime::now_utc())
    .bind(&entry.search_query)
    .bind(entry.did_find_match)
    .bind(entry.image_id)
    .bind(entry.tag_id)
    .execute(db)
    .await
    .context("insert search history")?;
    Ok(())
}

const HISTORY_QUERY: &str = r#"
    SELECT sh.source, sh.source_team_identifier, sh.source_team_name,
           sh.source_channel_identifier, sh.source_channel_name,
           sh.source_user_identifier, sh.source_user_name,
           sh.timestamp_utc, sh.search_query, sh.did_find_match,
           sh.image_id, i.uuid AS image_uuid, i.s3_read_url AS image_s3_read_url,
           sh.tag_id, t.uuid AS tag_uuid, t.tag_value AS tag_value
    FROM search_history sh
        LEFT JOIN image i ON i.id = sh.image_id
        LEFT JOIN tag t ON t.id = sh.tag_id
    ORDER BY sh.timestamp_utc DESC
"#;

pub async fn page(db: impl PgExecutor<'_>, count: i64, offset: i64) -> anyhow::Result<Vec<SearchHistory>> {
    let q = format!("{HISTORY_QUERY} LIMIT $1 OFFSET $2");
    sqlx::query_as::<_, SearchHistory>(&q)
        .bind(count)
        .bind(offset)
        .fetch_all(db)
        .await
        .context("select search history page")
}
