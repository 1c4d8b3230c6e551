use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};
use time::OffsetDateTime;

/// One user's vote on an (image, tag) link.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Vote {
    #[serde(skip)]
    pub user_id: i64,
    pub user_uuid: String,
    #[serde(skip)]
    pub image_id: i64,
    pub image_uuid: String,
    #[serde(skip)]
    pub tag_id: i64,
    pub tag_uuid: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp_utc: OffsetDateTime,
    pub is_upvote: bool,
}

fn votes_query(where_clause: &str) -> String {
    format!(
        r#"
        SELECT v.user_id, u.uuid AS user_uuid, v.image_id, i.uuid AS image_uuid,
               v.tag_id, t.uuid AS tag_uuid, v.created_utc AS timestamp_utc, v.is_upvote
        FROM vote v
            JOIN users u ON v.user_id = u.id
            JOIN image i ON v.image_id = i.id
            JOIN tag t ON v.tag_id = t.id
        {where_clause}
        ORDER BY v.created_utc DESC
        "#
    )
}

pub async fn create(
    db: impl PgExecutor<'_>,
    user_id: i64,
    image_id: i64,
    tag_id: i64,
    is_upvote: bool,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO vote (user_id, image_id, tag_id, created_utc, is_upvote) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(user_id)
    .bind(image_id)
    .bind(tag_id)
    .bind(OffsetDateTime::now_utc())
    .bind(is_upvote)
    .execute(db)
    .await
    .context("insert vote")?;
    Ok(())
}

pub async fn for_image(db: impl PgExecutor<'_>, image_id: i64) -> anyhow::Result<Vec<Vote>> {
    sqlx::query_as::<_, Vote>(&votes_query("WHERE v.image_id = $1"))
        .bind(image_id)
        .fetch_all(db)
        .await
        .context("select votes for image")
}

pub async fn for_tag(db: impl PgExecutor<'_>, tag_id: i64) -> anyhow::Result<Vec<Vote>> {
    sqlx::query_as::<_, Vote>(&votes_query("WHERE v.tag_id = $1"))
        .bind(tag_id)
        .fetch_all(db)
        .await
        .context("select votes for tag")
}

pub async fn for_user_and_image(
    db: impl PgExecutor<'_>,
    user_id: i64,
    image_id: i64,
) -> anyhow::Result<Vec<Vote>> {
    sqlx::query_as::<_, Vote>(&votes_query("WHERE v.user_id = $1 AND v.image_id = $2"))
        .bind(user_id)
        .bind(image_id)
        .fetch_all(db)
        .await
        .context("select votes for user and image")
}

pub async fn for_user_and_tag(
    db: impl PgExecutor<'_>,
    user_id: i64,
    tag_id: i64,
) -> anyhow::Result<Vec<Vote>> {
    sqlx::query_as::<_, Vote>(&votes_query("WHERE v.user_id = $1 AND v.tag_id = $2"))
        .bind(user_id)
        .bind(tag_id)
        .fetch_all(db)
        .await
        .context("select votes for user and tag")
}

pub async fn get(
    db: impl PgExecutor<'_>,
    user_id: i64,
    image_id: i64,
    tag_id: i64,
) -> anyhow::Result<Option<Vote>> {
    sqlx::query_as::<_, Vote>(&votes_query(
        "WHERE v.user_id = $1 AND v.image_id = $2 AND v.tag_id = $3",
    ))
    .bind(user_id)
    .bind(image_id)
    .bind(tag_id)
    .fetch_optional(db)
    .await
    .context("select vote")
}

pub async fn set_tag_id(
    db: impl PgExecutor<'_>,
    user_id: i64,
    image_id: i64,
    old_tag_id: i64,
    new_tag_id: i64,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE vote SET tag_id = $1 WHERE user_id = $2 AND image_id = $3 AND tag_id = $4")
        .bind(new_tag_id)
        .bind(user_id)
        .bind(image_id)
        .bind(old_tag_id)
        .execute(db)
        .await
        .context("update vote tag")?;
    Ok(())
}

pub async fn delete(db: impl PgExecutor<'_>, user_id: i64, image_id: i64, tag_id: i64) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM vote WHERE user_id = $1 AND image_id = $2 AND tag_id = $3")
        .bind(user_id)
        .bind(image_id)
        .bind(tag_id)
        .execute(db)
        .await
        .context("delete vote")?;
    Ok(())
}
