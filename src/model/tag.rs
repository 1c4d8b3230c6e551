use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgExecutor};
use time::OffsetDateTime;

use crate::crypto::new_uuid;
use crate::model::{vote, vote_summary};

/// Width of the `tag_value` column, in characters.
pub const MAX_TAG_VALUE_LEN: usize = 32;

pub(crate) const TAG_COLUMNS: &str = "id, uuid, created_utc, created_by, tag_value";

/// A tag; the vote columns are only populated when loaded through an image.
#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct Tag {
    #[serde(skip)]
    pub id: i64,
    pub uuid: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_utc: OffsetDateTime,
    #[serde(skip)]
    pub created_by: i64,
    pub tag_value: String,

    #[sqlx(default)]
    #[serde(rename = "created_by", skip_serializing_if = "Option::is_none")]
    pub created_by_uuid: Option<String>,
    #[sqlx(default)]
    #[serde(skip)]
    pub image_id: Option<i64>,
    #[sqlx(default)]
    #[serde(skip_serializing_if = "is_zero")]
    pub votes_for: i32,
    #[sqlx(default)]
    #[serde(skip_serializing_if = "is_zero")]
    pub votes_against: i32,
    #[sqlx(default)]
    pub votes_total: i32,
    #[sqlx(default)]
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub vote_rank: i64,
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

impl Tag {
    pub fn new(created_by: i64, tag_value: &str) -> Self {
        Self {
            id: 0,
            uuid: new_uuid(),
            created_utc: OffsetDateTime::now_utc(),
            created_by,
            tag_value: tag_value.to_string(),
            created_by_uuid: None,
            image_id: None,
            votes_for: 0,
            votes_against: 0,
            votes_total: 0,
            vote_rank: 0,
        }
    }
}

/// Lowercases, trims and strips everything but letters, digits and whitespace.
pub fn clean_tag_value(value: &str) -> String {
    value
        .to_lowercase()
        .trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect()
}

pub async fn create(db: impl PgExecutor<'_>, tag: &Tag) -> anyhow::Result<Tag> {
    let q = format!(
        "INSERT INTO tag (uuid, created_utc, created_by, tag_value) VALUES ($1, $2, $3, $4) \
         RETURNING {TAG_COLUMNS}"
    );
    sqlx::query_as::<_, Tag>(&q)
        .bind(&tag.uuid)
        .bind(tag.created_utc)
        .bind(tag.created_by)
        .bind(&tag.tag_value)
        .fetch_one(db)
        .await
        .context("insert tag")
}

pub async fn all(db: impl PgExecutor<'_>) -> anyhow::Result<Vec<Tag>> {
    let q = format!("SELECT {TAG_COLUMNS} FROM tag ORDER BY tag_value");
    sqlx::query_as::<_, Tag>(&q)
        .fetch_all(db)
        .await
        .context("select tags")
}

pub async fn random(db: impl PgExecutor<'_>, count: i64) -> anyhow::Result<Vec<Tag>> {
    let q = format!("SELECT {TAG_COLUMNS} FROM tag ORDER BY gen_random_uuid() LIMIT $1");
    sqlx::query_as::<_, Tag>(&q)
        .bind(count)
        .fetch_all(db)
        .await
        .context("select random tags")
}

pub async fn by_id(db: impl PgExecutor<'_>, id: i64) -> anyhow::Result<Option<Tag>> {
    let q = format!("SELECT {TAG_COLUMNS} FROM tag WHERE id = $1");
    sqlx::query_as::<_, Tag>(&q)
        .bind(id)
        .fetch_optional(db)
        .await
        .context("select tag by id")
}

pub async fn by_uuid(db: impl PgExecutor<'_>, uuid: &str) -> anyhow::Result<Option<Tag>> {
    let q = format!("SELECT {TAG_COLUMNS} FROM tag WHERE uuid = $1");
    sqlx::query_as::<_, Tag>(&q)
        .bind(uuid)
        .fetch_optional(db)
        .await
        .context("select tag by uuid")
}

/// Case-insensitive exact match.
pub async fn by_value(db: impl PgExecutor<'_>, value: &str) -> anyhow::Result<Option<Tag>> {
    let q = format!("SELECT {TAG_COLUMNS} FROM tag WHERE tag_value ILIKE $1 LIMIT 1");
    sqlx::query_as::<_, Tag>(&q)
        .bind(value)
        .fetch_optional(db)
        .await
        .context("select tag by value")
}

/// Tags linked to an image with their vote counts, best voted first.
pub async fn for_image(db: impl PgExecutor<'_>, image_id: i64) -> anyhow::Result<Vec<Tag>> {
    sqlx::query_as::<_, Tag>(
        r#"
        SELECT t.id, t.uuid, t.created_utc, t.created_by, t.tag_value,
               u.uuid AS created_by_uuid, vs.image_id,
               vs.votes_for, vs.votes_against, vs.votes_total
        FROM tag t
            JOIN vote_summary vs ON vs.tag_id = t.id
            JOIN users u ON u.id = t.created_by
        WHERE vs.image_id = $1
        ORDER BY vs.votes_total DESC
        "#,
    )
    .bind(image_id)
    .fetch_all(db)
    .await
    .context("select tags for image")
}

/// Trigram match ordered by similarity.
pub async fn search(db: impl PgExecutor<'_>, query: &str) -> anyhow::Result<Vec<Tag>> {
    let q = format!(
        "SELECT {TAG_COLUMNS} FROM tag WHERE tag_value % $1 ORDER BY similarity(tag_value, $1) DESC"
    );
    sqlx::query_as::<_, Tag>(&q)
        .bind(query)
        .fetch_all(db)
        .await
        .context("search tags")
}

pub async fn set_value(db: impl PgExecutor<'_>, tag_id: i64, value: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE tag SET tag_value = $1 WHERE id = $2")
        .bind(value)
        .bind(tag_id)
        .execute(db)
        .await
        .context("update tag value")?;
    Ok(())
}

pub async fn delete_by_id(db: impl PgExecutor<'_>, tag_id: i64) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM tag WHERE id = $1")
        .bind(tag_id)
        .execute(db)
        .await
        .context("delete tag")?;
    Ok(())
}

/// Removes the tag's links, then its votes, then the tag.
pub async fn delete_with_votes(conn: &mut PgConnection, tag_id: i64) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM vote_summary WHERE tag_id = $1")
        .bind(tag_id)
        .execute(&mut *conn)
        .await
        .context("delete tag vote summaries")?;
    sqlx::query("DELETE FROM vote WHERE tag_id = $1")
        .bind(tag_id)
        .execute(&mut *conn)
        .await
        .context("delete tag votes")?;
    delete_by_id(&mut *conn, tag_id).await
}

/// Moves every vote and link from `from_tag_id` onto `to_tag_id`, then drops `from_tag_id`.
pub async fn merge(conn: &mut PgConnection, from_tag_id: i64, to_tag_id: i64) -> anyhow::Result<()> {
    for v in vote::for_tag(&mut *conn, from_tag_id).await? {
        let existing = vote::get(&mut *conn, v.user_id, v.image_id, to_tag_id).await?;
        if existing.is_some() {
            vote::delete(&mut *conn, v.user_id, v.image_id, from_tag_id).await?;
        } else {
            vote::set_tag_id(&mut *conn, v.user_id, v.image_id, from_tag_id, to_tag_id).await?;
        }
    }

    for link in vote_summary::for_tag(&mut *conn, from_tag_id).await? {
        let existing = vote_summary::get(&mut *conn, link.image_id, to_tag_id).await?;
        if existing.is_some() {
            vote_summary::reconcile_totals(&mut *conn, link.image_id, to_tag_id).await?;
            vote_summary::delete(&mut *conn, link.image_id, from_tag_id).await?;
        } else {
            vote_summary::set_tag_id(&mut *conn, link.image_id, from_tag_id, to_tag_id).await?;
        }
    }

    delete_by_id(&mut *conn, from_tag_id).await
}

/// Tags with no links, and the votes pointing at them.
pub async fn delete_orphaned(conn: &mut PgConnection) -> anyhow::Result<u64> {
    sqlx::query(
        "DELETE FROM vote WHERE NOT EXISTS (SELECT 1 FROM vote_summary vs WHERE vs.tag_id = vote.tag_id)",
    )
    .execute(&mut *conn)
    .await
    .context("delete orphaned votes")?;
    let res = sqlx::query(
        "DELETE FROM tag WHERE NOT EXISTS (SELECT 1 FROM vote_summary vs WHERE vs.tag_id = tag.id)",
    )
    .execute(&mut *conn)
    .await
    .context("delete orphaned tags")?;
    Ok(res.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_tag_value_strips_punctuation() {
        assert_eq!(clean_tag_value("  Hello, World!  "), "hello world");
        assert_eq!(clean_tag_value("ÜBER cool #1"), "über cool 1");
        assert_eq!(clean_tag_value("!!!"), "");
    }

    #[test]
    fn plain_tag_json_omits_vote_details() {
        let t = Tag::new(1, "cats");
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["tag_value"], "cats");
        assert_eq!(v["votes_total"], 0);
        assert!(v.get("votes_for").is_none());
        assert!(v.get("vote_rank").is_none());
        assert!(v.get("created_by").is_none());
        assert!(v.get("id").is_none());
    }
}
