use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgExecutor};
use time::OffsetDateTime;

use crate::model::vote;

/// Aggregate vote counts for an (image, tag) link.
///
/// `votes_total` is always `votes_for - votes_against`; it is kept up to date
/// incrementally on each vote and re-derived from the `vote` table by
/// [`reconcile_totals`].
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VoteSummary {
    #[serde(skip)]
    pub image_id: i64,
    #[sqlx(default)]
    pub image_uuid: String,
    #[serde(skip)]
    pub tag_id: i64,
    #[sqlx(default)]
    pub tag_uuid: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_vote_utc: OffsetDateTime,
    #[serde(skip)]
    pub last_vote_by: i64,
    #[sqlx(default)]
    pub last_vote_by_uuid: String,
    pub votes_for: i32,
    pub votes_against: i32,
    pub votes_total: i32,
}

const SUMMARY_COLUMNS: &str =
    "image_id, tag_id, last_vote_utc, last_vote_by, votes_for, votes_against, votes_total";

fn summaries_query(where_clause: &str) -> String {
    format!(
        r#"
        SELECT vs.image_id, i.uuid AS image_uuid, vs.tag_id, t.uuid AS tag_uuid,
               vs.last_vote_utc, vs.last_vote_by, u.uuid AS last_vote_by_uuid,
               vs.votes_for, vs.votes_against, vs.votes_total
        FROM vote_summary vs
            JOIN image i ON i.id = vs.image_id
            JOIN tag t ON t.id = vs.tag_id
            JOIN users u ON u.id = vs.last_vote_by
        {where_clause}
        ORDER BY vs.votes_total DESC
        "#
    )
}

pub async fn get(db: impl PgExecutor<'_>, image_id: i64, tag_id: i64) -> anyhow::Result<Option<VoteSummary>> {
    let q = format!("SELECT {SUMMARY_COLUMNS} FROM vote_summary WHERE image_id = $1 AND tag_id = $2");
    sqlx::query_as::<_, VoteSummary>(&q)
        .bind(image_id)
        .bind(tag_id)
        .fetch_optional(db)
        .await
        .context("select vote summary")
}

pub async fn for_image(db: impl PgExecutor<'_>, image_id: i64) -> anyhow::Result<Vec<VoteSummary>> {
    sqlx::query_as::<_, VoteSummary>(&summaries_query("WHERE vs.image_id = $1"))
        .bind(image_id)
        .fetch_all(db)
        .await
        .context("select vote summaries for image")
}

pub async fn for_tag(db: impl PgExecutor<'_>, tag_id: i64) -> anyhow::Result<Vec<VoteSummary>> {
    sqlx::query_as::<_, VoteSummary>(&summaries_query("WHERE vs.tag_id = $1"))
        .bind(tag_id)
        .fetch_all(db)
        .await
        .context("select vote summaries for tag")
}

pub async fn set_counts(
    db: impl PgExecutor<'_>,
    image_id: i64,
    tag_id: i64,
    votes_for: i32,
    votes_against: i32,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE vote_summary SET votes_for = $1, votes_against = $2, votes_total = $3 \
         WHERE image_id = $4 AND tag_id = $5",
    )
    .bind(votes_for)
    .bind(votes_against)
    .bind(votes_for - votes_against)
    .bind(image_id)
    .bind(tag_id)
    .execute(db)
    .await
    .context("update vote summary counts")?;
    Ok(())
}

pub async fn set_tag_id(
    db: impl PgExecutor<'_>,
    image_id: i64,
    old_tag_id: i64,
    new_tag_id: i64,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE vote_summary SET tag_id = $1 WHERE image_id = $2 AND tag_id = $3")
        .bind(new_tag_id)
        .bind(image_id)
        .bind(old_tag_id)
        .execute(db)
        .await
        .context("update vote summary tag")?;
    Ok(())
}

pub async fn delete(db: impl PgExecutor<'_>, image_id: i64, tag_id: i64) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM vote_summary WHERE image_id = $1 AND tag_id = $2")
        .bind(image_id)
        .bind(tag_id)
        .execute(db)
        .await
        .context("delete vote summary")?;
    Ok(())
}

/// Re-derives the counts for one link from the `vote` table.
pub async fn reconcile_totals(db: impl PgExecutor<'_>, image_id: i64, tag_id: i64) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE vote_summary SET
            votes_for = data.votes_for,
            votes_against = data.votes_against,
            votes_total = data.votes_for - data.votes_against
        FROM (
            SELECT
                coalesce(sum(CASE WHEN is_upvote THEN 1 ELSE 0 END), 0)::int AS votes_for,
                coalesce(sum(CASE WHEN is_upvote THEN 0 ELSE 1 END), 0)::int AS votes_against
            FROM vote v
            WHERE v.image_id = $1 AND v.tag_id = $2
        ) data
        WHERE vote_summary.image_id = $1 AND vote_summary.tag_id = $2
        "#,
    )
    .bind(image_id)
    .bind(tag_id)
    .execute(db)
    .await
    .context("reconcile vote summary")?;
    Ok(())
}

/// Records a vote and bumps the link's counters. Returns true when the link
/// did not exist before this vote.
pub async fn create_or_update_vote(
    conn: &mut PgConnection,
    user_id: i64,
    image_id: i64,
    tag_id: i64,
    is_upvote: bool,
) -> anyhow::Result<bool> {
    let now = OffsetDateTime::now_utc();
    let did_create = match get(&mut *conn, image_id, tag_id).await? {
        None => {
            let (votes_for, votes_against) = if is_upvote { (1, 0) } else { (0, 1) };
            sqlx::query(
                r#"
                INSERT INTO vote_summary (image_id, tag_id, created_utc, last_vote_by, last_vote_utc,
                                          votes_for, votes_against, votes_total)
                VALUES ($1, $2, $3, $4, $3, $5, $6, $7)
                "#,
            )
            .bind(image_id)
            .bind(tag_id)
            .bind(now)
            .bind(user_id)
            .bind(votes_for)
            .bind(votes_against)
            .bind(votes_for - votes_against)
            .execute(&mut *conn)
            .await
            .context("insert vote summary")?;
            true
        }
        Some(mut existing) => {
            if is_upvote {
                existing.votes_for += 1;
            } else {
                existing.votes_against += 1;
            }
            sqlx::query(
                r#"
                UPDATE vote_summary SET
                    last_vote_by = $3, last_vote_utc = $4,
                    votes_for = $5, votes_against = $6, votes_total = $7
                WHERE image_id = $1 AND tag_id = $2
                "#,
            )
            .bind(image_id)
            .bind(tag_id)
            .bind(user_id)
            .bind(now)
            .bind(existing.votes_for)
            .bind(existing.votes_against)
            .bind(existing.votes_for - existing.votes_against)
            .execute(&mut *conn)
            .await
            .context("update vote summary")?;
            false
        }
    };

    vote::delete(&mut *conn, user_id, image_id, tag_id).await?;
    vote::create(&mut *conn, user_id, image_id, tag_id, is_upvote).await?;
    Ok(did_create)
}

/// Takes back a user's vote. Returns false when the user never voted on the link.
pub async fn delete_user_vote(
    conn: &mut PgConnection,
    user_id: i64,
    image_id: i64,
    tag_id: i64,
) -> anyhow::Result<bool> {
    let Some(existing) = vote::get(&mut *conn, user_id, image_id, tag_id).await? else {
        return Ok(false);
    };

    if let Some(summary) = get(&mut *conn, image_id, tag_id).await? {
        let (mut votes_for, mut votes_against) = (summary.votes_for, summary.votes_against);
        if existing.is_upvote {
            votes_for -= 1;
        } else {
            votes_against -= 1;
        }
        set_counts(&mut *conn, image_id, tag_id, votes_for, votes_against).await?;
    }

    vote::delete(&mut *conn, user_id, image_id, tag_id).await?;
    Ok(true)
}
