use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgExecutor, PgPool};
use time::{Date, Month, OffsetDateTime};

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct SiteStats {
    pub user_count: i64,
    pub image_count: i64,
    pub tag_count: i64,
    pub karma_total: i64,
    pub orphaned_tag_count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ImageStats {
    pub image_id: i64,
    pub votes_total: i64,
    pub searches: i64,
}

/// Number of searches on one UTC day.
#[derive(Debug, Clone, FromRow)]
pub struct DayCount {
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub count: i64,
}

impl DayCount {
    pub fn date(&self) -> Option<Date> {
        let month = Month::try_from(u8::try_from(self.month).ok()?).ok()?;
        Date::from_calendar_date(self.year, month, u8::try_from(self.day).ok()?).ok()
    }
}

pub async fn site_stats(db: &PgPool) -> anyhow::Result<SiteStats> {
    sqlx::query_as::<_, SiteStats>(
        r#"
        SELECT
            (SELECT count(*) FROM users) AS user_count,
            (SELECT count(*) FROM image) AS image_count,
            (SELECT count(*) FROM tag) AS tag_count,
            (SELECT coalesce(sum(votes_total), 0)::bigint FROM vote_summary) AS karma_total,
            (SELECT count(*) FROM tag t
                WHERE NOT EXISTS (SELECT 1 FROM vote_summary vs WHERE vs.tag_id = t.id)) AS orphaned_tag_count
        "#,
    )
    .fetch_one(db)
    .await
    .context("select site stats")
}

pub async fn image_stats(db: impl PgExecutor<'_>, image_id: i64) -> anyhow::Result<Option<ImageStats>> {
    sqlx::query_as::<_, ImageStats>(
        r#"
        SELECT
            i.id AS image_id,
            (SELECT coalesce(sum(votes_total), 0)::bigint FROM vote_summary WHERE image_id = $1) AS votes_total,
            (SELECT count(image_id) FROM search_history WHERE image_id = $1) AS searches
        FROM image i
        WHERE i.id = $1
        "#,
    )
    .bind(image_id)
    .fetch_optional(db)
    .await
    .context("select image stats")
}

pub async fn searches_per_day(db: impl PgExecutor<'_>, since: OffsetDateTime) -> anyhow::Result<Vec<DayCount>> {
    sqlx::query_as::<_, DayCount>(
        r#"
        SELECT
            date_part('year', timestamp_utc AT TIME ZONE 'UTC')::int AS year,
            date_part('month', timestamp_utc AT TIME ZONE 'UTC')::int AS month,
            date_part('day', timestamp_utc AT TIME ZONE 'UTC')::int AS day,
            count(*) AS count
        FROM search_history
        WHERE timestamp_utc > $1
        GROUP BY 1, 2, 3
        ORDER BY 1, 2, 3
        "#,
    )
    .bind(since)
    .fetch_all(db)
    .await
    .context("select searches per day")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_count_date() {
        let dc = DayCount { year: 2024, month: 2, day: 29, count: 3 };
        assert_eq!(dc.date(), Date::from_calendar_date(2024, Month::February, 29).ok());
        let bad = DayCount { year: 2023, month: 2, day: 30, count: 1 };
        assert_eq!(bad.date(), None);
    }
}
