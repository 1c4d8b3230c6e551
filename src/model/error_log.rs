use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};
use time::OffsetDateTime;

use crate::crypto::new_uuid;

/// A request that failed with an internal error.
#[derive(Debug, Clone, Default)]
pub struct NewErrorRecord {
    pub message: String,
    pub stack_trace: Option<String>,
    pub verb: Option<String>,
    pub proto: Option<String>,
    pub host: Option<String>,
    pub path: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ErrorRecord {
    pub uuid: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_utc: OffsetDateTime,
    pub message: String,
    pub stack_trace: Option<String>,
    pub verb: Option<String>,
    pub proto: Option<String>,
    pub host: Option<String>,
    pub path: Option<String>,
    pub query: Option<String>,
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn truncate_opt(s: &Option<String>, max: usize) -> Option<String> {
    s.as_deref().map(|v| truncate(v, max))
}

pub async fn create(db: impl PgExecutor<'_>, record: NewErrorRecord) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO error (uuid, created_utc, message, stack_trace, verb, proto, host, path, query)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(new_uuid())
    .bind(OffsetDateTime::now_utc())
    .bind(truncate(&record.message, 255))
    .bind(truncate_opt(&record.stack_trace, 1024))
    .bind(truncate_opt(&record.verb, 8))
    .bind(truncate_opt(&record.proto, 8))
    .bind(truncate_opt(&record.host, 255))
    .bind(truncate_opt(&record.path, 255))
    .bind(truncate_opt(&record.query, 255))
    .execute(db)
    .await
    .context("insert error")?;
    Ok(())
}

const ERROR_COLUMNS: &str = "uuid, created_utc, message, stack_trace, verb, proto, host, path, query";

pub async fn page(db: impl PgExecutor<'_>, limit: i64, offset: i64) -> anyhow::Result<Vec<ErrorRecord>> {
    let q = format!("SELECT {ERROR_COLUMNS} FROM error ORDER BY created_utc DESC LIMIT $1 OFFSET $2");
    sqlx::query_as::<_, ErrorRecord>(&q)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
        .context("select errors")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate_opt(&Some("HTTP/1.1".into()), 8), Some("HTTP/1.1".into()));
        assert_eq!(truncate_opt(&None, 8), None);
    }
}
