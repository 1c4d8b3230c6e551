use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};
use time::OffsetDateTime;

use crate::crypto::new_uuid;
use crate::model::user::User;

pub const VERB_CREATE: &str = "create";
pub const VERB_DELETE: &str = "delete";
pub const VERB_CONSOLIDATE: &str = "consolidate";
pub const VERB_PROMOTE_MODERATOR: &str = "promote_moderator";
pub const VERB_DEMOTE_MODERATOR: &str = "demote_moderator";
pub const VERB_BAN: &str = "ban";
pub const VERB_UNBAN: &str = "unban";

pub const OBJECT_IMAGE: &str = "image";
pub const OBJECT_TAG: &str = "tag";
pub const OBJECT_LINK: &str = "link";
pub const OBJECT_USER: &str = "user";

/// A new log entry, before it is written.
#[derive(Debug, Clone)]
pub struct NewModeration {
    pub user_id: i64,
    pub verb: &'static str,
    pub object: &'static str,
    pub noun: Option<String>,
    pub secondary_noun: Option<String>,
}

impl NewModeration {
    pub fn new(user_id: i64, verb: &'static str, object: &'static str, noun: impl Into<String>) -> Self {
        Self {
            user_id,
            verb,
            object,
            noun: Some(noun.into()),
            secondary_noun: None,
        }
    }

    pub fn with_secondary(mut self, secondary: impl Into<String>) -> Self {
        self.secondary_noun = Some(secondary.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageRef {
    pub uuid: String,
    pub display_name: Option<String>,
    pub s3_read_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagRef {
    pub uuid: String,
    pub tag_value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRef {
    pub uuid: String,
    pub username: String,
}

/// A log entry with the moderator and whatever the nouns point at.
#[derive(Debug, Clone, Serialize)]
pub struct Moderation {
    pub uuid: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp_utc: OffsetDateTime,
    pub verb: String,
    pub object: String,
    pub noun: Option<String>,
    pub secondary_noun: Option<String>,
    pub moderator: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<TagRef>,
}

#[derive(FromRow)]
struct ModerationRow {
    uuid: String,
    timestamp_utc: OffsetDateTime,
    verb: String,
    object: String,
    noun: Option<String>,
    secondary_noun: Option<String>,
    moderator_id: i64,
    moderator_uuid: String,
    moderator_created_utc: OffsetDateTime,
    moderator_username: String,
    moderator_first_name: Option<String>,
    moderator_last_name: Option<String>,
    moderator_email_address: Option<String>,
    moderator_is_email_verified: bool,
    moderator_is_admin: bool,
    moderator_is_moderator: bool,
    moderator_is_banned: bool,
    target_user_uuid: Option<String>,
    target_user_username: Option<String>,
    image_uuid: Option<String>,
    image_display_name: Option<String>,
    image_s3_read_url: Option<String>,
    tag_uuid: Option<String>,
    tag_tag_value: Option<String>,
}

impl From<ModerationRow> for Moderation {
    fn from(r: ModerationRow) -> Self {
        let user = match (r.target_user_uuid, r.target_user_username) {
            (Some(uuid), Some(username)) => Some(UserRef { uuid, username }),
            _ => None,
        };
        let image = r.image_uuid.map(|uuid| ImageRef {
            uuid,
            display_name: r.image_display_name,
            s3_read_url: r.image_s3_read_url,
        });
        let tag = match (r.tag_uuid, r.tag_tag_value) {
            (Some(uuid), Some(tag_value)) => Some(TagRef { uuid, tag_value }),
            _ => None,
        };
        Self {
            uuid: r.uuid,
            timestamp_utc: r.timestamp_utc,
            verb: r.verb,
            object: r.object,
            noun: r.noun,
            secondary_noun: r.secondary_noun,
            moderator: User {
                id: r.moderator_id,
                uuid: r.moderator_uuid,
                created_utc: r.moderator_created_utc,
                username: r.moderator_username,
                first_name: r.moderator_first_name,
                last_name: r.moderator_last_name,
                email_address: r.moderator_email_address,
                is_email_verified: r.moderator_is_email_verified,
                is_admin: r.moderator_is_admin,
                is_moderator: r.moderator_is_moderator,
                is_banned: r.moderator_is_banned,
            },
            user,
            image,
            tag,
        }
    }
}

fn moderation_query(where_clause: &str, tail: &str) -> String {
    format!(
        r#"
        SELECT m.uuid, m.timestamp_utc, m.verb, m.object, m.noun, m.secondary_noun,
               mu.id AS moderator_id, mu.uuid AS moderator_uuid,
               mu.created_utc AS moderator_created_utc, mu.username AS moderator_username,
               mu.first_name AS moderator_first_name, mu.last_name AS moderator_last_name,
               mu.email_address AS moderator_email_address,
               mu.is_email_verified AS moderator_is_email_verified,
               mu.is_admin AS moderator_is_admin, mu.is_moderator AS moderator_is_moderator,
               mu.is_banned AS moderator_is_banned,
               u.uuid AS target_user_uuid, u.username AS target_user_username,
               i.uuid AS image_uuid, i.display_name AS image_display_name,
               i.s3_read_url AS image_s3_read_url,
               t.uuid AS tag_uuid, t.tag_value AS tag_tag_value
        FROM moderation m
            JOIN users mu ON m.user_id = mu.id
            LEFT JOIN users u ON m.noun = u.uuid OR m.secondary_noun = u.uuid
            LEFT JOIN image i ON m.noun = i.uuid OR m.secondary_noun = i.uuid
            LEFT JOIN tag t ON m.noun = t.uuid OR m.secondary_noun = t.uuid
        {where_clause}
        ORDER BY m.timestamp_utc DESC
        {tail}
        "#
    )
}

pub async fn create(db: impl PgExecutor<'_>, entry: &NewModeration) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO moderation (user_id, uuid, timestamp_utc, verb, object, noun, secondary_noun)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.user_id)
    .bind(new_uuid())
    .bind(OffsetDateTime::now_utc())
    .bind(entry.verb)
    .bind(entry.object)
    .bind(&entry.noun)
    .bind(&entry.secondary_noun)
    .execute(db)
    .await
    .context("insert moderation")?;
    Ok(())
}

pub async fn for_user(db: impl PgExecutor<'_>, user_id: i64) -> anyhow::Result<Vec<Moderation>> {
    let rows = sqlx::query_as::<_, ModerationRow>(&moderation_query("WHERE m.user_id = $1", ""))
        .bind(user_id)
        .fetch_all(db)
        .await
        .context("select moderation for user")?;
    Ok(rows.into_iter().map(Moderation::from).collect())
}

pub async fn since(db: impl PgExecutor<'_>, after: OffsetDateTime) -> anyhow::Result<Vec<Moderation>> {
    let rows = sqlx::query_as::<_, ModerationRow>(&moderation_query("WHERE m.timestamp_utc > $1", ""))
        .bind(after)
        .fetch_all(db)
        .await
        .context("select recent moderation")?;
    Ok(rows.into_iter().map(Moderation::from).collect())
}

pub async fn page(db: impl PgExecutor<'_>, count: i64, offset: i64) -> anyhow::Result<Vec<Moderation>> {
    let rows = sqlx::query_as::<_, ModerationRow>(&moderation_query("", "LIMIT $1 OFFSET $2"))
        .bind(count)
        .bind(offset)
        .fetch_all(db)
        .await
        .context("select moderation page")?;
    Ok(rows.into_iter().map(Moderation::from).collect())
}
