use std::collections::HashMap;

use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgExecutor, PgPool};
use time::OffsetDateTime;

use crate::crypto::new_uuid;
use crate::model::content_rating;
use crate::model::tag::Tag;
use crate::model::user::{User, USER_COLUMNS};

pub(crate) const IMAGE_COLUMNS: &str = "id, uuid, created_utc, created_by, display_name, content_rating, \
     md5, s3_read_url, s3_bucket, s3_key, width, height, file_size, extension";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Image {
    #[serde(skip)]
    pub id: i64,
    pub uuid: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_utc: OffsetDateTime,
    #[serde(skip)]
    pub created_by: i64,
    #[sqlx(skip)]
    #[serde(rename = "created_by", skip_serializing_if = "Option::is_none")]
    pub created_by_user: Option<User>,

    pub display_name: Option<String>,
    pub content_rating: i32,

    #[serde(with = "crate::model::base64_bytes")]
    pub md5: Vec<u8>,
    pub s3_read_url: Option<String>,
    #[serde(skip)]
    pub s3_bucket: String,
    #[serde(skip)]
    pub s3_key: String,

    pub width: i32,
    pub height: i32,
    pub file_size: i32,
    pub extension: Option<String>,

    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl Image {
    /// Unsaved image rated G with a fresh uuid.
    pub fn new(created_by: i64) -> Self {
        Self {
            id: 0,
            uuid: new_uuid(),
            created_utc: OffsetDateTime::now_utc(),
            created_by,
            created_by_user: None,
            display_name: None,
            content_rating: content_rating::G,
            md5: Vec::new(),
            s3_read_url: None,
            s3_bucket: String::new(),
            s3_key: String::new(),
            width: 0,
            height: 0,
            file_size: 0,
            extension: None,
            tags: Vec::new(),
        }
    }

    /// Top tag value, used as a title in chat posts.
    pub fn top_tag_value(&self) -> Option<&str> {
        self.tags.first().map(|t| t.tag_value.as_str())
    }
}

pub async fn create(db: impl PgExecutor<'_>, image: &Image) -> anyhow::Result<Image> {
    let q = format!(
        r#"
        INSERT INTO image (uuid, created_utc, created_by, display_name, content_rating, md5,
                           s3_read_url, s3_bucket, s3_key, width, height, file_size, extension)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING {IMAGE_COLUMNS}
        "#
    );
    sqlx::query_as::<_, Image>(&q)
        .bind(&image.uuid)
        .bind(image.created_utc)
        .bind(image.created_by)
        .bind(&image.display_name)
        .bind(image.content_rating)
        .bind(&image.md5)
        .bind(&image.s3_read_url)
        .bind(&image.s3_bucket)
        .bind(&image.s3_key)
        .bind(image.width)
        .bind(image.height)
        .bind(image.file_size)
        .bind(&image.extension)
        .fetch_one(db)
        .await
        .context("insert image")
}

/// Row only, without tags or creator.
pub async fn by_id_plain(db: impl PgExecutor<'_>, id: i64) -> anyhow::Result<Option<Image>> {
    let q = format!("SELECT {IMAGE_COLUMNS} FROM image WHERE id = $1");
    sqlx::query_as::<_, Image>(&q)
        .bind(id)
        .fetch_optional(db)
        .await
        .context("select image by id")
}

pub async fn by_md5(db: impl PgExecutor<'_>, md5: &[u8]) -> anyhow::Result<Option<Image>> {
    let q = format!("SELECT {IMAGE_COLUMNS} FROM image WHERE md5 = $1");
    sqlx::query_as::<_, Image>(&q)
        .bind(md5)
        .fetch_optional(db)
        .await
        .context("select image by md5")
}

pub async fn id_for_uuid(db: impl PgExecutor<'_>, uuid: &str) -> anyhow::Result<Option<i64>> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM image WHERE uuid = $1")
        .bind(uuid)
        .fetch_optional(db)
        .await
        .context("select image id by uuid")
}

pub async fn by_id(db: &PgPool, id: i64) -> anyhow::Result<Option<Image>> {
    Ok(by_ids(db, &[id]).await?.into_iter().next())
}

pub async fn by_uuid(db: &PgPool, uuid: &str) -> anyhow::Result<Option<Image>> {
    match id_for_uuid(db, uuid).await? {
        Some(id) => by_id(db, id).await,
        None => Ok(None),
    }
}

pub async fn all(db: &PgPool) -> anyhow::Result<Vec<Image>> {
    by_ids(db, &[]).await
}

/// `count` random images rated below NR.
pub async fn random(db: &PgPool, count: i64) -> anyhow::Result<Vec<Image>> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM image WHERE content_rating < $1 ORDER BY gen_random_uuid() LIMIT $2",
    )
    .bind(content_rating::NR)
    .bind(count)
    .fetch_all(db)
    .await
    .context("select random image ids")?;
    load_ids(db, &ids).await
}

pub async fn for_user(db: &PgPool, user_id: i64) -> anyhow::Result<Vec<Image>> {
    let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM image WHERE created_by = $1 ORDER BY created_utc DESC")
        .bind(user_id)
        .fetch_all(db)
        .await
        .context("select image ids for user")?;
    load_ids(db, &ids).await
}

/// Images linked to a tag, best voted first.
pub async fn for_tag(db: &PgPool, tag_id: i64) -> anyhow::Result<Vec<Image>> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT image_id FROM vote_summary WHERE tag_id = $1 ORDER BY votes_total DESC",
    )
    .bind(tag_id)
    .fetch_all(db)
    .await
    .context("select image ids for tag")?;
    load_ids(db, &ids).await
}

/// Like [`by_ids`] but an empty list yields nothing instead of everything.
pub(crate) async fn load_ids(db: &PgPool, ids: &[i64]) -> anyhow::Result<Vec<Image>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    by_ids(db, ids).await
}

/// Loads images with their top five tags and creators, preserving the order of
/// `ids`. An empty slice loads every image.
pub async fn by_ids(db: &PgPool, ids: &[i64]) -> anyhow::Result<Vec<Image>> {
    let filter = if ids.is_empty() { "" } else { "WHERE id = ANY($1)" };
    let q = format!("SELECT {IMAGE_COLUMNS} FROM image {filter}");
    let mut query = sqlx::query_as::<_, Image>(&q);
    if !ids.is_empty() {
        query = query.bind(ids);
    }
    let mut images = query.fetch_all(db).await.context("select images")?;

    let tag_filter = if ids.is_empty() { "" } else { "WHERE vs.image_id = ANY($1)" };
    let tq = format!(
        r#"
        SELECT * FROM (
            SELECT t.id, t.uuid, t.created_utc, t.created_by, t.tag_value,
                   u.uuid AS created_by_uuid, vs.image_id,
                   vs.votes_for, vs.votes_against, vs.votes_total,
                   row_number() OVER (PARTITION BY vs.image_id ORDER BY vs.votes_total DESC) AS vote_rank
            FROM tag t
                JOIN vote_summary vs ON vs.tag_id = t.id
                JOIN users u ON u.id = t.created_by
            {tag_filter}
        ) ranked
        WHERE vote_rank <= 5
        ORDER BY image_id, vote_rank
        "#
    );
    let mut tag_query = sqlx::query_as::<_, Tag>(&tq);
    if !ids.is_empty() {
        tag_query = tag_query.bind(ids);
    }
    let tags = tag_query.fetch_all(db).await.context("select image tags")?;

    let user_filter = if ids.is_empty() { "" } else { "WHERE i.id = ANY($1)" };
    let user_columns = USER_COLUMNS
        .split(", ")
        .map(|c| format!("u.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let uq = format!(
        "SELECT DISTINCT {user_columns} FROM image i JOIN users u ON i.created_by = u.id {user_filter}"
    );
    let mut user_query = sqlx::query_as::<_, User>(&uq);
    if !ids.is_empty() {
        user_query = user_query.bind(ids);
    }
    let users: HashMap<i64, User> = user_query
        .fetch_all(db)
        .await
        .context("select image creators")?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let mut tags_by_image: HashMap<i64, Vec<Tag>> = HashMap::new();
    for t in tags {
        if let Some(image_id) = t.image_id {
            tags_by_image.entry(image_id).or_default().push(t);
        }
    }

    for image in images.iter_mut() {
        image.tags = tags_by_image.remove(&image.id).unwrap_or_default();
        image.created_by_user = users.get(&image.created_by).cloned();
    }

    if !ids.is_empty() {
        let position: HashMap<i64, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        images.sort_by_key(|img| position.get(&img.id).copied().unwrap_or(usize::MAX));
    } else {
        images.sort_by_key(|img| img.id);
    }
    Ok(images)
}

pub async fn update_display_name(db: impl PgExecutor<'_>, image_id: i64, display_name: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE image SET display_name = $2 WHERE id = $1")
        .bind(image_id)
        .bind(display_name)
        .execute(db)
        .await
        .context("update image display name")?;
    Ok(())
}

pub async fn update_content_rating(db: impl PgExecutor<'_>, image_id: i64, rating: i32) -> anyhow::Result<()> {
    sqlx::query("UPDATE image SET content_rating = $2 WHERE id = $1")
        .bind(image_id)
        .bind(rating)
        .execute(db)
        .await
        .context("update image content rating")?;
    Ok(())
}

pub async fn update_file_size(db: impl PgExecutor<'_>, image_id: i64, file_size: i32) -> anyhow::Result<()> {
    sqlx::query("UPDATE image SET file_size = $2 WHERE id = $1")
        .bind(image_id)
        .bind(file_size)
        .execute(db)
        .await
        .context("update image file size")?;
    Ok(())
}

/// Images whose size was never recorded.
pub async fn ids_with_zero_file_size(db: impl PgExecutor<'_>) -> anyhow::Result<Vec<i64>> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM image WHERE file_size = 0")
        .fetch_all(db)
        .await
        .context("select images without size")
}

/// Drops the image's links, then votes, then the image row.
pub async fn delete_by_id(conn: &mut PgConnection, image_id: i64) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM vote_summary WHERE image_id = $1")
        .bind(image_id)
        .execute(&mut *conn)
        .await
        .context("delete image vote summaries")?;
    sqlx::query("DELETE FROM vote WHERE image_id = $1")
        .bind(image_id)
        .execute(&mut *conn)
        .await
        .context("delete image votes")?;
    sqlx::query("DELETE FROM image WHERE id = $1")
        .bind(image_id)
        .execute(&mut *conn)
        .await
        .context("delete image")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_hides_storage_details() {
        let mut img = Image::new(7);
        img.md5 = vec![0xde, 0xad, 0xbe, 0xef];
        img.s3_bucket = "bucket".into();
        img.s3_key = "key.gif".into();
        let v = serde_json::to_value(&img).unwrap();
        assert!(v.get("s3_bucket").is_none());
        assert!(v.get("s3_key").is_none());
        assert!(v.get("id").is_none());
        assert!(v.get("tags").is_none());
        assert_eq!(v["md5"], "3q2+7w==");
        assert_eq!(v["content_rating"], content_rating::G);
    }

    #[test]
    fn top_tag_is_first_loaded_tag() {
        let mut img = Image::new(1);
        assert_eq!(img.top_tag_value(), None);
        img.tags.push(Tag::new(1, "party parrot"));
        img.tags.push(Tag::new(1, "bird"));
        assert_eq!(img.top_tag_value(), Some("party parrot"));
    }
}
