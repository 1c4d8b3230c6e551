use std::io::Cursor;

use anyhow::Context;
use bytes::Bytes;
use tracing::{info, instrument, warn};

use crate::crypto::md5_sum;
use crate::error::{AppError, AppResult};
use crate::model::image::{self, Image};
use crate::model::moderation::{self, NewModeration, OBJECT_IMAGE, VERB_CREATE};
use crate::model::user::User;
use crate::state::AppState;
use crate::storage::upload_file;

pub const MAX_IMAGE_SIZE: usize = 1 << 25;
pub const MIN_IMAGE_WIDTH: u32 = 200;
pub const MIN_IMAGE_HEIGHT: u32 = 200;
pub const MIN_IMAGE_WIDTH_OR_HEIGHT: u32 = 300;

/// A file posted or fetched for upload.
pub struct UploadItem {
    pub file_name: String,
    pub body: Bytes,
}

/// What the upload form posts.
pub const UPLOAD_FIELDS: [&str; 2] = ["image_url", "image"];

/// Lowercased extension including the dot, or empty.
pub fn extension_of(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() && !ext.contains('/') && !stem.is_empty() => {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => String::new(),
    }
}

fn dimensions(body: &[u8]) -> AppResult<(u32, u32)> {
    ::image::ImageReader::new(Cursor::new(body))
        .with_guessed_format()
        .context("read image header")?
        .into_dimensions()
        .map_err(|e| AppError::bad_request(format!("could not read image: {}", e)))
}

fn content_type(body: &[u8]) -> &'static str {
    ::image::guess_format(body)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream")
}

/// Size rules applied to uploads by non-admins.
pub fn validate(width: u32, height: u32, file_size: usize) -> AppResult<()> {
    if width < MIN_IMAGE_WIDTH {
        return Err(AppError::bad_request(format!("Image width needs to be > {}px.", MIN_IMAGE_WIDTH)));
    }
    if height < MIN_IMAGE_HEIGHT {
        return Err(AppError::bad_request(format!("Image height needs to be > {}px.", MIN_IMAGE_HEIGHT)));
    }
    if width < MIN_IMAGE_WIDTH_OR_HEIGHT && height < MIN_IMAGE_WIDTH_OR_HEIGHT {
        return Err(AppError::bad_request(format!(
            "Image width or height need to be > {}px.",
            MIN_IMAGE_WIDTH_OR_HEIGHT
        )));
    }
    if file_size > MAX_IMAGE_SIZE {
        return Err(AppError::bad_request("Image file size should be < 32 mb."));
    }
    Ok(())
}

/// Reads the image metadata, uploads the file, then stores the row and its
/// `create image` entry. The stored file is removed again if the row cannot be written.
#[instrument(skip(state, item), fields(file_name = %item.file_name))]
pub async fn create_image_from_file(state: &AppState, user_id: i64, should_validate: bool, item: UploadItem) -> AppResult<Image> {
    let (width, height) = dimensions(&item.body)?;
    let file_size = item.body.len();
    if should_validate {
        validate(width, height, file_size)?;
    }

    let mut new_image = Image::new(user_id);
    new_image.md5 = md5_sum(&item.body);
    new_image.display_name = Some(item.file_name.clone());
    new_image.extension = Some(extension_of(&item.file_name));
    new_image.width = width as i32;
    new_image.height = height as i32;
    new_image.file_size = file_size as i32;

    let extension = new_image.extension.clone().unwrap_or_default();
    let stored = upload_file(state.storage.as_ref(), item.body.clone(), &extension, content_type(&item.body)).await?;
    new_image.s3_read_url = Some(state.config.read_url(&stored.bucket, &stored.key));
    new_image.s3_bucket = stored.bucket;
    new_image.s3_key = stored.key;

    match insert_with_moderation(state, user_id, &new_image).await {
        Ok(created) => {
            info!(image_id = created.id, "image created");
            Ok(created)
        }
        Err(e) => {
            if let Err(cleanup) = state.storage.delete_object(&new_image.s3_key).await {
                warn!(key = %new_image.s3_key, error = %cleanup, "could not remove stored file");
            }
            Err(e.into())
        }
    }
}

async fn insert_with_moderation(state: &AppState, user_id: i64, new_image: &Image) -> anyhow::Result<Image> {
    let mut tx = state.db.begin().await?;
    let created = image::create(&mut *tx, new_image).await?;
    moderation::create(
        &mut *tx,
        &NewModeration::new(user_id, VERB_CREATE, OBJECT_IMAGE, created.uuid.clone()),
    )
    .await?;
    tx.commit().await?;
    Ok(created)
}

/// Returns the existing image for a duplicate file, otherwise creates one.
pub async fn upload_image(state: &AppState, user: &User, item: UploadItem) -> AppResult<Image> {
    let md5 = md5_sum(&item.body);
    if let Some(existing) = image::by_md5(&state.db, &md5).await? {
        info!(image_id = existing.id, "duplicate upload");
        return Ok(existing);
    }

    create_image_from_file(state, user.id, !user.is_admin, item).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_lowercased_with_dot() {
        assert_eq!(extension_of("Cat.GIF"), ".gif");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("noext"), "");
        assert_eq!(extension_of(".hidden"), "");
    }

    #[test]
    fn size_rules() {
        assert!(validate(400, 300, 1024).is_ok());
        assert!(matches!(validate(199, 400, 1), Err(AppError::BadRequest(_))));
        assert!(matches!(validate(400, 199, 1), Err(AppError::BadRequest(_))));
        assert!(matches!(validate(250, 250, 1), Err(AppError::BadRequest(_))));
        assert!(validate(250, 300, 1).is_ok());
        assert!(matches!(validate(400, 400, MAX_IMAGE_SIZE + 1), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn reads_gif_dimensions() {
        // 1x1 transparent gif
        let gif: &[u8] = &[
            0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0xff, 0xff,
            0xff, 0x00, 0x00, 0x00, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
            0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
        ];
        assert_eq!(dimensions(gif).unwrap(), (1, 1));
        assert_eq!(content_type(gif), "image/gif");
        assert!(matches!(dimensions(b"not an image"), Err(AppError::BadRequest(_))));
    }
}
