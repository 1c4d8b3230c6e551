use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::{instrument, warn};

use super::services::{upload_image, UploadItem, MAX_IMAGE_SIZE, UPLOAD_FIELDS};
use crate::api::dto::Envelope;
use crate::auth::extractors::SessionRequired;
use crate::error::{AppError, AppResult};
use crate::fetch::file_name_from_url;
use crate::model::image::Image;
use crate::state::AppState;

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/images/upload", get(upload_form).post(upload_complete))
        .layer(DefaultBodyLimit::max(MAX_IMAGE_SIZE + 1024 * 1024))
}

/// Everything a multipart upload carried.
#[derive(Default)]
pub struct PostedUpload {
    pub image_url: Option<String>,
    pub files: Vec<UploadItem>,
}

/// Collects the `image_url` field and every file part.
pub async fn read_multipart(mut mp: Multipart) -> AppResult<PostedUpload> {
    let mut posted = PostedUpload::default();
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("problem reading posted file: {}", e)))?
    {
        if let Some(file_name) = field.file_name().map(str::to_string) {
            let body = field
                .bytes()
                .await
                .map_err(|e| AppError::bad_request(format!("problem reading posted file: {}", e)))?;
            posted.files.push(UploadItem { file_name, body });
        } else if field.name() == Some("image_url") {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::bad_request(e.to_string()))?;
            posted.image_url = Some(value.trim().to_string()).filter(|v| !v.is_empty());
        }
    }
    Ok(posted)
}

/// Exactly one file.
pub fn single_file(files: Vec<UploadItem>) -> AppResult<UploadItem> {
    let mut files = files.into_iter();
    match (files.next(), files.next()) {
        (None, _) => Err(AppError::bad_request("no files posted")),
        (Some(_), Some(_)) => Err(AppError::bad_request("too many files posted")),
        (Some(file), None) => Ok(file),
    }
}

#[derive(Debug, Serialize)]
pub struct UploadForm {
    pub fields: [&'static str; 2],
    pub max_file_size: usize,
}

#[instrument(skip_all)]
pub async fn upload_form(SessionRequired(session): SessionRequired) -> AppResult<Json<UploadForm>> {
    if !session.user.can_moderate() {
        return Err(AppError::NotAuthorized);
    }
    Ok(Json(UploadForm {
        fields: UPLOAD_FIELDS,
        max_file_size: MAX_IMAGE_SIZE,
    }))
}

#[instrument(skip(state, session, mp), fields(user_id = session.user_id))]
pub async fn upload_complete(
    State(state): State<AppState>,
    SessionRequired(session): SessionRequired,
    mp: Multipart,
) -> AppResult<Json<Envelope<Image>>> {
    if !session.user.can_moderate() {
        return Err(AppError::NotAuthorized);
    }

    let posted = read_multipart(mp).await?;
    let item = match posted.image_url {
        Some(url) => {
            reqwest::Url::parse(&url).map_err(|_| AppError::bad_request("`image_url` was malformed"))?;
            let fetched = state.fetcher.fetch(&url).await?;
            if fetched.status != 200 {
                warn!(status = fetched.status, "image url fetch failed");
                return Err(AppError::bad_request("non 200 returned from `image_url` host"));
            }
            UploadItem {
                file_name: file_name_from_url(&url).to_string(),
                body: fetched.body,
            }
        }
        None => single_file(posted.files)?,
    };

    let image = upload_image(&state, &session.user, item).await?;
    Ok(Json(Envelope::ok(image)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn item(name: &str) -> UploadItem {
        UploadItem {
            file_name: name.into(),
            body: Bytes::from_static(b"x"),
        }
    }

    #[test]
    fn exactly_one_file_is_accepted() {
        assert!(matches!(single_file(vec![]), Err(AppError::BadRequest(_))));
        assert!(matches!(single_file(vec![item("a"), item("b")]), Err(AppError::BadRequest(_))));
        assert_eq!(single_file(vec![item("a.gif")]).unwrap().file_name, "a.gif");
    }
}
