use std::path::Path;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tower_http::services::{ServeDir, ServeFile};
use tracing::error;

use crate::error::AppError;
use crate::state::AppState;

/// Serves the single page app out of the static directory. Paths that match no
/// file get `index.html`; unknown `/api` paths get the JSON 404.
pub async fn fallback(State(state): State<AppState>, req: Request) -> Response {
    if req.uri().path().starts_with("/api/") {
        return AppError::NotFound.into_response();
    }

    let dir = Path::new(&state.config.static_dir);
    let mut files = ServeDir::new(dir).not_found_service(ServeFile::new(dir.join("index.html")));
    match files.try_call(req).await {
        Ok(res) => res.into_response(),
        Err(e) => {
            error!(error = %e, "failed to serve static file");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
