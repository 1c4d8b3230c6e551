use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::api::dto::Envelope;
use crate::model::error_log::{self, NewErrorRecord};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("not authorized")]
    NotAuthorized,
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        AppError::BadRequest(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotAuthorized => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Internal(e.into())
    }
}

impl From<crate::crypto::CryptoError> for AppError {
    fn from(e: crate::crypto::CryptoError) -> Self {
        AppError::Internal(e.into())
    }
}

/// Carried on 500 responses so `record_errors` can persist them.
#[derive(Debug, Clone)]
pub struct RecordedError {
    pub message: String,
    pub stack_trace: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(e) => {
                error!(error = %e, "internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut res = (status, Json(Envelope::<()>::error(status, message))).into_response();
        if let AppError::Internal(e) = self {
            res.extensions_mut().insert(RecordedError {
                message: e.to_string(),
                stack_trace: format!("{:?}", e),
            });
        }
        res
    }
}

/// Writes a row to the `error` table for every response that carries a `RecordedError`.
pub async fn record_errors(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let verb = req.method().to_string();
    let proto = format!("{:?}", req.version());
    let host = req
        .headers()
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    let res = next.run(req).await;

    if let Some(recorded) = res.extensions().get::<RecordedError>().cloned() {
        let db = state.db.clone();
        tokio::spawn(async move {
            let record = NewErrorRecord {
                message: recorded.message,
                stack_trace: Some(recorded.stack_trace),
                verb: Some(verb),
                proto: Some(proto),
                host,
                path: Some(path),
                query,
            };
            if let Err(e) = error_log::create(&db, record).await {
                error!(error = %e, "failed to record error");
            }
        });
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(AppError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotAuthorized.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_errors_are_marked_for_recording() {
        let res = AppError::Internal(anyhow::anyhow!("db down")).into_response();
        let recorded = res.extensions().get::<RecordedError>().cloned().unwrap();
        assert_eq!(recorded.message, "db down");

        let res = AppError::NotFound.into_response();
        assert!(res.extensions().get::<RecordedError>().is_none());
    }
}
