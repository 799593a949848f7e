//! HTTP error mapping for the core error taxonomy.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use garden_search::SearchError;
use garden_sync::SyncError;
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    NotFound(String),
    Conflict(String),
    UpstreamUnavailable(String),
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, "validation", Some(msg)),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg)),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg)),
            Self::UpstreamUnavailable(msg) => {
                (StatusCode::BAD_GATEWAY, "upstream_unavailable", Some(msg))
            }
            // Internal details stay in the logs, not the response.
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", None)
            }
        };
        (
            status,
            Json(ErrorBody {
                error: error.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::EmptyQuery | SearchError::Invalid(_) => Self::Validation(err.to_string()),
            SearchError::Embedding(_) | SearchError::Llm(_) | SearchError::Http(_) => {
                Self::UpstreamUnavailable(err.to_string())
            }
            SearchError::Db(_) | SearchError::Cancelled => Self::Internal(err.to_string()),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::SyncInProgress => Self::Conflict(err.to_string()),
            SyncError::EntityNotFound(_) | SyncError::PageNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            SyncError::MissingPagePath(_) => Self::Validation(err.to_string()),
            SyncError::Git(_) => Self::UpstreamUnavailable(err.to_string()),
            SyncError::Db(_) | SyncError::Io(_) | SyncError::Cancelled => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<garden_db::DbError> for ApiError {
    fn from(err: garden_db::DbError) -> Self {
        Self::Internal(err.to_string())
    }
}
