use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::LibraryError;

pub const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_id: Option<i64>,
}

impl MessageResponse {
    pub fn new(msg: &str) -> Self {
        MessageResponse {
            message: msg.to_owned(),
            book_id: None,
        }
    }

    pub fn with_book_id(msg: &str, book_id: i64) -> Self {
        MessageResponse {
            message: msg.to_owned(),
            book_id: Some(book_id),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub fn success<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

pub fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

fn error_with(status: StatusCode, msg: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: msg.to_string(),
        }),
    )
        .into_response()
}

pub fn not_found(msg: &str) -> Response {
    error_with(StatusCode::NOT_FOUND, msg)
}

pub fn bad_request(msg: &str) -> Response {
    error_with(StatusCode::BAD_REQUEST, msg)
}

pub fn conflict(msg: &str) -> Response {
    error_with(StatusCode::CONFLICT, msg)
}

pub fn internal_error() -> Response {
    error_with(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_SERVER_ERROR)
}

/// Maps a workflow failure to its response. Store failures never leak their cause.
pub fn error_response(err: &LibraryError) -> Response {
    match err {
        LibraryError::InvalidInput(msg) => bad_request(msg),
        LibraryError::ReferenceNotFound(msg) => not_found(msg),
        LibraryError::ConflictDetected(msg) => conflict(msg),
        LibraryError::StoreUnavailable(_) => internal_error(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_per_error_kind() {
        let cases = [
            (LibraryError::InvalidInput("x".to_owned()), StatusCode::BAD_REQUEST),
            (LibraryError::ReferenceNotFound("x".to_owned()), StatusCode::NOT_FOUND),
            (LibraryError::ConflictDetected("x".to_owned()), StatusCode::CONFLICT),
            (
                LibraryError::StoreUnavailable(libsql::Error::SqliteFailure(5, "database is locked".to_owned())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(error_response(&err).status(), status);
        }
    }

    #[test]
    fn test_message_omits_missing_book_id() {
        let value = serde_json::to_value(MessageResponse::new("ok")).unwrap();
        assert_eq!(value, serde_json::json!({ "message": "ok" }));

        let value = serde_json::to_value(MessageResponse::with_book_id("ok", 3)).unwrap();
        assert_eq!(value, serde_json::json!({ "message": "ok", "book_id": 3 }));
    }
}
