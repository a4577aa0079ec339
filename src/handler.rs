use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    response::{IntoResponse, Response},
};

use crate::api::{self, HealthResponse, MessageResponse};
use crate::db::Database;
use crate::error::LibraryError;
use crate::loan::LoanRequest;
use crate::model::{NewBook, NewReader};
use crate::unpack_error;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
}

const INVALID_INPUT: &str = "Invalid input";

fn log_failure(e: &LibraryError, what: &str) {
    if e.is_client_fault() {
        tracing::info!(error = %unpack_error(e), "{}", what);
    } else {
        tracing::error!(error = %unpack_error(e), "{}", what);
    }
}

pub async fn healthcheck() -> impl IntoResponse {
    tracing::debug!("got healthcheck request");
    Json(HealthResponse { status: "ok" })
}

pub async fn get_books(State(state): State<AppState>) -> Response {
    match state.db.list_books().await {
        Ok(books) => api::success(books),
        Err(e) => {
            tracing::error!(error = %e, "failed to fetch books");
            api::internal_error()
        }
    }
}

pub async fn get_books_with_authors(State(state): State<AppState>) -> Response {
    match state.db.list_books_with_authors().await {
        Ok(books) => api::success(books),
        Err(e) => {
            tracing::error!(error = %e, "failed to fetch books with authors");
            api::internal_error()
        }
    }
}

pub async fn get_book(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.db.get_book_with_authors(id).await {
        Ok(Some(book)) => api::success(book),
        Ok(None) => api::not_found("Book not found"),
        Err(e) => {
            tracing::error!(error = %e, book_id = id, "failed to fetch book details");
            api::internal_error()
        }
    }
}

pub async fn add_book(State(state): State<AppState>, payload: Result<Json<NewBook>, JsonRejection>) -> Response {
    let Json(book) = match payload {
        Ok(payload) => payload,
        Err(e) => {
            tracing::info!(error = %e, "rejected add-book payload");
            return api::bad_request(INVALID_INPUT);
        }
    };

    match state.db.add_book(book).await {
        Ok(book_id) => {
            tracing::info!(book_id, "book added");
            api::success(MessageResponse::with_book_id("Book added successfully", book_id))
        }
        Err(e) => {
            log_failure(&e, "failed to add book");
            api::error_response(&e)
        }
    }
}

pub async fn get_authors(State(state): State<AppState>) -> Response {
    match state.db.list_authors().await {
        Ok(authors) => api::success(authors),
        Err(e) => {
            tracing::error!(error = %e, "failed to fetch authors");
            api::internal_error()
        }
    }
}

pub async fn get_author(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.db.get_author(id).await {
        Ok(Some(author)) => api::success(author),
        Ok(None) => api::not_found("Author not found"),
        Err(e) => {
            tracing::error!(error = %e, author_id = id, "failed to fetch author");
            api::internal_error()
        }
    }
}

pub async fn get_readers(State(state): State<AppState>) -> Response {
    match state.db.list_readers().await {
        Ok(readers) => api::success(readers),
        Err(e) => {
            tracing::error!(error = %e, "failed to fetch readers");
            api::internal_error()
        }
    }
}

pub async fn create_reader(
    State(state): State<AppState>,
    payload: Result<Json<NewReader>, JsonRejection>,
) -> Response {
    let Json(reader) = match payload {
        Ok(payload) => payload,
        Err(e) => {
            tracing::info!(error = %e, "rejected reader payload");
            return api::bad_request(INVALID_INPUT);
        }
    };

    match state.db.register_reader(reader).await {
        Ok((reader, true)) => api::created(reader),
        Ok((reader, false)) => api::success(reader),
        Err(e) => {
            log_failure(&e, "failed to register reader");
            api::error_response(&e)
        }
    }
}

pub async fn get_loans(State(state): State<AppState>) -> Response {
    match state.db.list_loans().await {
        Ok(loans) => api::success(loans),
        Err(e) => {
            tracing::error!(error = %e, "failed to fetch loans");
            api::internal_error()
        }
    }
}

pub async fn loan_book(State(state): State<AppState>, payload: Result<Json<LoanRequest>, JsonRejection>) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(e) => {
            tracing::info!(error = %e, "rejected loan payload");
            return api::bad_request(INVALID_INPUT);
        }
    };

    match state.db.issue_loan(request).await {
        Ok(_) => api::success(MessageResponse::new("Book loaned successfully")),
        Err(e) => {
            log_failure(&e, "failed to issue loan");
            api::error_response(&e)
        }
    }
}
