use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::assets::{add_book_page, book_page, index_page, serve_embedded};
use crate::handler::{self, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handler::healthcheck))
        .route("/", get(index_page))
        .route("/book/:id", get(book_page))
        .route("/add-book", get(add_book_page).post(handler::add_book))
        .route("/books", get(handler::get_books))
        .route("/books-with-authors", get(handler::get_books_with_authors))
        .route("/book-data/:id", get(handler::get_book))
        .route("/authors", get(handler::get_authors))
        .route("/authors/:id", get(handler::get_author))
        .route("/readers", get(handler::get_readers).post(handler::create_reader))
        .route("/loans", get(handler::get_loans))
        .route("/loan", post(handler::loan_book))
        .fallback(serve_embedded)
}

/// The full application with middleware and state applied.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    routes()
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
