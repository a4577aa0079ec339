use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    response::{IntoResponse, Response},
};
use rust_embed::Embed;

#[derive(Embed)]
#[folder = "static"]
pub struct Assets;

fn serve(path: &str) -> Response {
    match Assets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref().to_owned())],
                Body::from(content.data.into_owned()),
            )
                .into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn index_page() -> Response {
    serve("index.html")
}

pub async fn book_page() -> Response {
    serve("book.html")
}

pub async fn add_book_page() -> Response {
    serve("add_book.html")
}

/// Serves `/static/<file>` from the embedded folder.
pub async fn serve_embedded(req: Request<Body>) -> impl IntoResponse {
    match req.uri().path().strip_prefix("/static/") {
        Some(path) if !path.is_empty() => serve(path),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
