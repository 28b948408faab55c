//! Landing page served from embedded assets

use axum::{
    body::Body,
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;

/// Embedded landing page assets (compiled into binary)
#[derive(RustEmbed)]
#[folder = "assets/"]
struct LandingAssets;

/// `GET /`
pub async fn index_handler() -> impl IntoResponse {
    serve_file("index.html")
        .unwrap_or_else(|| (StatusCode::NOT_FOUND, "landing page not found").into_response())
}

/// Serve any other embedded asset, 404 otherwise
pub async fn static_handler(uri: Uri) -> impl IntoResponse {
    let path = uri.path().trim_start_matches('/');

    serve_file(path).unwrap_or_else(|| (StatusCode::NOT_FOUND, "not found").into_response())
}

/// Serve a file from embedded assets
fn serve_file(path: &str) -> Option<Response<Body>> {
    let file = LandingAssets::get(path)?;

    let mime = mime_guess::from_path(path).first_or_octet_stream();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime.as_ref())
        .body(Body::from(file.data.into_owned()))
        .ok()
}
