//! Static file serving using rust-embed.
//!
//! The single-page UI is compiled into the binary.

use axum::{
    body::Body,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;

/// Embedded static assets for the web UI.
#[derive(RustEmbed)]
#[folder = "src/web/assets/"]
#[include = "*.html"]
#[include = "*.js"]
#[include = "*.css"]
#[include = "*.ico"]
#[include = "*.svg"]
pub struct Assets;

/// Slot in the page where a receive error is shown.
const RECEIVE_ERROR_SLOT: &str = r#"<p class="error" id="receive-error" hidden></p>"#;

/// Fallback handler: serve an embedded asset, or the page itself for
/// extension-less paths.
pub async fn serve_static_fallback(uri: Uri) -> impl IntoResponse {
    let path = uri.path().trim_start_matches('/');

    let path = if path.is_empty() || !path.contains('.') {
        "index.html"
    } else {
        path
    };

    serve_file(path)
}

fn serve_file(path: &str) -> Response {
    let Some(content) = Assets::get(path) else {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    };

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    (
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CACHE_CONTROL, cache_control_for(path).to_string()),
        ],
        Body::from(content.data.into_owned()),
    )
        .into_response()
}

/// The page with `message` shown under the receive form.
pub fn page_with_error(status: StatusCode, message: &str) -> Response {
    let Some(content) = Assets::get("index.html") else {
        return (status, message.to_string()).into_response();
    };

    let filled = format!(
        r#"<p class="error" id="receive-error">{}</p>"#,
        html_escape::encode_text(message)
    );
    let page = String::from_utf8_lossy(&content.data).replacen(RECEIVE_ERROR_SLOT, &filled, 1);

    (
        status,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        page,
    )
        .into_response()
}

fn has_extension(path: &str, ext: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn cache_control_for(path: &str) -> &'static str {
    if has_extension(path, "html") {
        "no-cache, no-store, must-revalidate"
    } else {
        "public, max-age=3600"
    }
}
