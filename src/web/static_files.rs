//! Static file serving with embedded assets

use axum::{
    body::Body,
    http::{header, Response, StatusCode},
    response::IntoResponse,
};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "assets/web/"]
pub struct WebAssets;

fn respond(status: StatusCode, content_type: &str, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    if let Ok(value) = header::HeaderValue::from_str(content_type) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    response
}

/// Serve embedded static files
pub async fn serve_static(path: &str) -> impl IntoResponse {
    let path = if path.is_empty() || path == "/" {
        "index.html"
    } else {
        path.trim_start_matches('/')
    };

    if let Some(content) = WebAssets::get(path) {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        return respond(
            StatusCode::OK,
            mime.as_ref(),
            Body::from(content.data.into_owned()),
        );
    }

    // Paths without an extension belong to the single page app
    if !path.contains('.') {
        if let Some(content) = WebAssets::get("index.html") {
            return respond(
                StatusCode::OK,
                "text/html",
                Body::from(content.data.into_owned()),
            );
        }
    }

    respond(StatusCode::NOT_FOUND, "text/plain", Body::from("Not found"))
}
