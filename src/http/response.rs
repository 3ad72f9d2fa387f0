//! Response construction.
//!
//! # Responsibilities
//! - Build redirect, error and file responses in one place
//! - Stream file bodies instead of buffering them
//! - Map resolver errors to status codes without leaking paths
//!
//! # Design Decisions
//! - Error bodies are the canonical status text only
//! - File handles are owned by the body stream, so dropping the response
//!   (client disconnect, timeout) closes the file

use std::io;
use std::path::Path;

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

use crate::static_files::StaticError;

/// Methods the request/response pipeline serves.
pub const ALLOWED_METHODS: &str = "GET, HEAD";

/// 302 Found to `location`.
pub fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (
            StatusCode::FOUND,
            [(header::LOCATION, value)],
            format!("Found. Redirecting to {}", location),
        )
            .into_response(),
        Err(_) => internal_error(),
    }
}

pub fn not_found() -> Response {
    status_text(StatusCode::NOT_FOUND)
}

pub fn forbidden() -> Response {
    status_text(StatusCode::FORBIDDEN)
}

pub fn internal_error() -> Response {
    status_text(StatusCode::INTERNAL_SERVER_ERROR)
}

pub fn method_not_allowed() -> Response {
    let mut response = status_text(StatusCode::METHOD_NOT_ALLOWED);
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
    response
}

/// 400 for a malformed upgrade handshake. The connection is closed after
/// the response is written.
pub fn handshake_rejected() -> Response {
    let mut response = status_text(StatusCode::BAD_REQUEST);
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

/// Map a resolver failure to a response.
pub fn static_error(err: &StaticError) -> Response {
    match err {
        StaticError::NotFound => not_found(),
        StaticError::Forbidden => forbidden(),
        StaticError::Io(e) => {
            tracing::error!(error = %e, "Static file I/O failure");
            internal_error()
        }
    }
}

/// 200 with the file's bytes, or headers only for `HEAD`.
pub async fn file(path: &Path, head_only: bool) -> io::Result<Response> {
    let file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    let body = if head_only {
        Body::empty()
    } else {
        Body::from_stream(ReaderStream::new(file))
    };

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.as_ref())
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    Ok(response)
}

fn status_text(status: StatusCode) -> Response {
    (status, status.canonical_reason().unwrap_or("Error")).into_response()
}
