use std::path::Path;

use crate::http::status::HttpStatus;
use crate::log::Logger;

/// A fully built answer, before it is written to an
/// [`OutgoingResponse`](crate::http::response::OutgoingResponse).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: HttpStatus,
    pub content_type: &'static str,
    pub content_encoding: Option<&'static str>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn new(status: HttpStatus, content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            content_encoding: None,
            body,
        }
    }
}

fn error_page(status: HttpStatus) -> Reply {
    let body = format!("<h1>{} {}</h1>", status.as_u16(), status.reason());
    Reply::new(status, "text/html", body.into_bytes())
}

/// Serves the configured error document with a 404 status, or a built-in
/// page when that document cannot be read.
pub async fn not_found(document: &Path, log: &Logger) -> Reply {
    match async_std::fs::read(document.as_os_str()).await {
        Ok(body) => Reply::new(HttpStatus::NotFound, "text/html", body),
        Err(err) => {
            log.emit(|| {
                tracing::warn!(document = %document.display(), error = %err, "Error document unavailable")
            });
            error_page(HttpStatus::NotFound)
        }
    }
}

pub fn forbidden() -> Reply {
    error_page(HttpStatus::Forbidden)
}

pub fn method_not_allowed() -> Reply {
    error_page(HttpStatus::MethodNotAllowed)
}

pub fn internal_server_error() -> Reply {
    error_page(HttpStatus::InternalServerError)
}
