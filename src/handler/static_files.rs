use std::io::ErrorKind::*;
use std::path::{Component, Path, PathBuf};

use async_std::fs;

use crate::handler::responses::{self, Reply};
use crate::http::status::HttpStatus;
use crate::log::Logger;

const INDEX: &str = "index.html";

/// Resolves `url` under `root` and reads the file.
pub async fn serve(root: &Path, error_page: &Path, url: &str, log: &Logger) -> Reply {
    let Some(safe_path) = sanitize_path(url) else {
        return responses::forbidden();
    };
    let mut full_path = root.join(safe_path);
    if fs::metadata(full_path.as_os_str()).await.is_ok_and(|meta| meta.is_dir()) {
        full_path.push(INDEX);
    }
    log.emit(|| tracing::debug!(path = %full_path.display(), "Serving static file"));

    match fs::read(full_path.as_os_str()).await {
        Ok(body) => Reply::new(HttpStatus::Ok, guess_mime(&full_path), body),
        Err(err) => match err.kind() {
            NotFound => responses::not_found(error_page, log).await,
            PermissionDenied => responses::forbidden(),
            _ => {
                log.emit(|| {
                    tracing::error!(path = %full_path.display(), error = %err, "Failed to read static file")
                });
                responses::internal_server_error()
            }
        },
    }
}

/// Turns a request path into a relative file path. Query strings and
/// fragments are dropped; `None` if the path tries to leave the root.
fn sanitize_path(url: &str) -> Option<PathBuf> {
    let path = url.split(['?', '#']).next().unwrap_or_default();

    let mut relative = PathBuf::new();
    for segment in Path::new(path).components() {
        match segment {
            Component::Normal(part) => relative.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    Some(relative)
}

fn guess_mime(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("htm") | Some("html") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("txt") => "text/plain",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}
