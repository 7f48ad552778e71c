//! Static site served on top of the adapter.

mod middleware;
mod responses;
mod router;
mod static_files;

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use crate::Error;
use crate::config::ServerConfig;
use crate::http::request::IncomingRequest;
use crate::http::response::OutgoingResponse;
use crate::http::{BodySink, HttpMessage, HttpMethod};
use crate::log::Logger;
use crate::net::server::Handler;

pub use middleware::CompressionAlgorithm;
pub use responses::Reply;

#[derive(Debug, Clone)]
pub struct StaticSite {
    root: PathBuf,
    error_page: PathBuf,
    log: Logger,
}

impl StaticSite {
    pub fn new(root: impl Into<PathBuf>, error_page: impl Into<PathBuf>, log: &Logger) -> Self {
        Self {
            root: root.into(),
            error_page: error_page.into(),
            log: log.child("static"),
        }
    }

    pub fn from_config(config: &ServerConfig, log: &Logger) -> Self {
        Self::new(&config.directory, &config.error_page, log)
    }

    /// Builds the reply for a request, without touching the wire.
    pub async fn reply(&self, req: &IncomingRequest) -> Reply {
        let mut reply =
            router::route(&self.root, &self.error_page, req.method_kind(), req.url(), &self.log).await;
        middleware::apply(req.header("accept-encoding"), &mut reply, &self.log);
        reply
    }

    async fn respond(&self, mut req: IncomingRequest, res: &mut OutgoingResponse) -> Result<(), Error> {
        // The request body is never used, but it still has to be consumed.
        let _ = req.read_to_end().await;

        let reply = self.reply(&req).await;
        res.set_header("content-type", reply.content_type)?;
        res.set_header("content-length", reply.body.len().to_string())?;
        if let Some(encoding) = reply.content_encoding {
            res.set_header("content-encoding", encoding)?;
        }
        res.write_head(reply.status.as_u16(), None)?;

        if req.method_kind() != HttpMethod::Head && !reply.body.is_empty() {
            res.write(Bytes::from(reply.body))?;
        }
        res.end()?;

        self.log.emit(|| {
            tracing::info!(
                method = req.method(),
                url = req.url(),
                status = reply.status.as_u16(),
                "Request served"
            )
        });
        Ok(())
    }
}

#[async_trait]
impl Handler for StaticSite {
    async fn handle(&self, request: IncomingRequest, mut response: OutgoingResponse) {
        let stream = request.stream_id();
        if let Err(err) = self.respond(request, &mut response).await {
            self.log.emit(|| tracing::error!(stream, error = %err, "Failed to send response"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::path::Path;

    use crate::http::headers::HeaderSet;
    use crate::net::server::{Server, ServerOptions};
    use crate::transport::StreamEvent;
    use crate::transport::memory::{Frame, MemoryEndpoint, MemoryStream};

    fn site_dir(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("h2serve-site-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("index.html"), "<h1>home</h1>").unwrap();
        root
    }

    fn request(method: &str, path: &str) -> Vec<StreamEvent> {
        let head: HeaderSet = [
            (":method", method),
            (":scheme", "https"),
            (":authority", "example.com"),
            (":path", path),
        ]
        .into_iter()
        .collect();
        vec![StreamEvent::Headers(head), StreamEvent::End]
    }

    async fn serve_one(root: &Path, method: &str, path: &str) -> std::sync::Arc<MemoryStream> {
        let site = StaticSite::new(root, root.join("404.html"), &Logger::null());
        let server = Server::new(ServerOptions::default(), site);
        let (stream, incoming) = MemoryStream::scripted(1, request(method, path));
        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        server.serve_endpoint(MemoryEndpoint::new([incoming]), peer).await;
        stream
    }

    #[test]
    fn site_logs_through_the_given_logger() {
        let config = ServerConfig::default();

        assert!(!StaticSite::from_config(&config, &Logger::null()).log.is_enabled());
        assert!(StaticSite::from_config(&config, &Logger::new("server")).log.is_enabled());
    }

    #[async_std::test]
    async fn get_root_serves_the_index() {
        let root = site_dir("get");
        let stream = serve_one(&root, "GET", "/").await;

        let frames = stream.frames();
        let Frame::Headers(head) = &frames[0] else {
            panic!("expected a header frame first, got {frames:?}");
        };
        assert_eq!(head.get(":status"), Some("200"));
        assert_eq!(head.get("content-type"), Some("text/html"));
        assert_eq!(head.get("content-length"), Some("13"));
        assert_eq!(frames[1], Frame::Data(Bytes::from_static(b"<h1>home</h1>")));
        assert_eq!(frames[2], Frame::End);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[async_std::test]
    async fn head_sends_headers_only() {
        let root = site_dir("head");
        let stream = serve_one(&root, "HEAD", "/").await;

        let frames = stream.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(stream.header_frames()[0].get("content-length"), Some("13"));
        assert_eq!(frames[1], Frame::End);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[async_std::test]
    async fn other_methods_are_refused() {
        let root = site_dir("post");
        let stream = serve_one(&root, "POST", "/").await;

        assert_eq!(stream.header_frames()[0].get(":status"), Some("405"));

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[async_std::test]
    async fn missing_files_use_the_built_in_page() {
        let root = site_dir("missing");
        let stream = serve_one(&root, "GET", "/nope.css").await;

        assert_eq!(stream.header_frames()[0].get(":status"), Some("404"));
        assert_eq!(stream.frames()[1], Frame::Data(Bytes::from_static(b"<h1>404 Not Found</h1>")));

        std::fs::remove_dir_all(&root).unwrap();
    }
}
