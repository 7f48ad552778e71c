use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

use crate::http::headers::{AUTHORITY, HOST, HeaderSet, METHOD, PATH, SCHEME};
use crate::http::incoming::IncomingMessage;
use crate::http::validator::{ValidationError, Validator};
use crate::http::{HttpMessage, HttpMethod, HttpVersion, http_method_from_str};

/// Scheme and authority of the request a response answers, used to fill in
/// push promises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    pub scheme: String,
    pub authority: String,
}

/// A request whose head has been received and validated.
///
/// The only way to obtain one is [`IncomingRequest::ready`], so application
/// code never sees a request with missing or malformed pseudo-headers.
pub struct IncomingRequest {
    message: IncomingMessage,
    method: String,
    scheme: String,
    authority: String,
    path: String,
}

impl IncomingRequest {
    /// Waits for the request head and validates it.
    ///
    /// Returns `None` when the request never becomes ready: the stream closed
    /// before its head, or the head was malformed, in which case the stream
    /// has been reset with a protocol error.
    pub async fn ready(mut message: IncomingMessage) -> Option<IncomingRequest> {
        let head = message.recv_head().await?;

        let (method, scheme, authority, path) = match Self::check_head(&head) {
            Ok(fields) => fields,
            Err(err) => {
                message.abort(&err);
                return None;
            }
        };

        message.accept_head(&head);
        message.headers_mut().insert(HOST, authority.as_str());

        message.log().emit(|| {
            tracing::info!(
                method = %method,
                scheme = %scheme,
                host = %authority,
                path = %path,
                "Incoming request"
            )
        });

        Some(IncomingRequest {
            message,
            method,
            scheme,
            authority,
            path,
        })
    }

    /// Runs the general header rules, then extracts the four request
    /// pseudo-headers.
    fn check_head(
        head: &HeaderSet,
    ) -> Result<(String, String, String, String), ValidationError> {
        Validator::validate_headers(head)?;
        Ok((
            Validator::require_pseudo_header(head, METHOD)?.to_string(),
            Validator::require_pseudo_header(head, SCHEME)?.to_string(),
            Validator::require_pseudo_header(head, AUTHORITY)?.to_string(),
            Validator::require_pseudo_header(head, PATH)?.to_string(),
        ))
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn method_kind(&self) -> HttpMethod {
        http_method_from_str(&self.method)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The `:authority` pseudo-header, also visible as the `host` header.
    pub fn host(&self) -> &str {
        &self.authority
    }

    /// The `:path` pseudo-header, query string included.
    pub fn url(&self) -> &str {
        &self.path
    }

    pub fn http_version(&self) -> HttpVersion {
        self.message.http_version()
    }

    pub fn stream_id(&self) -> u32 {
        self.message.stream_id()
    }

    pub fn origin(&self) -> RequestOrigin {
        RequestOrigin {
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
        }
    }

    pub fn trailers(&self) -> Option<&HeaderSet> {
        self.message.trailers()
    }

    pub fn is_complete(&self) -> bool {
        self.message.is_complete()
    }

    /// Whether the peer reset the stream before the body ended.
    pub fn is_aborted(&self) -> bool {
        self.message.is_aborted()
    }

    pub async fn read_chunk(&mut self) -> Option<Bytes> {
        self.message.read_chunk().await
    }

    pub async fn read_to_end(&mut self) -> Vec<u8> {
        self.message.read_to_end().await
    }
}

impl HttpMessage for IncomingRequest {
    fn headers(&self) -> &HeaderSet {
        self.message.headers()
    }
}

impl Stream for IncomingRequest {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        Pin::new(&mut self.get_mut().message).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::Logger;
    use crate::transport::memory::MemoryStream;
    use crate::transport::{ResetReason, StreamEvent};

    fn head(extra: &[(&str, &str)]) -> HeaderSet {
        let mut headers: HeaderSet = [
            (":method", "GET"),
            (":scheme", "https"),
            (":authority", "example.com"),
            (":path", "/index.html?v=2"),
        ]
        .into_iter()
        .collect();
        for (name, value) in extra {
            headers.insert(*name, *value);
        }
        headers
    }

    async fn accept(headers: HeaderSet) -> (std::sync::Arc<MemoryStream>, Option<IncomingRequest>) {
        let (stream, incoming) =
            MemoryStream::scripted(1, vec![StreamEvent::Headers(headers), StreamEvent::End]);
        let request = IncomingRequest::ready(IncomingMessage::new(incoming, &Logger::null())).await;
        (stream, request)
    }

    #[async_std::test]
    async fn valid_head_makes_the_request_ready() {
        let (stream, request) = accept(head(&[("accept", "text/html")])).await;
        let request = request.expect("request should be ready");

        assert_eq!(request.method(), "GET");
        assert_eq!(request.method_kind(), HttpMethod::Get);
        assert_eq!(request.scheme(), "https");
        assert_eq!(request.host(), "example.com");
        assert_eq!(request.url(), "/index.html?v=2");
        assert_eq!(request.header("host"), Some("example.com"));
        assert_eq!(request.header("accept"), Some("text/html"));
        assert_eq!(request.header(":method"), None);
        assert!(stream.frames().is_empty());
    }

    #[async_std::test]
    async fn deprecated_header_keeps_the_request_from_ready() {
        let (stream, request) = accept(head(&[("connection", "keep-alive")])).await;

        assert!(request.is_none());
        assert_eq!(stream.reset_reason(), Some(ResetReason::ProtocolError));
    }

    #[async_std::test]
    async fn uppercase_name_resets() {
        let (stream, request) = accept(head(&[("Connection", "keep-alive")])).await;

        assert!(request.is_none());
        assert_eq!(stream.reset_reason(), Some(ResetReason::ProtocolError));
    }

    #[async_std::test]
    async fn every_pseudo_header_is_required() {
        for missing in [METHOD, SCHEME, AUTHORITY, PATH] {
            let mut headers = head(&[]);
            headers.insert(missing, "");

            let (stream, request) = accept(headers).await;
            assert!(request.is_none(), "{missing} accepted while empty");
            assert_eq!(stream.reset_reason(), Some(ResetReason::ProtocolError));
        }
    }

    #[test]
    fn general_rules_run_before_pseudo_header_checks() {
        let mut headers = head(&[("connection", "close")]);
        headers.insert(PATH, "");

        assert_eq!(
            IncomingRequest::check_head(&headers),
            Err(ValidationError::DeprecatedHeader("connection".to_string()))
        );

        let mut headers = head(&[]);
        headers.insert(PATH, "");
        assert_eq!(
            IncomingRequest::check_head(&headers),
            Err(ValidationError::InvalidPseudoHeader(PATH))
        );
    }

    #[async_std::test]
    async fn client_host_field_is_replaced_by_the_authority() {
        let (_, request) = accept(head(&[("host", "other.example")])).await;
        let request = request.expect("request should be ready");

        assert_eq!(request.header("host"), Some("example.com"));
        assert_eq!(request.headers().get_all("host").len(), 1);
    }

    #[async_std::test]
    async fn stream_closed_before_head_is_not_reset() {
        let (stream, incoming) = MemoryStream::scripted(1, vec![StreamEvent::End]);
        let request = IncomingRequest::ready(IncomingMessage::new(incoming, &Logger::null())).await;

        assert!(request.is_none());
        assert_eq!(stream.reset_reason(), None);
    }

    #[async_std::test]
    async fn body_and_trailers_follow_readiness() {
        let (_, incoming) = MemoryStream::scripted(
            1,
            vec![
                StreamEvent::Headers(head(&[])),
                StreamEvent::Data(Bytes::from_static(b"payload")),
                StreamEvent::Headers([("x-sum", "7")].into_iter().collect()),
                StreamEvent::End,
            ],
        );
        let mut request = IncomingRequest::ready(IncomingMessage::new(incoming, &Logger::null()))
            .await
            .unwrap();

        assert_eq!(request.read_to_end().await, b"payload");
        assert_eq!(request.trailers().and_then(|t| t.get("x-sum")), Some("7"));
        assert_eq!(request.origin().authority, "example.com");
    }
}
