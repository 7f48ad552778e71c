use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use ::http::Uri;

use crate::Error;
use crate::http::headers::{AUTHORITY, DATE, HeaderSet, METHOD, PATH, SCHEME, STATUS};
use crate::http::outgoing::OutgoingMessage;
use crate::http::request::RequestOrigin;
use crate::http::{BodySink, HttpMessage};
use crate::log::Logger;
use crate::transport::TransportStream;

/// Settings shared by every response a server creates.
#[derive(Debug, Clone)]
pub struct ResponseOptions {
    /// Fields every response starts with.
    pub headers: HeaderSet,
    /// Whether a `date` field is added to response heads that lack one.
    pub send_date: bool,
    /// How long frames may wait for a stream before the response gives up.
    pub attach_timeout: Duration,
}

impl Default for ResponseOptions {
    fn default() -> Self {
        Self {
            headers: HeaderSet::new(),
            send_date: true,
            attach_timeout: Duration::from_secs(30),
        }
    }
}

/// Target of a server push.
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    pub method: Option<String>,
    pub scheme: Option<String>,
    pub authority: Option<String>,
    pub path: String,
    /// Extra fields of the promised request.
    pub headers: HeaderSet,
}

impl PushOptions {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Reads a push target from a URL (`https://host/app.css`) or a path
    /// (`/app.css`).
    pub fn parse(target: &str) -> Result<Self, Error> {
        let uri: Uri = target
            .parse()
            .map_err(|_| Error::InvalidPushTarget(target.to_string()))?;
        let path = uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::InvalidPushTarget(target.to_string()))?;

        Ok(Self {
            scheme: uri.scheme_str().map(str::to_string),
            authority: uri.authority().map(|a| a.as_str().to_string()),
            path,
            ..Self::default()
        })
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }
}

pub struct OutgoingResponse {
    message: OutgoingMessage,
    status_code: u16,
    send_date: bool,
    origin: Option<RequestOrigin>,
    options: Arc<ResponseOptions>,
    log: Logger,
}

impl OutgoingResponse {
    pub fn new(stream: Arc<dyn TransportStream>, options: Arc<ResponseOptions>, log: &Logger) -> Self {
        Self::build(Some(stream), options, log)
    }

    /// A response whose stream does not exist yet. Everything written to it is
    /// queued until [`attach`](Self::attach).
    pub fn detached(options: Arc<ResponseOptions>, log: &Logger) -> Self {
        Self::build(None, options, log)
    }

    fn build(
        stream: Option<Arc<dyn TransportStream>>,
        options: Arc<ResponseOptions>,
        log: &Logger,
    ) -> Self {
        let log = log.child("http");
        let mut message = OutgoingMessage::new(stream, options.attach_timeout, &log);
        for (name, value) in options.headers.regular() {
            if let Err(err) = message.set_header(name, value) {
                log.emit(|| tracing::error!(error = %err, "Skipping configured response header"));
            }
        }

        Self {
            message,
            status_code: 200,
            send_date: options.send_date,
            origin: None,
            options,
            log,
        }
    }

    pub fn attach(&mut self, stream: Arc<dyn TransportStream>) -> Result<(), Error> {
        self.message.attach(stream)
    }

    pub fn cancel(&mut self) {
        self.message.cancel();
    }

    pub(crate) fn bind_request(&mut self, origin: RequestOrigin) {
        self.origin = Some(origin);
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Status used by the implicit head sent on the first write.
    pub fn set_status_code(&mut self, status: u16) {
        self.status_code = status;
    }

    pub fn set_send_date(&mut self, send_date: bool) {
        self.send_date = send_date;
    }

    pub fn headers_sent(&self) -> bool {
        self.message.headers_sent()
    }

    pub fn is_finished(&self) -> bool {
        self.message.is_finished()
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> Result<(), Error> {
        self.message.set_header(name, value)
    }

    pub fn remove_header(&mut self, name: &str) -> Result<(), Error> {
        self.message.remove_header(name)
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.message.get_header(name)
    }

    pub fn add_trailers(&mut self, trailers: HeaderSet) {
        self.message.add_trailers(trailers);
    }

    /// Sends the response head. Does nothing if it was already sent.
    pub fn write_head(&mut self, status: u16, headers: Option<&HeaderSet>) -> Result<(), Error> {
        if self.message.headers_sent() {
            return Ok(());
        }

        if let Some(headers) = headers {
            // all or nothing: a bad name leaves the stored set untouched
            let mut checked = Vec::new();
            for (name, value) in headers.regular() {
                checked.push((self.message.check_header(name)?, value));
            }
            for (name, value) in checked {
                self.message.set_header(&name, value)?;
            }
        }
        if self.send_date && self.message.get_header(DATE).is_none() {
            self.message
                .set_header(DATE, httpdate::fmt_http_date(SystemTime::now()))?;
        }

        let mut frame = HeaderSet::new();
        frame.insert(STATUS, status.to_string());
        frame.merge(self.message.headers());

        self.log.emit(|| tracing::info!(status, "Sending server response"));
        self.status_code = status;
        self.message.send_headers(frame)
    }

    fn implicit_headers(&mut self) -> Result<(), Error> {
        if !self.message.headers_sent() {
            self.write_head(self.status_code, None)?;
        }
        Ok(())
    }

    /// Promises a server-initiated stream and returns the response that will
    /// fill it.
    ///
    /// Method defaults to `GET`; scheme and authority default to those of the
    /// request this response answers. Transport refusals (push disabled by
    /// the peer, pushing from a pushed stream) are returned as is.
    pub fn push(&mut self, options: PushOptions) -> Result<OutgoingResponse, Error> {
        let method = options.method.as_deref().unwrap_or("GET").to_ascii_uppercase();
        let scheme = options
            .scheme
            .or_else(|| self.origin.as_ref().map(|o| o.scheme.clone()))
            .ok_or(Error::MissingPushField(SCHEME))?;
        let authority = options
            .authority
            .or_else(|| self.origin.as_ref().map(|o| o.authority.clone()))
            .ok_or(Error::MissingPushField(AUTHORITY))?;
        if options.path.is_empty() {
            return Err(Error::MissingPushField(PATH));
        }

        let mut promise = HeaderSet::new();
        promise.insert(METHOD, method);
        promise.insert(SCHEME, scheme.as_str());
        promise.insert(AUTHORITY, authority.as_str());
        promise.insert(PATH, options.path.as_str());
        promise.merge(&options.headers);

        self.log.emit(|| {
            tracing::info!(
                scheme = %scheme,
                authority = %authority,
                path = %options.path,
                "Promising push stream"
            )
        });

        let stream = self.message.stream().ok_or(Error::NotAttached)?;
        let pushed = stream.promise(&promise)?;

        let mut child = OutgoingResponse::new(pushed, self.options.clone(), &self.log);
        child.bind_request(RequestOrigin { scheme, authority });
        Ok(child)
    }
}

impl HttpMessage for OutgoingResponse {
    fn headers(&self) -> &HeaderSet {
        self.message.headers()
    }
}

impl BodySink for OutgoingResponse {
    fn write(&mut self, chunk: Bytes) -> Result<(), Error> {
        self.implicit_headers()?;
        self.message.write(chunk)
    }

    fn end(&mut self) -> Result<(), Error> {
        self.implicit_headers()?;
        self.message.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use crate::transport::memory::{Frame, MemoryStream};

    fn response(stream: &Arc<MemoryStream>) -> OutgoingResponse {
        OutgoingResponse::new(stream.clone(), Arc::new(ResponseOptions::default()), &Logger::null())
    }

    fn bound(stream: &Arc<MemoryStream>) -> OutgoingResponse {
        let mut res = response(stream);
        res.bind_request(RequestOrigin {
            scheme: "https".to_string(),
            authority: "example.com".to_string(),
        });
        res
    }

    #[test]
    fn write_head_then_end_sends_one_head_before_end() {
        let stream = MemoryStream::new(1);
        let mut res = response(&stream);
        res.write_head(200, None).unwrap();
        res.end().unwrap();

        let frames = stream.frames();
        assert_eq!(frames.len(), 2);
        let Frame::Headers(head) = &frames[0] else {
            panic!("expected a header frame first, got {frames:?}");
        };
        assert_eq!(head.get(STATUS), Some("200"));
        assert!(head.get(DATE).is_some());
        assert_eq!(frames[1], Frame::End);
    }

    #[test]
    fn set_header_after_head_fails_and_leaves_the_frame_alone() {
        let stream = MemoryStream::new(1);
        let mut res = response(&stream);
        res.write_head(200, None).unwrap();

        assert!(matches!(res.set_header("x", "y"), Err(Error::HeadersSent(_))));
        assert_eq!(stream.header_frames()[0].get("x"), None);
    }

    #[test]
    fn second_write_head_is_ignored() {
        let stream = MemoryStream::new(1);
        let mut res = response(&stream);
        res.write_head(404, None).unwrap();
        res.write_head(500, None).unwrap();

        assert_eq!(stream.header_frames().len(), 1);
        assert_eq!(res.status_code(), 404);
    }

    #[test]
    fn write_sends_implicit_head_first() {
        let stream = MemoryStream::new(1);
        let mut res = response(&stream);
        res.set_status_code(201);
        res.set_send_date(false);
        res.set_header("Content-Type", "text/plain").unwrap();
        res.write(Bytes::from_static(b"body")).unwrap();

        let frames = stream.frames();
        let Frame::Headers(head) = &frames[0] else {
            panic!("expected a header frame first, got {frames:?}");
        };
        assert_eq!(head.get(STATUS), Some("201"));
        assert_eq!(head.get("content-type"), Some("text/plain"));
        assert_eq!(head.get(DATE), None);
        assert_eq!(frames[1], Frame::Data(Bytes::from_static(b"body")));
    }

    #[test]
    fn write_head_merges_headers_and_keeps_explicit_date() {
        let stream = MemoryStream::new(1);
        let mut res = response(&stream);
        let extra: HeaderSet = [("Date", "Thu, 01 Jan 1970 00:00:00 GMT"), ("x-one", "1")]
            .into_iter()
            .collect();
        res.write_head(200, Some(&extra)).unwrap();

        let head = &stream.header_frames()[0];
        assert_eq!(head.get(DATE), Some("Thu, 01 Jan 1970 00:00:00 GMT"));
        assert_eq!(head.get("x-one"), Some("1"));
    }

    #[test]
    fn write_head_rejects_deprecated_headers() {
        let stream = MemoryStream::new(1);
        let mut res = response(&stream);
        let extra: HeaderSet = [("connection", "close")].into_iter().collect();

        assert!(matches!(res.write_head(200, Some(&extra)), Err(Error::DeprecatedHeader(_))));
        assert!(stream.frames().is_empty());
        assert!(!res.headers_sent());
    }

    #[test]
    fn failed_write_head_leaves_no_headers_behind() {
        let stream = MemoryStream::new(1);
        let mut res = response(&stream);
        res.set_send_date(false);
        let extra: HeaderSet = [("x-first", "1"), ("keep-alive", "timeout=5")].into_iter().collect();

        assert!(matches!(res.write_head(200, Some(&extra)), Err(Error::DeprecatedHeader(_))));
        assert_eq!(res.get_header("x-first"), None);

        res.end().unwrap();
        let head = &stream.header_frames()[0];
        assert_eq!(head.get("x-first"), None);
        assert_eq!(head.len(), 1);
    }

    #[test]
    fn status_cannot_be_overridden_by_a_header() {
        let stream = MemoryStream::new(1);
        let mut res = response(&stream);

        assert!(matches!(res.set_header(":status", "500"), Err(Error::PseudoHeader(_))));
        res.write_head(204, None).unwrap();
        assert_eq!(stream.header_frames()[0].get(":status"), Some("204"));
        assert_eq!(res.status_code(), 204);
    }

    #[test]
    fn configured_headers_start_every_response() {
        let options = ResponseOptions {
            headers: [("x-powered-by", "h2serve"), ("upgrade", "h2c")].into_iter().collect(),
            ..ResponseOptions::default()
        };
        let res = OutgoingResponse::new(MemoryStream::new(1), Arc::new(options), &Logger::null());

        assert_eq!(res.get_header("x-powered-by"), Some("h2serve"));
        assert_eq!(res.get_header("upgrade"), None);
    }

    #[test]
    fn trailers_go_out_before_end() {
        let stream = MemoryStream::new(1);
        let mut res = response(&stream);
        res.add_trailers([("x-checksum", "abc")].into_iter().collect());
        res.end().unwrap();

        let frames = stream.frames();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1], Frame::Headers([("x-checksum", "abc")].into_iter().collect()));
        assert_eq!(frames[2], Frame::End);
    }

    #[test]
    fn push_defaults_to_the_request_origin() {
        let stream = MemoryStream::new(1);
        let mut res = bound(&stream);
        let mut pushed = res
            .push(PushOptions::new("/style.css").method("get").header("accept", "text/css"))
            .unwrap();

        let promised = stream.promised();
        assert_eq!(promised.len(), 1);
        let frames = stream.frames();
        let Frame::Promise(promise) = &frames[0] else {
            panic!("expected a promise frame");
        };
        assert_eq!(promise.get(METHOD), Some("GET"));
        assert_eq!(promise.get(SCHEME), Some("https"));
        assert_eq!(promise.get(AUTHORITY), Some("example.com"));
        assert_eq!(promise.get(PATH), Some("/style.css"));
        assert_eq!(promise.get("accept"), Some("text/css"));

        pushed.end().unwrap();
        assert_eq!(promised[0].frames().len(), 2);
    }

    #[test]
    fn push_overrides_take_precedence() {
        let stream = MemoryStream::new(1);
        let mut res = bound(&stream);
        res.push(PushOptions::parse("http://cdn.example.com/app.js?v=1").unwrap())
            .unwrap();

        let frames = stream.frames();
        let Frame::Promise(promise) = &frames[0] else {
            panic!("expected a promise frame");
        };
        assert_eq!(promise.get(SCHEME), Some("http"));
        assert_eq!(promise.get(AUTHORITY), Some("cdn.example.com"));
        assert_eq!(promise.get(PATH), Some("/app.js?v=1"));
    }

    #[test]
    fn push_failures_surface_to_the_caller() {
        let stream = MemoryStream::without_push(1);
        let mut res = bound(&stream);

        assert!(matches!(
            res.push(PushOptions::new("/a.css")),
            Err(Error::Transport(TransportError::PushDisabled))
        ));

        let mut unbound = response(&MemoryStream::new(3));
        assert!(matches!(
            unbound.push(PushOptions::new("/a.css")),
            Err(Error::MissingPushField(SCHEME))
        ));
    }

    #[test]
    fn detached_response_replays_on_attach() {
        let mut res = OutgoingResponse::detached(Arc::new(ResponseOptions::default()), &Logger::null());
        res.write(Bytes::from_static(b"a")).unwrap();
        res.write(Bytes::from_static(b"b")).unwrap();
        res.end().unwrap();

        let stream = MemoryStream::new(2);
        res.attach(stream.clone()).unwrap();

        let frames = stream.frames();
        assert!(matches!(&frames[0], Frame::Headers(h) if h.get(STATUS) == Some("200")));
        assert_eq!(&frames[1..], &[
            Frame::Data(Bytes::from_static(b"a")),
            Frame::Data(Bytes::from_static(b"b")),
            Frame::End,
        ]);
    }

    #[test]
    fn parse_rejects_empty_targets() {
        assert!(PushOptions::parse("").is_err());
        assert_eq!(PushOptions::parse("/x").unwrap().scheme, None);
    }
}
