//! Inbound side of a stream, seen as a header set plus a readable body.
//!
//! An [`IncomingMessage`] owns the event channel of its stream. The first
//! header frame is the message head: it is validated and its regular fields
//! become [`headers`](IncomingMessage::headers). Everything after that is
//! consumed lazily while the body is read, so the reader's pace is what
//! drains the transport:
//!
//! - `Data` chunks are yielded by the [`Stream`] implementation;
//! - every later header frame overwrites the "last headers seen";
//! - `End` turns the last headers seen into the trailers.
//!
//! Only the most recent header frame before `End` survives as trailers. A
//! channel that closes without `End` means the peer reset the stream: the
//! body is truncated, the message is aborted and has no trailers.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::channel::mpsc;
use futures::{Stream, StreamExt, ready};

use crate::http::headers::HeaderSet;
use crate::http::validator::{ValidationError, Validator};
use crate::http::{HttpMessage, HttpVersion};
use crate::log::Logger;
use crate::transport::{IncomingStream, ResetReason, StreamEvent, TransportStream};

pub struct IncomingMessage {
    stream: Arc<dyn TransportStream>,
    events: mpsc::Receiver<StreamEvent>,
    headers: HeaderSet,
    trailers: Option<HeaderSet>,
    last_headers_seen: Option<HeaderSet>,
    headers_received: bool,
    ended: bool,
    aborted: bool,
    log: Logger,
}

impl IncomingMessage {
    pub fn new(incoming: IncomingStream, log: &Logger) -> Self {
        Self {
            stream: incoming.stream,
            events: incoming.events,
            headers: HeaderSet::new(),
            trailers: None,
            last_headers_seen: None,
            headers_received: false,
            ended: false,
            aborted: false,
            log: log.child("http"),
        }
    }

    pub fn http_version(&self) -> HttpVersion {
        HttpVersion::V2_0
    }

    pub fn stream_id(&self) -> u32 {
        self.stream.id()
    }

    /// Trailers, available once the body has been read to its end.
    pub fn trailers(&self) -> Option<&HeaderSet> {
        self.trailers.as_ref()
    }

    /// Whether the stream was reset, either here after a malformed header
    /// frame or by the peer before the body ended.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Whether the body was received up to its end.
    pub fn is_complete(&self) -> bool {
        self.ended
    }

    pub async fn read_chunk(&mut self) -> Option<Bytes> {
        self.next().await
    }

    pub async fn read_to_end(&mut self) -> Vec<u8> {
        let mut body = Vec::new();
        while let Some(chunk) = self.next().await {
            body.extend_from_slice(&chunk);
        }
        body
    }

    pub(crate) fn log(&self) -> &Logger {
        &self.log
    }

    pub(crate) fn headers_mut(&mut self) -> &mut HeaderSet {
        &mut self.headers
    }

    /// Waits for the first header frame. `None` if the stream ends or sends
    /// data before it; such a stream is reset.
    pub(crate) async fn recv_head(&mut self) -> Option<HeaderSet> {
        match self.events.next().await {
            Some(StreamEvent::Headers(headers)) => Some(headers),
            Some(StreamEvent::Data(_)) => {
                self.log.emit(|| tracing::error!("Data frame received before headers"));
                self.stream.reset(ResetReason::ProtocolError);
                self.aborted = true;
                None
            }
            Some(StreamEvent::End) => {
                self.ended = true;
                None
            }
            None => {
                self.on_closed();
                None
            }
        }
    }

    /// Handles the message head: validates it and copies its regular fields.
    pub(crate) fn on_headers(&mut self, headers: &HeaderSet) -> Result<(), ValidationError> {
        if let Err(err) = Validator::validate_headers(headers) {
            self.abort(&err);
            return Err(err);
        }
        self.accept_head(headers);
        Ok(())
    }

    /// Copies the regular fields of an already validated head.
    pub(crate) fn accept_head(&mut self, headers: &HeaderSet) {
        for (name, value) in headers.regular() {
            self.headers.append(name, value);
        }
        self.headers_received = true;
    }

    /// Resets the stream after a protocol error. Nothing else is processed
    /// afterwards.
    pub(crate) fn abort(&mut self, err: &ValidationError) {
        self.log.emit(|| tracing::error!(error = %err, "Invalid header frame, resetting stream"));
        self.stream.reset(ResetReason::ProtocolError);
        self.aborted = true;
    }

    fn on_header_event(&mut self, headers: HeaderSet) {
        if self.headers_received {
            self.last_headers_seen = Some(headers);
        } else {
            let _ = self.on_headers(&headers);
        }
    }

    fn on_end(&mut self) {
        self.trailers = self.last_headers_seen.take();
        self.ended = true;
    }

    fn on_closed(&mut self) {
        self.log.emit(|| tracing::warn!(stream = self.stream.id(), "Stream closed before its end"));
        self.last_headers_seen = None;
        self.aborted = true;
    }
}

impl HttpMessage for IncomingMessage {
    fn headers(&self) -> &HeaderSet {
        &self.headers
    }
}

impl Stream for IncomingMessage {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        let this = self.get_mut();
        loop {
            if this.ended || this.aborted {
                return Poll::Ready(None);
            }
            match ready!(this.events.poll_next_unpin(cx)) {
                Some(StreamEvent::Data(chunk)) => return Poll::Ready(Some(chunk)),
                Some(StreamEvent::Headers(headers)) => this.on_header_event(headers),
                Some(StreamEvent::End) => this.on_end(),
                None => this.on_closed(),
            }
        }
    }
}
