//! HTTP/2 endpoint backed by the `h2` crate.
//!
//! The socket is adapted to tokio's I/O traits with `tokio-util`'s compat
//! layer, so `h2` runs on the async-std executor like the rest of the crate.
//!
//! Inbound, each accepted stream gets a pump task that forwards the request
//! head, the body chunks and the trailers into a bounded event channel. Flow
//! control capacity is only released once the consumer's channel accepted a
//! chunk, so a slow reader slows the peer down.
//!
//! Outbound, the first header frame becomes the response head and a later one
//! becomes the trailers (which also end the stream).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ::h2::server::{self, Connection, SendPushedResponse, SendResponse};
use ::h2::{Reason, RecvStream, SendStream};
use ::http::header::{HeaderName, HeaderValue};
use ::http::request::Parts;
use ::http::{HeaderMap, Request, Response, StatusCode, Uri};
use async_std::net::TcpStream;
use async_std::task;
use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use futures::channel::mpsc;
use serde::Deserialize;
use tokio_util::compat::{Compat, FuturesAsyncReadCompatExt};

use crate::http::headers::{AUTHORITY, HeaderSet, METHOD, PATH, SCHEME, STATUS};
use crate::log::Logger;
use crate::transport::{
    Endpoint, IncomingStream, ResetReason, StreamEvent, Transport, TransportError, TransportStream,
};

const EVENT_BUFFER: usize = 16;

impl From<::h2::Error> for TransportError {
    fn from(err: ::h2::Error) -> Self {
        match err.get_io() {
            Some(io) => TransportError::Io(std::io::Error::new(io.kind(), err.to_string())),
            None => TransportError::Protocol(err.to_string()),
        }
    }
}

impl From<ResetReason> for Reason {
    fn from(reason: ResetReason) -> Self {
        match reason {
            ResetReason::ProtocolError => Reason::PROTOCOL_ERROR,
            ResetReason::InternalError => Reason::INTERNAL_ERROR,
            ResetReason::RefusedStream => Reason::REFUSED_STREAM,
            ResetReason::Cancel => Reason::CANCEL,
        }
    }
}

/// Connection settings announced to the peer. Unset values keep the `h2`
/// defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct H2Settings {
    pub max_concurrent_streams: Option<u32>,
    pub initial_window_size: Option<u32>,
    pub max_frame_size: Option<u32>,
    pub max_header_list_size: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct H2Transport {
    settings: H2Settings,
}

impl H2Transport {
    pub fn new(settings: H2Settings) -> Self {
        Self { settings }
    }

    fn builder(&self) -> server::Builder {
        let mut builder = server::Builder::new();
        if let Some(max) = self.settings.max_concurrent_streams {
            builder.max_concurrent_streams(max);
        }
        if let Some(size) = self.settings.initial_window_size {
            builder.initial_window_size(size);
        }
        if let Some(size) = self.settings.max_frame_size {
            builder.max_frame_size(size);
        }
        if let Some(size) = self.settings.max_header_list_size {
            builder.max_header_list_size(size);
        }
        builder
    }
}

#[async_trait]
impl Transport for H2Transport {
    type Endpoint = H2Endpoint;

    async fn establish(&self, socket: TcpStream, log: &Logger) -> Result<H2Endpoint, TransportError> {
        let connection = self.builder().handshake(socket.compat()).await?;
        Ok(H2Endpoint {
            connection,
            log: log.child("h2"),
        })
    }
}

pub struct H2Endpoint {
    connection: Connection<Compat<TcpStream>, Bytes>,
    log: Logger,
}

#[async_trait]
impl Endpoint for H2Endpoint {
    async fn next_stream(&mut self) -> Option<Result<IncomingStream, TransportError>> {
        let accepted = self.connection.accept().await?;
        Some(
            accepted
                .map(|(request, respond)| self.bind(request, respond))
                .map_err(TransportError::from),
        )
    }
}

impl H2Endpoint {
    fn bind(&self, request: Request<RecvStream>, respond: SendResponse<Bytes>) -> IncomingStream {
        let id = respond.stream_id().as_u32();
        let (parts, body) = request.into_parts();

        let (mut events, receiver) = mpsc::channel(EVENT_BUFFER);
        // a fresh channel always has room for the head
        let _ = events.try_send(StreamEvent::Headers(request_head(&parts)));
        task::spawn(pump(body, events, self.log.clone()));

        IncomingStream {
            stream: Arc::new(H2Stream::new(id, Responder::Stream(respond))),
            events: receiver,
        }
    }
}

async fn pump(mut body: RecvStream, mut events: mpsc::Sender<StreamEvent>, log: Logger) {
    while let Some(chunk) = body.data().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                log.emit(|| tracing::debug!(error = %err, "Request body aborted"));
                return;
            }
        };
        let len = chunk.len();
        if events.send(StreamEvent::Data(chunk)).await.is_err() {
            return;
        }
        let _ = body.flow_control().release_capacity(len);
    }

    match body.trailers().await {
        Ok(Some(trailers)) => {
            if events.send(StreamEvent::Headers(header_set(&trailers))).await.is_err() {
                return;
            }
        }
        Ok(None) => {}
        Err(err) => {
            log.emit(|| tracing::debug!(error = %err, "Request trailers aborted"));
            return;
        }
    }
    let _ = events.send(StreamEvent::End).await;
}

fn request_head(parts: &Parts) -> HeaderSet {
    let mut head = HeaderSet::new();
    head.insert(METHOD, parts.method.as_str());
    head.insert(SCHEME, parts.uri.scheme_str().unwrap_or_default());
    head.insert(AUTHORITY, parts.uri.authority().map(|a| a.as_str()).unwrap_or_default());
    head.insert(PATH, parts.uri.path_and_query().map(|p| p.as_str()).unwrap_or_default());
    for (name, value) in header_set(&parts.headers).iter() {
        head.append(name, value);
    }
    head
}

fn header_set(map: &HeaderMap) -> HeaderSet {
    map.iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn header_map(headers: &HeaderSet) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers.regular() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::InvalidHeader(name.to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidHeader(name.as_str().to_string()))?;
        map.append(name, value);
    }
    Ok(map)
}

fn response_head(headers: &HeaderSet) -> Result<Response<()>, TransportError> {
    let status = headers
        .get(STATUS)
        .and_then(|s| s.parse::<u16>().ok())
        .and_then(|s| StatusCode::from_u16(s).ok())
        .ok_or_else(|| TransportError::InvalidHeader(STATUS.to_string()))?;

    let mut response = Response::new(());
    *response.status_mut() = status;
    *response.headers_mut() = header_map(headers)?;
    Ok(response)
}

fn promise_head(headers: &HeaderSet) -> Result<Request<()>, TransportError> {
    let field = |name: &str| {
        headers
            .get(name)
            .ok_or_else(|| TransportError::InvalidHeader(name.to_string()))
    };
    let uri = Uri::builder()
        .scheme(field(SCHEME)?)
        .authority(field(AUTHORITY)?)
        .path_and_query(field(PATH)?)
        .build()
        .map_err(|err| TransportError::InvalidHeader(err.to_string()))?;

    let mut request = Request::builder()
        .method(field(METHOD)?)
        .uri(uri)
        .body(())
        .map_err(|err| TransportError::InvalidHeader(err.to_string()))?;
    *request.headers_mut() = header_map(headers)?;
    Ok(request)
}

enum Responder {
    Stream(SendResponse<Bytes>),
    Pushed(SendPushedResponse<Bytes>),
}

impl Responder {
    fn send_response(
        &mut self,
        response: Response<()>,
        end_of_stream: bool,
    ) -> Result<SendStream<Bytes>, ::h2::Error> {
        match self {
            Responder::Stream(respond) => respond.send_response(response, end_of_stream),
            Responder::Pushed(respond) => respond.send_response(response, end_of_stream),
        }
    }

    fn send_reset(&mut self, reason: Reason) {
        match self {
            Responder::Stream(respond) => respond.send_reset(reason),
            Responder::Pushed(respond) => respond.send_reset(reason),
        }
    }
}

struct SendState {
    respond: Responder,
    body: Option<SendStream<Bytes>>,
    closed: bool,
}

pub struct H2Stream {
    id: u32,
    state: Mutex<SendState>,
}

impl H2Stream {
    fn new(id: u32, respond: Responder) -> Self {
        Self {
            id,
            state: Mutex::new(SendState {
                respond,
                body: None,
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TransportStream for H2Stream {
    fn id(&self) -> u32 {
        self.id
    }

    fn send_headers(&self, headers: &HeaderSet) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.closed {
            return Err(TransportError::StreamClosed(self.id));
        }

        match state.body.take() {
            None => {
                let response = response_head(headers)?;
                let body = state.respond.send_response(response, false)?;
                state.body = Some(body);
            }
            Some(mut body) => {
                state.closed = true;
                body.send_trailers(header_map(headers)?)?;
            }
        }
        Ok(())
    }

    fn send_data(&self, data: Bytes) -> Result<(), TransportError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        match state.body.as_mut() {
            Some(body) if !state.closed => Ok(body.send_data(data, false)?),
            _ => Err(TransportError::StreamClosed(self.id)),
        }
    }

    fn end(&self) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;

        match state.body.take() {
            Some(mut body) => body.send_data(Bytes::new(), true)?,
            None => {
                let mut response = Response::new(());
                *response.status_mut() = StatusCode::OK;
                state.respond.send_response(response, true)?;
            }
        }
        Ok(())
    }

    fn promise(
        &self,
        pseudo_headers: &HeaderSet,
    ) -> Result<Arc<dyn TransportStream>, TransportError> {
        let request = promise_head(pseudo_headers)?;
        let mut state = self.lock();
        match &mut state.respond {
            Responder::Stream(respond) => {
                // refusals raised locally carry neither a reason nor an I/O error
                let pushed = respond.push_request(request).map_err(|err| {
                    if err.reason().is_none() && err.get_io().is_none() {
                        TransportError::PushDisabled
                    } else {
                        TransportError::from(err)
                    }
                })?;
                let id = pushed.stream_id().as_u32();
                Ok(Arc::new(H2Stream::new(id, Responder::Pushed(pushed))))
            }
            Responder::Pushed(_) => Err(TransportError::PushUnsupported(self.id)),
        }
    }

    fn reset(&self, reason: ResetReason) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        match state.body.take() {
            Some(mut body) => body.send_reset(reason.into()),
            None => state.respond.send_reset(reason.into()),
        }
    }
}
