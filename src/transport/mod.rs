//! The multiplexing engine this crate sits on top of.
//!
//! Framing, header compression and flow control all belong to the transport.
//! The adapter only needs what is described here: an [`Endpoint`] per
//! connection that yields one [`IncomingStream`] per new multiplexed stream,
//! and a [`TransportStream`] handle to answer on.
//!
//! Two implementations ship with the crate:
//! - [`http2::H2Transport`], backed by the `h2` crate, used by the server binary;
//! - [`memory`], which records frames instead of encoding them.

pub mod http2;
pub mod memory;

use std::sync::Arc;

use async_std::net::TcpStream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use thiserror::Error;

use crate::http::headers::HeaderSet;
use crate::log::Logger;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stream {0} does not support push promises")]
    PushUnsupported(u32),

    #[error("peer has disabled server push")]
    PushDisabled,

    #[error("stream {0} is closed")]
    StreamClosed(u32),

    #[error("invalid header field: {0}")]
    InvalidHeader(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Why a stream is being aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    ProtocolError,
    InternalError,
    RefusedStream,
    Cancel,
}

/// Inbound activity on one stream, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A header frame. The first one is the message head.
    Headers(HeaderSet),
    Data(Bytes),
    /// The peer finished sending.
    End,
}

/// Outbound half of one multiplexed stream.
///
/// Calls never block; the transport queues frames and flushes them while
/// its connection is being driven.
pub trait TransportStream: Send + Sync {
    fn id(&self) -> u32;

    /// Sends a header frame. The first one carries the response head, a
    /// later one carries trailers.
    fn send_headers(&self, headers: &HeaderSet) -> Result<(), TransportError>;

    fn send_data(&self, data: Bytes) -> Result<(), TransportError>;

    /// Ends the outbound side. Ending after trailers is a no-op.
    fn end(&self) -> Result<(), TransportError>;

    /// Reserves a server-initiated stream for the request described by
    /// `pseudo_headers` and returns its outbound half.
    fn promise(&self, pseudo_headers: &HeaderSet)
    -> Result<Arc<dyn TransportStream>, TransportError>;

    fn reset(&self, reason: ResetReason);
}

/// A new stream yielded by an [`Endpoint`].
pub struct IncomingStream {
    pub stream: Arc<dyn TransportStream>,
    pub events: mpsc::Receiver<StreamEvent>,
}

/// One connection's multiplexer.
#[async_trait]
pub trait Endpoint: Send + 'static {
    /// Waits for the next stream the peer opens. `None` once the connection
    /// is closed. Driving this method also drives the connection itself.
    async fn next_stream(&mut self) -> Option<Result<IncomingStream, TransportError>>;
}

/// Creates one [`Endpoint`] per accepted socket.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Endpoint: Endpoint;

    /// Takes ownership of the socket and pipes both directions through a
    /// new endpoint.
    async fn establish(
        &self,
        socket: TcpStream,
        log: &Logger,
    ) -> Result<Self::Endpoint, TransportError>;
}
