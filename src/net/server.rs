//! Connection server.
//!
//! This module owns the listening socket and nothing above the transport.
//! It is responsible for:
//! - accepting TCP connections,
//! - handing each socket to a [`Transport`] that builds one [`Endpoint`],
//! - binding every stream the endpoint yields to one
//!   [`IncomingRequest`] / [`OutgoingResponse`] pair.
//!
//! ## Request handling flow
//!
//! 1. Accept a TCP connection
//! 2. Establish the endpoint ([`ServerEvent::Connection`] on success,
//!    [`ServerEvent::ClientError`] on failure)
//! 3. For each new stream, spawn a task that builds the pair and waits for
//!    the request head
//! 4. Once the request is ready, call the [`Handler`]
//!
//! Streams whose head is malformed are reset by the request itself and never
//! reach the handler. A failing connection only ends its own task.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_std::channel::{self, Receiver, Sender};
use async_std::net::{TcpListener, TcpStream, ToSocketAddrs};
use async_std::task;
use async_trait::async_trait;
use futures::future::{self, Either};
use futures::stream::FuturesUnordered;
use futures::{StreamExt, pin_mut};

use crate::http::incoming::IncomingMessage;
use crate::http::request::IncomingRequest;
use crate::http::response::{OutgoingResponse, ResponseOptions};
use crate::log::Logger;
use crate::transport::{Endpoint, IncomingStream, Transport};

/// Application entry point, called once per ready request.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, request: IncomingRequest, response: OutgoingResponse);
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(IncomingRequest, OutgoingResponse) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, request: IncomingRequest, response: OutgoingResponse) {
        (self)(request, response).await
    }
}

/// Lifecycle notifications, for embedders that want them.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Listening(SocketAddr),
    Connection(SocketAddr),
    ClientError { peer: SocketAddr, error: String },
    Close,
}

pub type EventHook = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

#[derive(Clone, Default)]
pub struct ServerOptions {
    pub response: ResponseOptions,
    pub log: Logger,
    pub on_event: Option<EventHook>,
}

struct Inner {
    handler: Arc<dyn Handler>,
    responses: Arc<ResponseOptions>,
    log: Logger,
    on_event: Option<EventHook>,
    shutdown: (Sender<()>, Receiver<()>),
}

#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

enum Accepted {
    Socket(io::Result<(TcpStream, SocketAddr)>),
    Closed,
}

impl Server {
    pub fn new(options: ServerOptions, handler: impl Handler) -> Self {
        Self {
            inner: Arc::new(Inner {
                handler: Arc::new(handler),
                responses: Arc::new(options.response),
                log: options.log.child("http"),
                on_event: options.on_event,
                shutdown: channel::bounded(1),
            }),
        }
    }

    /// Binds `addr` and serves connections through `transport` until
    /// [`close`](Self::close) is called.
    ///
    /// Connections already accepted keep running after close.
    pub async fn listen<T, A>(&self, transport: T, addr: A) -> io::Result<()>
    where
        T: Transport,
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        let transport = Arc::new(transport);

        self.inner.log.emit(|| tracing::info!(on = %local, "Listening"));
        self.inner.emit(&ServerEvent::Listening(local));

        loop {
            match self.next_socket(&listener).await {
                Accepted::Socket(Ok((socket, peer))) => {
                    let inner = self.inner.clone();
                    let transport = transport.clone();
                    task::spawn(async move { inner.start(transport, socket, peer).await });
                }
                Accepted::Socket(Err(err)) => {
                    self.inner.log.emit(|| tracing::warn!(error = %err, "Failed to accept"));
                }
                Accepted::Closed => break,
            }
        }

        self.inner.emit(&ServerEvent::Close);
        Ok(())
    }

    async fn next_socket(&self, listener: &TcpListener) -> Accepted {
        let accept = listener.accept();
        let closed = self.inner.shutdown.1.recv();
        pin_mut!(accept, closed);

        match future::select(accept, closed).await {
            Either::Left((socket, _)) => Accepted::Socket(socket),
            Either::Right(_) => Accepted::Closed,
        }
    }

    /// Stops accepting new connections.
    pub fn close(&self) {
        self.inner.log.emit(|| tracing::info!("Closing server"));
        let _ = self.inner.shutdown.0.try_send(());
    }

    /// Serves every stream of an already established endpoint and returns
    /// once the connection and all of its streams are done.
    pub async fn serve_endpoint<E: Endpoint>(&self, endpoint: E, peer: SocketAddr) {
        self.inner.clone().serve(endpoint, peer).await
    }
}

impl Inner {
    fn emit(&self, event: &ServerEvent) {
        if let Some(hook) = &self.on_event {
            hook(event);
        }
    }

    fn client_error(&self, peer: SocketAddr, error: String) {
        self.log.emit(|| tracing::warn!(client = %peer, error = %error, "Client error"));
        self.emit(&ServerEvent::ClientError { peer, error });
    }

    async fn start<T: Transport>(self: Arc<Self>, transport: Arc<T>, socket: TcpStream, peer: SocketAddr) {
        let endpoint = match transport.establish(socket, &self.log).await {
            Ok(endpoint) => endpoint,
            Err(err) => return self.client_error(peer, err.to_string()),
        };

        self.log.emit(|| tracing::info!(client = %peer, "New connection"));
        self.emit(&ServerEvent::Connection(peer));
        self.serve(endpoint, peer).await
    }

    /// Spawns one task per stream. Finished stream tasks are collected while
    /// the endpoint is polled, so a long-lived connection only holds the
    /// streams still in flight.
    async fn serve<E: Endpoint>(self: Arc<Self>, mut endpoint: E, peer: SocketAddr) {
        let mut streams: FuturesUnordered<task::JoinHandle<()>> = FuturesUnordered::new();
        let mut accepting = endpoint.next_stream();
        loop {
            let next = if streams.is_empty() {
                (&mut accepting).await
            } else {
                match future::select(&mut accepting, streams.next()).await {
                    Either::Left((next, _)) => next,
                    Either::Right(_) => continue,
                }
            };
            drop(accepting);

            match next {
                Some(Ok(incoming)) => {
                    let inner = self.clone();
                    streams.push(task::spawn(async move { inner.bind_stream(incoming).await }));
                }
                Some(Err(err)) => {
                    self.client_error(peer, err.to_string());
                    break;
                }
                None => break,
            }
            accepting = endpoint.next_stream();
        }

        while streams.next().await.is_some() {}
    }

    async fn bind_stream(self: Arc<Self>, incoming: IncomingStream) {
        let mut response = OutgoingResponse::new(incoming.stream.clone(), self.responses.clone(), &self.log);
        let message = IncomingMessage::new(incoming, &self.log);

        if let Some(request) = IncomingRequest::ready(message).await {
            response.bind_request(request.origin());
            self.handler.handle(request, response).await;
        }
    }
}
