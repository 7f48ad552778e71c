//! HTTP/2 request/response adapter.
//!
//! Streams produced by a [`transport::Endpoint`] are turned into
//! [`IncomingRequest`] / [`OutgoingResponse`] pairs and handed to a
//! [`Handler`]. The crate ships an `h2` backed transport, an in-memory one
//! for tests, and a small static site handler.

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod log;
pub mod net;
pub mod transport;

pub use error::Error;
pub use http::request::IncomingRequest;
pub use http::response::{OutgoingResponse, PushOptions, ResponseOptions};
pub use http::{BodySink, HttpMessage};
pub use net::server::{Handler, Server, ServerEvent, ServerOptions};

/// Shorthand for [`Server::new`].
pub fn create_server(options: ServerOptions, handler: impl Handler) -> Server {
    Server::new(options, handler)
}
