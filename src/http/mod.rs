use std::fmt;

use bytes::Bytes;

use crate::Error;
use crate::http::headers::HeaderSet;

pub mod headers;
pub mod incoming;
pub mod outgoing;
pub mod request;
pub mod response;
pub mod status;
pub mod validator;

/// Protocol versions a message may report.
/// Messages produced by the adapter are always [`HttpVersion::V2_0`].
#[allow(dead_code)]
#[derive(PartialEq, PartialOrd, Debug, Clone, Copy)]
pub enum HttpVersion {
    V1_0,
    V1_1,
    V2_0,
}

impl HttpVersion {
    pub fn major(&self) -> u8 {
        match self {
            HttpVersion::V1_0 | HttpVersion::V1_1 => 1,
            HttpVersion::V2_0 => 2,
        }
    }

    pub fn minor(&self) -> u8 {
        match self {
            HttpVersion::V1_1 => 1,
            HttpVersion::V1_0 | HttpVersion::V2_0 => 0,
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Unknown,
}

pub fn http_method_from_str(method: &str) -> HttpMethod {
    match method {
        "GET" => HttpMethod::Get,
        "HEAD" => HttpMethod::Head,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "DELETE" => HttpMethod::Delete,
        "TRACE" => HttpMethod::Trace,
        "OPTIONS" => HttpMethod::Options,
        "CONNECT" => HttpMethod::Connect,
        _ => HttpMethod::Unknown,
    }
}

/// Header-set capability shared by requests and responses.
pub trait HttpMessage {
    fn headers(&self) -> &HeaderSet;

    /// Looks a field up by name, ignoring case.
    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(&name.to_ascii_lowercase())
    }
}

/// Body-writing capability of outgoing messages.
pub trait BodySink {
    fn write(&mut self, chunk: Bytes) -> Result<(), Error>;

    /// Completes the message; trailers, if any, go out before the end of
    /// the stream.
    fn end(&mut self) -> Result<(), Error>;
}
