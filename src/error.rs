use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;

/// Errors returned to application code by requests and responses.
///
/// `HeadersSent` and `DeprecatedHeader` are usage errors: they point at a
/// bug in the calling code and must not be retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error("can't {0} headers after they are sent")]
    HeadersSent(&'static str),

    #[error("cannot set deprecated header: {0}")]
    DeprecatedHeader(String),

    #[error("cannot set pseudo-header: {0}")]
    PseudoHeader(String),

    #[error("no stream attached within {0:?}")]
    AttachTimeout(Duration),

    #[error("response was cancelled")]
    Cancelled,

    #[error("response is already finished")]
    Finished,

    #[error("a stream is already attached to this response")]
    AlreadyAttached,

    #[error("response has no stream attached")]
    NotAttached,

    #[error("push promise needs a value for {0}")]
    MissingPushField(&'static str),

    #[error("invalid push target {0:?}")]
    InvalidPushTarget(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
