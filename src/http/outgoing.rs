//! Outbound side of a stream.
//!
//! An [`OutgoingMessage`] may exist before its transport stream does (a push
//! response waiting for its promise, for instance). Until a stream is
//! attached every frame is kept in a pending queue; [`OutgoingMessage::attach`]
//! drains that queue exactly once, in call order. The queue has a deadline:
//! past it, queuing fails and a late stream is reset instead of served.
//!
//! A frame the transport refuses cancels the message: the stream is reset
//! and every later write, end or attach fails.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::Error;
use crate::http::headers::{HeaderSet, is_deprecated, is_pseudo};
use crate::http::{BodySink, HttpMessage};
use crate::log::Logger;
use crate::transport::{ResetReason, TransportStream};

#[derive(Debug)]
enum PendingOp {
    Headers(HeaderSet),
    Data(Bytes),
    Finish(Option<HeaderSet>),
}

#[derive(Debug)]
struct PendingQueue {
    ops: VecDeque<PendingOp>,
    since: Option<Instant>,
    timeout: Duration,
}

impl PendingQueue {
    fn new(timeout: Duration) -> Self {
        Self {
            ops: VecDeque::new(),
            since: None,
            timeout,
        }
    }

    fn push(&mut self, op: PendingOp) -> Result<(), Error> {
        let now = Instant::now();
        if self.is_overdue(now) {
            return Err(Error::AttachTimeout(self.timeout));
        }
        self.since.get_or_insert(now);
        self.ops.push_back(op);
        Ok(())
    }

    fn is_overdue(&self, now: Instant) -> bool {
        self.since
            .is_some_and(|since| now.saturating_duration_since(since) > self.timeout)
    }

    fn clear(&mut self) {
        self.ops.clear();
        self.since = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Finished,
    Cancelled,
}

pub struct OutgoingMessage {
    stream: Option<Arc<dyn TransportStream>>,
    headers: HeaderSet,
    headers_sent: bool,
    trailers: Option<HeaderSet>,
    pending: PendingQueue,
    state: State,
    log: Logger,
}

impl OutgoingMessage {
    pub fn new(
        stream: Option<Arc<dyn TransportStream>>,
        attach_timeout: Duration,
        log: &Logger,
    ) -> Self {
        Self {
            stream,
            headers: HeaderSet::new(),
            headers_sent: false,
            trailers: None,
            pending: PendingQueue::new(attach_timeout),
            state: State::Open,
            log: log.child("http"),
        }
    }

    pub fn stream(&self) -> Option<&Arc<dyn TransportStream>> {
        self.stream.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// Number of frames waiting for a stream.
    pub fn pending_len(&self) -> usize {
        self.pending.ops.len()
    }

    /// Whether queued frames have waited longer than the attach timeout.
    pub fn is_overdue(&self, now: Instant) -> bool {
        self.pending.is_overdue(now)
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> Result<(), Error> {
        let name = self.check_header(name)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Checks that `name` may be set and returns it lower-cased.
    pub fn check_header(&self, name: &str) -> Result<String, Error> {
        if self.headers_sent {
            return Err(Error::HeadersSent("set"));
        }
        let name = name.to_ascii_lowercase();
        if is_pseudo(&name) {
            return Err(Error::PseudoHeader(name));
        }
        if is_deprecated(&name) {
            return Err(Error::DeprecatedHeader(name));
        }
        Ok(name)
    }

    pub fn remove_header(&mut self, name: &str) -> Result<(), Error> {
        if self.headers_sent {
            return Err(Error::HeadersSent("remove"));
        }
        self.headers.remove(&name.to_ascii_lowercase());
        Ok(())
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase())
    }

    /// Trailers sent when the message is finished.
    pub fn add_trailers(&mut self, trailers: HeaderSet) {
        self.trailers = Some(trailers);
    }

    /// Sends the message head. Once called, the header set is frozen.
    pub(crate) fn send_headers(&mut self, frame: HeaderSet) -> Result<(), Error> {
        self.ensure_open()?;
        self.headers_sent = true;
        self.dispatch(PendingOp::Headers(frame))
    }

    /// Attaches the transport stream and replays every queued frame.
    pub fn attach(&mut self, stream: Arc<dyn TransportStream>) -> Result<(), Error> {
        if self.stream.is_some() {
            return Err(Error::AlreadyAttached);
        }
        if self.state == State::Cancelled {
            stream.reset(ResetReason::Cancel);
            return Err(Error::Cancelled);
        }
        if self.pending.is_overdue(Instant::now()) {
            self.log.emit(|| {
                tracing::warn!(stream = stream.id(), "Stream attached after deadline, cancelling")
            });
            self.pending.clear();
            self.state = State::Cancelled;
            stream.reset(ResetReason::Cancel);
            return Err(Error::AttachTimeout(self.pending.timeout));
        }

        let ops = std::mem::take(&mut self.pending.ops);
        self.pending.since = None;
        self.stream = Some(stream.clone());
        for op in ops {
            if let Err(err) = Self::perform(stream.as_ref(), op) {
                self.fail(&err);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Drops queued frames and aborts the stream, if any.
    pub fn cancel(&mut self) {
        if self.state == State::Finished {
            return;
        }
        self.pending.clear();
        self.state = State::Cancelled;
        if let Some(stream) = &self.stream {
            stream.reset(ResetReason::Cancel);
        }
    }

    fn ensure_open(&self) -> Result<(), Error> {
        match self.state {
            State::Open => Ok(()),
            State::Finished => Err(Error::Finished),
            State::Cancelled => Err(Error::Cancelled),
        }
    }

    fn dispatch(&mut self, op: PendingOp) -> Result<(), Error> {
        let Some(stream) = self.stream.clone() else {
            return self.pending.push(op);
        };
        match Self::perform(stream.as_ref(), op) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn fail(&mut self, err: &Error) {
        self.log.emit(|| tracing::error!(error = %err, "Transport refused frame, cancelling"));
        self.pending.clear();
        self.state = State::Cancelled;
        if let Some(stream) = &self.stream {
            stream.reset(ResetReason::InternalError);
        }
    }

    fn perform(stream: &dyn TransportStream, op: PendingOp) -> Result<(), Error> {
        match op {
            PendingOp::Headers(frame) => stream.send_headers(&frame)?,
            PendingOp::Data(chunk) => stream.send_data(chunk)?,
            PendingOp::Finish(trailers) => {
                if let Some(trailers) = trailers {
                    stream.send_headers(&trailers)?;
                }
                stream.end()?;
            }
        }
        Ok(())
    }
}

impl HttpMessage for OutgoingMessage {
    fn headers(&self) -> &HeaderSet {
        &self.headers
    }
}

impl BodySink for OutgoingMessage {
    fn write(&mut self, chunk: Bytes) -> Result<(), Error> {
        self.ensure_open()?;
        self.dispatch(PendingOp::Data(chunk))
    }

    fn end(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        let trailers = self.trailers.take();
        self.dispatch(PendingOp::Finish(trailers))?;
        self.state = State::Finished;
        Ok(())
    }
}
