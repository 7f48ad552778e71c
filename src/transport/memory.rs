//! A transport that keeps frames in memory.
//!
//! Outbound calls are recorded as [`Frame`]s on the [`MemoryStream`];
//! inbound activity is whatever the caller pushes into the event channel.
//! Used by the tests and handy for exercising handlers without sockets.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc;

use crate::http::headers::HeaderSet;
use crate::transport::{
    Endpoint, IncomingStream, ResetReason, StreamEvent, TransportError, TransportStream,
};

/// One outbound call observed on a [`MemoryStream`].
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Headers(HeaderSet),
    Data(Bytes),
    End,
    Reset(ResetReason),
    Promise(HeaderSet),
}

#[derive(Default)]
struct State {
    frames: Vec<Frame>,
    promised: Vec<Arc<MemoryStream>>,
    closed: bool,
}

pub struct MemoryStream {
    id: u32,
    push_enabled: bool,
    next_promised: AtomicU32,
    state: Mutex<State>,
}

impl MemoryStream {
    pub fn new(id: u32) -> Arc<Self> {
        Arc::new(Self::build(id, true))
    }

    /// A stream whose peer refuses push promises.
    pub fn without_push(id: u32) -> Arc<Self> {
        Arc::new(Self::build(id, false))
    }

    fn build(id: u32, push_enabled: bool) -> Self {
        Self {
            id,
            push_enabled,
            next_promised: AtomicU32::new(2),
            state: Mutex::new(State::default()),
        }
    }

    /// Builds the inbound side of `stream` with room for `capacity` queued
    /// events, returning the sender used to feed it.
    pub fn open(
        stream: &Arc<MemoryStream>,
        capacity: usize,
    ) -> (IncomingStream, mpsc::Sender<StreamEvent>) {
        let (sender, events) = mpsc::channel(capacity);
        let incoming = IncomingStream {
            stream: stream.clone(),
            events,
        };
        (incoming, sender)
    }

    /// A stream whose inbound side delivers `events` and then closes.
    pub fn scripted(id: u32, events: Vec<StreamEvent>) -> (Arc<MemoryStream>, IncomingStream) {
        let stream = MemoryStream::new(id);
        let (incoming, mut sender) = MemoryStream::open(&stream, events.len());
        for event in events {
            // capacity was sized for the whole script
            let _ = sender.try_send(event);
        }
        (stream, incoming)
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.lock().frames.clone()
    }

    pub fn header_frames(&self) -> Vec<HeaderSet> {
        self.lock()
            .frames
            .iter()
            .filter_map(|frame| match frame {
                Frame::Headers(headers) => Some(headers.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn promised(&self) -> Vec<Arc<MemoryStream>> {
        self.lock().promised.clone()
    }

    pub fn reset_reason(&self) -> Option<ResetReason> {
        self.lock().frames.iter().find_map(|frame| match frame {
            Frame::Reset(reason) => Some(*reason),
            _ => None,
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, frame: Frame) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.closed {
            return Err(TransportError::StreamClosed(self.id));
        }
        state.frames.push(frame);
        Ok(())
    }
}

impl TransportStream for MemoryStream {
    fn id(&self) -> u32 {
        self.id
    }

    fn send_headers(&self, headers: &HeaderSet) -> Result<(), TransportError> {
        self.record(Frame::Headers(headers.clone()))
    }

    fn send_data(&self, data: Bytes) -> Result<(), TransportError> {
        self.record(Frame::Data(data))
    }

    fn end(&self) -> Result<(), TransportError> {
        self.record(Frame::End)?;
        self.lock().closed = true;
        Ok(())
    }

    fn promise(
        &self,
        pseudo_headers: &HeaderSet,
    ) -> Result<Arc<dyn TransportStream>, TransportError> {
        if !self.push_enabled {
            return Err(TransportError::PushDisabled);
        }
        self.record(Frame::Promise(pseudo_headers.clone()))?;

        let id = self.next_promised.fetch_add(2, Ordering::Relaxed);
        // promised streams cannot promise again
        let pushed = Arc::new(MemoryStream::build(id, false));
        self.lock().promised.push(pushed.clone());
        Ok(pushed)
    }

    fn reset(&self, reason: ResetReason) {
        let mut state = self.lock();
        if !state.closed {
            state.frames.push(Frame::Reset(reason));
            state.closed = true;
        }
    }
}

type Accepted = Result<IncomingStream, TransportError>;

/// An endpoint that hands out a scripted list of streams (and errors), then
/// either reports the connection as closed or, when [`live`](Self::live),
/// keeps yielding whatever is fed to it until the feeder is dropped.
pub struct MemoryEndpoint {
    queued: VecDeque<Accepted>,
    live: Option<mpsc::UnboundedReceiver<Accepted>>,
}

impl MemoryEndpoint {
    pub fn new(streams: impl IntoIterator<Item = IncomingStream>) -> Self {
        Self {
            queued: streams.into_iter().map(Ok).collect(),
            live: None,
        }
    }

    /// An endpoint fed at runtime; the connection closes when the returned
    /// sender is dropped.
    pub fn live() -> (Self, mpsc::UnboundedSender<Accepted>) {
        let (sender, receiver) = mpsc::unbounded();
        let endpoint = Self {
            queued: VecDeque::new(),
            live: Some(receiver),
        };
        (endpoint, sender)
    }

    /// Fails the connection with `error` once the queued streams are out.
    pub fn then_fail(mut self, error: TransportError) -> Self {
        self.queued.push_back(Err(error));
        self
    }
}

#[async_trait]
impl Endpoint for MemoryEndpoint {
    async fn next_stream(&mut self) -> Option<Accepted> {
        if let Some(next) = self.queued.pop_front() {
            return Some(next);
        }
        match &mut self.live {
            Some(receiver) => receiver.next().await,
            None => None,
        }
    }
}
