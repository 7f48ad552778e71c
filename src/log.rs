//! Logging capability handed to every component at construction.
//!
//! A [`Logger`] either carries a `tracing` span or nothing at all. The empty
//! logger is the default: its events are never built, so a library user who
//! does not ask for diagnostics pays nothing for them. Events go through
//! [`Logger::emit`], which enters the span before running the closure:
//!
//! ```
//! use h2serve::log::Logger;
//!
//! let log = Logger::new("http");
//! log.emit(|| tracing::info!(path = "/", "Incoming request"));
//! ```

use tracing::Span;

#[derive(Debug, Clone, Default)]
pub struct Logger {
    span: Option<Span>,
}

impl Logger {
    /// A logger that discards everything.
    pub fn null() -> Self {
        Self { span: None }
    }

    pub fn new(component: &'static str) -> Self {
        Self {
            span: Some(tracing::info_span!("h2serve", component)),
        }
    }

    /// A logger nested under this one. Children of the null logger are null.
    pub fn child(&self, component: &'static str) -> Self {
        match &self.span {
            Some(parent) => Self {
                span: Some(tracing::info_span!(parent: parent, "component", name = component)),
            },
            None => Self::null(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.span.is_some()
    }

    pub fn emit<F: FnOnce()>(&self, event: F) {
        if let Some(span) = &self.span {
            span.in_scope(event);
        }
    }
}
