//! Fan-out dispatch for released network messages.
//!
//! A released envelope is observable two ways: by the unscoped subscriber
//! set ("from anyone") and by the subscriber set scoped to its originating
//! session ("from this specific session"). Both sets fire for every message,
//! unscoped first, each in subscription order. Subscriber failures are
//! isolated and logged, mirroring the event bus.

use std::collections::HashMap;
use std::fmt;

use tracing::error;

use crate::reconcile::{Envelope, SessionId};

// ---------------------------------------------------------------------------
// DispatchError
// ---------------------------------------------------------------------------

/// Failure reported by a message subscriber.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DispatchError {
    pub message: String,
}

impl DispatchError {
    /// Construct a dispatch error from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A message subscriber callback.
pub type MessageHandler<M> = Box<dyn FnMut(&Envelope<M>) -> Result<(), DispatchError>>;

struct NamedHandler<M> {
    label: String,
    handler: MessageHandler<M>,
}

// ---------------------------------------------------------------------------
// MessageRouter
// ---------------------------------------------------------------------------

/// Routes released envelopes to unscoped and session-scoped subscribers.
pub struct MessageRouter<M> {
    any: Vec<NamedHandler<M>>,
    by_session: HashMap<SessionId, Vec<NamedHandler<M>>>,
}

impl<M> fmt::Debug for MessageRouter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRouter")
            .field("any", &self.any.len())
            .field("sessions", &self.by_session.len())
            .finish()
    }
}

impl<M> MessageRouter<M> {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            any: Vec::new(),
            by_session: HashMap::new(),
        }
    }

    /// Subscribe to every released message regardless of session.
    pub fn on_any(&mut self, label: &str, handler: MessageHandler<M>) {
        self.any.push(NamedHandler {
            label: label.to_owned(),
            handler,
        });
    }

    /// Subscribe to messages from one specific session.
    pub fn on_session(&mut self, session: SessionId, label: &str, handler: MessageHandler<M>) {
        self.by_session
            .entry(session)
            .or_default()
            .push(NamedHandler {
                label: label.to_owned(),
                handler,
            });
    }

    /// Forget every subscriber scoped to `session`.
    pub fn drop_session(&mut self, session: SessionId) {
        self.by_session.remove(&session);
    }

    /// Dispatch to the unscoped set, then to the set scoped to the
    /// envelope's session. Returns the number of subscriber failures.
    pub fn dispatch(&mut self, envelope: &Envelope<M>) -> usize {
        let mut failures = Self::run(&mut self.any, envelope);
        if let Some(scoped) = self.by_session.get_mut(&envelope.session) {
            failures += Self::run(scoped, envelope);
        }
        failures
    }

    fn run(handlers: &mut [NamedHandler<M>], envelope: &Envelope<M>) -> usize {
        let mut failures = 0;
        for named in handlers.iter_mut() {
            if let Err(err) = (named.handler)(envelope) {
                failures += 1;
                error!(
                    subscriber = %named.label,
                    session = %envelope.session,
                    source_tick = %envelope.source_tick,
                    sequence = envelope.sequence,
                    error = %err,
                    "message subscriber failed"
                );
            }
        }
        failures
    }
}

impl<M> Default for MessageRouter<M> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
