//! Network reconciliation queue.
//!
//! Inbound entity-mutation messages declare the tick they were produced at.
//! A message "from the future" relative to the local clock is buffered and
//! released only once the clock catches up; a message at or behind the local
//! clock dispatches immediately. Releases happen in strict (source tick,
//! sequence) order, with arrival order as the final tie break so two sessions
//! that picked the same (tick, sequence) pair still drain deterministically.
//!
//! The queue is the runtime's only cross-thread boundary: transports deliver
//! envelopes through a cloneable [`MessageSender`] backed by an `mpsc`
//! channel, and the simulation thread drains that channel during
//! [`pump`](ReconcileQueue::pump). Dequeue and dispatch never happen off the
//! simulation thread.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::sync::mpsc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use orrery_ecs::Tick;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Identifies one connected peer session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    /// Construct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// An inbound message with the ordering fields needed for reconciliation.
///
/// Owned by the reconciliation queue until released, then handed to the
/// dispatch layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<M> {
    /// The tick the sender produced this message at.
    pub source_tick: Tick,
    /// Per-session monotonic sequence number.
    pub sequence: u64,
    /// The originating session.
    pub session: SessionId,
    /// Opaque message payload.
    pub payload: M,
}

/// A buffered envelope plus its arrival index. Ordering compares only the
/// reconciliation keys, so the payload type needs no `Ord`.
struct Buffered<M> {
    arrival: u64,
    envelope: Envelope<M>,
}

impl<M> Buffered<M> {
    fn key(&self) -> (Tick, u64, u64) {
        (self.envelope.source_tick, self.envelope.sequence, self.arrival)
    }
}

impl<M> PartialEq for Buffered<M> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<M> Eq for Buffered<M> {}

impl<M> PartialOrd for Buffered<M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<M> Ord for Buffered<M> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

// ---------------------------------------------------------------------------
// MessageSender
// ---------------------------------------------------------------------------

/// Thread-safe handle a transport uses to hand envelopes to the simulation
/// thread. Cloneable; sends never block.
pub struct MessageSender<M> {
    tx: mpsc::Sender<Envelope<M>>,
}

impl<M> Clone for MessageSender<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<M> fmt::Debug for MessageSender<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageSender").finish_non_exhaustive()
    }
}

impl<M> MessageSender<M> {
    /// Enqueue an envelope for the next [`pump`](ReconcileQueue::pump).
    /// Returns `false` if the queue has been dropped.
    pub fn send(&self, envelope: Envelope<M>) -> bool {
        self.tx.send(envelope).is_ok()
    }
}

// ---------------------------------------------------------------------------
// ReconcileQueue
// ---------------------------------------------------------------------------

/// Configuration for the reconciliation queue.
#[derive(Debug, Clone, Default)]
pub struct ReconcileConfig {
    /// Log messages whose source tick is strictly behind the local clock at
    /// dispatch time.
    pub log_late: bool,
}

/// Tick-ordered buffer of inbound messages plus per-session watermarks.
pub struct ReconcileQueue<M> {
    inbox_tx: mpsc::Sender<Envelope<M>>,
    inbox_rx: mpsc::Receiver<Envelope<M>>,
    heap: BinaryHeap<std::cmp::Reverse<Buffered<M>>>,
    arrivals: u64,
    /// Highest processed sequence per connected session. Absence means the
    /// session is not connected.
    watermarks: HashMap<SessionId, u64>,
    config: ReconcileConfig,
}

impl<M> fmt::Debug for ReconcileQueue<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconcileQueue")
            .field("buffered", &self.heap.len())
            .field("sessions", &self.watermarks.len())
            .finish()
    }
}

impl<M> ReconcileQueue<M> {
    /// Create an empty queue.
    pub fn new(config: ReconcileConfig) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel();
        Self {
            inbox_tx,
            inbox_rx,
            heap: BinaryHeap::new(),
            arrivals: 0,
            watermarks: HashMap::new(),
            config,
        }
    }

    /// A thread-safe sender for transports delivering off the simulation
    /// thread.
    pub fn sender(&self) -> MessageSender<M> {
        MessageSender {
            tx: self.inbox_tx.clone(),
        }
    }

    // -- session lifecycle --------------------------------------------------

    /// Register a session, seeding its watermark to 0. Reconnecting an
    /// already-connected session keeps the existing watermark.
    pub fn connect(&mut self, session: SessionId) {
        self.watermarks.entry(session).or_insert(0);
    }

    /// Remove a session. Its watermark is forgotten and any message still
    /// buffered (or arriving later) for it is dropped silently.
    pub fn disconnect(&mut self, session: SessionId) {
        self.watermarks.remove(&session);
    }

    /// Whether the session's channel is currently connected.
    pub fn is_connected(&self, session: SessionId) -> bool {
        self.watermarks.contains_key(&session)
    }

    /// The session's highest processed sequence, or `None` if disconnected.
    pub fn watermark(&self, session: SessionId) -> Option<u64> {
        self.watermarks.get(&session).copied()
    }

    /// Number of buffered future messages.
    pub fn buffered_len(&self) -> usize {
        self.heap.len()
    }

    // -- receipt ------------------------------------------------------------

    /// Receive an envelope on the simulation thread.
    ///
    /// Messages for disconnected sessions are dropped silently. A message at
    /// or behind `now` is returned for immediate dispatch (optionally logged
    /// as late when strictly behind); a message ahead of `now` is buffered
    /// until the clock catches up.
    pub fn submit(&mut self, envelope: Envelope<M>, now: Tick) -> Option<Envelope<M>> {
        if !self.is_connected(envelope.session) {
            debug!(session = %envelope.session, "dropping message for disconnected session");
            return None;
        }
        if envelope.source_tick <= now {
            if self.config.log_late && envelope.source_tick < now {
                debug!(
                    session = %envelope.session,
                    source = %envelope.source_tick,
                    now = %now,
                    "dispatching late message"
                );
            }
            self.note_processed(envelope.session, envelope.sequence);
            return Some(envelope);
        }
        self.push_buffered(envelope);
        None
    }

    /// Drain the transport inbox and release everything due at `now`, in
    /// strict (source tick, sequence) order.
    pub fn pump(&mut self, now: Tick) -> Vec<Envelope<M>> {
        while let Ok(envelope) = self.inbox_rx.try_recv() {
            if !self.is_connected(envelope.session) {
                debug!(session = %envelope.session, "dropping message for disconnected session");
                continue;
            }
            self.push_buffered(envelope);
        }
        self.release_due(now)
    }

    /// Release every buffered message whose source tick is at or behind
    /// `now`, in order. Messages whose session disconnected while they were
    /// buffered are dropped.
    pub fn release_due(&mut self, now: Tick) -> Vec<Envelope<M>> {
        let mut released = Vec::new();
        while let Some(std::cmp::Reverse(top)) = self.heap.peek() {
            if top.envelope.source_tick > now {
                break;
            }
            let std::cmp::Reverse(buffered) = self.heap.pop().expect("peeked entry exists");
            let envelope = buffered.envelope;
            if !self.is_connected(envelope.session) {
                debug!(session = %envelope.session, "dropping buffered message for disconnected session");
                continue;
            }
            if self.config.log_late && envelope.source_tick < now {
                debug!(
                    session = %envelope.session,
                    source = %envelope.source_tick,
                    now = %now,
                    "dispatching late message"
                );
            }
            self.note_processed(envelope.session, envelope.sequence);
            released.push(envelope);
        }
        released
    }

    fn push_buffered(&mut self, envelope: Envelope<M>) {
        self.arrivals += 1;
        self.heap.push(std::cmp::Reverse(Buffered {
            arrival: self.arrivals,
            envelope,
        }));
    }

    /// Advance the session watermark monotonically. A message with a
    /// sequence at or below the stored value is still dispatched, but never
    /// moves the watermark back.
    fn note_processed(&mut self, session: SessionId, sequence: u64) {
        if let Some(watermark) = self.watermarks.get_mut(&session) {
            *watermark = (*watermark).max(sequence);
        }
    }
}

impl<M> Default for ReconcileQueue<M> {
    fn default() -> Self {
        Self::new(ReconcileConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
