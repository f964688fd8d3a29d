//! Contracts for the external collaborators the runtime consumes.
//!
//! The transport stack, the map service, and the prototype loader (defined
//! in `orrery-ecs`) are all external to this core; the engine talks to them
//! through these narrow traits and nothing else.

use crate::reconcile::SessionId;

/// Outbound side of the transport stack, plus per-channel connectivity.
///
/// The inbound side hands envelopes to the reconciliation queue through a
/// [`MessageSender`](crate::reconcile::MessageSender) instead; this trait
/// only covers what the simulation itself needs to originate.
pub trait Transport<M> {
    /// Broadcast a system message to every connected session.
    fn send_to_all(&mut self, payload: &M);

    /// Send a system message to one session.
    fn send_to_one(&mut self, session: SessionId, payload: &M);

    /// Whether the session's channel is currently connected.
    fn is_connected(&self, session: SessionId) -> bool;
}

/// Answers whether a map has finished its own initialization, which decides
/// whether a freshly started entity also runs map-init.
pub trait MapService {
    /// Whether the given map is initialized.
    fn is_map_initialized(&self, map: &str) -> bool;
}
