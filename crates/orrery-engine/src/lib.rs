//! Orrery Engine -- simulation driver for the Orrery entity runtime.
//!
//! This crate builds on [`orrery_ecs`] to provide the per-tick pipeline: the
//! network reconciliation queue releases due messages, queued events are
//! delivered, deferred deletions drain, and stale component rows are culled.
//! It also defines the narrow traits through which the runtime talks to its
//! external collaborators (transport, map service).
//!
//! # Quick Start
//!
//! ```
//! use orrery_engine::prelude::*;
//!
//! let world = World::new();
//! let mut sim: TickLoop<String> = TickLoop::new(world, ReconcileConfig::default());
//!
//! let session = SessionId::from_raw(1);
//! sim.connect_session(session);
//!
//! sim.advance_to(Tick(8));
//! sim.receive(Envelope {
//!     source_tick: Tick(10),
//!     sequence: 1,
//!     session,
//!     payload: "toggle_door".to_owned(),
//! });
//!
//! // Held until the clock reaches tick 10.
//! assert_eq!(sim.advance_to(Tick(9)).messages_released, 0);
//! assert_eq!(sim.advance_to(Tick(10)).messages_released, 1);
//! ```

#![deny(unsafe_code)]

pub mod reconcile;
pub mod router;
pub mod services;
pub mod tick;

/// Re-export the runtime core for convenience.
pub use orrery_ecs;

/// Install a `tracing` subscriber honoring `RUST_LOG`, for binaries and
/// integration tests. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::reconcile::{
        Envelope, MessageSender, ReconcileConfig, ReconcileQueue, SessionId,
    };
    pub use crate::router::{DispatchError, MessageHandler, MessageRouter};
    pub use crate::services::{MapService, Transport};
    pub use crate::tick::{TickLoop, TickReport};
    pub use orrery_ecs::prelude::*;
}
