//! Orrery ECS -- entity/component runtime for a networked, tick-based simulation.
//!
//! This crate owns entity identity, component storage, lifecycle transitions,
//! hierarchical parent/child teardown, and the event bus that makes all of it
//! observable. Entities move through a fixed sequence of lifecycle stages
//! exactly once, every entity carries a [`Metadata`](metadata::Metadata) and a
//! [`Transform`](transform::Transform) component for its whole lifetime, and
//! deletion of a hierarchy tears down every descendant without leaving a
//! dangling reference behind.
//!
//! The runtime is single-threaded cooperative: exactly one thread mutates the
//! world per tick, so there is no internal locking. The simulation driver (the
//! `orrery-engine` crate) mirrors the external tick clock into the world and
//! drains the deferred queues once per tick.
//!
//! # Quick Start
//!
//! ```
//! use orrery_ecs::prelude::*;
//!
//! let mut world = World::new();
//! let entity = world.allocate(None).unwrap();
//! assert!(world.entity_exists(entity));
//!
//! world.initialize(entity).unwrap();
//! world.start(entity).unwrap();
//!
//! world.queue_delete(entity);
//! world.drain_deferred_deletions();
//! assert!(!world.entity_exists(entity));
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod entity;
pub mod event;
pub mod metadata;
pub mod store;
pub mod transform;
pub mod world;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, NetworkId};
use crate::metadata::LifecycleStage;

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

/// A discrete simulation time unit.
///
/// The tick clock itself is external to this crate and monotonically
/// increasing; the world only mirrors the current value (see
/// [`World::advance_clock`](world::World::advance_clock)). Ticks gate message
/// reconciliation and dirty tracking.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Tick(pub u64);

impl Tick {
    /// The tick immediately after this one.
    #[inline]
    pub fn next(self) -> Tick {
        Tick(self.0 + 1)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// FaultPolicy
// ---------------------------------------------------------------------------

/// How the runtime reacts to tolerable programmer errors, such as deleting an
/// entity that is already being torn down.
///
/// The policy is consulted through a single helper on the world rather than
/// being re-decided at each call site. Event-bus subscriber failures are
/// always tolerated regardless of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Log the fault and continue.
    #[default]
    Tolerant,
    /// Surface the fault as an error to the caller.
    Strict,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by runtime operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EcsError {
    /// A lookup referenced an entity or network id with no live binding.
    #[error("unknown id {id}")]
    UnknownId {
        id: String,
    },

    /// The entity already has a component of this type.
    #[error("entity {entity} already has a '{component}' component")]
    DuplicateComponent {
        entity: EntityId,
        component: String,
    },

    /// The entity has no component of this type.
    #[error("entity {entity} has no '{component}' component")]
    NotFound {
        entity: EntityId,
        component: String,
    },

    /// A lifecycle operation was called on an entity outside the expected
    /// prior stage.
    #[error("cannot {operation} entity {entity} in stage {stage:?}")]
    InvalidLifecycleTransition {
        entity: EntityId,
        stage: LifecycleStage,
        operation: &'static str,
    },

    /// Loading or initializing a freshly allocated entity failed. The
    /// half-built entity has already been rolled back via deletion.
    #[error("failed to create entity {entity}: {reason}")]
    EntityCreationFailure {
        entity: EntityId,
        reason: String,
    },

    /// The hierarchy or store was found in an inconsistent state. These are
    /// logged and self-healed where possible; the error class exists so
    /// callers can still observe the repair.
    #[error("structural inconsistency: {detail}")]
    StructuralInconsistency {
        detail: String,
    },

    /// A network id was bound while another live entity still holds it.
    #[error("network id {network} is already bound to entity {entity}")]
    BindingConflict {
        network: NetworkId,
        entity: EntityId,
    },

    /// A component type was referenced that has not been registered.
    #[error("component type '{name}' is not registered")]
    UnregisteredComponent {
        name: String,
    },

    /// Subscriber before/after constraints form a cycle for this event kind.
    #[error("subscriber ordering cycle for event kind '{kind}'")]
    OrderingCycle {
        kind: &'static str,
    },
}

impl EcsError {
    /// Lookup miss for a local entity id.
    pub(crate) fn unknown_entity(entity: EntityId) -> Self {
        EcsError::UnknownId {
            id: entity.to_string(),
        }
    }

    /// Lookup miss for a network id.
    pub(crate) fn unknown_network(network: NetworkId) -> Self {
        EcsError::UnknownId {
            id: network.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{Component, ComponentTypeId, HookError};
    pub use crate::entity::{EntityId, IdAllocator, NetworkId};
    pub use crate::event::{Event, EventBus, EventKind, Handler};
    pub use crate::metadata::{LifecycleStage, Metadata};
    pub use crate::store::ComponentStore;
    pub use crate::transform::Transform;
    pub use crate::world::{ComponentLoader, LoadError, World, WorldConfig};
    pub use crate::{EcsError, FaultPolicy, Tick};
}
