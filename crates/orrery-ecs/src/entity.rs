//! Entity and network identifiers and their allocation.
//!
//! Local [`EntityId`]s are process-local and **never reused**: the allocator
//! hands out a strictly increasing counter, so a stale handle can never
//! silently alias a newer entity. [`NetworkId`]s are a separate, globally
//! stable id space used on the wire; they are mapped 1:1 to a local entity
//! while it exists and returned to a free pool on deletion.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::EcsError;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// An opaque, process-local entity identifier.
///
/// Ids are allocated monotonically and never recycled.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// NetworkId
// ---------------------------------------------------------------------------

/// A globally stable identifier used for wire messages.
///
/// Distinct from [`EntityId`]; bidirectionally mapped to a local entity while
/// it exists. Freed ids return to a FIFO pool and may be reused, but two live
/// entities never share a network id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetworkId(u64);

impl NetworkId {
    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetworkId({})", self.0)
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// IdAllocator
// ---------------------------------------------------------------------------

/// Issues local and network identifiers and maintains the 1:1 binding
/// between them.
///
/// Entity ids start at 1 and count upward forever. Network ids also count
/// upward but recycle through a FIFO free pool, which spreads reuse out over
/// time rather than hammering the most recently released id.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_entity: u64,
    next_network: u64,
    free_network: VecDeque<NetworkId>,
    entity_to_network: HashMap<EntityId, NetworkId>,
    network_to_entity: HashMap<NetworkId, EntityId>,
}

impl IdAllocator {
    /// Create a new, empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh, never-before-issued [`EntityId`].
    pub fn allocate_entity(&mut self) -> EntityId {
        self.next_entity += 1;
        EntityId(self.next_entity)
    }

    /// Allocate a [`NetworkId`], reusing the oldest freed id if one is
    /// available.
    pub fn allocate_network(&mut self) -> NetworkId {
        if let Some(id) = self.free_network.pop_front() {
            return id;
        }
        self.next_network += 1;
        NetworkId(self.next_network)
    }

    /// Bind an entity to a network id.
    ///
    /// Fails with [`EcsError::BindingConflict`] if the network id is already
    /// held by a different live entity. Rebinding an already-bound entity
    /// replaces its previous binding and frees the old network id.
    pub fn bind(&mut self, entity: EntityId, network: NetworkId) -> Result<(), EcsError> {
        if let Some(&holder) = self.network_to_entity.get(&network) {
            if holder != entity {
                return Err(EcsError::BindingConflict {
                    network,
                    entity: holder,
                });
            }
            return Ok(());
        }
        if let Some(previous) = self.entity_to_network.insert(entity, network) {
            self.network_to_entity.remove(&previous);
            self.free_network.push_back(previous);
        }
        self.network_to_entity.insert(network, entity);
        Ok(())
    }

    /// Resolve a network id to its live local entity.
    pub fn entity_of(&self, network: NetworkId) -> Result<EntityId, EcsError> {
        self.network_to_entity
            .get(&network)
            .copied()
            .ok_or_else(|| EcsError::unknown_network(network))
    }

    /// Resolve a live local entity to its network id.
    pub fn network_of(&self, entity: EntityId) -> Result<NetworkId, EcsError> {
        self.entity_to_network
            .get(&entity)
            .copied()
            .ok_or_else(|| EcsError::unknown_entity(entity))
    }

    /// Release an entity's binding, returning the freed [`NetworkId`] to the
    /// pool. Returns `None` if the entity had no binding.
    pub fn release(&mut self, entity: EntityId) -> Option<NetworkId> {
        let network = self.entity_to_network.remove(&entity)?;
        self.network_to_entity.remove(&network);
        self.free_network.push_back(network);
        Some(network)
    }

    /// Number of live entity-to-network bindings.
    pub fn live_bindings(&self) -> usize {
        self.entity_to_network.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
