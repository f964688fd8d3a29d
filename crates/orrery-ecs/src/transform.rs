//! The mandatory per-entity transform component.
//!
//! Parent/child links are stored as plain entity ids into the component
//! store, never as owning references, so a hierarchy can never form a
//! reference cycle at the type level. The forest invariant (a child's parent
//! pointer and the parent's child set stay mutually consistent, no cycles) is
//! enforced by the world's attach/detach operations at mutation time.

use std::any::Any;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::entity::EntityId;

/// Hierarchy and placement record, present on every live entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transform {
    /// Parent entity, or `None` for a root.
    pub parent: Option<EntityId>,
    /// Children in attach order. Teardown recursion walks this in order,
    /// which keeps deletion of a hierarchy deterministic.
    pub children: Vec<EntityId>,
    /// Anchored entities are fixed in place; gameplay meaning only.
    pub anchored: bool,
    /// Position relative to the parent (or the world origin for roots).
    pub local_position: Vec2,
}

impl Transform {
    /// A root transform at the origin.
    pub fn root() -> Self {
        Self::default()
    }

    /// Whether this entity has no parent.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

impl Component for Transform {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
