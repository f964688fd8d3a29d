//! Component trait, lifecycle hooks, and type registration.
//!
//! Every component type used in the runtime must be registered in a
//! [`ComponentRegistry`]. Registration produces a dense [`ComponentTypeId`]
//! whose ordering doubles as the runtime's *safe order*: the world registers
//! [`Metadata`](crate::metadata::Metadata) (id 0) and
//! [`Transform`](crate::transform::Transform) (id 1) before anything else, and
//! enumeration in descending id order therefore yields dependents before the
//! two mandatory components. Initialization uses the reverse (ascending)
//! order, so dependencies come up before dependents.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// HookError
// ---------------------------------------------------------------------------

/// Failure reported by a component lifecycle hook.
///
/// Initialize/start failures abort entity creation; shutdown failures are
/// logged at the teardown site and never stop the remaining teardown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HookError {
    pub message: String,
}

impl HookError {
    /// Construct a hook error from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// A typed data record attached to exactly one entity.
///
/// Components participate in the entity lifecycle through three hooks, all of
/// which default to no-ops. Hooks run in a deterministic order derived from
/// [`ComponentTypeId`]: ascending for `on_initialize`/`on_start` (mandatory
/// components first), descending for `on_shutdown` (mandatory components
/// last).
pub trait Component: Any {
    /// Runs during `Initialize`, before the entity reaches `Initialized`.
    fn on_initialize(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs during `Start`, before the entity reaches `Started`.
    fn on_start(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs during teardown, immediately before the component is disposed.
    fn on_shutdown(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    /// Upcast for typed downcasting through [`Any`].
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed downcasting through [`Any`].
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Opaque, dense identifier for a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentTypeId(pub(crate) u32);

impl ComponentTypeId {
    /// The metadata component, always registered first by the world.
    pub const METADATA: ComponentTypeId = ComponentTypeId(0);
    /// The transform component, always registered second by the world.
    pub const TRANSFORM: ComponentTypeId = ComponentTypeId(1);
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Metadata about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Unique dense id assigned at registration time.
    pub id: ComponentTypeId,
    /// Human-readable name (supplied by the caller).
    pub name: String,
    /// Rust `TypeId` for runtime type checking.
    pub type_id: TypeId,
}

/// Registry mapping Rust types to [`ComponentTypeId`]s and their metadata.
///
/// A type can only be registered once; re-registering the same Rust type
/// returns the existing id.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentTypeId>,
    by_name: HashMap<String, ComponentTypeId>,
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type under the given `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered for a different Rust type.
    pub fn register<T: Component>(&mut self, name: &str) -> ComponentTypeId {
        let rust_type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&rust_type_id) {
            return existing;
        }
        if self.by_name.contains_key(name) {
            panic!("component name '{name}' is already registered for a different type");
        }

        let id = ComponentTypeId(self.infos.len() as u32);
        self.infos.push(ComponentInfo {
            id,
            name: name.to_owned(),
            type_id: rust_type_id,
        });
        self.by_type.insert(rust_type_id, id);
        self.by_name.insert(name.to_owned(), id);
        id
    }

    /// Look up a component type by its Rust `TypeId`.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Look up a component type by its registered string name.
    pub fn lookup_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.by_name.get(name).copied()
    }

    /// Get the [`ComponentInfo`] for a registered component type id.
    pub fn get_info(&self, id: ComponentTypeId) -> Option<&ComponentInfo> {
        self.infos.get(id.0 as usize)
    }

    /// The registered name for a type id, or `"<unregistered>"`.
    pub fn name_of(&self, id: ComponentTypeId) -> &str {
        self.get_info(id).map_or("<unregistered>", |i| &i.name)
    }

    /// Total number of registered component types.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether any component types have been registered.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Pos {
        #[allow(dead_code)]
        x: f32,
    }

    impl Component for Pos {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct Vel;

    impl Component for Vel {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Pos>("position");
        assert_eq!(reg.lookup::<Pos>(), Some(id));
        assert_eq!(reg.lookup_by_name("position"), Some(id));
    }

    #[test]
    fn same_type_same_id() {
        let mut reg = ComponentRegistry::new();
        let id1 = reg.register::<Pos>("position");
        let id2 = reg.register::<Pos>("position_again");
        assert_eq!(id1, id2);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn ids_are_dense_in_registration_order() {
        let mut reg = ComponentRegistry::new();
        let p = reg.register::<Pos>("position");
        let v = reg.register::<Vel>("velocity");
        assert!(p < v);
        assert_eq!(reg.name_of(p), "position");
        assert_eq!(reg.name_of(v), "velocity");
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_name_different_type_panics() {
        let mut reg = ComponentRegistry::new();
        reg.register::<Pos>("position");
        reg.register::<Vel>("position");
    }
}
