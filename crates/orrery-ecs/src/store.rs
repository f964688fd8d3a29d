//! Per-component-type storage.
//!
//! The [`ComponentStore`] keeps one table per registered component type,
//! mapping entity id to the boxed component instance. Tables are `BTreeMap`s
//! keyed by [`EntityId`] so that every enumeration the store hands out is
//! deterministic without callers having to sort.
//!
//! *Safe order* is the deterministic component ordering used during teardown:
//! dependents are disposed before their dependencies, which concretely means
//! descending [`ComponentTypeId`] -- user components first, then transform,
//! then metadata last. Initialization uses the reverse order.

use std::collections::BTreeMap;

use crate::component::{Component, ComponentRegistry, ComponentTypeId};
use crate::entity::EntityId;
use crate::EcsError;

// ---------------------------------------------------------------------------
// ComponentStore
// ---------------------------------------------------------------------------

/// Owns every component instance in the runtime, one table per type.
#[derive(Default)]
pub struct ComponentStore {
    registry: ComponentRegistry,
    /// Indexed by `ComponentTypeId.0`; grown on registration.
    tables: Vec<BTreeMap<EntityId, Box<dyn Component>>>,
}

impl std::fmt::Debug for ComponentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentStore")
            .field("registered_types", &self.registry.len())
            .field(
                "component_count",
                &self.tables.iter().map(BTreeMap::len).sum::<usize>(),
            )
            .finish()
    }
}

impl ComponentStore {
    /// Create an empty store with no registered types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type, creating its table.
    pub fn register<T: Component>(&mut self, name: &str) -> ComponentTypeId {
        let id = self.registry.register::<T>(name);
        if id.0 as usize >= self.tables.len() {
            self.tables.resize_with(id.0 as usize + 1, BTreeMap::new);
        }
        id
    }

    /// Read-only access to the registry.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// The type id for a registered Rust component type.
    pub fn type_id_of<T: Component>(&self) -> Result<ComponentTypeId, EcsError> {
        self.registry
            .lookup::<T>()
            .ok_or_else(|| EcsError::UnregisteredComponent {
                name: std::any::type_name::<T>().to_owned(),
            })
    }

    // -- add / remove -------------------------------------------------------

    /// Attach a boxed component instance to an entity.
    ///
    /// Fails with [`EcsError::DuplicateComponent`] if the entity already has
    /// a component of this type.
    pub fn add_boxed(
        &mut self,
        entity: EntityId,
        type_id: ComponentTypeId,
        component: Box<dyn Component>,
    ) -> Result<(), EcsError> {
        let name = self.registry.name_of(type_id).to_owned();
        let table = self
            .tables
            .get_mut(type_id.0 as usize)
            .ok_or(EcsError::UnregisteredComponent { name: name.clone() })?;
        if table.contains_key(&entity) {
            return Err(EcsError::DuplicateComponent {
                entity,
                component: name,
            });
        }
        table.insert(entity, component);
        Ok(())
    }

    /// Attach a typed component instance to an entity.
    pub fn add<T: Component>(&mut self, entity: EntityId, component: T) -> Result<(), EcsError> {
        let type_id = self.type_id_of::<T>()?;
        self.add_boxed(entity, type_id, Box::new(component))
    }

    /// Detach and return a component, failing with [`EcsError::NotFound`]
    /// if the entity does not have one of this type.
    pub fn remove(
        &mut self,
        entity: EntityId,
        type_id: ComponentTypeId,
    ) -> Result<Box<dyn Component>, EcsError> {
        let name = self.registry.name_of(type_id).to_owned();
        self.tables
            .get_mut(type_id.0 as usize)
            .and_then(|table| table.remove(&entity))
            .ok_or(EcsError::NotFound {
                entity,
                component: name,
            })
    }

    // -- lookups ------------------------------------------------------------

    /// Whether the entity has a component of this type.
    pub fn has(&self, entity: EntityId, type_id: ComponentTypeId) -> bool {
        self.tables
            .get(type_id.0 as usize)
            .is_some_and(|table| table.contains_key(&entity))
    }

    /// Typed read-only lookup; never fails, returns absence as `None`.
    pub fn try_get<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let type_id = self.registry.lookup::<T>()?;
        self.tables
            .get(type_id.0 as usize)?
            .get(&entity)?
            .as_any()
            .downcast_ref::<T>()
    }

    /// Typed mutable lookup; never fails, returns absence as `None`.
    pub fn try_get_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let type_id = self.registry.lookup::<T>()?;
        self.tables
            .get_mut(type_id.0 as usize)?
            .get_mut(&entity)?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    /// Typed read-only lookup, failing with [`EcsError::NotFound`].
    pub fn get<T: Component>(&self, entity: EntityId) -> Result<&T, EcsError> {
        let type_id = self.type_id_of::<T>()?;
        let name = self.registry.name_of(type_id).to_owned();
        self.try_get::<T>(entity).ok_or(EcsError::NotFound {
            entity,
            component: name,
        })
    }

    /// Typed mutable lookup, failing with [`EcsError::NotFound`].
    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Result<&mut T, EcsError> {
        let type_id = self.type_id_of::<T>()?;
        let name = self.registry.name_of(type_id).to_owned();
        self.try_get_mut::<T>(entity).ok_or(EcsError::NotFound {
            entity,
            component: name,
        })
    }

    /// Mutable access to a boxed component by type id (hook invocation).
    pub fn get_boxed_mut(
        &mut self,
        entity: EntityId,
        type_id: ComponentTypeId,
    ) -> Option<&mut Box<dyn Component>> {
        self.tables.get_mut(type_id.0 as usize)?.get_mut(&entity)
    }

    // -- enumeration --------------------------------------------------------

    /// Enumerate an entity's components lazily in safe order (descending
    /// type id: dependents first, transform then metadata last).
    pub fn enumerate(
        &self,
        entity: EntityId,
    ) -> impl Iterator<Item = (ComponentTypeId, &dyn Component)> {
        (0..self.tables.len() as u32).rev().filter_map(move |raw| {
            let type_id = ComponentTypeId(raw);
            self.tables[raw as usize]
                .get(&entity)
                .map(|boxed| (type_id, boxed.as_ref()))
        })
    }

    /// The type ids present on an entity, in safe order. Used by teardown,
    /// which needs to mutate the store while walking.
    pub fn safe_order_ids(&self, entity: EntityId) -> Vec<ComponentTypeId> {
        self.enumerate(entity).map(|(id, _)| id).collect()
    }

    /// The type ids present on an entity, in initialization order
    /// (dependencies before dependents: metadata and transform first).
    pub fn init_order_ids(&self, entity: EntityId) -> Vec<ComponentTypeId> {
        let mut ids = self.safe_order_ids(entity);
        ids.reverse();
        ids
    }

    /// All entities currently holding a component of this type, in id order.
    /// This is the per-type index consulted by type-scoped subscriptions.
    pub fn entities_with(&self, type_id: ComponentTypeId) -> Vec<EntityId> {
        self.tables
            .get(type_id.0 as usize)
            .map(|table| table.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Every entity id that appears in at least one table, in id order.
    /// Teardown sweeps use this to find orphaned rows.
    pub fn all_entities(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .tables
            .iter()
            .flat_map(|table| table.keys().copied())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Remove every component row for an entity, returning how many were
    /// dropped. Bypasses shutdown hooks; only the orphan sweep uses this.
    pub fn purge(&mut self, entity: EntityId) -> usize {
        self.tables
            .iter_mut()
            .filter_map(|table| table.remove(&entity))
            .count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    use crate::metadata::Metadata;
    use crate::transform::Transform;
    use crate::Tick;

    struct Health(u32);

    impl Component for Health {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct Door;

    impl Component for Door {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn setup() -> (ComponentStore, EntityId) {
        let mut store = ComponentStore::new();
        store.register::<Metadata>("metadata");
        store.register::<Transform>("transform");
        store.register::<Health>("health");
        store.register::<Door>("door");
        let entity = EntityId::from_raw(1);
        store
            .add(entity, Metadata::new(None, Tick(0)))
            .unwrap();
        store.add(entity, Transform::root()).unwrap();
        (store, entity)
    }

    #[test]
    fn add_then_get() {
        let (mut store, e) = setup();
        store.add(e, Health(10)).unwrap();
        assert_eq!(store.get::<Health>(e).unwrap().0, 10);
        assert!(store.try_get::<Door>(e).is_none());
    }

    #[test]
    fn duplicate_add_fails() {
        let (mut store, e) = setup();
        store.add(e, Health(10)).unwrap();
        let err = store.add(e, Health(20)).unwrap_err();
        assert!(matches!(err, EcsError::DuplicateComponent { .. }));
    }

    #[test]
    fn remove_missing_fails() {
        let (mut store, e) = setup();
        let health = store.type_id_of::<Health>().unwrap();
        let err = store.remove(e, health).err().unwrap();
        assert!(matches!(err, EcsError::NotFound { .. }));
    }

    #[test]
    fn try_get_never_fails() {
        let (store, e) = setup();
        assert!(store.try_get::<Health>(e).is_none());
        assert!(store.try_get::<Metadata>(e).is_some());
    }

    #[test]
    fn enumerate_is_safe_order() {
        let (mut store, e) = setup();
        store.add(e, Health(1)).unwrap();
        store.add(e, Door).unwrap();

        let ids = store.safe_order_ids(e);
        // Dependents (door, health) first; transform and metadata last.
        assert_eq!(
            ids,
            vec![
                store.type_id_of::<Door>().unwrap(),
                store.type_id_of::<Health>().unwrap(),
                ComponentTypeId::TRANSFORM,
                ComponentTypeId::METADATA,
            ]
        );

        let init = store.init_order_ids(e);
        assert_eq!(init[0], ComponentTypeId::METADATA);
        assert_eq!(init[1], ComponentTypeId::TRANSFORM);
    }

    #[test]
    fn entities_with_is_sorted() {
        let mut store = ComponentStore::new();
        store.register::<Health>("health");
        let health = store.type_id_of::<Health>().unwrap();
        for raw in [5u64, 2, 9] {
            store.add(EntityId::from_raw(raw), Health(0)).unwrap();
        }
        let ids: Vec<u64> = store
            .entities_with(health)
            .into_iter()
            .map(EntityId::to_raw)
            .collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn purge_drops_all_rows() {
        let (mut store, e) = setup();
        store.add(e, Health(1)).unwrap();
        assert_eq!(store.purge(e), 3);
        assert!(store.enumerate(e).next().is_none());
    }
}
