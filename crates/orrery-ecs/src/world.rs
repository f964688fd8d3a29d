//! The [`World`] is the top-level runtime container. It owns the identifier
//! allocator, the component store, the event bus, and the deferred deletion
//! queue, and it is the only legal way to move entities through their
//! lifecycle.
//!
//! # Lifecycle
//!
//! `Allocated -> Initializing -> Initialized -> Starting -> Started ->
//! MapInitialized`, with the terminal branch `Terminating -> Deleted`
//! reachable from any non-deleted stage. Stages only move forward. Failures
//! while constructing an entity (prototype load, initialize/start hooks) are
//! not swallowed: the half-built entity is rolled back via deletion and the
//! failure surfaces to the caller. Failures while tearing an entity down are
//! logged and tolerated so that deletion is always total.
//!
//! # Termination protocol
//!
//! Deletion is two-phase so no live entity ever observes a partially
//! torn-down descendant. The flag phase walks the hierarchy pre-order,
//! marking every descendant `Terminating` and notifying it locally. The
//! delete phase walks post-order: detach from the parent, delete children,
//! dispose components in safe order, raise `Deleted` while the network id
//! still resolves, then release the binding last.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::{debug, error, warn};

use crate::component::{Component, ComponentTypeId};
use crate::entity::{EntityId, IdAllocator, NetworkId};
use crate::event::{Event, EventBus, EventKind, Handler};
use crate::metadata::{LifecycleStage, Metadata};
use crate::store::ComponentStore;
use crate::transform::Transform;
use crate::{EcsError, FaultPolicy, Tick};

// ---------------------------------------------------------------------------
// WorldConfig
// ---------------------------------------------------------------------------

/// Runtime configuration for the world.
#[derive(Debug, Clone, Default)]
pub struct WorldConfig {
    /// How tolerable programmer errors (such as re-entrant deletion) are
    /// handled. Defaults to [`FaultPolicy::Tolerant`].
    pub fault_policy: FaultPolicy,
}

// ---------------------------------------------------------------------------
// ComponentLoader
// ---------------------------------------------------------------------------

/// External prototype/template service that attaches components to a freshly
/// allocated entity. A failure aborts entity creation; the world rolls the
/// half-built entity back before surfacing the error.
pub trait ComponentLoader {
    /// Attach the prototype's components to `entity`, applying `overrides`
    /// (a free-form JSON mapping interpreted by the loader).
    fn load_components(
        &self,
        world: &mut World,
        entity: EntityId,
        prototype: &str,
        overrides: &serde_json::Value,
    ) -> Result<(), LoadError>;
}

/// Failure reported by a [`ComponentLoader`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct LoadError {
    pub message: String,
}

impl LoadError {
    /// Construct a load error from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Which hook a lifecycle pass invokes.
#[derive(Debug, Clone, Copy)]
enum HookPoint {
    Initialize,
    Start,
}

impl HookPoint {
    fn name(self) -> &'static str {
        match self {
            HookPoint::Initialize => "initialize",
            HookPoint::Start => "start",
        }
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The entity/component runtime.
pub struct World {
    ids: IdAllocator,
    store: ComponentStore,
    bus: EventBus,
    /// Live entity ids, sorted for deterministic iteration.
    live: BTreeSet<EntityId>,
    /// FIFO of entities awaiting the per-tick deletion drain.
    deletion_queue: VecDeque<EntityId>,
    /// Dedup set mirroring `deletion_queue`, cleared after each drain.
    queued_deletions: HashSet<EntityId>,
    /// Final metadata snapshots of entities deleted since the last cull,
    /// kept so diagnostics stay valid for just-deleted entities.
    retired: HashMap<EntityId, Metadata>,
    current_tick: Tick,
    config: WorldConfig,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("live", &self.live.len())
            .field("queued_deletions", &self.deletion_queue.len())
            .field("tick", &self.current_tick)
            .finish()
    }
}

impl World {
    /// Create a world with the default configuration.
    ///
    /// The two mandatory component types are registered here, first, so their
    /// type ids anchor the safe order.
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Create a world with an explicit configuration.
    pub fn with_config(config: WorldConfig) -> Self {
        let mut store = ComponentStore::new();
        let metadata = store.register::<Metadata>("metadata");
        let transform = store.register::<Transform>("transform");
        debug_assert_eq!(metadata, ComponentTypeId::METADATA);
        debug_assert_eq!(transform, ComponentTypeId::TRANSFORM);
        Self {
            ids: IdAllocator::new(),
            store,
            bus: EventBus::new(),
            live: BTreeSet::new(),
            deletion_queue: VecDeque::new(),
            queued_deletions: HashSet::new(),
            retired: HashMap::new(),
            current_tick: Tick(0),
            config,
        }
    }

    // -- clock --------------------------------------------------------------

    /// The most recently observed tick.
    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Mirror the external tick clock. The clock is read-only to this core;
    /// a backwards value is ignored with a warning.
    pub fn advance_clock(&mut self, tick: Tick) {
        if tick < self.current_tick {
            warn!(observed = %tick, current = %self.current_tick, "ignoring backwards clock");
            return;
        }
        self.current_tick = tick;
    }

    // -- registration and access --------------------------------------------

    /// Register a component type for use with this world.
    pub fn register_component<T: Component>(&mut self, name: &str) -> ComponentTypeId {
        self.store.register::<T>(name)
    }

    /// Read-only access to the component store (the published query
    /// contract; structural mutation goes through the world).
    pub fn components(&self) -> &ComponentStore {
        &self.store
    }

    /// Typed component lookup, failing with [`EcsError::NotFound`].
    pub fn get<T: Component>(&self, entity: EntityId) -> Result<&T, EcsError> {
        self.store.get::<T>(entity)
    }

    /// Typed component lookup that reports absence as `None`.
    pub fn try_get<T: Component>(&self, entity: EntityId) -> Option<&T> {
        self.store.try_get::<T>(entity)
    }

    /// Typed mutable component lookup. Callers that mutate
    /// replication-relevant state should follow up with
    /// [`mark_dirty`](Self::mark_dirty).
    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Result<&mut T, EcsError> {
        self.store.get_mut::<T>(entity)
    }

    // -- event bus passthrough ----------------------------------------------

    /// Subscribe to every event of `kind`.
    pub fn subscribe(&mut self, kind: EventKind, label: &str, handler: Handler) {
        self.bus.subscribe(kind, label, handler);
    }

    /// Subscribe with before/after ordering constraints.
    pub fn subscribe_ordered(
        &mut self,
        kind: EventKind,
        label: &str,
        before: &[&str],
        after: &[&str],
        handler: Handler,
    ) {
        self.bus.subscribe_ordered(kind, label, before, after, handler);
    }

    /// Subscribe to events of `kind` about one specific entity.
    pub fn subscribe_scoped(
        &mut self,
        kind: EventKind,
        entity: EntityId,
        label: &str,
        handler: Handler,
    ) {
        self.bus.subscribe_scoped(kind, entity, label, handler);
    }

    /// Run the one-time startup ordering pass over all subscribers.
    pub fn calculate_ordering(&mut self) -> Result<(), EcsError> {
        self.bus.calculate_ordering()
    }

    /// Dispatch a domain event immediately.
    pub fn publish(&mut self, event: Event) {
        self.dispatch_event(event);
    }

    /// Queue a domain event for delivery at the next tick boundary.
    pub fn queue_event(&mut self, event: Event) {
        self.bus.queue(event);
    }

    // -- allocation ---------------------------------------------------------

    /// Allocate a new entity in stage `Allocated`.
    ///
    /// The mandatory metadata and transform components are created and a
    /// network id is bound before the `EntityAdded` notification fires, and
    /// the notification fires before any further component is attached --
    /// subscribers observing addition never see a half-built entity.
    pub fn allocate(&mut self, prototype: Option<&str>) -> Result<EntityId, EcsError> {
        let entity = self.ids.allocate_entity();
        let network = self.ids.allocate_network();
        self.ids.bind(entity, network)?;
        self.live.insert(entity);
        self.store
            .add(entity, Metadata::new(prototype.map(str::to_owned), self.current_tick))?;
        self.store.add(entity, Transform::root())?;
        debug!(entity = %entity, network = %network, prototype, "allocated entity");
        self.dispatch_event(Event::EntityAdded { entity });
        Ok(entity)
    }

    /// Allocate an entity and populate it from a prototype via the external
    /// loader. A load failure rolls the entity back and surfaces as
    /// [`EcsError::EntityCreationFailure`].
    pub fn spawn_from(
        &mut self,
        loader: &dyn ComponentLoader,
        prototype: &str,
        overrides: &serde_json::Value,
    ) -> Result<EntityId, EcsError> {
        let entity = self.allocate(Some(prototype))?;
        if let Err(err) = loader.load_components(self, entity, prototype, overrides) {
            error!(entity = %entity, prototype, error = %err, "prototype load failed, rolling back");
            let _ = self.delete(entity);
            return Err(EcsError::EntityCreationFailure {
                entity,
                reason: format!("prototype '{prototype}' failed to load: {err}"),
            });
        }
        Ok(entity)
    }

    /// Attach a component to a live entity, raising `ComponentAdded`.
    pub fn attach_component<T: Component>(
        &mut self,
        entity: EntityId,
        component: T,
    ) -> Result<(), EcsError> {
        if !self.entity_exists(entity) {
            return Err(EcsError::unknown_entity(entity));
        }
        let type_id = self.store.type_id_of::<T>()?;
        self.store.add_boxed(entity, type_id, Box::new(component))?;
        self.dispatch_event(Event::ComponentAdded {
            entity,
            component: type_id,
        });
        Ok(())
    }

    /// Detach a component from a live entity, running its shutdown hook and
    /// raising `ComponentRemoved`. The two mandatory components cannot be
    /// removed outside of deletion.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Result<(), EcsError> {
        if !self.entity_exists(entity) {
            return Err(EcsError::unknown_entity(entity));
        }
        let type_id = self.store.type_id_of::<T>()?;
        if type_id == ComponentTypeId::METADATA || type_id == ComponentTypeId::TRANSFORM {
            return Err(EcsError::StructuralInconsistency {
                detail: format!(
                    "refusing to remove mandatory component '{}' from {entity}",
                    self.store.registry().name_of(type_id)
                ),
            });
        }
        let mut boxed = self.store.remove(entity, type_id)?;
        if let Err(err) = boxed.on_shutdown() {
            let descriptor = self.to_descriptive_string(entity);
            error!(
                entity = %descriptor,
                component = self.store.registry().name_of(type_id),
                error = %err,
                "shutdown hook failed during component removal"
            );
        }
        self.dispatch_event(Event::ComponentRemoved {
            entity,
            component: type_id,
        });
        Ok(())
    }

    // -- lifecycle transitions ----------------------------------------------

    /// Run every component's initialize hook and advance to `Initialized`.
    ///
    /// Hooks run in initialization order (metadata and transform first, then
    /// dependents). A hook failure aborts creation: the entity is deleted
    /// and [`EcsError::EntityCreationFailure`] surfaces to the caller.
    pub fn initialize(&mut self, entity: EntityId) -> Result<(), EcsError> {
        self.expect_stage(entity, LifecycleStage::Allocated, "initialize")?;
        self.set_stage(entity, LifecycleStage::Initializing);
        self.run_hook_pass(entity, HookPoint::Initialize)?;
        self.set_stage(entity, LifecycleStage::Initialized);
        self.dispatch_event(Event::EntityInitialized { entity });
        Ok(())
    }

    /// Run every component's start hook and advance to `Started`.
    pub fn start(&mut self, entity: EntityId) -> Result<(), EcsError> {
        self.expect_stage(entity, LifecycleStage::Initialized, "start")?;
        self.set_stage(entity, LifecycleStage::Starting);
        self.run_hook_pass(entity, HookPoint::Start)?;
        self.set_stage(entity, LifecycleStage::Started);
        self.dispatch_event(Event::EntityStarted { entity });
        Ok(())
    }

    /// Fire the one-shot map-init notification to the entity's scoped
    /// subscribers and advance to `MapInitialized`.
    ///
    /// Idempotent by design: calling it on an already map-initialized entity
    /// is a no-op, not an error, and the event never fires twice.
    pub fn run_map_init(&mut self, entity: EntityId) -> Result<(), EcsError> {
        let stage = self.stage_of(entity)?;
        if stage == LifecycleStage::MapInitialized {
            return Ok(());
        }
        if stage != LifecycleStage::Started {
            return Err(EcsError::InvalidLifecycleTransition {
                entity,
                stage,
                operation: "run map-init",
            });
        }
        self.set_stage(entity, LifecycleStage::MapInitialized);
        let descriptor = self.to_descriptive_string(entity);
        self.bus
            .dispatch_local(&Event::MapInit { entity }, &descriptor);
        Ok(())
    }

    /// Initialize and start an entity, also running map-init when the
    /// hosting map is already initialized.
    pub fn initialize_and_start(
        &mut self,
        entity: EntityId,
        map_ready: bool,
    ) -> Result<(), EcsError> {
        self.initialize(entity)?;
        self.start(entity)?;
        if map_ready {
            self.run_map_init(entity)?;
        }
        Ok(())
    }

    fn run_hook_pass(&mut self, entity: EntityId, point: HookPoint) -> Result<(), EcsError> {
        for type_id in self.store.init_order_ids(entity) {
            let name = self.store.registry().name_of(type_id).to_owned();
            let Some(boxed) = self.store.get_boxed_mut(entity, type_id) else {
                continue;
            };
            let result = match point {
                HookPoint::Initialize => boxed.on_initialize(),
                HookPoint::Start => boxed.on_start(),
            };
            if let Err(err) = result {
                error!(
                    entity = %entity,
                    component = %name,
                    hook = point.name(),
                    error = %err,
                    "lifecycle hook failed, rolling entity back"
                );
                let _ = self.delete(entity);
                return Err(EcsError::EntityCreationFailure {
                    entity,
                    reason: format!("{} hook for '{name}' failed: {err}", point.name()),
                });
            }
        }
        Ok(())
    }

    // -- dirty tracking -----------------------------------------------------

    /// Stamp the entity's last-modified tick with the current tick and raise
    /// `Dirtied`, at most once per tick.
    ///
    /// A no-op while the entity is still under construction
    /// (`Allocated`/`Initializing`), so construction-time mutation is never
    /// reported as a replication-relevant change.
    pub fn mark_dirty(&mut self, entity: EntityId) -> Result<(), EcsError> {
        if !self.entity_exists(entity) {
            return Err(EcsError::unknown_entity(entity));
        }
        let tick = self.current_tick;
        let meta = self.store.get_mut::<Metadata>(entity)?;
        if meta.stage.in_construction() || meta.last_modified_tick == tick {
            return Ok(());
        }
        meta.last_modified_tick = tick;
        self.dispatch_event(Event::Dirtied { entity, tick });
        Ok(())
    }

    /// Toggle the paused flag, stamping the entity dirty.
    pub fn set_paused(&mut self, entity: EntityId, paused: bool) -> Result<(), EcsError> {
        if !self.entity_exists(entity) {
            return Err(EcsError::unknown_entity(entity));
        }
        self.store.get_mut::<Metadata>(entity)?.paused = paused;
        self.mark_dirty(entity)
    }

    /// Entities whose last replication-relevant mutation happened at or
    /// after `tick`, in id order.
    pub fn dirty_since(&self, tick: Tick) -> Vec<EntityId> {
        self.live
            .iter()
            .copied()
            .filter(|&e| {
                self.store
                    .try_get::<Metadata>(e)
                    .is_some_and(|m| m.last_modified_tick >= tick)
            })
            .collect()
    }

    // -- hierarchy ----------------------------------------------------------

    /// Attach `child` under `parent`.
    ///
    /// Both sides of the link are updated before any notification can run,
    /// so the operation is atomic from an event handler's perspective.
    /// Rejects self-attachment and anything that would close a cycle.
    pub fn attach(&mut self, child: EntityId, parent: EntityId) -> Result<(), EcsError> {
        if !self.entity_exists(child) {
            return Err(EcsError::unknown_entity(child));
        }
        if !self.entity_exists(parent) {
            return Err(EcsError::unknown_entity(parent));
        }
        let mut cursor = Some(parent);
        while let Some(ancestor) = cursor {
            if ancestor == child {
                return Err(EcsError::StructuralInconsistency {
                    detail: format!("attaching {child} under {parent} would create a cycle"),
                });
            }
            cursor = self.store.try_get::<Transform>(ancestor).and_then(|t| t.parent);
        }
        self.detach_link(child);
        self.store.get_mut::<Transform>(child)?.parent = Some(parent);
        self.store.get_mut::<Transform>(parent)?.children.push(child);
        self.mark_dirty(child)?;
        self.mark_dirty(parent)
    }

    /// Detach `child` from its parent, making it a root.
    pub fn detach(&mut self, child: EntityId) -> Result<(), EcsError> {
        if !self.entity_exists(child) {
            return Err(EcsError::unknown_entity(child));
        }
        if let Some(parent) = self.detach_link(child) {
            self.mark_dirty(parent)?;
        }
        self.mark_dirty(child)
    }

    /// Clear the child's parent pointer and the parent's child entry, with
    /// no events in between. Returns the former parent.
    fn detach_link(&mut self, child: EntityId) -> Option<EntityId> {
        let parent = self
            .store
            .try_get_mut::<Transform>(child)
            .and_then(|t| t.parent.take())?;
        if let Some(parent_transform) = self.store.try_get_mut::<Transform>(parent) {
            parent_transform.children.retain(|&c| c != child);
        }
        Some(parent)
    }

    // -- deletion -----------------------------------------------------------

    /// Add the entity to the deferred deletion queue.
    ///
    /// Idempotent: a no-op when the entity is already queued or already
    /// deleted. The `QueuedForDeletion` notification fires exactly once per
    /// queue entry.
    pub fn queue_delete(&mut self, entity: EntityId) {
        if !self.entity_exists(entity) {
            return;
        }
        if !self.queued_deletions.insert(entity) {
            return;
        }
        self.deletion_queue.push_back(entity);
        self.dispatch_event(Event::QueuedForDeletion { entity });
    }

    /// Immediately delete an entity and its entire transform hierarchy.
    ///
    /// Deleting an entity already mid-termination is programmer error; the
    /// configured [`FaultPolicy`] decides between logging and surfacing it.
    pub fn delete(&mut self, entity: EntityId) -> Result<(), EcsError> {
        if !self.live.contains(&entity) {
            return Err(EcsError::unknown_entity(entity));
        }
        let stage = self.stage_of(entity)?;
        if stage == LifecycleStage::Terminating {
            return self.fault(EcsError::InvalidLifecycleTransition {
                entity,
                stage,
                operation: "re-enter delete",
            });
        }
        self.flag_termination(entity);
        self.delete_recursive(entity);
        Ok(())
    }

    /// Flag phase: pre-order walk marking every reachable descendant
    /// `Terminating` and notifying it locally. Subscriber failures are
    /// logged by the bus and do not abort the walk.
    fn flag_termination(&mut self, entity: EntityId) {
        match self.store.try_get_mut::<Metadata>(entity) {
            Some(meta) => meta.stage = LifecycleStage::Terminating,
            None => return,
        }
        let descriptor = self.to_descriptive_string(entity);
        self.bus
            .dispatch_local(&Event::Terminating { entity }, &descriptor);

        let children = self
            .store
            .try_get::<Transform>(entity)
            .map(|t| t.children.clone())
            .unwrap_or_default();
        for child in children {
            let child_live = self.live.contains(&child)
                && self
                    .store
                    .try_get::<Metadata>(child)
                    .is_some_and(|m| !m.deleted);
            if !child_live {
                // Self-healing repair: something mutated the hierarchy
                // behind the state machine's back.
                let repair = EcsError::StructuralInconsistency {
                    detail: format!("{entity} referenced already-deleted child {child}"),
                };
                error!(error = %repair, "hierarchy repair during termination");
                if let Some(transform) = self.store.try_get_mut::<Transform>(entity) {
                    transform.children.retain(|&c| c != child);
                }
                continue;
            }
            self.flag_termination(child);
        }
    }

    /// Delete phase: post-order teardown. See the module docs for the exact
    /// sequence; the network binding is released last so `Deleted`
    /// subscribers can still resolve the network id.
    fn delete_recursive(&mut self, entity: EntityId) {
        // Detach the parent link first so ancestor lookups never need to
        // re-run while descendants are still being destroyed.
        self.detach_link(entity);

        let children = self
            .store
            .try_get_mut::<Transform>(entity)
            .map(|t| std::mem::take(&mut t.children))
            .unwrap_or_default();
        for child in children {
            if self.live.contains(&child) {
                self.delete_recursive(child);
            }
        }

        if let Some(meta) = self.store.try_get_mut::<Metadata>(entity) {
            meta.stage = LifecycleStage::Deleted;
            meta.deleted = true;
        }

        // Dispose components in safe order; metadata is last, and its final
        // state is snapshotted just before it vanishes.
        let descriptor = self.to_descriptive_string(entity);
        let mut snapshot: Option<Metadata> = None;
        for type_id in self.store.safe_order_ids(entity) {
            if type_id == ComponentTypeId::METADATA {
                snapshot = self.store.try_get::<Metadata>(entity).cloned();
            }
            let name = self.store.registry().name_of(type_id).to_owned();
            if let Some(boxed) = self.store.get_boxed_mut(entity, type_id) {
                if let Err(err) = boxed.on_shutdown() {
                    error!(
                        entity = %descriptor,
                        component = %name,
                        stage = "Terminating",
                        error = %err,
                        "shutdown hook failed during teardown"
                    );
                }
            }
            let _ = self.store.remove(entity, type_id);
        }

        let metadata = snapshot.unwrap_or_else(|| {
            let mut meta = Metadata::new(None, self.current_tick);
            meta.stage = LifecycleStage::Deleted;
            meta.deleted = true;
            meta
        });
        let network = self.ids.network_of(entity).ok();
        self.retired.insert(entity, metadata.clone());

        self.dispatch_event(Event::Deleted {
            entity,
            network,
            metadata,
        });
        self.bus.drop_entity(entity);
        self.live.remove(&entity);
        self.queued_deletions.remove(&entity);
        self.ids.release(entity);
    }

    /// Drain the deferred deletion queue, deleting each still-live entry
    /// exactly once. Entities queued while the drain runs wait for the next
    /// tick. Returns the number of root deletions performed.
    pub fn drain_deferred_deletions(&mut self) -> usize {
        let pending: Vec<EntityId> = self.deletion_queue.drain(..).collect();
        self.queued_deletions.clear();
        let mut deleted = 0;
        for entity in pending {
            if !self.entity_exists(entity) {
                continue;
            }
            match self.delete(entity) {
                Ok(()) => deleted += 1,
                Err(err) => error!(entity = %entity, error = %err, "deferred deletion failed"),
            }
        }
        deleted
    }

    // -- tick boundary ------------------------------------------------------

    /// Deliver every event queued during the previous tick, in queue order.
    /// Returns how many were delivered.
    pub fn dispatch_queued_events(&mut self) -> usize {
        let events = self.bus.drain_queued();
        let count = events.len();
        for event in events {
            self.dispatch_event(event);
        }
        count
    }

    /// Cull component rows whose entity is no longer live and forget retired
    /// metadata snapshots. Orphaned rows are a structural inconsistency:
    /// they are repaired and logged, never fatal.
    pub fn cull_stale(&mut self) -> usize {
        self.retired.clear();
        let mut culled = 0;
        for entity in self.store.all_entities() {
            if !self.live.contains(&entity) {
                let dropped = self.store.purge(entity);
                culled += dropped;
                let repair = EcsError::StructuralInconsistency {
                    detail: format!("culled {dropped} orphaned component rows for {entity}"),
                };
                error!(error = %repair, "component store repair");
            }
        }
        culled
    }

    // -- queries ------------------------------------------------------------

    /// Whether the entity is live (allocated and not yet fully deleted).
    pub fn entity_exists(&self, entity: EntityId) -> bool {
        self.live.contains(&entity)
    }

    /// Number of live entities.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Live entity ids in ascending order.
    pub fn live_entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.live.iter().copied()
    }

    /// Resolve an entity's network id.
    pub fn network_of(&self, entity: EntityId) -> Result<NetworkId, EcsError> {
        self.ids.network_of(entity)
    }

    /// Resolve a network id to its live entity.
    pub fn entity_of(&self, network: NetworkId) -> Result<EntityId, EcsError> {
        self.ids.entity_of(network)
    }

    /// A human-readable descriptor for logs and diagnostics. Valid even for
    /// just-deleted entities, via the retired metadata snapshot.
    pub fn to_descriptive_string(&self, entity: EntityId) -> String {
        if let Some(meta) = self.store.try_get::<Metadata>(entity) {
            let network = self
                .ids
                .network_of(entity)
                .map(|n| n.to_string())
                .unwrap_or_else(|_| "unbound".to_owned());
            format!("{} ({entity}, {network}, {:?})", meta.name, meta.stage)
        } else if let Some(meta) = self.retired.get(&entity) {
            format!("{} ({entity}, deleted)", meta.name)
        } else {
            format!("{entity} (unknown)")
        }
    }

    // -- internals ----------------------------------------------------------

    fn stage_of(&self, entity: EntityId) -> Result<LifecycleStage, EcsError> {
        if !self.live.contains(&entity) {
            return Err(EcsError::unknown_entity(entity));
        }
        Ok(self.store.get::<Metadata>(entity)?.stage)
    }

    fn expect_stage(
        &self,
        entity: EntityId,
        expected: LifecycleStage,
        operation: &'static str,
    ) -> Result<(), EcsError> {
        let stage = self.stage_of(entity)?;
        if stage != expected {
            return Err(EcsError::InvalidLifecycleTransition {
                entity,
                stage,
                operation,
            });
        }
        Ok(())
    }

    fn set_stage(&mut self, entity: EntityId, stage: LifecycleStage) {
        if let Some(meta) = self.store.try_get_mut::<Metadata>(entity) {
            meta.stage = stage;
        }
    }

    fn dispatch_event(&mut self, event: Event) {
        let descriptor = self.to_descriptive_string(event.subject());
        self.bus.dispatch(&event, &descriptor);
    }

    /// The single decision point for tolerable programmer errors.
    fn fault(&self, error: EcsError) -> Result<(), EcsError> {
        match self.config.fault_policy {
            FaultPolicy::Tolerant => {
                error!(error = %error, "tolerated runtime fault");
                Ok(())
            }
            FaultPolicy::Strict => Err(error),
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
