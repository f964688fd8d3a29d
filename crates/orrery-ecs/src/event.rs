//! In-process publish/subscribe for lifecycle and domain events.
//!
//! Dispatch is single-threaded and synchronous within a tick unless an event
//! is explicitly queued, in which case it is delivered at the next tick
//! boundary. Subscriptions are registered per (event kind, optional entity
//! scope) and fire in subscription order; a subscriber failure is caught at
//! the dispatch site, logged with the originating entity's descriptive
//! string, and never prevents the remaining subscribers from running.
//!
//! Subscribers that care about relative ordering declare before/after
//! relationships against other subscriber labels. A single
//! [`calculate_ordering`](EventBus::calculate_ordering) pass at startup
//! topologically sorts each kind's subscriber list once; cyclic constraints
//! fail fast there instead of corrupting dispatch order silently.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, error};

use crate::component::HookError;
use crate::entity::{EntityId, NetworkId};
use crate::metadata::Metadata;
use crate::{EcsError, Tick};

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A lifecycle or domain notification flowing through the bus.
#[derive(Debug, Clone)]
pub enum Event {
    /// A new entity exists. Raised before any non-mandatory component is
    /// attached, so subscribers never observe a half-built component set.
    EntityAdded { entity: EntityId },
    /// All initialize hooks completed.
    EntityInitialized { entity: EntityId },
    /// All start hooks completed.
    EntityStarted { entity: EntityId },
    /// One-shot map-init notification, delivered to the entity's scoped
    /// subscribers only.
    MapInit { entity: EntityId },
    /// The entity was placed on the deferred deletion queue.
    QueuedForDeletion { entity: EntityId },
    /// The termination walk flagged this entity; delivered locally.
    Terminating { entity: EntityId },
    /// The entity is gone. Carries the final metadata snapshot and the
    /// network id, which still resolves for the duration of this dispatch.
    Deleted {
        entity: EntityId,
        network: Option<NetworkId>,
        metadata: Metadata,
    },
    /// A replication-relevant mutation was stamped this tick.
    Dirtied { entity: EntityId, tick: Tick },
    /// A component was attached after allocation.
    ComponentAdded {
        entity: EntityId,
        component: crate::component::ComponentTypeId,
    },
    /// A component was detached outside of teardown.
    ComponentRemoved {
        entity: EntityId,
        component: crate::component::ComponentTypeId,
    },
}

impl Event {
    /// The kind tag used for subscription lookup.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::EntityAdded { .. } => EventKind::EntityAdded,
            Event::EntityInitialized { .. } => EventKind::EntityInitialized,
            Event::EntityStarted { .. } => EventKind::EntityStarted,
            Event::MapInit { .. } => EventKind::MapInit,
            Event::QueuedForDeletion { .. } => EventKind::QueuedForDeletion,
            Event::Terminating { .. } => EventKind::Terminating,
            Event::Deleted { .. } => EventKind::Deleted,
            Event::Dirtied { .. } => EventKind::Dirtied,
            Event::ComponentAdded { .. } => EventKind::ComponentAdded,
            Event::ComponentRemoved { .. } => EventKind::ComponentRemoved,
        }
    }

    /// The entity this event is about.
    pub fn subject(&self) -> EntityId {
        match self {
            Event::EntityAdded { entity }
            | Event::EntityInitialized { entity }
            | Event::EntityStarted { entity }
            | Event::MapInit { entity }
            | Event::QueuedForDeletion { entity }
            | Event::Terminating { entity }
            | Event::Deleted { entity, .. }
            | Event::Dirtied { entity, .. }
            | Event::ComponentAdded { entity, .. }
            | Event::ComponentRemoved { entity, .. } => *entity,
        }
    }
}

/// Discriminant tag for [`Event`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    EntityAdded,
    EntityInitialized,
    EntityStarted,
    MapInit,
    QueuedForDeletion,
    Terminating,
    Deleted,
    Dirtied,
    ComponentAdded,
    ComponentRemoved,
}

impl EventKind {
    /// Stable name for logs and ordering-cycle errors.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::EntityAdded => "entity_added",
            EventKind::EntityInitialized => "entity_initialized",
            EventKind::EntityStarted => "entity_started",
            EventKind::MapInit => "map_init",
            EventKind::QueuedForDeletion => "queued_for_deletion",
            EventKind::Terminating => "terminating",
            EventKind::Deleted => "deleted",
            EventKind::Dirtied => "dirtied",
            EventKind::ComponentAdded => "component_added",
            EventKind::ComponentRemoved => "component_removed",
        }
    }
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// A subscriber callback. Failures are isolated per subscriber.
pub type Handler = Box<dyn FnMut(&Event) -> Result<(), HookError>>;

struct Subscription {
    label: String,
    /// Labels this subscriber must run before.
    before: Vec<String>,
    /// Labels this subscriber must run after.
    after: Vec<String>,
    handler: Handler,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("label", &self.label)
            .field("before", &self.before)
            .field("after", &self.after)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Single-threaded publish/subscribe hub.
#[derive(Default)]
pub struct EventBus {
    global: HashMap<EventKind, Vec<Subscription>>,
    scoped: HashMap<(EventKind, EntityId), Vec<Subscription>>,
    queued: VecDeque<Event>,
    ordered: bool,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("global_kinds", &self.global.len())
            .field("scoped_lists", &self.scoped.len())
            .field("queued", &self.queued.len())
            .field("ordered", &self.ordered)
            .finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event of `kind`, regardless of entity.
    pub fn subscribe(&mut self, kind: EventKind, label: &str, handler: Handler) {
        self.subscribe_ordered(kind, label, &[], &[], handler);
    }

    /// Subscribe with before/after constraints against other subscriber
    /// labels of the same kind. Constraints take effect at the next
    /// [`calculate_ordering`](Self::calculate_ordering) pass.
    pub fn subscribe_ordered(
        &mut self,
        kind: EventKind,
        label: &str,
        before: &[&str],
        after: &[&str],
        handler: Handler,
    ) {
        self.global.entry(kind).or_default().push(Subscription {
            label: label.to_owned(),
            before: before.iter().map(|s| s.to_string()).collect(),
            after: after.iter().map(|s| s.to_string()).collect(),
            handler,
        });
        self.ordered = false;
    }

    /// Subscribe to events of `kind` about one specific entity. Scoped
    /// subscriptions fire after the global set, in subscription order, and
    /// are dropped when the entity is deleted.
    pub fn subscribe_scoped(
        &mut self,
        kind: EventKind,
        entity: EntityId,
        label: &str,
        handler: Handler,
    ) {
        self.scoped
            .entry((kind, entity))
            .or_default()
            .push(Subscription {
                label: label.to_owned(),
                before: Vec::new(),
                after: Vec::new(),
                handler,
            });
    }

    /// Topologically order every kind's global subscriber list by the
    /// declared before/after constraints.
    ///
    /// Runs once at startup. Unconstrained subscribers keep their
    /// subscription order (the sort is stable). A constraint cycle is a
    /// startup error, never a silent reordering.
    pub fn calculate_ordering(&mut self) -> Result<(), EcsError> {
        for (kind, subs) in &mut self.global {
            Self::topo_sort(*kind, subs)?;
        }
        self.ordered = true;
        Ok(())
    }

    /// Kahn's algorithm over the label constraint graph, with subscription
    /// index as the deterministic tie break.
    fn topo_sort(kind: EventKind, subs: &mut Vec<Subscription>) -> Result<(), EcsError> {
        let n = subs.len();
        let index_of: HashMap<String, usize> = subs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.label.clone(), i))
            .collect();

        // edges[a] contains b  <=>  a must run before b.
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut indegree = vec![0usize; n];
        for (i, sub) in subs.iter().enumerate() {
            for label in &sub.before {
                if let Some(&j) = index_of.get(label) {
                    edges[i].push(j);
                    indegree[j] += 1;
                }
            }
            for label in &sub.after {
                if let Some(&j) = index_of.get(label) {
                    edges[j].push(i);
                    indegree[i] += 1;
                }
            }
        }

        let mut ready: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(&next) = ready.iter().min() {
            ready.retain(|&i| i != next);
            order.push(next);
            for &succ in &edges[next] {
                indegree[succ] -= 1;
                if indegree[succ] == 0 {
                    ready.push(succ);
                }
            }
        }

        if order.len() != n {
            return Err(EcsError::OrderingCycle { kind: kind.name() });
        }

        let mut reordered: Vec<Option<Subscription>> =
            subs.drain(..).map(Some).collect();
        *subs = order
            .into_iter()
            .map(|i| reordered[i].take().expect("each index appears once"))
            .collect();
        Ok(())
    }

    // -- dispatch -----------------------------------------------------------

    /// Dispatch to the global subscriber set for the event's kind, then to
    /// the subscribers scoped to the event's subject entity.
    ///
    /// `descriptor` is the subject's descriptive string, used when logging a
    /// failed subscriber. Returns the number of subscriber failures.
    pub fn dispatch(&mut self, event: &Event, descriptor: &str) -> usize {
        let mut failures = 0;
        let kind = event.kind();
        if let Some(subs) = self.global.get_mut(&kind) {
            failures += Self::run_subscribers(subs, event, descriptor);
        }
        failures + self.dispatch_local(event, descriptor)
    }

    /// Dispatch to the subject entity's scoped subscribers only. Used for
    /// notifications that are local by contract (map-init, terminating).
    pub fn dispatch_local(&mut self, event: &Event, descriptor: &str) -> usize {
        let key = (event.kind(), event.subject());
        match self.scoped.get_mut(&key) {
            Some(subs) => Self::run_subscribers(subs, event, descriptor),
            None => 0,
        }
    }

    fn run_subscribers(subs: &mut [Subscription], event: &Event, descriptor: &str) -> usize {
        let mut failures = 0;
        for sub in subs.iter_mut() {
            if let Err(err) = (sub.handler)(event) {
                failures += 1;
                error!(
                    subscriber = %sub.label,
                    entity = %descriptor,
                    event = event.kind().name(),
                    error = %err,
                    "event subscriber failed"
                );
            }
        }
        failures
    }

    // -- deferred delivery --------------------------------------------------

    /// Queue an event for delivery at the next tick boundary.
    pub fn queue(&mut self, event: Event) {
        self.queued.push_back(event);
    }

    /// Take every queued event, in queue order. The caller dispatches them;
    /// events queued *during* that dispatch land in the next drain.
    pub fn drain_queued(&mut self) -> Vec<Event> {
        self.queued.drain(..).collect()
    }

    /// Number of events waiting for the next tick boundary.
    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Drop every subscription scoped to `entity`. Called during teardown,
    /// after the `Deleted` notification has fired.
    pub fn drop_entity(&mut self, entity: EntityId) {
        let before = self.scoped.len();
        self.scoped.retain(|(_, scoped_to), _| *scoped_to != entity);
        if self.scoped.len() != before {
            debug!(entity = %entity, "dropped scoped subscriptions");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
