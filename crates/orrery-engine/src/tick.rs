//! The per-tick control flow driving the runtime.
//!
//! Each tick, in order:
//!
//! 1. The reconciliation queue releases every due network message and the
//!    router fans each one out to its subscribers.
//! 2. The event bus delivers events queued during the previous tick.
//! 3. The deferred deletion queue is drained; each deletion recursively
//!    tears down its transform hierarchy.
//! 4. Stale component rows are culled from the store and the retired
//!    metadata snapshots are forgotten.
//!
//! The live entity gauge is refreshed once per tick, after the deletion
//! drain, and reported through [`TickLoop::live_entity_gauge`].
//!
//! The loop does not own a wall clock: the external tick counter drives it
//! through [`advance_to`](TickLoop::advance_to) (or the [`tick`](TickLoop::tick)
//! convenience, which steps by one).

use tracing::debug;

use orrery_ecs::prelude::*;

use crate::reconcile::{Envelope, MessageSender, ReconcileConfig, ReconcileQueue, SessionId};
use crate::router::{MessageHandler, MessageRouter};
use crate::services::MapService;

// ---------------------------------------------------------------------------
// TickReport
// ---------------------------------------------------------------------------

/// What one tick did. Useful for diagnostics and tests.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// The tick that just completed.
    pub tick: Tick,
    /// Network messages released and dispatched.
    pub messages_released: usize,
    /// Message subscriber failures (logged, never fatal).
    pub message_failures: usize,
    /// Queued events delivered at this boundary.
    pub events_delivered: usize,
    /// Root entities deleted by the deferred drain.
    pub entities_deleted: usize,
    /// Orphaned component rows culled from the store.
    pub components_culled: usize,
    /// Live entities after the deletion drain.
    pub live_entities: usize,
}

// ---------------------------------------------------------------------------
// TickLoop
// ---------------------------------------------------------------------------

/// Owns the world, the reconciliation queue, and the message router, and
/// runs the fixed per-tick pipeline over them.
///
/// `M` is the opaque network message payload type.
pub struct TickLoop<M> {
    world: World,
    reconciler: ReconcileQueue<M>,
    router: MessageRouter<M>,
    current_tick: Tick,
    live_gauge: usize,
    last_report: TickReport,
}

impl<M> TickLoop<M> {
    /// Create a tick loop around an existing world.
    pub fn new(world: World, reconcile_config: ReconcileConfig) -> Self {
        Self {
            world,
            reconciler: ReconcileQueue::new(reconcile_config),
            router: MessageRouter::new(),
            current_tick: Tick(0),
            live_gauge: 0,
            last_report: TickReport::default(),
        }
    }

    // -- tick pipeline ------------------------------------------------------

    /// Run one tick at the given clock value. The clock is external and
    /// monotonic; this mirrors it into the world and runs the pipeline.
    pub fn advance_to(&mut self, tick: Tick) -> TickReport {
        self.current_tick = tick;
        self.world.advance_clock(tick);

        let released = self.reconciler.pump(tick);
        let messages_released = released.len();
        let mut message_failures = 0;
        for envelope in &released {
            message_failures += self.router.dispatch(envelope);
        }

        let events_delivered = self.world.dispatch_queued_events();
        let entities_deleted = self.world.drain_deferred_deletions();
        let components_culled = self.world.cull_stale();
        self.live_gauge = self.world.live_count();

        let report = TickReport {
            tick,
            messages_released,
            message_failures,
            events_delivered,
            entities_deleted,
            components_culled,
            live_entities: self.live_gauge,
        };
        debug!(
            tick = %tick,
            live = report.live_entities,
            released = report.messages_released,
            deleted = report.entities_deleted,
            "tick complete"
        );
        self.last_report = report.clone();
        report
    }

    /// Run one tick at the next clock value.
    pub fn tick(&mut self) -> TickReport {
        self.advance_to(self.current_tick.next())
    }

    // -- sessions and messages ----------------------------------------------

    /// Register a connected session with the reconciliation queue.
    pub fn connect_session(&mut self, session: SessionId) {
        self.reconciler.connect(session);
    }

    /// Drop a session: its watermark, its pending messages, and its scoped
    /// message subscribers.
    pub fn disconnect_session(&mut self, session: SessionId) {
        self.reconciler.disconnect(session);
        self.router.drop_session(session);
    }

    /// Thread-safe sender for transports delivering inbound envelopes.
    pub fn message_sender(&self) -> MessageSender<M> {
        self.reconciler.sender()
    }

    /// Receive an envelope on the simulation thread, dispatching immediately
    /// when it is already due.
    pub fn receive(&mut self, envelope: Envelope<M>) {
        if let Some(due) = self.reconciler.submit(envelope, self.current_tick) {
            self.router.dispatch(&due);
        }
    }

    /// Subscribe to every released message.
    pub fn on_message(&mut self, label: &str, handler: MessageHandler<M>) {
        self.router.on_any(label, handler);
    }

    /// Subscribe to released messages from one session.
    pub fn on_session_message(
        &mut self,
        session: SessionId,
        label: &str,
        handler: MessageHandler<M>,
    ) {
        self.router.on_session(session, label, handler);
    }

    // -- entity orchestration -----------------------------------------------

    /// Spawn an entity from a prototype and bring it fully up, consulting
    /// the map service to decide whether map-init also runs.
    pub fn spawn_entity(
        &mut self,
        loader: &dyn ComponentLoader,
        map_service: &dyn MapService,
        prototype: &str,
        map: &str,
        overrides: &serde_json::Value,
    ) -> Result<EntityId, EcsError> {
        let entity = self.world.spawn_from(loader, prototype, overrides)?;
        self.world
            .initialize_and_start(entity, map_service.is_map_initialized(map))?;
        Ok(entity)
    }

    // -- accessors ----------------------------------------------------------

    /// The tick that last ran (or 0 before the first tick).
    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Gauge-style readout of the live entity count, refreshed once per
    /// tick after the deferred-deletion drain.
    pub fn live_entity_gauge(&self) -> usize {
        self.live_gauge
    }

    /// Report from the most recent tick.
    pub fn last_report(&self) -> &TickReport {
        &self.last_report
    }

    /// Read-only access to the world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to the world for setup and lifecycle operations.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The reconciliation queue (session watermarks, buffered counts).
    pub fn reconciler(&self) -> &ReconcileQueue<M> {
        &self.reconciler
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn envelope(tick: u64, sequence: u64, session: SessionId, payload: &str) -> Envelope<String> {
        Envelope {
            source_tick: Tick(tick),
            sequence,
            session,
            payload: payload.to_owned(),
        }
    }

    fn tick_loop() -> (TickLoop<String>, SessionId) {
        let mut looper = TickLoop::new(World::new(), ReconcileConfig::default());
        let session = SessionId::from_raw(1);
        looper.connect_session(session);
        (looper, session)
    }

    // -- pipeline order -----------------------------------------------------

    #[test]
    fn future_message_released_exactly_once() {
        let (mut looper, s) = tick_loop();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = Rc::clone(&seen);
        looper.on_message(
            "collector",
            Box::new(move |env: &Envelope<String>| {
                seen2.borrow_mut().push(env.payload.clone());
                Ok(())
            }),
        );

        // Clock at 8; message declares tick 10.
        looper.advance_to(Tick(8));
        looper.receive(envelope(10, 1, s, "future"));
        assert!(seen.borrow().is_empty());

        looper.advance_to(Tick(9));
        assert!(seen.borrow().is_empty());

        let report = looper.advance_to(Tick(10));
        assert_eq!(report.messages_released, 1);
        assert_eq!(*seen.borrow(), vec!["future"]);

        let report = looper.advance_to(Tick(11));
        assert_eq!(report.messages_released, 0);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn due_message_dispatches_on_receive() {
        let (mut looper, s) = tick_loop();
        let seen = Rc::new(RefCell::new(0u32));
        let seen2 = Rc::clone(&seen);
        looper.on_message(
            "counter",
            Box::new(move |_| {
                *seen2.borrow_mut() += 1;
                Ok(())
            }),
        );
        looper.advance_to(Tick(5));
        looper.receive(envelope(5, 1, s, "now"));
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn deferred_deletion_drains_during_tick() {
        let (mut looper, _s) = tick_loop();
        let e = looper.world_mut().allocate(None).unwrap();
        looper.world_mut().queue_delete(e);
        assert!(looper.world().entity_exists(e));

        let report = looper.tick();
        assert_eq!(report.entities_deleted, 1);
        assert!(!looper.world().entity_exists(e));
        assert_eq!(looper.live_entity_gauge(), 0);
    }

    #[test]
    fn queued_events_deliver_before_deletions() {
        let (mut looper, _s) = tick_loop();
        let order = Rc::new(RefCell::new(Vec::new()));

        let e = looper.world_mut().allocate(None).unwrap();
        let order_event = Rc::clone(&order);
        looper.world_mut().subscribe(
            EventKind::Dirtied,
            "queued-observer",
            Box::new(move |_| {
                order_event.borrow_mut().push("event");
                Ok(())
            }),
        );
        let order_deleted = Rc::clone(&order);
        looper.world_mut().subscribe(
            EventKind::Deleted,
            "deletion-observer",
            Box::new(move |_| {
                order_deleted.borrow_mut().push("deleted");
                Ok(())
            }),
        );

        looper.world_mut().queue_event(Event::Dirtied {
            entity: e,
            tick: Tick(0),
        });
        looper.world_mut().queue_delete(e);
        looper.tick();

        assert_eq!(*order.borrow(), vec!["event", "deleted"]);
    }

    #[test]
    fn gauge_tracks_live_entities() {
        let (mut looper, _s) = tick_loop();
        for _ in 0..3 {
            looper.world_mut().allocate(None).unwrap();
        }
        let report = looper.tick();
        assert_eq!(report.live_entities, 3);
        assert_eq!(looper.live_entity_gauge(), 3);
    }

    // -- sessions -----------------------------------------------------------

    #[test]
    fn disconnect_drops_pending_and_scoped_subscribers() {
        let (mut looper, s) = tick_loop();
        let hits = Rc::new(RefCell::new(0u32));
        let hits2 = Rc::clone(&hits);
        looper.on_session_message(
            s,
            "scoped",
            Box::new(move |_| {
                *hits2.borrow_mut() += 1;
                Ok(())
            }),
        );
        looper.advance_to(Tick(1));
        looper.receive(envelope(5, 1, s, "pending"));
        looper.disconnect_session(s);

        looper.advance_to(Tick(5));
        assert_eq!(*hits.borrow(), 0);
        assert_eq!(looper.reconciler().watermark(s), None);
    }

    // -- orchestration ------------------------------------------------------

    struct NullLoader;

    impl ComponentLoader for NullLoader {
        fn load_components(
            &self,
            _world: &mut World,
            _entity: EntityId,
            _prototype: &str,
            _overrides: &serde_json::Value,
        ) -> Result<(), LoadError> {
            Ok(())
        }
    }

    struct FixedMap(bool);

    impl MapService for FixedMap {
        fn is_map_initialized(&self, _map: &str) -> bool {
            self.0
        }
    }

    #[test]
    fn spawn_entity_runs_map_init_when_map_ready() {
        let (mut looper, _s) = tick_loop();
        let e = looper
            .spawn_entity(&NullLoader, &FixedMap(true), "door", "station", &serde_json::Value::Null)
            .unwrap();
        assert_eq!(
            looper.world().get::<Metadata>(e).unwrap().stage,
            LifecycleStage::MapInitialized
        );

        let e2 = looper
            .spawn_entity(&NullLoader, &FixedMap(false), "door", "station", &serde_json::Value::Null)
            .unwrap();
        assert_eq!(
            looper.world().get::<Metadata>(e2).unwrap().stage,
            LifecycleStage::Started
        );
    }
}
