//! End-to-end simulation scenarios: network messages driving entity
//! lifecycle through the full per-tick pipeline.

use std::cell::RefCell;
use std::rc::Rc;

use orrery_engine::prelude::*;

/// Payload for a toy protocol: ask the simulation to delete an entity by
/// network id.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct DeleteRequest {
    target: u64,
}

fn envelope(tick: u64, sequence: u64, session: SessionId, target: NetworkId) -> Envelope<DeleteRequest> {
    Envelope {
        source_tick: Tick(tick),
        sequence,
        session,
        payload: DeleteRequest {
            target: target.to_raw(),
        },
    }
}

#[test]
fn future_message_deletes_hierarchy_when_due() {
    let mut sim: TickLoop<DeleteRequest> = TickLoop::new(World::new(), ReconcileConfig::default());
    let session = SessionId::from_raw(1);
    sim.connect_session(session);

    // Build a parent with two children.
    let parent = sim.world_mut().allocate(Some("shuttle")).unwrap();
    let child_a = sim.world_mut().allocate(None).unwrap();
    let child_b = sim.world_mut().allocate(None).unwrap();
    sim.world_mut().attach(child_a, parent).unwrap();
    sim.world_mut().attach(child_b, parent).unwrap();
    let parent_net = sim.world().network_of(parent).unwrap();

    // A message subscriber translates requests into queued deletions.
    let requests: Rc<RefCell<Vec<u64>>> = Rc::new(RefCell::new(Vec::new()));
    let requests2 = Rc::clone(&requests);
    sim.on_message(
        "delete-requests",
        Box::new(move |env: &Envelope<DeleteRequest>| {
            requests2.borrow_mut().push(env.payload.target);
            Ok(())
        }),
    );

    // The request declares tick 10; the clock is at 5.
    sim.advance_to(Tick(5));
    sim.receive(envelope(10, 1, session, parent_net));
    assert!(requests.borrow().is_empty());

    // Not due yet.
    sim.advance_to(Tick(9));
    assert!(requests.borrow().is_empty());
    assert!(sim.world().entity_exists(parent));

    // Due now: the subscriber sees it, and we apply it as a queued delete.
    sim.advance_to(Tick(10));
    let targets: Vec<u64> = requests.borrow_mut().drain(..).collect();
    assert_eq!(targets, vec![parent_net.to_raw()]);
    for target in targets {
        let entity = sim
            .world()
            .entity_of(NetworkId::from_raw(target))
            .unwrap();
        sim.world_mut().queue_delete(entity);
    }

    // The next tick's drain tears down the whole hierarchy.
    let report = sim.advance_to(Tick(11));
    assert_eq!(report.entities_deleted, 1);
    assert!(!sim.world().entity_exists(parent));
    assert!(!sim.world().entity_exists(child_a));
    assert!(!sim.world().entity_exists(child_b));
    assert!(sim.world().entity_of(parent_net).is_err());
    assert_eq!(sim.live_entity_gauge(), 0);
}

#[test]
fn same_message_observed_unscoped_and_session_scoped() {
    let mut sim: TickLoop<DeleteRequest> = TickLoop::new(World::new(), ReconcileConfig::default());
    let chatty = SessionId::from_raw(7);
    let other = SessionId::from_raw(8);
    sim.connect_session(chatty);
    sim.connect_session(other);

    let log = Rc::new(RefCell::new(Vec::new()));
    let log_any = Rc::clone(&log);
    sim.on_message(
        "anyone",
        Box::new(move |env: &Envelope<DeleteRequest>| {
            log_any.borrow_mut().push(format!("any:{}", env.session));
            Ok(())
        }),
    );
    let log_scoped = Rc::clone(&log);
    sim.on_session_message(
        chatty,
        "chatty-only",
        Box::new(move |env: &Envelope<DeleteRequest>| {
            log_scoped.borrow_mut().push(format!("scoped:{}", env.session));
            Ok(())
        }),
    );

    sim.advance_to(Tick(1));
    sim.receive(envelope(1, 1, chatty, NetworkId::from_raw(1)));
    sim.receive(envelope(1, 1, other, NetworkId::from_raw(2)));

    assert_eq!(*log.borrow(), vec!["any:s7", "scoped:s7", "any:s8"]);
}

#[test]
fn lifecycle_and_dirty_tracking_across_ticks() {
    let mut sim: TickLoop<DeleteRequest> = TickLoop::new(World::new(), ReconcileConfig::default());

    sim.advance_to(Tick(1));
    let e = sim.world_mut().allocate(Some("crate")).unwrap();
    sim.world_mut().initialize_and_start(e, true).unwrap();
    assert_eq!(
        sim.world().get::<Metadata>(e).unwrap().stage,
        LifecycleStage::MapInitialized
    );

    // Construction happened at tick 1; stamp a real mutation at tick 2.
    sim.advance_to(Tick(2));
    sim.world_mut().mark_dirty(e).unwrap();
    assert_eq!(sim.world().dirty_since(Tick(2)), vec![e]);

    // Nothing new at tick 3.
    sim.advance_to(Tick(3));
    assert!(sim.world().dirty_since(Tick(3)).is_empty());
}

#[test]
fn descriptive_string_valid_for_just_deleted_entity_within_tick() {
    let mut sim: TickLoop<DeleteRequest> = TickLoop::new(World::new(), ReconcileConfig::default());
    let e = sim.world_mut().allocate(Some("beacon")).unwrap();

    // Delete directly mid-tick; the retired snapshot keeps diagnostics
    // working until the end-of-tick cull.
    sim.world_mut().delete(e).unwrap();
    assert!(sim.world().to_descriptive_string(e).contains("beacon"));

    sim.tick();
    assert!(sim.world().to_descriptive_string(e).contains("unknown"));
}
