//! Property tests for network message reconciliation.
//!
//! Random batches of future-dated messages must always drain in
//! non-decreasing (source tick, sequence) order as the clock advances, and
//! per-session watermarks must never move backwards regardless of the
//! arrival order.

use orrery_engine::prelude::*;
use proptest::prelude::*;

fn envelope(tick: u64, sequence: u64, session: SessionId) -> Envelope<u32> {
    Envelope {
        source_tick: Tick(tick),
        sequence,
        session,
        payload: 0,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    /// Buffered messages release in strict (tick, sequence) order and each
    /// releases exactly once, at the first tick at or past its source tick.
    #[test]
    fn buffered_messages_release_in_order(
        messages in prop::collection::vec((1u64..20, 0u64..100), 1..40),
    ) {
        let mut queue: ReconcileQueue<u32> = ReconcileQueue::new(ReconcileConfig::default());
        let session = SessionId::from_raw(1);
        queue.connect(session);

        // Everything is in the future relative to tick 0, so everything
        // buffers.
        for &(tick, sequence) in &messages {
            prop_assert!(queue.submit(envelope(tick, sequence, session), Tick(0)).is_none());
        }
        prop_assert_eq!(queue.buffered_len(), messages.len());

        let mut drained: Vec<(u64, u64)> = Vec::new();
        for now in 1..=20u64 {
            for env in queue.release_due(Tick(now)) {
                // Nothing releases before its source tick, and nothing is
                // held past it.
                prop_assert!(env.source_tick.0 <= now);
                prop_assert!(env.source_tick.0 > now - 1);
                drained.push((env.source_tick.0, env.sequence));
            }
        }

        prop_assert_eq!(drained.len(), messages.len());
        for pair in drained.windows(2) {
            prop_assert!(pair[0] <= pair[1], "released out of order: {pair:?}");
        }
    }

    /// The watermark equals the maximum sequence processed so far and never
    /// decreases, even when lower sequences dispatch after higher ones.
    #[test]
    fn watermark_is_monotonic(sequences in prop::collection::vec(0u64..1000, 1..50)) {
        let mut queue: ReconcileQueue<u32> = ReconcileQueue::new(ReconcileConfig::default());
        let session = SessionId::from_raw(1);
        queue.connect(session);

        let mut high = 0u64;
        for (i, &sequence) in sequences.iter().enumerate() {
            let now = Tick(i as u64 + 1);
            let out = queue.submit(envelope(now.0, sequence, session), now);
            // Due messages always dispatch, watermark or not.
            prop_assert!(out.is_some());
            high = high.max(sequence);
            prop_assert_eq!(queue.watermark(session), Some(high));
        }
    }

    /// Messages split across sessions never leak: disconnecting one session
    /// drops exactly its messages and leaves the other session's stream
    /// intact and ordered.
    #[test]
    fn disconnect_only_drops_that_session(
        messages in prop::collection::vec((1u64..10, 0u64..50, prop::bool::ANY), 1..30),
    ) {
        let mut queue: ReconcileQueue<u32> = ReconcileQueue::new(ReconcileConfig::default());
        let keep = SessionId::from_raw(1);
        let drop_me = SessionId::from_raw(2);
        queue.connect(keep);
        queue.connect(drop_me);

        let mut expected_kept = 0usize;
        for &(tick, sequence, to_keep) in &messages {
            let session = if to_keep { keep } else { drop_me };
            if to_keep {
                expected_kept += 1;
            }
            queue.submit(envelope(tick, sequence, session), Tick(0));
        }
        queue.disconnect(drop_me);

        let released = queue.release_due(Tick(10));
        prop_assert_eq!(released.len(), expected_kept);
        for env in &released {
            prop_assert_eq!(env.session, keep);
        }
    }
}
