//! The mandatory per-entity metadata component and the lifecycle stages.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::Tick;

// ---------------------------------------------------------------------------
// LifecycleStage
// ---------------------------------------------------------------------------

/// The stage an entity occupies between allocation and deletion.
///
/// Stages are strictly ordered and monotonic per entity: no sequence of valid
/// operations moves an entity backward. The terminal branch
/// `Terminating -> Deleted` is reachable from any non-deleted stage, so
/// deletion may be requested immediately after allocation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum LifecycleStage {
    /// Freshly allocated; mandatory components exist, nothing else does yet.
    Allocated,
    /// Initialize hooks are currently running.
    Initializing,
    /// All initialize hooks completed.
    Initialized,
    /// Start hooks are currently running.
    Starting,
    /// All start hooks completed.
    Started,
    /// The one-shot map-init event has fired.
    MapInitialized,
    /// Flagged for teardown; the termination walk has visited this entity.
    Terminating,
    /// Fully torn down. Nothing survives past this stage.
    Deleted,
}

impl LifecycleStage {
    /// Whether the entity is in the terminal branch.
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleStage::Terminating | LifecycleStage::Deleted)
    }

    /// Whether construction (allocate/initialize) is still in progress.
    /// Mutations during construction are not replication-relevant.
    pub fn in_construction(self) -> bool {
        self <= LifecycleStage::Initializing
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Per-entity bookkeeping record.
///
/// Exists for every live entity from allocation to deletion and is the last
/// component removed during teardown. The `Deleted` event carries a clone of
/// this record as a final snapshot, since the component itself is about to
/// vanish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Current lifecycle stage.
    pub stage: LifecycleStage,
    /// Set exactly once, during the delete phase of the termination walk.
    pub deleted: bool,
    /// Paused entities are skipped by gameplay systems; the runtime itself
    /// does not consult this flag.
    pub paused: bool,
    /// Tick of the most recent replication-relevant mutation.
    pub last_modified_tick: Tick,
    /// The prototype this entity was built from, if any.
    pub prototype: Option<String>,
    /// Short human-readable name.
    pub name: String,
    /// Longer free-form description.
    pub description: String,
}

impl Metadata {
    /// Fresh metadata for a just-allocated entity.
    pub fn new(prototype: Option<String>, tick: Tick) -> Self {
        let name = prototype.clone().unwrap_or_else(|| "entity".to_owned());
        Self {
            stage: LifecycleStage::Allocated,
            deleted: false,
            paused: false,
            last_modified_tick: tick,
            prototype,
            name,
            description: String::new(),
        }
    }
}

impl Component for Metadata {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_is_monotonic() {
        use LifecycleStage::*;
        let forward = [
            Allocated,
            Initializing,
            Initialized,
            Starting,
            Started,
            MapInitialized,
            Terminating,
            Deleted,
        ];
        for pair in forward.windows(2) {
            assert!(pair[0] < pair[1], "{:?} should precede {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn construction_window() {
        assert!(LifecycleStage::Allocated.in_construction());
        assert!(LifecycleStage::Initializing.in_construction());
        assert!(!LifecycleStage::Initialized.in_construction());
        assert!(!LifecycleStage::Started.in_construction());
    }

    #[test]
    fn metadata_defaults_from_prototype() {
        let meta = Metadata::new(Some("door".to_owned()), Tick(4));
        assert_eq!(meta.stage, LifecycleStage::Allocated);
        assert_eq!(meta.name, "door");
        assert_eq!(meta.last_modified_tick, Tick(4));
        assert!(!meta.deleted);
    }
}
