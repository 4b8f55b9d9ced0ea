//! Store boundaries the pipeline talks to. Implementations decide where
//! records live. Every write replaces the previous contents wholesale.

use coborrow_core::types::{ClusterAssignment, ClusteredEvent, EntityId, Event, Itemset, RuleSetDocument};
use coborrow_core::CoborrowResult;

/// Source of completed borrow events.
pub trait EventSource: Send + Sync {
    /// All completed events. An empty collection is valid.
    fn fetch_events(&self) -> CoborrowResult<Vec<Event>>;

    /// Events joined with the persisted cluster of their entity. Fails when
    /// no cluster assignment has been stored yet.
    fn fetch_clustered_events(&self) -> CoborrowResult<Vec<ClusteredEvent>>;

    /// Every item the entity has borrowed, open loans included.
    fn fetch_history(&self, entity_id: EntityId) -> CoborrowResult<Itemset>;
}

/// Destination for run results.
pub trait ResultSink: Send + Sync {
    /// Replace the stored results of the previous run in one step.
    ///
    /// With `assignment` set, it replaces the stored assignment together
    /// with the rules. With `None`, the stored assignment is kept. Either
    /// both parts land or neither does.
    fn replace_results(&self, assignment: Option<&ClusterAssignment>, rules: &RuleSetDocument) -> CoborrowResult<()>;
}

/// Read access to the most recently exported results.
pub trait ResultReader: Send + Sync {
    fn load_rules(&self) -> CoborrowResult<Option<RuleSetDocument>>;

    fn load_assignments(&self) -> CoborrowResult<Option<ClusterAssignment>>;
}

/// Join events with an assignment, dropping events of unassigned entities.
pub(crate) fn join_clusters(events: &[Event], assignment: &ClusterAssignment) -> Vec<ClusteredEvent> {
    events
        .iter()
        .filter_map(|event| {
            assignment
                .cluster_of(event.entity_id)
                .map(|cluster_id| ClusteredEvent {
                    entity_id: event.entity_id,
                    item_id: event.item_id,
                    date: event.date,
                    cluster_id,
                })
        })
        .collect()
}
