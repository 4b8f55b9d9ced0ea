//! In-process store. Used by tests and for embedding the pipeline in a
//! host that already holds its records in memory.

use coborrow_core::types::{ClusterAssignment, ClusteredEvent, EntityId, Event, Itemset, RuleSetDocument};
use coborrow_core::{CoborrowError, CoborrowResult, Phase};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::traits::{join_clusters, EventSource, ResultReader, ResultSink};

#[derive(Default)]
struct State {
    events: Vec<Event>,
    /// Borrows not yet returned. Never mined, only part of history.
    open_loans: Vec<Event>,
    assignment: Option<ClusterAssignment>,
    rules: Option<RuleSetDocument>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    reject_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<Event>) -> Self {
        Self {
            state: RwLock::new(State {
                events,
                ..State::default()
            }),
            reject_writes: AtomicBool::new(false),
        }
    }

    pub fn set_events(&self, events: Vec<Event>) {
        self.state.write().events = events;
    }

    pub fn set_open_loans(&self, open_loans: Vec<Event>) {
        self.state.write().open_loans = open_loans;
    }

    /// Make every subsequent write fail, as an unreachable store would.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub fn assignment(&self) -> Option<ClusterAssignment> {
        self.state.read().assignment.clone()
    }

    pub fn rules(&self) -> Option<RuleSetDocument> {
        self.state.read().rules.clone()
    }

    fn check_writable(&self) -> CoborrowResult<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(CoborrowError::Persistence("memory store rejected the write".to_string()));
        }
        Ok(())
    }
}

impl EventSource for MemoryStore {
    fn fetch_events(&self) -> CoborrowResult<Vec<Event>> {
        Ok(self.state.read().events.clone())
    }

    fn fetch_clustered_events(&self) -> CoborrowResult<Vec<ClusteredEvent>> {
        let state = self.state.read();
        let assignment = state.assignment.as_ref().ok_or_else(|| CoborrowError::DataUnavailable {
            phase: Phase::Ingest,
            detail: "no persisted cluster assignment".to_string(),
        })?;
        Ok(join_clusters(&state.events, assignment))
    }

    fn fetch_history(&self, entity_id: EntityId) -> CoborrowResult<Itemset> {
        let state = self.state.read();
        Ok(state
            .events
            .iter()
            .chain(&state.open_loans)
            .filter(|e| e.entity_id == entity_id)
            .map(|e| e.item_id)
            .collect())
    }
}

impl ResultSink for MemoryStore {
    fn replace_results(&self, assignment: Option<&ClusterAssignment>, rules: &RuleSetDocument) -> CoborrowResult<()> {
        self.check_writable()?;
        let mut state = self.state.write();
        if let Some(assignment) = assignment {
            state.assignment = Some(assignment.clone());
        }
        state.rules = Some(rules.clone());
        Ok(())
    }
}

impl ResultReader for MemoryStore {
    fn load_rules(&self) -> CoborrowResult<Option<RuleSetDocument>> {
        Ok(self.rules())
    }

    fn load_assignments(&self) -> CoborrowResult<Option<ClusterAssignment>> {
        Ok(self.assignment())
    }
}
