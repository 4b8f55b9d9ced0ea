//! File-backed store under a single data directory.
//!
//! `events.json` holds raw borrow records; only completed borrows (with a
//! return date) become events. The cluster assignment and rule set of a run
//! share one `results.json`, written through a temp file in the same
//! directory and then renamed. Readers see either the previous run's
//! results or the new ones, never a mix.

use chrono::NaiveDate;
use coborrow_core::types::{ClusterAssignment, ClusteredEvent, EntityId, Event, ItemId, Itemset, RuleSetDocument};
use coborrow_core::{CoborrowError, CoborrowResult, Phase};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::traits::{join_clusters, EventSource, ResultReader, ResultSink};

pub const EVENTS_FILE: &str = "events.json";
pub const RESULTS_FILE: &str = "results.json";

/// One row of the borrow log as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowRecord {
    pub entity_id: EntityId,
    pub item_id: ItemId,
    pub borrowed_on: NaiveDate,
    #[serde(default)]
    pub returned_on: Option<NaiveDate>,
}

impl BorrowRecord {
    pub fn is_completed(&self) -> bool {
        self.returned_on.is_some()
    }

    fn into_event(self) -> Event {
        Event {
            entity_id: self.entity_id,
            item_id: self.item_id,
            date: self.borrowed_on,
        }
    }
}

/// On-disk layout of `results.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredResults {
    #[serde(default)]
    assignment: Option<ClusterAssignment>,
    rules: RuleSetDocument,
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Overwrite the borrow log. Used for seeding and by tests.
    pub fn write_records(&self, records: &[BorrowRecord]) -> CoborrowResult<()> {
        self.write_document(EVENTS_FILE, records)
    }

    fn read_records(&self) -> CoborrowResult<Vec<BorrowRecord>> {
        self.read_document(EVENTS_FILE)?
            .ok_or_else(|| CoborrowError::DataUnavailable {
                phase: Phase::Ingest,
                detail: format!("{} not found", self.path(EVENTS_FILE).display()),
            })
    }

    fn read_results(&self) -> CoborrowResult<Option<StoredResults>> {
        self.read_document(RESULTS_FILE)
    }

    fn path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    fn read_document<T: DeserializeOwned>(&self, file: &str) -> CoborrowResult<Option<T>> {
        let path = self.path(file);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(persistence(&path, e)),
        };
        let doc = serde_json::from_slice(&raw)?;
        Ok(Some(doc))
    }

    fn write_document<T: Serialize + ?Sized>(&self, file: &str, doc: &T) -> CoborrowResult<()> {
        let path = self.path(file);
        std::fs::create_dir_all(&self.data_dir).map_err(|e| persistence(&self.data_dir, e))?;

        let body = serde_json::to_vec_pretty(doc)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.data_dir).map_err(|e| persistence(&path, e))?;
        tmp.write_all(&body).map_err(|e| persistence(&path, e))?;
        tmp.as_file().sync_all().map_err(|e| persistence(&path, e))?;
        tmp.persist(&path).map_err(|e| persistence(&path, e.error))?;

        debug!(path = %path.display(), bytes = body.len(), "Replaced document");
        Ok(())
    }
}

fn persistence(path: &Path, err: std::io::Error) -> CoborrowError {
    CoborrowError::Persistence(format!("{}: {err}", path.display()))
}

impl EventSource for JsonFileStore {
    fn fetch_events(&self) -> CoborrowResult<Vec<Event>> {
        let records = self.read_records()?;
        let total = records.len();
        let events: Vec<Event> = records
            .into_iter()
            .filter(BorrowRecord::is_completed)
            .map(BorrowRecord::into_event)
            .collect();

        info!(
            records = total,
            completed = events.len(),
            "Loaded borrow records"
        );
        Ok(events)
    }

    fn fetch_clustered_events(&self) -> CoborrowResult<Vec<ClusteredEvent>> {
        let assignment = self
            .load_assignments()?
            .ok_or_else(|| CoborrowError::DataUnavailable {
                phase: Phase::Ingest,
                detail: "no persisted cluster assignment".to_string(),
            })?;
        let events = self.fetch_events()?;
        Ok(join_clusters(&events, &assignment))
    }

    fn fetch_history(&self, entity_id: EntityId) -> CoborrowResult<Itemset> {
        Ok(self
            .read_records()?
            .into_iter()
            .filter(|record| record.entity_id == entity_id)
            .map(|record| record.item_id)
            .collect())
    }
}

impl ResultSink for JsonFileStore {
    fn replace_results(&self, assignment: Option<&ClusterAssignment>, rules: &RuleSetDocument) -> CoborrowResult<()> {
        let assignment = match assignment {
            Some(assignment) => Some(assignment.clone()),
            None => self.read_results()?.and_then(|stored| stored.assignment),
        };
        self.write_document(
            RESULTS_FILE,
            &StoredResults {
                assignment,
                rules: rules.clone(),
            },
        )
    }
}

impl ResultReader for JsonFileStore {
    fn load_rules(&self) -> CoborrowResult<Option<RuleSetDocument>> {
        Ok(self.read_results()?.map(|stored| stored.rules))
    }

    fn load_assignments(&self) -> CoborrowResult<Option<ClusterAssignment>> {
        Ok(self.read_results()?.and_then(|stored| stored.assignment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coborrow_core::types::{AggregatedRule, Thresholds};
    use std::collections::BTreeMap;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn empty_rules() -> RuleSetDocument {
        let thresholds = Thresholds {
            min_support: 0.4,
            min_confidence: 0.5,
        };
        RuleSetDocument::new(uuid::Uuid::new_v4(), thresholds, &[])
    }

    fn record(entity_id: i64, item_id: i64, returned: bool) -> BorrowRecord {
        BorrowRecord {
            entity_id,
            item_id,
            borrowed_on: date(1),
            returned_on: returned.then(|| date(10)),
        }
    }

    #[test]
    fn test_only_completed_borrows_are_events() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store
            .write_records(&[record(1, 10, true), record(1, 11, false), record(2, 10, true)])
            .unwrap();

        let events = store.fetch_events().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.item_id == 10));
    }

    #[test]
    fn test_missing_event_log_is_data_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let err = store.fetch_events().unwrap_err();
        assert!(matches!(err, CoborrowError::DataUnavailable { phase: Phase::Ingest, .. }));
    }

    #[test]
    fn test_returned_on_defaults_to_open_borrow() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(EVENTS_FILE),
            r#"[{"entity_id": 4, "item_id": 7, "borrowed_on": "2024-03-02"}]"#,
        )
        .unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.fetch_events().unwrap().is_empty());
    }

    #[test]
    fn test_results_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested"));
        assert!(store.load_rules().unwrap().is_none());

        let assignment = ClusterAssignment {
            n_clusters: 2,
            seed: 42,
            inertia: 0.5,
            assignments: BTreeMap::from([(1, 0), (2, 1)]),
        };

        let rule = AggregatedRule {
            cluster_id: Some(1),
            antecedent: [10].into_iter().collect(),
            consequent: [11, 12].into_iter().collect(),
            confidence: 0.75,
            support: 0.5,
        };
        let thresholds = Thresholds {
            min_support: 0.4,
            min_confidence: 0.5,
        };
        let doc = RuleSetDocument::new(uuid::Uuid::new_v4(), thresholds, &[rule.clone()]);
        store.replace_results(Some(&assignment), &doc).unwrap();

        assert_eq!(store.load_assignments().unwrap(), Some(assignment));
        let loaded = store.load_rules().unwrap().unwrap();
        assert_eq!(loaded.rules[0].antecedent, "10");
        assert_eq!(loaded.rules[0].consequent, "11,12");
        assert_eq!(loaded.aggregated_rules().unwrap(), vec![rule]);
    }

    #[test]
    fn test_clustered_events_join_assignment() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store
            .write_records(&[record(1, 10, true), record(2, 11, true), record(3, 12, true)])
            .unwrap();
        assert!(store.fetch_clustered_events().is_err());

        let assignment = ClusterAssignment {
            n_clusters: 2,
            seed: 1,
            inertia: 0.0,
            assignments: BTreeMap::from([(1, 0), (2, 1)]),
        };
        store.replace_results(Some(&assignment), &empty_rules()).unwrap();
        let joined = store.fetch_clustered_events().unwrap();
        // entity 3 has no cluster
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[1].cluster_id, 1);
    }

    #[test]
    fn test_rules_only_write_keeps_assignment() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let assignment = ClusterAssignment {
            n_clusters: 2,
            seed: 7,
            inertia: 0.0,
            assignments: BTreeMap::from([(1, 0), (2, 1)]),
        };
        store.replace_results(Some(&assignment), &empty_rules()).unwrap();

        let rerun = empty_rules();
        store.replace_results(None, &rerun).unwrap();
        assert_eq!(store.load_rules().unwrap().unwrap().run_id, rerun.run_id);
        assert_eq!(store.load_assignments().unwrap().unwrap().assignments, assignment.assignments);
        // one document holds both parts
        assert!(dir.path().join(RESULTS_FILE).is_file());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_history_includes_open_loans() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store
            .write_records(&[record(1, 10, true), record(1, 11, false), record(2, 12, false)])
            .unwrap();

        assert_eq!(store.fetch_history(1).unwrap(), [10, 11].into_iter().collect::<Itemset>());
        assert_eq!(store.fetch_events().unwrap().len(), 1);
    }
}
