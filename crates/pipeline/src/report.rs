//! What a run produced, including the parts that went wrong without
//! aborting it.

use coborrow_core::types::{AggregatedRule, ClusterAssignment, ClusterId};
use coborrow_core::CoborrowError;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Cluster first, then mine each cluster.
    Segmented,
    /// Mine the whole basket once.
    Unsegmented,
    /// Mine with a previously persisted assignment.
    FromAssignments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoFrequentPatterns,
    NoQualifyingRules,
}

/// A cluster round that ended without rules.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSkip {
    pub cluster_id: Option<ClusterId>,
    pub reason: SkipReason,
    /// The threshold that nothing met.
    pub threshold: f64,
}

impl ClusterSkip {
    /// `None` for errors that are not local to a cluster round.
    pub fn from_error(err: &CoborrowError) -> Option<Self> {
        match *err {
            CoborrowError::NoFrequentPatterns {
                cluster_id,
                min_support,
            } => Some(Self {
                cluster_id,
                reason: SkipReason::NoFrequentPatterns,
                threshold: min_support,
            }),
            CoborrowError::NoQualifyingRules {
                cluster_id,
                min_confidence,
            } => Some(Self {
                cluster_id,
                reason: SkipReason::NoQualifyingRules,
                threshold: min_confidence,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportStatus {
    Written,
    Failed { reason: String },
}

impl ExportStatus {
    pub fn is_written(&self) -> bool {
        matches!(self, ExportStatus::Written)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhaseCounts {
    pub events: usize,
    pub transactions: usize,
    pub entities: usize,
    pub clusters_mined: usize,
    pub itemsets: usize,
    pub rules_derived: usize,
    pub rules_aggregated: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub counts: PhaseCounts,
    /// Present when this run produced a new assignment.
    pub assignment: Option<ClusterAssignment>,
    pub rules: Vec<AggregatedRule>,
    pub skipped: Vec<ClusterSkip>,
    pub export: ExportStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_from_local_errors_only() {
        let skip = ClusterSkip::from_error(&CoborrowError::NoFrequentPatterns {
            cluster_id: Some(2),
            min_support: 0.4,
        })
        .unwrap();
        assert_eq!(skip.cluster_id, Some(2));
        assert_eq!(skip.reason, SkipReason::NoFrequentPatterns);
        assert_eq!(skip.threshold, 0.4);

        let skip = ClusterSkip::from_error(&CoborrowError::NoQualifyingRules {
            cluster_id: None,
            min_confidence: 0.5,
        })
        .unwrap();
        assert_eq!(skip.reason, SkipReason::NoQualifyingRules);

        assert!(ClusterSkip::from_error(&CoborrowError::Persistence("down".into())).is_none());
    }

    #[test]
    fn test_export_status_is_written() {
        let failed = ExportStatus::Failed {
            reason: "disk full".to_string(),
        };
        assert!(!failed.is_written());
        assert!(ExportStatus::Written.is_written());
    }
}
