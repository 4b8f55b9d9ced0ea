use thiserror::Error;

use crate::types::ClusterId;

pub type CoborrowResult<T> = Result<T, CoborrowError>;

/// Pipeline phase a failure originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Ingest,
    Cluster,
    Mine,
    Derive,
    Aggregate,
    Export,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Ingest => "ingest",
            Phase::Cluster => "cluster",
            Phase::Mine => "mine",
            Phase::Derive => "derive",
            Phase::Aggregate => "aggregate",
            Phase::Export => "export",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum CoborrowError {
    #[error("No usable records during {phase} phase: {detail}")]
    DataUnavailable { phase: Phase, detail: String },

    #[error(
        "Segmentation infeasible: insufficient entities for requested cluster count \
         ({entities} entities, {clusters} clusters requested)"
    )]
    SegmentationInfeasible { entities: usize, clusters: usize },

    #[error("Segmentation infeasible: entity {entity_id} has an all-zero behavior vector")]
    DegenerateVector { entity_id: i64 },

    #[error("No frequent itemsets in {} at min_support={min_support}", describe_cluster(.cluster_id))]
    NoFrequentPatterns {
        cluster_id: Option<ClusterId>,
        min_support: f64,
    },

    #[error("No association rules in {} at min_confidence={min_confidence}", describe_cluster(.cluster_id))]
    NoQualifyingRules {
        cluster_id: Option<ClusterId>,
        min_confidence: f64,
    },

    #[error("Invalid threshold {name}={value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("Invalid itemset key: {0}")]
    InvalidItemsetKey(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CoborrowError {
    /// True for failures that are local to one cluster round and must not
    /// abort the whole run.
    pub fn is_cluster_local(&self) -> bool {
        matches!(
            self,
            CoborrowError::NoFrequentPatterns { .. } | CoborrowError::NoQualifyingRules { .. }
        )
    }
}

fn describe_cluster(cluster_id: &Option<ClusterId>) -> String {
    match cluster_id {
        Some(id) => format!("cluster {id}"),
        None => "unsegmented basket".to_string(),
    }
}

impl From<config::ConfigError> for CoborrowError {
    fn from(err: config::ConfigError) -> Self {
        CoborrowError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_context() {
        let err = CoborrowError::NoFrequentPatterns {
            cluster_id: Some(2),
            min_support: 0.4,
        };
        assert_eq!(
            err.to_string(),
            "No frequent itemsets in cluster 2 at min_support=0.4"
        );

        let err = CoborrowError::SegmentationInfeasible {
            entities: 2,
            clusters: 3,
        };
        assert!(err.to_string().contains("insufficient entities"));

        let err = CoborrowError::NoQualifyingRules {
            cluster_id: None,
            min_confidence: 0.9,
        };
        assert!(err.to_string().contains("unsegmented basket"));
    }

    #[test]
    fn test_cluster_local_classification() {
        assert!(CoborrowError::NoQualifyingRules {
            cluster_id: Some(0),
            min_confidence: 0.5
        }
        .is_cluster_local());
        assert!(!CoborrowError::DataUnavailable {
            phase: Phase::Ingest,
            detail: "empty".into()
        }
        .is_cluster_local());
    }
}
