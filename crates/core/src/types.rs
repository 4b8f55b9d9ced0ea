use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::error::{CoborrowError, CoborrowResult};

pub type EntityId = i64;
pub type ItemId = i64;
pub type ClusterId = u32;

/// A set of items. Ordered so every itemset has one canonical form.
pub type Itemset = BTreeSet<ItemId>;

/// Separator used by the canonical itemset key.
pub const ITEMSET_KEY_SEPARATOR: char = ',';

/// One completed borrow: a patron took an item on a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub entity_id: EntityId,
    pub item_id: ItemId,
    pub date: NaiveDate,
}

/// An event joined with the cluster of its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusteredEvent {
    pub entity_id: EntityId,
    pub item_id: ItemId,
    pub date: NaiveDate,
    pub cluster_id: ClusterId,
}

impl ClusteredEvent {
    pub fn event(&self) -> Event {
        Event {
            entity_id: self.entity_id,
            item_id: self.item_id,
            date: self.date,
        }
    }
}

/// Transaction grouping key: everything one entity took on one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionKey {
    pub entity_id: EntityId,
    pub date: NaiveDate,
}

/// Entity to cluster mapping produced by the segmentation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub n_clusters: usize,
    pub seed: u64,
    /// Within-cluster sum of squared distances of the winning trial.
    pub inertia: f64,
    pub assignments: BTreeMap<EntityId, ClusterId>,
}

impl ClusterAssignment {
    pub fn cluster_of(&self, entity_id: EntityId) -> Option<ClusterId> {
        self.assignments.get(&entity_id).copied()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Entities grouped by cluster, clusters and entities ascending.
    pub fn members(&self) -> BTreeMap<ClusterId, Vec<EntityId>> {
        let mut members: BTreeMap<ClusterId, Vec<EntityId>> = BTreeMap::new();
        for (&entity_id, &cluster_id) in &self.assignments {
            members.entry(cluster_id).or_default().push(entity_id);
        }
        members
    }
}

/// An itemset whose support met the mining threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequentItemset {
    pub items: Itemset,
    pub support: f64,
}

/// Directional rule `antecedent => consequent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationRule {
    pub antecedent: Itemset,
    pub consequent: Itemset,
    /// support(antecedent ∪ consequent) / support(antecedent)
    pub confidence: f64,
    /// support(antecedent ∪ consequent)
    pub support: f64,
    /// confidence / support(consequent)
    pub lift: f64,
}

/// A rule together with the segment it was mined in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedRule {
    pub cluster_id: Option<ClusterId>,
    pub rule: AssociationRule,
}

/// All rules of one segment sharing an antecedent, consequents unioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRule {
    pub cluster_id: Option<ClusterId>,
    pub antecedent: Itemset,
    pub consequent: Itemset,
    pub confidence: f64,
    pub support: f64,
}

impl AggregatedRule {
    pub fn antecedent_key(&self) -> String {
        encode_itemset(&self.antecedent)
    }

    pub fn to_export(&self) -> ExportedRule {
        ExportedRule {
            cluster_id: self.cluster_id,
            antecedent: encode_itemset(&self.antecedent),
            consequent: encode_itemset(&self.consequent),
            confidence: self.confidence,
            support: self.support,
        }
    }
}

/// Store row for an aggregated rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedRule {
    pub cluster_id: Option<ClusterId>,
    pub antecedent: String,
    pub consequent: String,
    pub confidence: f64,
    pub support: f64,
}

impl ExportedRule {
    pub fn to_aggregated(&self) -> CoborrowResult<AggregatedRule> {
        Ok(AggregatedRule {
            cluster_id: self.cluster_id,
            antecedent: decode_itemset(&self.antecedent)?,
            consequent: decode_itemset(&self.consequent)?,
            confidence: self.confidence,
            support: self.support,
        })
    }
}

/// Mining thresholds a rule set was produced with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub min_support: f64,
    pub min_confidence: f64,
}

impl Thresholds {
    /// min_support must lie in (0, 1], min_confidence in [0, 1].
    pub fn validate(&self) -> CoborrowResult<()> {
        if !(self.min_support > 0.0 && self.min_support <= 1.0) {
            return Err(CoborrowError::InvalidThreshold {
                name: "min_support",
                value: self.min_support,
            });
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(CoborrowError::InvalidThreshold {
                name: "min_confidence",
                value: self.min_confidence,
            });
        }
        Ok(())
    }
}

/// Complete rule set written by one run. Replaces whatever was stored before.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetDocument {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub thresholds: Thresholds,
    pub rules: Vec<ExportedRule>,
}

impl RuleSetDocument {
    pub fn new(run_id: Uuid, thresholds: Thresholds, rules: &[AggregatedRule]) -> Self {
        Self {
            run_id,
            generated_at: Utc::now(),
            thresholds,
            rules: rules.iter().map(AggregatedRule::to_export).collect(),
        }
    }

    pub fn aggregated_rules(&self) -> CoborrowResult<Vec<AggregatedRule>> {
        self.rules.iter().map(ExportedRule::to_aggregated).collect()
    }
}

/// Canonical key for an itemset: items ascending, comma separated.
pub fn encode_itemset(items: &Itemset) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Inverse of [`encode_itemset`]. Surrounding whitespace per item is tolerated.
pub fn decode_itemset(key: &str) -> CoborrowResult<Itemset> {
    if key.trim().is_empty() {
        return Err(CoborrowError::InvalidItemsetKey("empty key".to_string()));
    }
    key.split(ITEMSET_KEY_SEPARATOR)
        .map(|part| {
            part.trim()
                .parse::<ItemId>()
                .map_err(|_| CoborrowError::InvalidItemsetKey(format!("{key:?}: bad item {part:?}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[ItemId]) -> Itemset {
        items.iter().copied().collect()
    }

    #[test]
    fn test_itemset_key_is_sorted() {
        let items: Itemset = [12, 3, 7].into_iter().collect();
        assert_eq!(encode_itemset(&items), "3,7,12");
        assert_eq!(decode_itemset("3,7,12").unwrap(), items);
        assert_eq!(decode_itemset(" 12, 3 ,7").unwrap(), items);
    }

    #[test]
    fn test_itemset_key_rejects_garbage() {
        assert!(decode_itemset("").is_err());
        assert!(decode_itemset("1,,2").is_err());
        assert!(decode_itemset("1,x").is_err());
    }

    #[test]
    fn test_threshold_validation() {
        let ok = Thresholds {
            min_support: 1.0,
            min_confidence: 0.0,
        };
        assert!(ok.validate().is_ok());

        let zero_support = Thresholds {
            min_support: 0.0,
            min_confidence: 0.5,
        };
        assert!(matches!(
            zero_support.validate(),
            Err(CoborrowError::InvalidThreshold { name: "min_support", .. })
        ));

        let nan_confidence = Thresholds {
            min_support: 0.5,
            min_confidence: f64::NAN,
        };
        assert!(nan_confidence.validate().is_err());
    }

    #[test]
    fn test_exported_rule_conversion() {
        let rule = AggregatedRule {
            cluster_id: Some(1),
            antecedent: set(&[5, 2]),
            consequent: set(&[9]),
            confidence: 0.75,
            support: 0.5,
        };
        let exported = rule.to_export();
        assert_eq!(exported.antecedent, "2,5");
        assert_eq!(exported.consequent, "9");
        assert_eq!(exported.to_aggregated().unwrap(), rule);
    }

    #[test]
    fn test_assignment_members() {
        let assignment = ClusterAssignment {
            n_clusters: 2,
            seed: 42,
            inertia: 0.0,
            assignments: [(10, 1), (4, 0), (7, 1)].into_iter().collect(),
        };
        let members = assignment.members();
        assert_eq!(members[&0], vec![4]);
        assert_eq!(members[&1], vec![7, 10]);
        assert_eq!(assignment.cluster_of(7), Some(1));
        assert_eq!(assignment.cluster_of(99), None);
    }
}
