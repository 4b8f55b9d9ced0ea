//! Rule aggregation: one entry per `(cluster, antecedent)`.
//!
//! Consequents of rules sharing a key are unioned. The confidence and
//! support reported for the entry come from its strongest rule: highest
//! confidence, then highest support, then the smallest consequent. That
//! choice depends only on the set of rules, never on arrival order, so
//! per-cluster results can be merged in any order.

use coborrow_core::types::{AggregatedRule, AssociationRule, ClusterId, Itemset, TaggedRule};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Group {
    consequent: Itemset,
    confidence: f64,
    support: f64,
    representative: Itemset,
}

impl Group {
    fn new(rule: &AssociationRule) -> Self {
        Self {
            consequent: rule.consequent.clone(),
            confidence: rule.confidence,
            support: rule.support,
            representative: rule.consequent.clone(),
        }
    }

    fn merge(&mut self, rule: &AssociationRule) {
        self.consequent.extend(rule.consequent.iter().copied());
        if outranks(rule, self) {
            self.confidence = rule.confidence;
            self.support = rule.support;
            self.representative = rule.consequent.clone();
        }
    }
}

fn outranks(rule: &AssociationRule, group: &Group) -> bool {
    let order = rule
        .confidence
        .total_cmp(&group.confidence)
        .then_with(|| rule.support.total_cmp(&group.support))
        .then_with(|| group.representative.cmp(&rule.consequent));
    order == Ordering::Greater
}

/// Accumulates tagged rules and emits aggregated entries.
#[derive(Debug, Default)]
pub struct RuleAggregator {
    groups: BTreeMap<(Option<ClusterId>, Itemset), Group>,
    n_rules: usize,
}

impl RuleAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, cluster_id: Option<ClusterId>, rule: &AssociationRule) {
        self.n_rules += 1;
        let key = (cluster_id, rule.antecedent.clone());
        self.groups
            .entry(key)
            .and_modify(|group| group.merge(rule))
            .or_insert_with(|| Group::new(rule));
    }

    pub fn add_tagged(&mut self, tagged: &TaggedRule) {
        self.add(tagged.cluster_id, &tagged.rule);
    }

    /// Rules seen so far, before merging.
    pub fn rules_seen(&self) -> usize {
        self.n_rules
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Entries ordered by cluster, then antecedent items compared
    /// numerically.
    pub fn finish(self) -> Vec<AggregatedRule> {
        self.groups
            .into_iter()
            .map(|((cluster_id, antecedent), group)| AggregatedRule {
                cluster_id,
                antecedent,
                consequent: group.consequent,
                confidence: group.confidence,
                support: group.support,
            })
            .collect()
    }
}

impl<'a> Extend<&'a TaggedRule> for RuleAggregator {
    fn extend<T: IntoIterator<Item = &'a TaggedRule>>(&mut self, iter: T) {
        for tagged in iter {
            self.add_tagged(tagged);
        }
    }
}

/// Aggregate a whole rule stream in one call.
pub fn aggregate<'a, I>(rules: I) -> Vec<AggregatedRule>
where
    I: IntoIterator<Item = &'a TaggedRule>,
{
    let mut aggregator = RuleAggregator::new();
    aggregator.extend(rules);
    aggregator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use coborrow_core::types::ItemId;

    fn set(items: &[ItemId]) -> Itemset {
        items.iter().copied().collect()
    }

    fn tagged(cluster_id: Option<ClusterId>, a: &[ItemId], c: &[ItemId], confidence: f64, support: f64) -> TaggedRule {
        TaggedRule {
            cluster_id,
            rule: AssociationRule {
                antecedent: set(a),
                consequent: set(c),
                confidence,
                support,
                lift: 1.0,
            },
        }
    }

    #[test]
    fn test_consequents_are_unioned_within_cluster() {
        let rules = vec![
            tagged(Some(0), &[1], &[2], 0.6, 0.3),
            tagged(Some(0), &[1], &[3], 0.9, 0.2),
            tagged(Some(0), &[1], &[2, 4], 0.7, 0.25),
        ];
        let out = aggregate(&rules);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].antecedent, set(&[1]));
        assert_eq!(out[0].consequent, set(&[2, 3, 4]));
        // strongest rule supplies the numbers
        assert_eq!(out[0].confidence, 0.9);
        assert_eq!(out[0].support, 0.2);
    }

    #[test]
    fn test_same_antecedent_in_two_clusters_stays_separate() {
        let rules = vec![
            tagged(Some(0), &[1], &[2], 0.6, 0.3),
            tagged(Some(1), &[1], &[5], 0.8, 0.4),
        ];
        let out = aggregate(&rules);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].cluster_id, Some(0));
        assert_eq!(out[0].consequent, set(&[2]));
        assert_eq!(out[1].cluster_id, Some(1));
        assert_eq!(out[1].consequent, set(&[5]));
    }

    #[test]
    fn test_order_independent() {
        let rules = vec![
            tagged(Some(0), &[1], &[2], 0.8, 0.3),
            tagged(Some(0), &[1], &[3], 0.8, 0.4),
            tagged(Some(0), &[1], &[4], 0.8, 0.4),
            tagged(Some(1), &[2, 1], &[3], 0.5, 0.5),
            tagged(None, &[7], &[8], 1.0, 0.1),
        ];
        let forward = aggregate(&rules);
        let reversed: Vec<TaggedRule> = rules.iter().rev().cloned().collect();
        let backward = aggregate(&reversed);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_confidence_tie_breaks_on_support_then_consequent() {
        let rules = vec![
            tagged(Some(0), &[1], &[4], 0.8, 0.4),
            tagged(Some(0), &[1], &[3], 0.8, 0.4),
            tagged(Some(0), &[1], &[2], 0.8, 0.3),
        ];
        let mut aggregator = RuleAggregator::new();
        aggregator.extend(&rules);
        assert_eq!(aggregator.rules_seen(), 3);
        let out = aggregator.finish();
        assert_eq!(out[0].support, 0.4);
        assert_eq!(out[0].consequent, set(&[2, 3, 4]));
    }

    #[test]
    fn test_antecedent_key_is_canonical() {
        let rules = vec![
            tagged(Some(0), &[3, 1], &[5], 0.5, 0.5),
            tagged(Some(0), &[1, 3], &[6], 0.5, 0.5),
        ];
        let out = aggregate(&rules);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].antecedent_key(), "1,3");
    }

    #[test]
    fn test_antecedents_sort_by_item_id() {
        let rules = vec![
            tagged(Some(0), &[10], &[1], 0.5, 0.5),
            tagged(Some(0), &[2], &[1], 0.5, 0.5),
            tagged(Some(0), &[2, 10], &[1], 0.5, 0.5),
        ];
        let out = aggregate(&rules);
        let antecedents: Vec<Itemset> = out.into_iter().map(|rule| rule.antecedent).collect();
        // textual order would put "10" before "2"
        assert_eq!(antecedents, vec![set(&[2]), set(&[2, 10]), set(&[10])]);
    }

    #[test]
    fn test_empty_stream() {
        assert!(aggregate(&[]).is_empty());
    }
}
