//! Association rule derivation from frequent itemsets.

use coborrow_core::types::{AssociationRule, FrequentItemset, ItemId, Itemset};
use coborrow_core::{BasketMatrix, CoborrowError, CoborrowResult};
use std::collections::HashMap;
use tracing::debug;

/// Support lookups for rule scoring. Seeded from the mined itemsets; any
/// miss is counted from the basket and remembered.
pub struct SupportCache<'a> {
    basket: &'a BasketMatrix,
    known: HashMap<Itemset, f64>,
}

impl<'a> SupportCache<'a> {
    pub fn new(basket: &'a BasketMatrix, itemsets: &[FrequentItemset]) -> Self {
        let known = itemsets
            .iter()
            .map(|fi| (fi.items.clone(), fi.support))
            .collect();
        Self { basket, known }
    }

    pub fn support(&mut self, itemset: &Itemset) -> f64 {
        if let Some(&support) = self.known.get(itemset) {
            return support;
        }
        let support = self.basket.support(itemset);
        self.known.insert(itemset.clone(), support);
        support
    }
}

/// Expands frequent itemsets into directional rules with confidence at or
/// above `min_confidence`.
#[derive(Debug, Clone)]
pub struct RuleDeriver {
    min_confidence: f64,
}

impl RuleDeriver {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Every split of every itemset (size >= 2) into non-empty antecedent and
    /// consequent. A split below the threshold is dropped on its own; the
    /// other splits of the same itemset are still considered.
    pub fn derive(
        &self,
        basket: &BasketMatrix,
        itemsets: &[FrequentItemset],
    ) -> CoborrowResult<Vec<AssociationRule>> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(CoborrowError::InvalidThreshold {
                name: "min_confidence",
                value: self.min_confidence,
            });
        }

        let mut cache = SupportCache::new(basket, itemsets);
        let mut rules = Vec::new();

        for itemset in itemsets.iter().filter(|fi| fi.items.len() >= 2) {
            for antecedent in proper_subsets(&itemset.items) {
                let antecedent_support = cache.support(&antecedent);
                if antecedent_support <= 0.0 {
                    continue;
                }
                let confidence = itemset.support / antecedent_support;
                if confidence < self.min_confidence {
                    continue;
                }

                let consequent: Itemset = itemset.items.difference(&antecedent).copied().collect();
                let consequent_support = cache.support(&consequent);
                let lift = if consequent_support > 0.0 {
                    confidence / consequent_support
                } else {
                    0.0
                };

                rules.push(AssociationRule {
                    antecedent,
                    consequent,
                    confidence,
                    support: itemset.support,
                    lift,
                });
            }
        }

        debug!(
            itemsets = itemsets.len(),
            rules = rules.len(),
            min_confidence = self.min_confidence,
            "Derived association rules"
        );
        metrics::counter!("coborrow.rules.derived").increment(rules.len() as u64);
        Ok(rules)
    }
}

/// Non-empty proper subsets of `items`, ascending.
fn proper_subsets(items: &Itemset) -> Vec<Itemset> {
    let members: Vec<ItemId> = items.iter().copied().collect();
    let mut subsets: Vec<Itemset> = vec![Itemset::new()];
    for &item in &members {
        let grown: Vec<Itemset> = subsets
            .iter()
            .map(|s| {
                let mut next = s.clone();
                next.insert(item);
                next
            })
            .collect();
        subsets.extend(grown);
    }
    subsets.retain(|s| !s.is_empty() && s.len() < members.len());
    subsets.sort();
    subsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apriori::ItemsetMiner;

    fn set(items: &[ItemId]) -> Itemset {
        items.iter().copied().collect()
    }

    fn scenario_basket() -> BasketMatrix {
        // T1:{A,B} T2:{A,B} T3:{A} T4:{B,C} with A=1, B=2, C=3
        BasketMatrix::from_item_lists(vec![vec![1, 2], vec![1, 2], vec![1], vec![2, 3]])
    }

    #[test]
    fn test_reference_scenario_rules() {
        let basket = scenario_basket();
        let itemsets = ItemsetMiner::new(0.5).mine(&basket).unwrap();
        let rules = RuleDeriver::new(0.6).derive(&basket, &itemsets).unwrap();

        assert_eq!(rules.len(), 2);
        let a_to_b = &rules[0];
        assert_eq!(a_to_b.antecedent, set(&[1]));
        assert_eq!(a_to_b.consequent, set(&[2]));
        assert!((a_to_b.confidence - 2.0 / 3.0).abs() < 1e-9);
        assert!((a_to_b.support - 0.5).abs() < 1e-12);
        // lift = (2/3) / 0.75
        assert!((a_to_b.lift - 8.0 / 9.0).abs() < 1e-9);

        let b_to_a = &rules[1];
        assert_eq!(b_to_a.antecedent, set(&[2]));
        assert_eq!(b_to_a.consequent, set(&[1]));
        assert!((b_to_a.confidence - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_low_confidence_split_dropped_alone() {
        // {1}->{2}: 2/4 = 0.5, {2}->{1}: 2/2 = 1.0
        let basket = BasketMatrix::from_item_lists(vec![vec![1, 2], vec![1, 2], vec![1], vec![1]]);
        let itemsets = ItemsetMiner::new(0.5).mine(&basket).unwrap();
        let rules = RuleDeriver::new(0.8).derive(&basket, &itemsets).unwrap();

        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].antecedent, set(&[2]));
        assert_eq!(rules[0].consequent, set(&[1]));
        assert!((rules[0].confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_three_item_splits() {
        let basket = BasketMatrix::from_item_lists(vec![vec![1, 2, 3], vec![1, 2, 3]]);
        let itemsets = ItemsetMiner::new(1.0).mine(&basket).unwrap();
        let rules = RuleDeriver::new(0.0).derive(&basket, &itemsets).unwrap();
        // three 2-itemsets give 2 rules each, the 3-itemset gives 6
        assert_eq!(rules.len(), 12);
        for rule in &rules {
            assert!(rule.antecedent.is_disjoint(&rule.consequent));
            assert!(!rule.antecedent.is_empty() && !rule.consequent.is_empty());
        }
    }

    #[test]
    fn test_empty_input_gives_no_rules() {
        let basket = BasketMatrix::default();
        let rules = RuleDeriver::new(0.5).derive(&basket, &[]).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_support_cache_counts_misses_from_basket() {
        let basket = scenario_basket();
        // seed the cache with nothing so every lookup hits the basket
        let mut cache = SupportCache::new(&basket, &[]);
        assert!((cache.support(&set(&[1])) - 0.75).abs() < 1e-12);
        assert!((cache.support(&set(&[2, 3])) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_proper_subsets() {
        let subsets = proper_subsets(&set(&[1, 2, 3]));
        assert_eq!(
            subsets,
            vec![set(&[1]), set(&[1, 2]), set(&[1, 3]), set(&[2]), set(&[2, 3]), set(&[3])]
        );
    }

    #[test]
    fn test_rejects_out_of_range_confidence() {
        let basket = scenario_basket();
        assert!(RuleDeriver::new(1.2).derive(&basket, &[]).is_err());
    }
}
