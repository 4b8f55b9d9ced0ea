//! Rule-based recommendations for one entity.
//!
//! A rule fires when its whole antecedent is in the entity's history. The
//! consequents of every firing rule are candidates; items the entity
//! already borrowed are dropped. Each candidate is scored by the highest
//! confidence among the rules that suggested it.

use coborrow_core::types::{AggregatedRule, ClusterId, ItemId, Itemset, RuleSetDocument};
use coborrow_core::CoborrowResult;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub item_id: ItemId,
    /// Highest confidence among the rules suggesting this item.
    pub score: f64,
    pub support: f64,
    /// Antecedent of the rule that supplied the score.
    pub because: Itemset,
    pub cluster_id: Option<ClusterId>,
}

pub struct RuleRecommender {
    rules: Vec<AggregatedRule>,
}

impl RuleRecommender {
    pub fn new(rules: Vec<AggregatedRule>) -> Self {
        Self { rules }
    }

    pub fn from_document(document: &RuleSetDocument) -> CoborrowResult<Self> {
        Ok(Self::new(document.aggregated_rules()?))
    }

    pub fn rules(&self) -> &[AggregatedRule] {
        &self.rules
    }

    /// Recommendations for an entity with the given borrow history. The
    /// history should cover open loans as well as returned items.
    ///
    /// With `cluster_id` set, only rules of that cluster and untagged rules
    /// apply. Without it, every rule applies. Results are ordered by score,
    /// then support, then item id.
    pub fn recommend(
        &self,
        history: &Itemset,
        cluster_id: Option<ClusterId>,
        limit: Option<usize>,
    ) -> Vec<Recommendation> {
        let mut best: BTreeMap<ItemId, Recommendation> = BTreeMap::new();

        let firing = self
            .rules
            .iter()
            .filter(|rule| applies_to_cluster(rule, cluster_id))
            .filter(|rule| rule.antecedent.is_subset(history));

        for rule in firing {
            for &item_id in rule.consequent.difference(history) {
                let candidate = Recommendation {
                    item_id,
                    score: rule.confidence,
                    support: rule.support,
                    because: rule.antecedent.clone(),
                    cluster_id: rule.cluster_id,
                };
                match best.get(&item_id) {
                    Some(current) if !stronger(&candidate, current) => {}
                    _ => {
                        best.insert(item_id, candidate);
                    }
                }
            }
        }

        let mut items: Vec<Recommendation> = best.into_values().collect();
        items.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.support.total_cmp(&a.support))
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        if let Some(limit) = limit {
            items.truncate(limit);
        }

        debug!(
            history = history.len(),
            cluster_id = ?cluster_id,
            recommendations = items.len(),
            "Computed recommendations"
        );
        items
    }
}

fn applies_to_cluster(rule: &AggregatedRule, cluster_id: Option<ClusterId>) -> bool {
    match (cluster_id, rule.cluster_id) {
        (None, _) | (_, None) => true,
        (Some(wanted), Some(tagged)) => wanted == tagged,
    }
}

/// Ties on score and support keep the smaller antecedent so the choice
/// does not depend on rule order.
fn stronger(candidate: &Recommendation, current: &Recommendation) -> bool {
    candidate
        .score
        .total_cmp(&current.score)
        .then_with(|| candidate.support.total_cmp(&current.support))
        .then_with(|| current.because.cmp(&candidate.because))
        .is_gt()
}
