//! Rule set summary: how much a rule set recommends and how many entities
//! it can reach.

use chrono::{DateTime, Utc};
use coborrow_core::types::{AggregatedRule, ClusterId, EntityId, Event, Itemset, RuleSetDocument};
use coborrow_core::CoborrowResult;
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleSetSummary {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub rule_entries: usize,
    /// Sum of consequent sizes over all entries.
    pub recommendations: usize,
    /// Every item that appears in some antecedent.
    pub antecedent_items: Itemset,
    pub clusters: BTreeSet<Option<ClusterId>>,
    /// Entities that borrowed at least one antecedent item.
    pub impacted_entities: usize,
}

impl RuleSetSummary {
    pub fn from_document(document: &RuleSetDocument, events: &[Event]) -> CoborrowResult<Self> {
        let rules = document.aggregated_rules()?;
        let antecedent_items: Itemset = rules
            .iter()
            .flat_map(|rule| rule.antecedent.iter().copied())
            .collect();

        Ok(Self {
            run_id: document.run_id,
            generated_at: document.generated_at,
            rule_entries: rules.len(),
            recommendations: rules.iter().map(|rule| rule.consequent.len()).sum(),
            clusters: rules.iter().map(|rule| rule.cluster_id).collect(),
            impacted_entities: impacted_entities(&rules, events).len(),
            antecedent_items,
        })
    }
}

/// Entities with at least one event on an antecedent item of `rules`.
pub fn impacted_entities(rules: &[AggregatedRule], events: &[Event]) -> BTreeSet<EntityId> {
    let antecedent_items: Itemset = rules
        .iter()
        .flat_map(|rule| rule.antecedent.iter().copied())
        .collect();

    events
        .iter()
        .filter(|e| antecedent_items.contains(&e.item_id))
        .map(|e| e.entity_id)
        .collect()
}
