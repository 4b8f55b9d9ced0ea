//! Basket matrix: transactions keyed by `(entity, date)` with the set of
//! distinct items in each.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::types::{ClusterAssignment, ClusterId, EntityId, Event, ItemId, Itemset, TransactionKey};

/// Transaction × item incidence structure. Presence is boolean: an item
/// appears at most once per transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketMatrix {
    transactions: BTreeMap<TransactionKey, Itemset>,
}

impl BasketMatrix {
    /// Group events into transactions. Empty input yields an empty matrix.
    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let mut transactions: BTreeMap<TransactionKey, Itemset> = BTreeMap::new();
        let mut n_events = 0usize;
        for event in events {
            n_events += 1;
            transactions
                .entry(TransactionKey {
                    entity_id: event.entity_id,
                    date: event.date,
                })
                .or_default()
                .insert(event.item_id);
        }
        debug!(
            events = n_events,
            transactions = transactions.len(),
            "Built basket matrix"
        );
        Self { transactions }
    }

    /// Empty transactions are dropped: a transaction exists only through its items.
    pub fn from_transactions(transactions: BTreeMap<TransactionKey, Itemset>) -> Self {
        let transactions = transactions
            .into_iter()
            .filter(|(_, items)| !items.is_empty())
            .collect();
        Self { transactions }
    }

    /// One transaction per list, keyed by position. Handy when only the item
    /// structure matters (benchmarks, property tests).
    pub fn from_item_lists<I, L>(lists: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator<Item = ItemId>,
    {
        let transactions = lists
            .into_iter()
            .enumerate()
            .map(|(i, items)| {
                let key = TransactionKey {
                    entity_id: i as EntityId,
                    date: NaiveDate::default(),
                };
                (key, items.into_iter().collect::<Itemset>())
            })
            .collect();
        Self::from_transactions(transactions)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn transactions(&self) -> impl Iterator<Item = (&TransactionKey, &Itemset)> {
        self.transactions.iter()
    }

    pub fn get(&self, key: &TransactionKey) -> Option<&Itemset> {
        self.transactions.get(key)
    }

    /// Distinct entities, ascending.
    pub fn entities(&self) -> Vec<EntityId> {
        let entities: BTreeSet<EntityId> = self.transactions.keys().map(|k| k.entity_id).collect();
        entities.into_iter().collect()
    }

    /// Distinct items, ascending.
    pub fn items(&self) -> Vec<ItemId> {
        let items: BTreeSet<ItemId> = self.transactions.values().flatten().copied().collect();
        items.into_iter().collect()
    }

    /// Every item each entity ever took, across all of its transactions.
    pub fn entity_items(&self) -> BTreeMap<EntityId, Itemset> {
        let mut out: BTreeMap<EntityId, Itemset> = BTreeMap::new();
        for (key, items) in &self.transactions {
            out.entry(key.entity_id).or_default().extend(items.iter().copied());
        }
        out
    }

    /// Number of transactions containing every item of `itemset`.
    pub fn count(&self, itemset: &Itemset) -> usize {
        self.transactions
            .values()
            .filter(|items| itemset.is_subset(items))
            .count()
    }

    /// Exact support of `itemset`; 0.0 on an empty matrix.
    pub fn support(&self, itemset: &Itemset) -> f64 {
        if self.transactions.is_empty() {
            return 0.0;
        }
        self.count(itemset) as f64 / self.transactions.len() as f64
    }

    /// Sub-basket holding only the transactions of the given entities.
    pub fn restrict_to(&self, entities: &BTreeSet<EntityId>) -> Self {
        let transactions = self
            .transactions
            .iter()
            .filter(|(key, _)| entities.contains(&key.entity_id))
            .map(|(key, items)| (*key, items.clone()))
            .collect();
        Self { transactions }
    }

    /// Split into one sub-basket per cluster. Transactions of entities the
    /// assignment does not know are left out.
    pub fn partition(&self, assignment: &ClusterAssignment) -> BTreeMap<ClusterId, BasketMatrix> {
        let mut parts: BTreeMap<ClusterId, BTreeMap<TransactionKey, Itemset>> = BTreeMap::new();
        for (key, items) in &self.transactions {
            if let Some(cluster_id) = assignment.cluster_of(key.entity_id) {
                parts
                    .entry(cluster_id)
                    .or_default()
                    .insert(*key, items.clone());
            }
        }
        parts
            .into_iter()
            .map(|(cluster_id, transactions)| (cluster_id, Self { transactions }))
            .collect()
    }
}
