//! Apriori frequent-itemset mining.
//!
//! Level-wise search: every frequent k-itemset is grown from a frequent
//! (k-1)-itemset plus one frequent item. Support is anti-monotone, so a
//! candidate with any infrequent (k-1)-subset is dropped before counting.
//! Supports are exact transaction counts over the basket.

use coborrow_core::types::{FrequentItemset, ItemId, Itemset};
use coborrow_core::{BasketMatrix, CoborrowError, CoborrowResult};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Apriori miner over a [`BasketMatrix`].
///
/// ```
/// use coborrow_core::BasketMatrix;
/// use coborrow_mining::ItemsetMiner;
///
/// let basket = BasketMatrix::from_item_lists(vec![vec![1, 2], vec![1, 2], vec![1], vec![2, 3]]);
/// let itemsets = ItemsetMiner::new(0.5).mine(&basket).unwrap();
/// assert_eq!(itemsets.len(), 3); // {1}, {2}, {1,2}
/// ```
#[derive(Debug, Clone)]
pub struct ItemsetMiner {
    min_support: f64,
    max_len: Option<usize>,
}

impl ItemsetMiner {
    pub fn new(min_support: f64) -> Self {
        Self {
            min_support,
            max_len: None,
        }
    }

    /// Stop growing itemsets beyond `max_len` items. `Some(0)` is rejected
    /// by [`mine`](Self::mine).
    pub fn with_max_len(mut self, max_len: Option<usize>) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn min_support(&self) -> f64 {
        self.min_support
    }

    /// Every itemset with support >= `min_support`, ordered by size and then
    /// ascending item order. An empty basket yields an empty result.
    pub fn mine(&self, basket: &BasketMatrix) -> CoborrowResult<Vec<FrequentItemset>> {
        if !(self.min_support > 0.0 && self.min_support <= 1.0) {
            return Err(CoborrowError::InvalidThreshold {
                name: "min_support",
                value: self.min_support,
            });
        }
        if self.max_len == Some(0) {
            return Err(CoborrowError::InvalidThreshold {
                name: "max_len",
                value: 0.0,
            });
        }
        if basket.is_empty() {
            return Ok(Vec::new());
        }

        let transactions: Vec<&Itemset> = basket.transactions().map(|(_, items)| items).collect();
        let n_items = basket.items().len();
        let max_len = self.max_len.unwrap_or(n_items).min(n_items);

        let mut frequent = Vec::new();
        let mut level = self.frequent_singletons(basket, &transactions);
        let frequent_items: Vec<ItemId> = level
            .iter()
            .filter_map(|fi| fi.items.iter().next().copied())
            .collect();

        let mut size = 1;
        while !level.is_empty() {
            debug!(size, frequent = level.len(), "Apriori level complete");
            let previous: HashSet<Itemset> = level.iter().map(|fi| fi.items.clone()).collect();
            frequent.append(&mut level);

            if size >= max_len {
                break;
            }
            size += 1;

            let candidates = generate_candidates(&previous, &frequent_items);
            level = candidates
                .into_iter()
                .filter_map(|items| {
                    let support = support_of(&items, &transactions);
                    (support >= self.min_support).then_some(FrequentItemset { items, support })
                })
                .collect();
        }

        metrics::counter!("coborrow.itemsets.mined").increment(frequent.len() as u64);
        Ok(frequent)
    }

    fn frequent_singletons(&self, basket: &BasketMatrix, transactions: &[&Itemset]) -> Vec<FrequentItemset> {
        basket
            .items()
            .into_iter()
            .filter_map(|item| {
                let items: Itemset = [item].into_iter().collect();
                let support = support_of(&items, transactions);
                (support >= self.min_support).then_some(FrequentItemset { items, support })
            })
            .collect()
    }
}

/// Extend each frequent (k-1)-itemset by one frequent item it lacks, keeping
/// only candidates whose every (k-1)-subset is frequent. Deduplicated and
/// ordered ascending.
fn generate_candidates(previous: &HashSet<Itemset>, frequent_items: &[ItemId]) -> BTreeSet<Itemset> {
    let mut candidates = BTreeSet::new();
    for base in previous {
        for &item in frequent_items {
            if base.contains(&item) {
                continue;
            }
            let mut candidate = base.clone();
            candidate.insert(item);
            if candidates.contains(&candidate) {
                continue;
            }
            if all_subsets_frequent(&candidate, previous) {
                candidates.insert(candidate);
            }
        }
    }
    candidates
}

fn all_subsets_frequent(candidate: &Itemset, previous: &HashSet<Itemset>) -> bool {
    candidate.iter().all(|item| {
        let mut subset = candidate.clone();
        subset.remove(item);
        previous.contains(&subset)
    })
}

fn support_of(itemset: &Itemset, transactions: &[&Itemset]) -> f64 {
    let count = transactions.iter().filter(|t| itemset.is_subset(t)).count();
    count as f64 / transactions.len() as f64
}
