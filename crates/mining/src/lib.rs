//! Frequent-itemset mining (Apriori), association rule derivation, and
//! per-segment rule aggregation.

pub mod aggregate;
pub mod apriori;
pub mod rules;

pub use aggregate::{aggregate, RuleAggregator};
pub use apriori::ItemsetMiner;
pub use rules::{RuleDeriver, SupportCache};
