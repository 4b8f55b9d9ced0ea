//! Applying a mined rule set: per-entity recommendations and rule set
//! summaries.

pub mod engine;
pub mod summary;

pub use engine::{Recommendation, RuleRecommender};
pub use summary::{impacted_entities, RuleSetSummary};
