//! Segmentation engine: partitions entities into behaviorally similar
//! clusters from their normalized item-occurrence vectors.

use coborrow_core::config::PipelineConfig;
use coborrow_core::types::{ClusterAssignment, ClusterId};
use coborrow_core::{BasketMatrix, CoborrowError, CoborrowResult};
use ndarray::Array2;
use tracing::{debug, info};

use crate::kmeans::{KMeans, KMeansFit};
use crate::vectors::BehaviorMatrix;

pub struct SegmentationEngine {
    n_clusters: usize,
    seed: u64,
    max_iter: usize,
    n_init: usize,
}

impl SegmentationEngine {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            seed: 42,
            max_iter: 300,
            n_init: 1,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.clusters)
            .with_seed(config.seed)
            .with_max_iter(config.max_iter)
            .with_n_init(config.n_init)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Number of seeded trials (`seed`, `seed + 1`, ...). At least one runs.
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// Assign every entity in `basket` to one of `n_clusters` segments.
    ///
    /// Fails fast with `SegmentationInfeasible` when there are fewer
    /// entities than clusters; nothing is clustered in that case.
    pub fn segment(&self, basket: &BasketMatrix) -> CoborrowResult<ClusterAssignment> {
        let behavior = BehaviorMatrix::from_basket(basket);
        let n_entities = behavior.n_entities();

        if self.n_clusters == 0 || n_entities < self.n_clusters {
            return Err(CoborrowError::SegmentationInfeasible {
                entities: n_entities,
                clusters: self.n_clusters,
            });
        }

        let normalized = behavior.normalized()?;

        let mut best: (u64, KMeansFit) = (self.seed, self.run_trial(&normalized, self.seed));
        for trial in 1..self.n_init {
            let seed = self.seed.wrapping_add(trial as u64);
            let fit = self.run_trial(&normalized, seed);
            // strict improvement keeps the earliest trial on ties
            if fit.inertia < best.1.inertia {
                best = (seed, fit);
            }
        }
        let (seed, fit) = best;

        let assignments = behavior
            .entities
            .iter()
            .zip(&fit.labels)
            .map(|(&entity_id, &label)| (entity_id, label as ClusterId))
            .collect();

        metrics::counter!("coborrow.segmentation.runs").increment(1);
        info!(
            entities = n_entities,
            items = behavior.items.len(),
            clusters = self.n_clusters,
            seed,
            inertia = fit.inertia,
            converged = fit.converged,
            "Entities segmented"
        );

        Ok(ClusterAssignment {
            n_clusters: self.n_clusters,
            seed,
            inertia: fit.inertia,
            assignments,
        })
    }

    fn run_trial(&self, normalized: &Array2<f64>, seed: u64) -> KMeansFit {
        let fit = KMeans::new(self.n_clusters)
            .with_seed(seed)
            .with_max_iter(self.max_iter)
            .fit(normalized.view());
        debug!(
            seed,
            inertia = fit.inertia,
            n_iter = fit.n_iter,
            converged = fit.converged,
            "k-means trial finished"
        );
        fit
    }
}

impl Default for SegmentationEngine {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use coborrow_core::types::{EntityId, Event, ItemId};

    fn ev(entity_id: EntityId, item_id: ItemId, day: u32) -> Event {
        Event {
            entity_id,
            item_id,
            date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
        }
    }

    /// Entities 1-3 read items 1-3, entities 4-6 read items 7-9.
    fn two_reading_groups() -> BasketMatrix {
        let mut events = Vec::new();
        for entity in 1..=3 {
            for item in 1..=3 {
                events.push(ev(entity, item, entity as u32));
            }
        }
        for entity in 4..=6 {
            for item in 7..=9 {
                events.push(ev(entity, item, entity as u32));
            }
        }
        events.push(ev(2, 4, 10));
        events.push(ev(5, 6, 10));
        BasketMatrix::from_events(&events)
    }

    #[test]
    fn test_every_entity_gets_one_cluster() {
        let basket = two_reading_groups();
        let assignment = SegmentationEngine::new(2).segment(&basket).unwrap();

        assert_eq!(assignment.len(), 6);
        assert_eq!(assignment.n_clusters, 2);
        for cluster in assignment.assignments.values() {
            assert!(*cluster < 2);
        }
        let a = assignment.cluster_of(1).unwrap();
        assert_eq!(assignment.cluster_of(2), Some(a));
        assert_eq!(assignment.cluster_of(3), Some(a));
        let b = assignment.cluster_of(4).unwrap();
        assert_ne!(a, b);
        assert_eq!(assignment.cluster_of(5), Some(b));
        assert_eq!(assignment.cluster_of(6), Some(b));
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let basket = two_reading_groups();
        let engine = SegmentationEngine::new(3).with_seed(99);
        let first = engine.segment(&basket).unwrap();
        let second = engine.segment(&basket).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_too_few_entities_fails_fast() {
        let basket = BasketMatrix::from_events(&[ev(1, 1, 1), ev(2, 2, 1)]);
        let err = SegmentationEngine::new(3).segment(&basket).unwrap_err();
        assert!(matches!(
            err,
            CoborrowError::SegmentationInfeasible {
                entities: 2,
                clusters: 3
            }
        ));
    }

    #[test]
    fn test_zero_clusters_is_infeasible() {
        let basket = two_reading_groups();
        assert!(matches!(
            SegmentationEngine::new(0).segment(&basket),
            Err(CoborrowError::SegmentationInfeasible { .. })
        ));
    }

    #[test]
    fn test_more_trials_never_raise_inertia() {
        let basket = two_reading_groups();
        let single = SegmentationEngine::new(3).with_seed(5).segment(&basket).unwrap();
        let many = SegmentationEngine::new(3)
            .with_seed(5)
            .with_n_init(8)
            .segment(&basket)
            .unwrap();
        assert!(many.inertia <= single.inertia);
    }
}
