//! Behavioral segmentation: binary item-occurrence vectors per entity,
//! L2-normalized and partitioned with seeded k-means.

pub mod engine;
pub mod kmeans;
pub mod vectors;

pub use engine::SegmentationEngine;
pub use kmeans::{KMeans, KMeansFit};
pub use vectors::BehaviorMatrix;
