use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{CoborrowError, CoborrowResult};
use crate::types::Thresholds;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `COBORROW__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Knobs for one mining run.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Number of segments (K).
    #[serde(default = "default_clusters")]
    pub clusters: usize,
    #[serde(default = "default_min_support")]
    pub min_support: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Seed for centroid initialization.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    /// Seeded k-means trials; the lowest inertia wins.
    #[serde(default = "default_n_init")]
    pub n_init: usize,
    /// Largest itemset size to mine. `None` mines until exhaustion.
    #[serde(default)]
    pub max_len: Option<usize>,
    /// Run per-cluster mining rounds on the rayon pool.
    #[serde(default)]
    pub parallel: bool,
    /// Cluster entities before mining. When false the whole basket is mined once.
    #[serde(default = "default_segmented")]
    pub segmented: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Directory holding `events.json` and the exported results.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

// Default functions
fn default_clusters() -> usize {
    3
}
fn default_min_support() -> f64 {
    0.4
}
fn default_min_confidence() -> f64 {
    0.5
}
fn default_seed() -> u64 {
    42
}
fn default_max_iter() -> usize {
    300
}
fn default_n_init() -> usize {
    1
}
fn default_segmented() -> bool {
    true
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            clusters: default_clusters(),
            min_support: default_min_support(),
            min_confidence: default_min_confidence(),
            seed: default_seed(),
            max_iter: default_max_iter(),
            n_init: default_n_init(),
            max_len: None,
            parallel: false,
            segmented: default_segmented(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            min_support: self.min_support,
            min_confidence: self.min_confidence,
        }
    }

    /// Reject settings no run could honor.
    pub fn validate(&self) -> CoborrowResult<()> {
        self.thresholds().validate()?;
        if self.max_len == Some(0) {
            return Err(CoborrowError::InvalidThreshold {
                name: "max_len",
                value: 0.0,
            });
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from environment variables and an optional config file.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("COBORROW")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
