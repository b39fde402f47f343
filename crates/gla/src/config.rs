//! Runtime and operator configuration.
//!
//! Every structure here can be deserialized from JSON, with defaults for
//! optional entries.  Validation is separate from deserialization: operators
//! call `validate()` when their round context is built, so that malformed
//! parameters are rejected before any data flows.

use serde::{Deserialize, Serialize};
use std::thread::available_parallelism;

use crate::{convergence::ConvergenceMode, error::ConfigError};

/// Default number of items a partition accumulates between two
/// [`chunk_boundary`](crate::Gla::chunk_boundary) calls.
pub const fn default_chunk_size() -> usize {
    4096
}

/// Default number of worker threads: one per available core.
pub fn default_workers() -> usize {
    available_parallelism().map_or(1, |n| n.get())
}

/// Vitter's empirically chosen switch point between the two skip estimators,
/// as a multiple of the sample size.
pub const fn default_threshold_coefficient() -> f64 {
    22.0
}

pub const fn default_kmeans_max_rounds() -> usize {
    100
}

pub const fn default_graph_max_rounds() -> usize {
    10_000
}

pub const fn default_correlation_block() -> usize {
    40
}

const fn default_true() -> bool {
    true
}

/// Worker pool configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Number of worker threads used for scanning, merging and fragment
    /// emission.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Items between two chunk boundaries within a partition.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl RuntimeConfig {
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::invalid("workers", self.workers, "at least 1"));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::invalid(
                "chunk_size",
                self.chunk_size,
                "at least 1",
            ));
        }
        Ok(())
    }
}

/// Reservoir sampling parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReservoirConfig {
    /// Number of items retained in the sample.
    pub size: usize,

    /// Switch from the simple to the rejection-based skip estimator once
    /// `threshold_coefficient * size` items have been seen.
    #[serde(default = "default_threshold_coefficient")]
    pub threshold_coefficient: f64,

    /// Seed for reproducible sampling.  Partitions derive distinct streams
    /// from it.  `None` seeds from the operating system.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl ReservoirConfig {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            threshold_coefficient: default_threshold_coefficient(),
            seed: None,
        }
    }

    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size == 0 {
            return Err(ConfigError::invalid("size", self.size, "at least 1"));
        }
        // Algorithm Z assumes the reservoir is full when it takes over.
        if !(self.threshold_coefficient >= 1.0) {
            return Err(ConfigError::invalid(
                "threshold_coefficient",
                self.threshold_coefficient,
                "a number no smaller than 1",
            ));
        }
        Ok(())
    }
}

/// K-means clustering parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KMeansConfig {
    /// Number of clusters.
    pub clusters: usize,

    /// Number of coordinates per item.
    pub dimension: usize,

    /// Hard cap on the number of rounds, including the bootstrap round.
    #[serde(default = "default_kmeans_max_rounds")]
    pub max_rounds: usize,

    /// Largest per-coordinate change of a center that still counts as
    /// converged.
    #[serde(default)]
    pub epsilon: f64,

    #[serde(default)]
    pub convergence: ConvergenceMode,

    /// Explicit initial centers.  When absent, the first round draws them
    /// from the data with a reservoir sample.
    #[serde(default)]
    pub centers: Option<Vec<Vec<f64>>>,

    #[serde(default)]
    pub seed: Option<u64>,
}

impl KMeansConfig {
    pub fn new(clusters: usize, dimension: usize) -> Self {
        Self {
            clusters,
            dimension,
            max_rounds: default_kmeans_max_rounds(),
            epsilon: 0.0,
            convergence: ConvergenceMode::default(),
            centers: None,
            seed: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clusters == 0 {
            return Err(ConfigError::invalid("clusters", self.clusters, "at least 1"));
        }
        if self.dimension == 0 {
            return Err(ConfigError::invalid(
                "dimension",
                self.dimension,
                "at least 1",
            ));
        }
        if self.max_rounds == 0 {
            return Err(ConfigError::invalid(
                "max_rounds",
                self.max_rounds,
                "at least 1",
            ));
        }
        if !(self.epsilon >= 0.0) {
            return Err(ConfigError::invalid(
                "epsilon",
                self.epsilon,
                "a non-negative number",
            ));
        }
        if let Some(centers) = &self.centers {
            if centers.len() != self.clusters {
                return Err(ConfigError::invalid(
                    "centers",
                    format!("{} centers", centers.len()),
                    "one center per cluster",
                ));
            }
            if let Some(center) = centers.iter().find(|c| c.len() != self.dimension) {
                return Err(ConfigError::invalid(
                    "centers",
                    format!("a center of dimension {}", center.len()),
                    "centers matching `dimension`",
                ));
            }
        }
        Ok(())
    }
}

/// Parameters shared by the graph fixpoint operators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_graph_max_rounds")]
    pub max_rounds: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_graph_max_rounds(),
        }
    }
}

impl GraphConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Initialization plus at least one propagation round.
        if self.max_rounds < 2 {
            return Err(ConfigError::invalid(
                "max_rounds",
                self.max_rounds,
                "at least 2",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MomentsConfig {
    pub dimension: usize,
}

impl MomentsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimension == 0 {
            return Err(ConfigError::invalid(
                "dimension",
                self.dimension,
                "at least 1",
            ));
        }
        Ok(())
    }
}

/// Equi-width histogram parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramConfig {
    pub bins: usize,
}

impl HistogramConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bins == 0 {
            return Err(ConfigError::invalid("bins", self.bins, "at least 1"));
        }
        Ok(())
    }
}

/// Blocked correlation matrix parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Side length of each square block of the output matrix.
    #[serde(default = "default_correlation_block")]
    pub block: usize,

    /// Whether the main diagonal is part of the output.
    #[serde(default = "default_true")]
    pub diagonal: bool,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            block: default_correlation_block(),
            diagonal: true,
        }
    }
}

impl CorrelationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block == 0 {
            return Err(ConfigError::invalid("block", self.block, "at least 1"));
        }
        Ok(())
    }
}
