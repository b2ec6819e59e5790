//! Fit configuration

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default iteration cap.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Default convergence tolerance on the largest per-dimension centroid shift.
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Default seed for centroid initialization.
pub const DEFAULT_SEED: u64 = 42;

/// Default entropy neighborhood size.
pub const DEFAULT_NEIGHBORHOOD_SIZE: usize = 5;

/// How the initial centroids are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum InitStrategy {
    /// Uniform draws inside the per-dimension bounding box of the points.
    #[default]
    BoundingBox,
    /// K distinct input points.
    Sample,
    /// k-means++ seeding (squared-distance weighted sampling).
    PlusPlus,
}

/// Configuration for a K-Means fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    /// Number of clusters
    pub k: usize,

    /// Maximum number of assignment/update iterations
    pub max_iterations: usize,

    /// Convergence threshold on the maximum absolute per-dimension centroid change
    pub tolerance: f64,

    /// Seed for the per-fit random generator
    pub seed: u64,

    /// Number of nearest neighbors used by the entropy estimate
    pub neighborhood_size: usize,

    /// Centroid initialization strategy
    pub init: InitStrategy,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 3,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            seed: DEFAULT_SEED,
            neighborhood_size: DEFAULT_NEIGHBORHOOD_SIZE,
            init: InitStrategy::default(),
        }
    }
}

impl KMeansConfig {
    /// Create a new configuration with the specified number of clusters
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Set the maximum number of iterations
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the convergence tolerance
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the entropy neighborhood size
    pub fn with_neighborhood_size(mut self, neighborhood_size: usize) -> Self {
        self.neighborhood_size = neighborhood_size;
        self
    }

    /// Set the initialization strategy
    pub fn with_init(mut self, init: InitStrategy) -> Self {
        self.init = init;
        self
    }
}
