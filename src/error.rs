//! Error types for clustering and its collaborators

use thiserror::Error;

/// Result type for clustering operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while validating inputs or running a fit
#[derive(Debug, Error)]
pub enum Error {
    /// The point set has no points
    #[error("point set is empty")]
    EmptyInput,

    /// Cluster count outside [1, N]
    #[error("invalid cluster count k={k} for {n} points (expected 1 <= k <= n)")]
    InvalidK { k: usize, n: usize },

    /// No usable weight: every raw weight is non-positive or a weight is not finite
    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    /// A weighted mode was requested without a weight source
    #[error("weights must be provided for weighted and entropy modes")]
    WeightsNotSet,

    /// Neighborhood size is zero or there are too few points to have neighbors
    #[error("invalid neighborhood size {size} for {n} points")]
    InvalidNeighborhoodSize { size: usize, n: usize },

    /// Two per-point sequences disagree in length
    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// A point coordinate is NaN or infinite
    #[error("point {index} has a non-finite coordinate")]
    NonFinitePoint { index: usize },

    /// Iteration cap of zero
    #[error("max_iterations must be at least 1")]
    InvalidIterations,

    /// Prediction requested before any fit
    #[error("engine has not been fitted")]
    NotFitted,

    /// IO error (config loading, report writing)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON configuration error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
