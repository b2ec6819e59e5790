//! # netcluster
//!
//! K-Means clustering of layout net coordinates under three weighting
//! policies:
//!
//! - **plain**: every point counts equally (Lloyd's K-Means)
//! - **weighted**: points are weighted by their normalized capacitance
//! - **entropy**: capacitance weights amplified by `1 + H`, where `H` is the
//!   Shannon entropy of the point's nearest-neighbor softmax distribution
//!
//! ## Example
//!
//! ```rust
//! use ndarray::array;
//! use netcluster::{KMeans, KMeansConfig, WeightMode};
//!
//! let points = array![[0.0, 0.0], [0.1, 0.0], [9.0, 9.0], [9.1, 9.0]];
//! let capacitances = [0.2, 0.0, 1.5, 0.7];
//!
//! let kmeans = KMeans::with_config(KMeansConfig::new(2).with_neighborhood_size(2));
//! let result = kmeans
//!     .fit(&points, WeightMode::Entropy, Some(&capacitances))
//!     .unwrap();
//! assert_eq!(result.labels.len(), 4);
//! ```

pub mod config;
pub mod engine;
pub mod entropy;
pub mod error;
pub mod extract;
pub mod kmeans;
pub mod report;
pub mod synth;
pub mod weights;

pub use config::{InitStrategy, KMeansConfig};
pub use engine::{ClusterEngine, EngineState, FitResult, Termination};
pub use error::{Error, Result};
pub use extract::NetRecord;
pub use kmeans::{fit, KMeans};
pub use weights::WeightMode;
