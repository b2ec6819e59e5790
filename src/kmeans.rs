//! Single entry point for the three weighting policies.

use crate::config::KMeansConfig;
use crate::engine::{ClusterEngine, FitResult};
use crate::entropy;
use crate::error::{Error, Result};
use crate::weights::{self, WeightMode};
use ndarray::{Array1, ArrayBase, ArrayView1, Data, Ix2};
use tracing::debug;

/// Weighted K-Means driver.
///
/// Builds the weight vector for the requested [`WeightMode`] once, then runs a
/// fresh [`ClusterEngine`] to a terminal state. Holds no state between fits
/// other than its configuration.
#[derive(Debug, Clone, Default)]
pub struct KMeans {
    config: KMeansConfig,
}

impl KMeans {
    /// Creates a new KMeans instance with the given number of clusters and iterations.
    pub fn new(n_clusters: usize, max_iterations: usize) -> Self {
        KMeans {
            config: KMeansConfig::new(n_clusters).with_max_iterations(max_iterations),
        }
    }

    pub fn with_config(config: KMeansConfig) -> Self {
        KMeans { config }
    }

    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }

    /// Normalized per-point weights for `mode`.
    ///
    /// `raw_weights` is required for [`WeightMode::Weighted`] and
    /// [`WeightMode::Entropy`] and ignored for [`WeightMode::Plain`].
    pub fn weights<S>(
        &self,
        points: &ArrayBase<S, Ix2>,
        mode: WeightMode,
        raw_weights: Option<&[f64]>,
    ) -> Result<Array1<f64>>
    where
        S: Data<Elem = f64> + Sync,
    {
        let n = points.nrows();
        if !mode.requires_weights() {
            return weights::uniform(n);
        }

        let raw = raw_weights.ok_or(Error::WeightsNotSet)?;
        if raw.len() != n {
            return Err(Error::LengthMismatch {
                expected: n,
                actual: raw.len(),
            });
        }
        let base = weights::normalize(&ArrayView1::from(raw))?;
        if mode == WeightMode::Weighted {
            return Ok(base);
        }

        let entropies = entropy::estimate(points, self.config.neighborhood_size)?;
        debug!(
            neighborhood_size = self.config.neighborhood_size,
            max_entropy = entropies.fold(0.0f64, |a, &b| a.max(b)),
            "Computed local-density entropy"
        );
        weights::combine_with_entropy(&base, &entropies)
    }

    /// Cluster `points` under `mode`.
    ///
    /// Which groups are recovered depends on `config.init`; see [`fit`].
    pub fn fit<S>(
        &self,
        points: &ArrayBase<S, Ix2>,
        mode: WeightMode,
        raw_weights: Option<&[f64]>,
    ) -> Result<FitResult>
    where
        S: Data<Elem = f64> + Sync,
    {
        let n = points.nrows();
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        if self.config.k < 1 || self.config.k > n {
            return Err(Error::InvalidK {
                k: self.config.k,
                n,
            });
        }

        let weights = self.weights(points, mode, raw_weights)?;
        debug!(?mode, n, k = self.config.k, "Starting K-Means fit");
        ClusterEngine::new(&self.config).run(points, &weights)
    }
}

/// One-shot fit with the default tolerance, seed and initialization.
///
/// `neighborhood_size` defaults to 5 and only matters in entropy mode.
///
/// The default bounding-box initialization never reseeds empty clusters, so
/// well-separated groups are not guaranteed to be recovered one per cluster.
/// Use [`KMeans::with_config`] with [`InitStrategy::PlusPlus`] or
/// [`InitStrategy::Sample`] when that matters.
///
/// [`InitStrategy::PlusPlus`]: crate::InitStrategy::PlusPlus
/// [`InitStrategy::Sample`]: crate::InitStrategy::Sample
pub fn fit<S>(
    points: &ArrayBase<S, Ix2>,
    mode: WeightMode,
    k: usize,
    max_iterations: usize,
    raw_weights: Option<&[f64]>,
    neighborhood_size: Option<usize>,
) -> Result<FitResult>
where
    S: Data<Elem = f64> + Sync,
{
    let mut config = KMeansConfig::new(k).with_max_iterations(max_iterations);
    if let Some(size) = neighborhood_size {
        config = config.with_neighborhood_size(size);
    }
    KMeans::with_config(config).fit(points, mode, raw_weights)
}
