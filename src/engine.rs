//! Weighted Lloyd's iteration.
//!
//! [`ClusterEngine`] owns the centroids and labels of one fit and moves
//! through `Uninitialized -> Initialized -> Iterating -> Converged |
//! IterationCapReached`. Every call to [`ClusterEngine::initialize`] reseeds
//! its own generator from the configured seed, so repeated fits on identical
//! input are bit-identical.

use crate::config::{InitStrategy, KMeansConfig};
use crate::error::{Error, Result};
use crate::weights::stable_sum;
use ndarray::{Array1, Array2, ArrayBase, ArrayView2, Axis, Data, Ix1, Ix2};
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

/// Lifecycle of a [`ClusterEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initialized,
    Iterating,
    Converged,
    IterationCapReached,
}

impl EngineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EngineState::Converged | EngineState::IterationCapReached
        )
    }
}

/// Why a fit stopped. Both outcomes are successful fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Termination {
    Converged,
    IterationCapReached,
}

/// Output of a completed fit.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Cluster index per input point, in input order
    pub labels: Array1<usize>,
    /// One row per cluster
    pub centroids: Array2<f64>,
    /// Number of assignment/update iterations performed
    pub iterations: usize,
    pub termination: Termination,
    /// Weighted sum of squared distances to the assigned centroids
    pub inertia: f64,
}

/// Centroid and label state of a single weighted K-Means fit.
#[derive(Debug, Clone)]
pub struct ClusterEngine {
    n_clusters: usize,
    max_iterations: usize,
    tolerance: f64,
    seed: u64,
    init: InitStrategy,
    state: EngineState,
    centroids: Array2<f64>,
    labels: Array1<usize>,
    iteration: usize,
}

impl ClusterEngine {
    pub fn new(config: &KMeansConfig) -> Self {
        ClusterEngine {
            n_clusters: config.k,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
            seed: config.seed,
            init: config.init,
            state: EngineState::Uninitialized,
            centroids: Array2::zeros((0, 0)),
            labels: Array1::zeros(0),
            iteration: 0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn centroids(&self) -> ArrayView2<'_, f64> {
        self.centroids.view()
    }

    pub fn labels(&self) -> &Array1<usize> {
        &self.labels
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Validate the point set and draw the initial centroids.
    pub fn initialize<S>(&mut self, points: &ArrayBase<S, Ix2>) -> Result<()>
    where
        S: Data<Elem = f64>,
    {
        let n_samples = points.nrows();
        if n_samples == 0 {
            return Err(Error::EmptyInput);
        }
        if self.n_clusters < 1 || self.n_clusters > n_samples {
            return Err(Error::InvalidK {
                k: self.n_clusters,
                n: n_samples,
            });
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidIterations);
        }
        if let Some(index) = points
            .axis_iter(Axis(0))
            .position(|row| row.iter().any(|v| !v.is_finite()))
        {
            return Err(Error::NonFinitePoint { index });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        self.centroids = match self.init {
            InitStrategy::BoundingBox => self.bounding_box_init(points, &mut rng),
            InitStrategy::Sample => self.sample_init(points, &mut rng),
            InitStrategy::PlusPlus => self.plus_plus_init(points, &mut rng),
        };
        self.labels = Array1::zeros(n_samples);
        self.iteration = 0;
        self.state = EngineState::Initialized;
        Ok(())
    }

    /// Run one assignment/update iteration and return the resulting state.
    ///
    /// A no-op on an uninitialized or terminated engine.
    pub fn step<S1, S2>(
        &mut self,
        points: &ArrayBase<S1, Ix2>,
        weights: &ArrayBase<S2, Ix1>,
    ) -> Result<EngineState>
    where
        S1: Data<Elem = f64> + Sync,
        S2: Data<Elem = f64> + Sync,
    {
        if self.state == EngineState::Uninitialized || self.state.is_terminal() {
            return Ok(self.state);
        }
        self.check_shapes(points, weights)?;
        self.state = EngineState::Iterating;

        // Assign labels.
        self.labels = self.assign_labels(points, weights);

        // Compute new centroids.
        let new_centroids = self.update_centroids(points, weights);
        let shift = (&new_centroids - &self.centroids)
            .iter()
            .fold(0.0f64, |acc, v| acc.max(v.abs()));
        self.centroids = new_centroids;
        self.iteration += 1;
        debug!(iteration = self.iteration, shift, "K-Means iteration");

        if shift < self.tolerance {
            self.state = EngineState::Converged;
        } else if self.iteration >= self.max_iterations {
            self.state = EngineState::IterationCapReached;
        }
        Ok(self.state)
    }

    /// Initialize and iterate until convergence or the iteration cap.
    pub fn run<S1, S2>(
        &mut self,
        points: &ArrayBase<S1, Ix2>,
        weights: &ArrayBase<S2, Ix1>,
    ) -> Result<FitResult>
    where
        S1: Data<Elem = f64> + Sync,
        S2: Data<Elem = f64> + Sync,
    {
        self.initialize(points)?;
        if let Some(index) = weights.iter().position(|w| !(w.is_finite() && *w > 0.0)) {
            return Err(Error::InvalidWeights(format!(
                "weight {} is not a positive finite value",
                index
            )));
        }

        while !self.step(points, weights)?.is_terminal() {}

        let termination = match self.state {
            EngineState::Converged => Termination::Converged,
            _ => Termination::IterationCapReached,
        };
        let inertia = self.inertia(points, weights);
        info!(
            iterations = self.iteration,
            ?termination,
            inertia,
            "K-Means finished"
        );

        Ok(FitResult {
            labels: self.labels.clone(),
            centroids: self.centroids.clone(),
            iterations: self.iteration,
            termination,
            inertia,
        })
    }

    /// Predicts the closest centroid for each sample, without weighting.
    pub fn predict<S>(&self, points: &ArrayBase<S, Ix2>) -> Result<Array1<usize>>
    where
        S: Data<Elem = f64> + Sync,
    {
        if self.state == EngineState::Uninitialized {
            return Err(Error::NotFitted);
        }
        if points.ncols() != self.centroids.ncols() {
            return Err(Error::LengthMismatch {
                expected: self.centroids.ncols(),
                actual: points.ncols(),
            });
        }
        let ones = Array1::<f64>::ones(points.nrows());
        Ok(self.assign_labels(points, &ones))
    }

    fn check_shapes<S1, S2>(
        &self,
        points: &ArrayBase<S1, Ix2>,
        weights: &ArrayBase<S2, Ix1>,
    ) -> Result<()>
    where
        S1: Data<Elem = f64>,
        S2: Data<Elem = f64>,
    {
        if points.nrows() != self.labels.len() {
            return Err(Error::LengthMismatch {
                expected: self.labels.len(),
                actual: points.nrows(),
            });
        }
        if points.ncols() != self.centroids.ncols() {
            return Err(Error::LengthMismatch {
                expected: self.centroids.ncols(),
                actual: points.ncols(),
            });
        }
        if weights.len() != points.nrows() {
            return Err(Error::LengthMismatch {
                expected: points.nrows(),
                actual: weights.len(),
            });
        }
        Ok(())
    }

    /// Uniform draws inside the per-dimension [min, max] box of the points.
    fn bounding_box_init<S>(&self, points: &ArrayBase<S, Ix2>, rng: &mut StdRng) -> Array2<f64>
    where
        S: Data<Elem = f64>,
    {
        let n_features = points.ncols();
        let mins = points.fold_axis(Axis(0), f64::INFINITY, |&a, &b| a.min(b));
        let maxs = points.fold_axis(Axis(0), f64::NEG_INFINITY, |&a, &b| a.max(b));

        let mut centroids =
            Array2::random_using((self.n_clusters, n_features), Uniform::new(0.0, 1.0), rng);
        for (mut column, (lo, hi)) in centroids
            .axis_iter_mut(Axis(1))
            .zip(mins.iter().zip(maxs.iter()))
        {
            column.mapv_inplace(|u| lo + u * (hi - lo));
        }
        centroids
    }

    /// K distinct input points.
    fn sample_init<S>(&self, points: &ArrayBase<S, Ix2>, rng: &mut StdRng) -> Array2<f64>
    where
        S: Data<Elem = f64>,
    {
        let indices: Vec<usize> = (0..points.nrows()).choose_multiple(rng, self.n_clusters);
        points.select(Axis(0), &indices)
    }

    /// k-means++: the first centroid is a uniform pick, each next one is drawn
    /// with probability proportional to the squared distance to the nearest
    /// centroid chosen so far.
    fn plus_plus_init<S>(&self, points: &ArrayBase<S, Ix2>, rng: &mut StdRng) -> Array2<f64>
    where
        S: Data<Elem = f64>,
    {
        let n_samples = points.nrows();
        let mut chosen = Vec::with_capacity(self.n_clusters);
        chosen.push(rng.gen_range(0..n_samples));

        let mut nearest_sq: Vec<f64> = points
            .axis_iter(Axis(0))
            .map(|x| squared_distance(&x, &points.row(chosen[0])))
            .collect();

        while chosen.len() < self.n_clusters {
            let total = stable_sum(nearest_sq.iter().copied());
            let next = if total <= 0.0 {
                // every point sits on a chosen centroid
                rng.gen_range(0..n_samples)
            } else {
                let threshold = rng.gen::<f64>() * total;
                let mut cumsum = 0.0;
                let mut selected = n_samples - 1;
                for (i, &d) in nearest_sq.iter().enumerate() {
                    cumsum += d;
                    if d > 0.0 && cumsum >= threshold {
                        selected = i;
                        break;
                    }
                }
                selected
            };
            chosen.push(next);

            let c = points.row(next);
            for (d, x) in nearest_sq.iter_mut().zip(points.axis_iter(Axis(0))) {
                *d = d.min(squared_distance(&x, &c));
            }
        }

        points.select(Axis(0), &chosen)
    }

    /// Assigns each sample to the centroid minimizing `distance * weight`.
    /// Ties go to the lowest centroid index.
    fn assign_labels<S1, S2>(
        &self,
        points: &ArrayBase<S1, Ix2>,
        weights: &ArrayBase<S2, Ix1>,
    ) -> Array1<usize>
    where
        S1: Data<Elem = f64> + Sync,
        S2: Data<Elem = f64> + Sync,
    {
        let n_samples = points.nrows();
        let n_centroids = self.centroids.nrows();
        let labels: Vec<usize> = (0..n_samples)
            .into_par_iter()
            .map(|i| {
                let x = points.row(i);
                let w = weights[i];
                let mut min_dist = f64::INFINITY;
                let mut min_j = 0;
                for j in 0..n_centroids {
                    let c = self.centroids.row(j);
                    let dist = squared_distance(&x, &c).sqrt() * w;
                    if dist < min_dist {
                        min_dist = dist;
                        min_j = j;
                    }
                }
                min_j
            })
            .collect();

        Array1::from(labels)
    }

    /// Weighted mean of each cluster's members; empty clusters keep their
    /// previous centroid.
    fn update_centroids<S1, S2>(
        &self,
        points: &ArrayBase<S1, Ix2>,
        weights: &ArrayBase<S2, Ix1>,
    ) -> Array2<f64>
    where
        S1: Data<Elem = f64>,
        S2: Data<Elem = f64>,
    {
        let mut sums = Array2::<f64>::zeros(self.centroids.raw_dim());
        let mut totals = vec![0.0; self.n_clusters];
        let mut counts = vec![0usize; self.n_clusters];
        points
            .axis_iter(Axis(0))
            .zip(self.labels.iter())
            .zip(weights.iter())
            .for_each(|((x, &label), &w)| {
                sums.row_mut(label).zip_mut_with(&x, |a, &b| *a += b * w);
                totals[label] += w;
                counts[label] += 1;
            });

        let mut new_centroids = self.centroids.clone();
        new_centroids
            .axis_iter_mut(Axis(0))
            .zip(sums.axis_iter(Axis(0)))
            .enumerate()
            .for_each(|(j, (mut c, s))| {
                if counts[j] > 0 {
                    c.assign(&s.mapv(|v| v / totals[j]));
                }
            });
        new_centroids
    }

    fn inertia<S1, S2>(&self, points: &ArrayBase<S1, Ix2>, weights: &ArrayBase<S2, Ix1>) -> f64
    where
        S1: Data<Elem = f64>,
        S2: Data<Elem = f64>,
    {
        stable_sum(
            points
                .axis_iter(Axis(0))
                .zip(self.labels.iter())
                .zip(weights.iter())
                .map(|((x, &label), &w)| w * squared_distance(&x, &self.centroids.row(label))),
        )
    }
}

fn squared_distance<S1, S2>(x: &ArrayBase<S1, Ix1>, y: &ArrayBase<S2, Ix1>) -> f64
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    x.iter()
        .zip(y.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_blobs() -> Array2<f64> {
        array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [10.0, 10.0],
            [10.1, 10.0],
            [10.0, 10.1],
        ]
    }

    fn uniform_weights(n: usize) -> Array1<f64> {
        Array1::from_elem(n, 1.0 / n as f64)
    }

    #[test]
    fn test_state_transitions() {
        let points = two_blobs();
        let weights = uniform_weights(6);
        let mut engine = ClusterEngine::new(&KMeansConfig::new(2));
        assert_eq!(engine.state(), EngineState::Uninitialized);

        // stepping before initialization does nothing
        assert_eq!(
            engine.step(&points, &weights).unwrap(),
            EngineState::Uninitialized
        );

        engine.initialize(&points).unwrap();
        assert_eq!(engine.state(), EngineState::Initialized);
        assert_eq!(engine.labels(), &Array1::<usize>::zeros(6));

        let state = engine.step(&points, &weights).unwrap();
        assert!(matches!(
            state,
            EngineState::Iterating | EngineState::Converged
        ));
        assert_eq!(engine.iteration(), 1);

        let result = engine.run(&points, &weights).unwrap();
        assert!(engine.state().is_terminal());
        assert_eq!(result.iterations, engine.iteration());
    }

    #[test]
    fn test_validation_errors() {
        let points = two_blobs();
        let weights = uniform_weights(6);

        let empty = Array2::<f64>::zeros((0, 2));
        let mut engine = ClusterEngine::new(&KMeansConfig::new(1));
        assert!(matches!(
            engine.run(&empty, &Array1::<f64>::zeros(0)),
            Err(Error::EmptyInput)
        ));

        for k in [0, 7] {
            let mut engine = ClusterEngine::new(&KMeansConfig::new(k));
            assert!(matches!(
                engine.run(&points, &weights),
                Err(Error::InvalidK { n: 6, .. })
            ));
        }

        let mut engine = ClusterEngine::new(&KMeansConfig::new(2).with_max_iterations(0));
        assert!(matches!(
            engine.run(&points, &weights),
            Err(Error::InvalidIterations)
        ));

        let mut engine = ClusterEngine::new(&KMeansConfig::new(2));
        assert!(matches!(
            engine.run(&points, &uniform_weights(5)),
            Err(Error::LengthMismatch {
                expected: 6,
                actual: 5
            })
        ));

        let mut bad = points.clone();
        bad[[4, 1]] = f64::NAN;
        assert!(matches!(
            engine.run(&bad, &weights),
            Err(Error::NonFinitePoint { index: 4 })
        ));

        let mut zero = weights.clone();
        zero[2] = 0.0;
        assert!(matches!(
            engine.run(&points, &zero),
            Err(Error::InvalidWeights(_))
        ));
    }

    #[test]
    fn test_bounding_box_init_stays_in_bounds() {
        let points = array![[1.0, -5.0], [3.0, 5.0], [2.0, 0.0], [1.5, 4.0]];
        let mut engine = ClusterEngine::new(&KMeansConfig::new(4));
        engine.initialize(&points).unwrap();
        for c in engine.centroids().axis_iter(Axis(0)) {
            assert!((1.0..=3.0).contains(&c[0]), "x = {}", c[0]);
            assert!((-5.0..=5.0).contains(&c[1]), "y = {}", c[1]);
        }
    }

    #[test]
    fn test_degenerate_bounding_box() {
        let points = array![[2.0, 7.0], [2.0, 7.0], [2.0, 7.0]];
        let mut engine = ClusterEngine::new(&KMeansConfig::new(2));
        let result = engine.run(&points, &uniform_weights(3)).unwrap();
        assert_eq!(result.labels, array![0, 0, 0]);
        assert!((result.centroids[[0, 0]] - 2.0).abs() < 1e-12);
        assert!((result.centroids[[0, 1]] - 7.0).abs() < 1e-12);
        // the unused centroid never moves off the single point either
        assert_eq!(result.centroids.row(1), array![2.0, 7.0]);
        assert_eq!(result.termination, Termination::Converged);
    }

    #[test]
    fn test_sample_init_uses_distinct_points() {
        let points = two_blobs();
        let mut engine = ClusterEngine::new(&KMeansConfig::new(6).with_init(InitStrategy::Sample));
        engine.initialize(&points).unwrap();
        let mut matched: Vec<usize> = engine
            .centroids()
            .axis_iter(Axis(0))
            .map(|c| {
                points
                    .axis_iter(Axis(0))
                    .position(|p| p == c)
                    .expect("centroid is an input point")
            })
            .collect();
        matched.sort_unstable();
        assert_eq!(matched, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_plus_plus_spreads_seeds() {
        let points = two_blobs();
        let mut engine =
            ClusterEngine::new(&KMeansConfig::new(2).with_init(InitStrategy::PlusPlus));
        engine.initialize(&points).unwrap();
        let c = engine.centroids();
        // one seed per blob
        assert!((c[[0, 0]] < 5.0) != (c[[1, 0]] < 5.0), "centroids {:?}", c);
    }

    #[test]
    fn test_update_weighted_mean_and_empty_cluster() {
        let points = array![[0.0, 0.0], [10.0, 0.0]];
        let weights = array![0.25, 0.75];
        let mut engine = ClusterEngine::new(&KMeansConfig::new(2));
        engine.initialize(&points).unwrap();
        engine.centroids = array![[1.0, 0.0], [100.0, 100.0]];
        engine.labels = engine.assign_labels(&points, &weights);
        assert_eq!(engine.labels, array![0, 0]);

        let updated = engine.update_centroids(&points, &weights);
        assert_eq!(updated.row(0), array![7.5, 0.0]);
        // cluster 1 had no members
        assert_eq!(updated.row(1), array![100.0, 100.0]);
    }

    #[test]
    fn test_assignment_ties_pick_lowest_index() {
        let points = array![[0.0, 0.0], [2.0, 0.0]];
        let mut engine = ClusterEngine::new(&KMeansConfig::new(2));
        engine.initialize(&points).unwrap();
        engine.centroids = array![[1.0, 0.0], [1.0, 0.0]];
        let labels = engine.assign_labels(&points, &array![0.5, 0.5]);
        assert_eq!(labels, array![0, 0]);
    }

    #[test]
    fn test_scalar_weight_does_not_change_assignment() {
        let points = two_blobs();
        let mut engine = ClusterEngine::new(&KMeansConfig::new(2));
        engine.initialize(&points).unwrap();
        engine.centroids = array![[0.0, 0.0], [10.0, 10.0]];
        let light = engine.assign_labels(&points, &array![1e-6, 1e-6, 1e-6, 1e-6, 1e-6, 1e-6]);
        let heavy = engine.assign_labels(&points, &array![0.9, 0.02, 0.02, 0.02, 0.02, 0.02]);
        assert_eq!(light, heavy);
        assert_eq!(light, array![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_iteration_cap() {
        let points = two_blobs();
        let config = KMeansConfig::new(2)
            .with_max_iterations(3)
            .with_tolerance(-1.0);
        let mut engine = ClusterEngine::new(&config);
        let result = engine.run(&points, &uniform_weights(6)).unwrap();
        assert_eq!(result.iterations, 3);
        assert_eq!(result.termination, Termination::IterationCapReached);
        assert_eq!(engine.state(), EngineState::IterationCapReached);
    }

    #[test]
    fn test_run_is_deterministic() {
        let points = two_blobs();
        let weights = array![0.1, 0.2, 0.1, 0.3, 0.2, 0.1];
        let config = KMeansConfig::new(2).with_seed(7);
        let a = ClusterEngine::new(&config).run(&points, &weights).unwrap();
        let b = ClusterEngine::new(&config).run(&points, &weights).unwrap();
        assert_eq!(a.labels, b.labels);
        for (x, y) in a.centroids.iter().zip(b.centroids.iter()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn test_predict() {
        let points = two_blobs();
        let mut engine =
            ClusterEngine::new(&KMeansConfig::new(2).with_init(InitStrategy::PlusPlus));
        assert!(matches!(engine.predict(&points), Err(Error::NotFitted)));
        let result = engine.run(&points, &uniform_weights(6)).unwrap();
        let predicted = engine.predict(&points).unwrap();
        assert_eq!(predicted, result.labels);
        assert!(result.inertia >= 0.0);
    }
}
