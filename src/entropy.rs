//! Local-density entropy.
//!
//! Each point's `neighborhood_size` nearest neighbors are turned into a
//! probability distribution by a softmax over negative distance, and the
//! point's score is the Shannon entropy of that distribution. Points whose
//! neighbors are all about equally far score high (uncertain local density);
//! points with one dominant close neighbor score low.
//!
//! Distances are computed row by row against every other point, which is
//! O(N²) and fine for the report sizes this crate targets.

use crate::error::{Error, Result};
use ndarray::{Array1, ArrayBase, ArrayView1, Axis, Data, Ix2};
use rayon::prelude::*;

/// Guard against `ln(0)` in the entropy sum.
const LOG_EPSILON: f64 = 1e-10;

/// Per-point entropy of the nearest-neighbor softmax distribution.
///
/// `neighborhood_size` larger than `N - 1` is clamped to `N - 1`. Fails with
/// [`Error::InvalidNeighborhoodSize`] when the size is zero or there are fewer
/// than two points, and with [`Error::NonFinitePoint`] on a NaN or infinite
/// coordinate.
pub fn estimate<S>(points: &ArrayBase<S, Ix2>, neighborhood_size: usize) -> Result<Array1<f64>>
where
    S: Data<Elem = f64> + Sync,
{
    let n = points.nrows();
    if n < 2 || neighborhood_size == 0 {
        return Err(Error::InvalidNeighborhoodSize {
            size: neighborhood_size,
            n,
        });
    }
    if let Some(index) = points
        .axis_iter(Axis(0))
        .position(|row| row.iter().any(|v| !v.is_finite()))
    {
        return Err(Error::NonFinitePoint { index });
    }
    let m = neighborhood_size.min(n - 1);

    let entropies: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|i| {
            let distances: Vec<f64> = nearest_neighbors(points, i, m)
                .into_iter()
                .map(|(d, _)| d)
                .collect();
            shannon_entropy(&softmax_neg(&distances))
        })
        .collect();

    Ok(Array1::from(entropies))
}

/// `(distance, index)` of the `m` nearest points to point `i`, ascending.
/// Ties keep the lower point index first.
fn nearest_neighbors<S>(points: &ArrayBase<S, Ix2>, i: usize, m: usize) -> Vec<(f64, usize)>
where
    S: Data<Elem = f64>,
{
    let origin = points.row(i);
    let mut candidates: Vec<(f64, usize)> = points
        .rows()
        .into_iter()
        .enumerate()
        .filter(|&(j, _)| j != i)
        .map(|(j, p)| (euclidean(&origin, &p), j))
        .collect();

    candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    candidates.truncate(m);
    candidates
}

/// `exp(-d_j) / Σ exp(-d_k)`, shifted by the smallest distance so large
/// coordinates do not underflow every term to zero.
fn softmax_neg(distances: &[f64]) -> Vec<f64> {
    let shift = distances.iter().copied().fold(f64::INFINITY, f64::min);
    let exps: Vec<f64> = distances.iter().map(|&d| (-(d - shift)).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

fn shannon_entropy(probabilities: &[f64]) -> f64 {
    let h: f64 = -probabilities
        .iter()
        .map(|&p| p * (p + LOG_EPSILON).ln())
        .sum::<f64>();
    // a single neighbor gives -ln(1 + eps), a tiny negative
    h.max(0.0)
}

pub(crate) fn euclidean(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
