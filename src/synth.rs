//! Seeded synthetic point sets for demos and tests.

use ndarray::{Array2, ArrayBase, Axis, Data, Ix2};
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

/// `rows x cols` points drawn uniformly from `[0, 1)`.
pub fn uniform(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::random_using((rows, cols), Uniform::new(0.0, 1.0), &mut rng)
}

/// `per_cluster` points around each row of `centers`, with independent normal
/// noise of standard deviation `spread` on every coordinate. Points are laid
/// out cluster by cluster.
///
/// A non-positive or non-finite `spread` places every point exactly on its center.
pub fn blobs<S>(
    centers: &ArrayBase<S, Ix2>,
    per_cluster: usize,
    spread: f64,
    seed: u64,
) -> Array2<f64>
where
    S: Data<Elem = f64>,
{
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, spread).ok().filter(|_| spread > 0.0);

    let n_features = centers.ncols();
    let mut data = Array2::<f64>::zeros((centers.nrows() * per_cluster, n_features));
    for (cluster, center) in centers.axis_iter(Axis(0)).enumerate() {
        for i in 0..per_cluster {
            let mut row = data.row_mut(cluster * per_cluster + i);
            row.assign(&center);
            if let Some(noise) = &noise {
                row.mapv_inplace(|v| v + noise.sample(&mut rng));
            }
        }
    }
    data
}
