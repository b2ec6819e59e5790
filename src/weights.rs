//! Per-point weight vectors: uniform weights, repair and normalization of raw
//! capacitances, and entropy amplification.
//!
//! Every vector produced here is strictly positive and sums to 1.

use crate::error::{Error, Result};
use ndarray::{Array1, ArrayBase, Data, Ix1};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Factor applied to the smallest positive weight to stand in for non-positive ones.
const REPAIR_FACTOR: f64 = 0.1;

/// Weighting policy of a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum WeightMode {
    /// Every point weighs `1/n`.
    #[default]
    Plain,
    /// Normalized raw weights (capacitances).
    Weighted,
    /// Normalized raw weights amplified by local-density entropy.
    Entropy,
}

impl WeightMode {
    /// Whether this mode needs caller-supplied raw weights.
    pub fn requires_weights(self) -> bool {
        !matches!(self, WeightMode::Plain)
    }

    /// Human-readable name used in report headers.
    pub fn title(self) -> &'static str {
        match self {
            WeightMode::Plain => "Regular",
            WeightMode::Weighted => "Weighted",
            WeightMode::Entropy => "Entropy",
        }
    }
}

/// `n` equal weights of `1/n`.
pub fn uniform(n: usize) -> Result<Array1<f64>> {
    if n == 0 {
        return Err(Error::EmptyInput);
    }
    Ok(Array1::from_elem(n, 1.0 / n as f64))
}

/// Repair non-positive entries and scale the vector to sum to 1.
///
/// Entries `<= 0` are replaced with a tenth of the smallest positive entry.
/// Fails with [`Error::InvalidWeights`] when no entry is positive or any
/// entry is not finite.
pub fn normalize<S>(raw: &ArrayBase<S, Ix1>) -> Result<Array1<f64>>
where
    S: Data<Elem = f64>,
{
    if raw.is_empty() {
        return Err(Error::EmptyInput);
    }
    if let Some(index) = raw.iter().position(|w| !w.is_finite()) {
        return Err(Error::InvalidWeights(format!(
            "weight {} is not finite",
            index
        )));
    }

    let max_positive = raw.iter().copied().fold(0.0, f64::max);
    if max_positive <= 0.0 {
        return Err(Error::InvalidWeights(format!(
            "all {} weights are non-positive",
            raw.len()
        )));
    }

    // Scaled into (0, 1] so the sum cannot overflow and the repair value
    // cannot underflow.
    let scaled = raw.mapv(|w| {
        if w > 0.0 {
            (w / max_positive).max(f64::MIN_POSITIVE)
        } else {
            w
        }
    });
    let min_positive = scaled
        .iter()
        .copied()
        .filter(|&w| w > 0.0)
        .fold(f64::INFINITY, f64::min);

    let replacement = (min_positive * REPAIR_FACTOR).max(f64::MIN_POSITIVE);
    let repaired = scaled.iter().filter(|&&w| w <= 0.0).count();
    if repaired > 0 {
        warn!(
            repaired,
            relative_replacement = replacement,
            "Found zero or negative weights, substituting small positive values"
        );
    }

    let weights = scaled.mapv(|w| if w <= 0.0 { replacement } else { w });
    let total = stable_sum(weights.iter().copied());
    Ok(weights / total)
}

/// `weights[i] * (1 + entropy[i])`, renormalized.
pub fn combine_with_entropy<S1, S2>(
    weights: &ArrayBase<S1, Ix1>,
    entropy: &ArrayBase<S2, Ix1>,
) -> Result<Array1<f64>>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    if weights.len() != entropy.len() {
        return Err(Error::LengthMismatch {
            expected: weights.len(),
            actual: entropy.len(),
        });
    }
    let combined = weights * &entropy.mapv(|e| 1.0 + e);
    normalize(&combined)
}

/// Neumaier-compensated summation.
pub(crate) fn stable_sum(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut compensation = 0.0;
    for v in values {
        let t = sum + v;
        if f64::abs(sum) >= f64::abs(v) {
            compensation += (sum - t) + v;
        } else {
            compensation += (v - t) + sum;
        }
        sum = t;
    }
    sum + compensation
}
