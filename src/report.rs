//! Plain-text cluster reports.

use crate::error::{Error, Result};
use crate::extract::NetRecord;
use crate::weights::WeightMode;
use ndarray::{ArrayBase, Data, Ix1, Ix2};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Group records by cluster index, members sorted by label then coordinates.
fn group_members<'a, S>(
    records: &'a [NetRecord],
    labels: &ArrayBase<S, Ix1>,
) -> BTreeMap<usize, Vec<&'a NetRecord>>
where
    S: Data<Elem = usize>,
{
    let mut clusters: BTreeMap<usize, Vec<&NetRecord>> = BTreeMap::new();
    for (record, &label) in records.iter().zip(labels.iter()) {
        clusters.entry(label).or_default().push(record);
    }
    for members in clusters.values_mut() {
        members.sort_by(|a, b| {
            a.label
                .cmp(&b.label)
                .then(a.x.total_cmp(&b.x))
                .then(a.y.total_cmp(&b.y))
        });
    }
    clusters
}

/// Write the grouped cluster report. Only non-empty clusters are listed,
/// numbered from 1.
pub fn write_report<W, S1, S2>(
    out: &mut W,
    mode: WeightMode,
    k: usize,
    records: &[NetRecord],
    labels: &ArrayBase<S1, Ix1>,
    centroids: &ArrayBase<S2, Ix2>,
) -> Result<()>
where
    W: Write,
    S1: Data<Elem = usize>,
    S2: Data<Elem = f64>,
{
    if labels.len() != records.len() {
        return Err(Error::LengthMismatch {
            expected: records.len(),
            actual: labels.len(),
        });
    }
    if centroids.ncols() < 2 {
        return Err(Error::LengthMismatch {
            expected: 2,
            actual: centroids.ncols(),
        });
    }
    if let Some(&label) = labels.iter().find(|&&l| l >= centroids.nrows()) {
        // a label must index a centroid row
        return Err(Error::LengthMismatch {
            expected: centroids.nrows(),
            actual: label + 1,
        });
    }

    writeln!(out, "Cluster Assignments for {} K-Means (K={})", mode.title(), k)?;
    writeln!(out, "{}", "=".repeat(50))?;
    writeln!(out)?;

    for (cluster_id, members) in group_members(records, labels) {
        let centroid = centroids.row(cluster_id);
        writeln!(out, "Cluster {}:", cluster_id + 1)?;
        writeln!(out, "{}", "-".repeat(20))?;
        writeln!(
            out,
            "Centroid Coordinates: X = {:.4}, Y = {:.4}",
            centroid[0], centroid[1]
        )?;
        writeln!(out, "{}", "-".repeat(20))?;
        writeln!(out, "Points in this cluster:")?;
        for record in members {
            writeln!(out, "{}: X = {:.4}, Y = {:.4}", record.label, record.x, record.y)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Write `ClusterOutputk=<k>.txt` into `dir` and return its path.
pub fn save_report<S1, S2>(
    dir: impl AsRef<Path>,
    mode: WeightMode,
    k: usize,
    records: &[NetRecord],
    labels: &ArrayBase<S1, Ix1>,
    centroids: &ArrayBase<S2, Ix2>,
) -> Result<PathBuf>
where
    S1: Data<Elem = usize>,
    S2: Data<Elem = f64>,
{
    let path = dir.as_ref().join(format!("ClusterOutputk={}.txt", k));
    let mut out = BufWriter::new(File::create(&path)?);
    write_report(&mut out, mode, k, records, labels, centroids)?;
    out.flush()?;
    info!(path = %path.display(), "Saved cluster assignments");
    Ok(path)
}
