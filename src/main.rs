use clap::Parser;
use ndarray::Axis;
use netcluster::extract::{self, NetRecord};
use netcluster::{report, synth, InitStrategy, KMeans, KMeansConfig, WeightMode};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "netcluster")]
#[command(about = "Capacitance- and entropy-weighted K-Means clustering of layout nets")]
#[command(version)]
struct Args {
    /// Coordinate report (`<label> : X = {<x>, Y = <y>}` lines)
    #[arg(long, required_unless_present = "demo")]
    coords: Option<PathBuf>,

    /// Parasitics report holding per-node capacitances
    #[arg(long, required_unless_present = "demo")]
    parasitics: Option<PathBuf>,

    /// Weighting policy
    #[arg(long, value_enum, default_value_t = WeightMode::Plain)]
    mode: WeightMode,

    /// Number of clusters
    #[arg(short)]
    k: Option<usize>,

    /// Iteration cap
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Nearest neighbors considered by the entropy estimate
    #[arg(long)]
    neighborhood_size: Option<usize>,

    /// Seed for centroid initialization
    #[arg(long)]
    seed: Option<u64>,

    /// Centroid initialization strategy
    #[arg(long, value_enum)]
    init: Option<InitStrategy>,

    /// JSON configuration file; command-line values take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory receiving ClusterOutputk=<K>.txt
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Cluster this many synthetic points instead of reading reports
    #[arg(long)]
    demo: Option<usize>,

    /// Log level (debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn resolve_config(&self) -> netcluster::Result<KMeansConfig> {
        let mut config = match &self.config {
            Some(path) => KMeansConfig::from_json_file(path)?,
            None => KMeansConfig::default(),
        };
        if let Some(k) = self.k {
            config.k = k;
        }
        if let Some(max_iterations) = self.max_iterations {
            config.max_iterations = max_iterations;
        }
        if let Some(size) = self.neighborhood_size {
            config.neighborhood_size = size;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(init) = self.init {
            config.init = init;
        }
        Ok(config)
    }
}

/// Well-separated blobs with random capacitances, labelled `net_<i>`.
fn demo_records(n_samples: usize, config: &KMeansConfig) -> Vec<NetRecord> {
    let n_clusters = config.k.max(1);
    let centers = synth::uniform(n_clusters, 2, config.seed) * 100.0;
    let per_cluster = n_samples.div_ceil(n_clusters);
    let points = synth::blobs(&centers, per_cluster, 2.0, config.seed);
    let capacitances = synth::uniform(points.nrows(), 1, config.seed.wrapping_add(1));

    points
        .axis_iter(Axis(0))
        .zip(capacitances.iter())
        .take(n_samples)
        .enumerate()
        .map(|(i, (p, &c))| NetRecord {
            label: format!("net_{}", i),
            x: p[0],
            y: p[1],
            capacitance: c,
        })
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let config = args.resolve_config()?;
    info!(
        k = config.k,
        max_iterations = config.max_iterations,
        mode = ?args.mode,
        init = ?config.init,
        "Starting netcluster"
    );

    let records = match (args.demo, &args.coords, &args.parasitics) {
        (Some(n_samples), _, _) => demo_records(n_samples, &config),
        (None, Some(coords), Some(parasitics)) => extract::extract_records(coords, parasitics),
        _ => Vec::new(),
    };
    if records.is_empty() {
        warn!("No points to cluster");
    }

    let (points, capacitances) = extract::records_to_arrays(&records);
    let kmeans = KMeans::with_config(config);
    let result = kmeans.fit(&points, args.mode, capacitances.as_slice())?;

    info!(
        iterations = result.iterations,
        termination = ?result.termination,
        inertia = result.inertia,
        "Clustering completed"
    );
    for (cluster_id, centroid) in result.centroids.axis_iter(Axis(0)).enumerate() {
        let count = result.labels.iter().filter(|&&l| l == cluster_id).count();
        info!(
            "Cluster {}: X = {:.4}, Y = {:.4}, {} points",
            cluster_id + 1,
            centroid[0],
            centroid[1],
            count
        );
    }

    let path = report::save_report(
        &args.output_dir,
        args.mode,
        kmeans.config().k,
        &records,
        &result.labels,
        &result.centroids,
    )?;
    info!("Report written to {}", path.display());
    Ok(())
}
