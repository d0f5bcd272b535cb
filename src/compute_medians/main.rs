//! Per-entity geometric medians.
//!
//! Reads a `uid,lat,lon` table grouped by uid, writes one `(lat, lon)` median
//! per entity and, when region boundaries are given, the region each median
//! falls in.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use hashbrown::HashSet;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use localness::batch::{open_input, point_records, read_entity_ids, BatchRunner, CsvSink};
use localness::{Config, PointClassifier, RegionIndex};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "compute-medians")]
#[command(about = "Compute a geometric median for each entity's points")]
struct Args {
    /// Input CSV with `uid,lat,lon` rows grouped by uid (may be gzipped)
    #[arg(short, long)]
    input: PathBuf,

    /// Output CSV
    #[arg(short, long)]
    output: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Earlier output files whose entities should not be recomputed
    #[arg(long)]
    skip: Vec<PathBuf>,

    /// Region boundaries (GeoJSON); classifies each median in the same pass
    #[arg(long)]
    regions: Option<PathBuf>,

    /// Group boundaries (GeoJSON); derived from the regions when omitted
    #[arg(long, requires = "regions")]
    groups: Option<PathBuf>,

    /// Output column holding the region id
    #[arg(long, default_value = "county")]
    region_column: String,

    /// Minimum points per entity
    #[arg(long)]
    min_points: Option<usize>,

    /// Largest accepted median absolute deviation, in kilometers
    #[arg(long)]
    mad_limit_km: Option<f64>,

    /// Snap the median to the best input point
    #[arg(long)]
    snap: bool,

    /// Only write entities with a resolved median
    #[arg(long)]
    resolved_only: bool,

    /// Worker threads (defaults to one per core)
    #[arg(long)]
    threads: Option<usize>,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(min_points) = args.min_points {
        config.median.min_points = min_points;
    }
    if let Some(limit) = args.mad_limit_km {
        config.median.mad_limit_km = limit;
    }
    if args.snap {
        config.median.snap_to_input_points = true;
    }
    if args.resolved_only {
        config.output.emit_all_entities = false;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = load_config(&args)?;

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure worker threads")?;
    }

    info!("Computing medians for {}", args.input.display());

    let mut skip = HashSet::new();
    for path in &args.skip {
        let ids = read_entity_ids(path)
            .with_context(|| format!("Failed to read earlier output {}", path.display()))?;
        skip.extend(ids);
    }
    if !skip.is_empty() {
        info!("Skipping {} entities from earlier runs", skip.len());
    }

    let runner = BatchRunner::new(&config).with_skip(skip);

    let input = open_input(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let records = point_records(input).context("Failed to read input header")?;

    let output = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("Failed to create {}", args.output.display()))?,
    );

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} entities ({per_sec})")?,
    );

    let summary = match &args.regions {
        Some(regions) => {
            let index =
                RegionIndex::load(regions, args.groups.as_deref(), &config.classification)
                    .context("Failed to load region boundaries")?;
            let mut classifier = PointClassifier::new(&index);
            let mut sink = CsvSink::locations(output, &args.region_column)?;
            let summary = runner.run_pipeline(&mut classifier, records, |row| {
                pb.inc(1);
                sink.write_location(&row)
            })?;
            sink.flush()?;
            summary
        }
        None => {
            let mut sink = CsvSink::medians(output)?;
            let summary = runner.run_medians(records, |row| {
                pb.inc(1);
                sink.write_median(&row)
            })?;
            sink.flush()?;
            summary
        }
    };

    pb.finish_and_clear();
    info!(
        "Wrote {} medians for {} entities to {}",
        summary.resolved,
        summary.entities,
        args.output.display()
    );

    Ok(())
}
