//! Region lookup for per-entity points.
//!
//! Reads a `uid,<point>` table (typically the output of `compute-medians`) and
//! writes the region containing each point.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use localness::batch::{open_input, point_inputs, BatchRunner, CsvSink, MEDIAN_COLUMN};
use localness::pip::ClassificationCache;
use localness::{Config, PointClassifier, RegionIndex};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "point-to-county")]
#[command(about = "Assign each entity's point to the region containing it")]
struct Args {
    /// Input CSV with a uid column and a `(lat, lon)` point column
    #[arg(short, long)]
    input: PathBuf,

    /// Output CSV
    #[arg(short, long)]
    output: PathBuf,

    /// Region boundaries (GeoJSON)
    #[arg(long)]
    regions: PathBuf,

    /// Group boundaries (GeoJSON); derived from the regions when omitted
    #[arg(long)]
    groups: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input column holding the point
    #[arg(long, default_value = MEDIAN_COLUMN)]
    point_column: String,

    /// Output column holding the region id
    #[arg(long, default_value = "county")]
    region_column: String,

    /// Input column copied to the output ahead of the region, e.g. `loc_field`
    #[arg(long)]
    passthrough_column: Option<String>,

    /// Feature property holding the region id
    #[arg(long)]
    id_property: Option<String>,

    /// Classification cache (JSON), loaded if present and saved afterwards
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Test every point, not only those inside the country bounding box
    #[arg(long)]
    no_country_filter: bool,

    /// Only write entities that fall in a region
    #[arg(long)]
    resolved_only: bool,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(id_property) = &args.id_property {
        config.classification.id_property = id_property.clone();
    }
    if args.no_country_filter {
        config.classification.country_filter = false;
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

    let index = RegionIndex::load(&args.regions, args.groups.as_deref(), &config.classification)
        .context("Failed to load region boundaries")?;

    let cache = match &args.cache {
        Some(path) if path.exists() => ClassificationCache::load(path)
            .with_context(|| format!("Failed to load cache {}", path.display()))?,
        _ => ClassificationCache::new(),
    };
    let mut classifier = PointClassifier::with_cache(&index, cache);

    let input = open_input(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let rows = point_inputs(
        input,
        &args.point_column,
        args.passthrough_column.as_deref(),
    )
    .context("Failed to read input header")?;

    let output = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("Failed to create {}", args.output.display()))?,
    );
    let mut sink = CsvSink::regions(
        output,
        args.passthrough_column.as_deref(),
        &args.region_column,
    )?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} entities ({per_sec})")?,
    );

    let runner = BatchRunner::new(&config);
    let summary = runner.run_classification(&mut classifier, rows, |row| {
        pb.inc(1);
        sink.write_region(&row)
    })?;
    sink.flush()?;
    pb.finish_and_clear();

    if let Some(path) = &args.cache {
        classifier
            .cache()
            .save(path)
            .with_context(|| format!("Failed to save cache {}", path.display()))?;
    }

    info!(
        "Assigned {} of {} entities to a region",
        summary.resolved, summary.entities
    );

    Ok(())
}
