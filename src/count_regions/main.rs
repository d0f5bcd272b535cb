//! Number of distinct regions each entity's points fall in.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use localness::batch::{open_input, point_records, BatchRunner, CsvSink, ENTITY_COLUMN};
use localness::{Config, RegionIndex};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "count-regions")]
#[command(about = "Count the distinct regions each entity's points fall in")]
struct Args {
    /// Input CSV with `uid,lat,lon` rows grouped by uid (may be gzipped)
    #[arg(short, long)]
    input: PathBuf,

    /// Output CSV
    #[arg(short, long)]
    output: PathBuf,

    /// Region boundaries (GeoJSON), e.g. states
    #[arg(long)]
    regions: PathBuf,

    /// Group boundaries (GeoJSON); derived from the regions when omitted
    #[arg(long)]
    groups: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output column holding the count
    #[arg(long, default_value = "regions")]
    count_column: String,

    /// Feature property holding the region id
    #[arg(long)]
    id_property: Option<String>,

    /// Test every point, not only those inside the country bounding box
    #[arg(long)]
    no_country_filter: bool,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

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

    let index = RegionIndex::load(&args.regions, args.groups.as_deref(), &config.classification)
        .context("Failed to load region boundaries")?;

    let input = open_input(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let records = point_records(input).context("Failed to read input header")?;

    let output = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("Failed to create {}", args.output.display()))?,
    );
    let mut sink = CsvSink::new(output, &[ENTITY_COLUMN, args.count_column.as_str()])?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} entities ({per_sec})")?,
    );

    let runner = BatchRunner::new(&config);
    let summary = runner.run_region_counts(&index, records, |row| {
        pb.inc(1);
        sink.write_region_count(&row)
    })?;
    sink.flush()?;
    pb.finish_and_clear();

    info!(
        "Counted regions for {} entities ({} with at least one)",
        summary.entities, summary.resolved
    );

    Ok(())
}
