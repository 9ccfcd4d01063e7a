use std::path::PathBuf;

use anyhow::{ensure, Context};
use clap::Parser;
use ica_synth::config::{RangeGuard, SynthConfig};
use ica_synth::sim::{run_dataset, RunPaths};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Generate synthetic datasets for single-sensor, multiple-time ICA"
)]
struct Cli {
    /// Directory containing audio files for sources
    data_dir: PathBuf,

    /// Directory that synthetic data is saved to
    #[arg(default_value = "data/synthetic-single-sensor-multiple-time")]
    output_dir: PathBuf,

    /// TOML configuration file; command-line options override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of simultaneously active sources
    #[arg(short = 'n', long)]
    num_active_sources: Option<usize>,

    /// Number of time points to generate data at
    #[arg(short = 't', long)]
    num_time_points: Option<usize>,

    /// YAML file with the distance of the source for each audio file [m]
    #[arg(short = 'm', long = "distance-map")]
    distance_map: Option<PathBuf>,

    /// Minimum allowable distance of sources from the receiver [m]
    #[arg(long)]
    min_dist: Option<f64>,

    /// Minimum initial distance of sources from the receiver [m]; defaults to --min-dist
    #[arg(long)]
    min_init_dist: Option<f64>,

    /// Average initial distance of sources from the receiver [m]; ignored with a distance map
    #[arg(short = 'i', long)]
    init_dist: Option<f64>,

    /// Average distance travelled by sources between time points [m]
    #[arg(short = 'd', long)]
    delta_dist: Option<f64>,

    /// Minimum distance travelled by sources between time points [m]
    #[arg(long)]
    min_delta_dist: Option<f64>,

    /// Apply a random temporal shift when combining sources
    #[arg(short = 'S', long)]
    temporal_shift: bool,

    /// How sources inside the minimum distance are handled after time 0
    #[arg(long, value_enum)]
    range_guard: Option<RangeGuard>,

    /// Maximum extra steps taken to clear the minimum distance at one time point
    #[arg(long)]
    max_range_retries: Option<usize>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Log debug detail
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    ensure!(
        cli.data_dir.is_dir(),
        "Path to data '{}' does not exist.",
        cli.data_dir.display()
    );
    if let Some(path) = &cli.distance_map {
        ensure!(
            path.is_file(),
            "Path to distance map '{}' does not exist.",
            path.display()
        );
    }

    let mut cfg = match &cli.config {
        Some(path) => SynthConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SynthConfig::default(),
    };
    if let Some(v) = cli.num_active_sources {
        cfg.num_active_sources = v;
    }
    if let Some(v) = cli.num_time_points {
        cfg.num_time_points = v;
    }
    if let Some(v) = cli.min_dist {
        cfg.min_range_m = v;
    }
    if let Some(v) = cli.min_init_dist {
        cfg.min_initial_range_m = Some(v);
    }
    if let Some(v) = cli.init_dist {
        cfg.avg_initial_range_m = v;
    }
    if let Some(v) = cli.delta_dist {
        cfg.avg_step_m = v;
    }
    if let Some(v) = cli.min_delta_dist {
        cfg.min_step_m = v;
    }
    if cli.temporal_shift {
        cfg.temporal_shift = true;
    }
    if let Some(v) = cli.range_guard {
        cfg.range_guard = v;
    }
    if let Some(v) = cli.max_range_retries {
        cfg.max_range_retries = v;
    }
    if let Some(v) = cli.seed {
        cfg.seed = Some(v);
    }
    cfg.validate().context("invalid configuration")?;

    let paths = RunPaths {
        data_dir: cli.data_dir,
        output_dir: cli.output_dir,
        distance_map: cli.distance_map,
    };
    let summary = run_dataset(&cfg, &paths).context("synthetic dataset run failed")?;

    println!(
        "Dataset complete. Sources: {} | Time points: {} | Samples per clip: {} | Seed: {}",
        summary.sources.join(", "),
        summary.time_points.len(),
        summary.output_samples,
        summary.seed
    );
    println!("Output directory: {}", summary.outputs.output_dir.display());
    println!("Summary: {}", summary.outputs.summary_path.display());

    let clamped: usize = summary.time_points.iter().map(|t| t.clamped_samples).sum();
    if clamped > 0 {
        println!("Clamped samples across all clips: {clamped}");
    }

    Ok(())
}
