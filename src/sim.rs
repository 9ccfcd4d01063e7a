//! Simulation harness
//!
//! `simulate` is the pure core (corpus + RNG in, trajectory and mixed signals
//! out); `run_dataset` loads the corpus, runs the core, and writes the dataset.

use std::path::PathBuf;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::info;

use crate::config::SynthConfig;
use crate::corpus::{load_corpus, DistanceMap, SourceCorpus};
use crate::kinematics::Trajectory;
use crate::mixing::{mix_trajectory, output_length, MixedSignal};
use crate::output::{
    ensure_outdir, position_records, write_positions_csv, write_signal_csv, write_signal_wav,
    write_sources_yaml, write_summary, OutputFiles,
};
use crate::SynthError;

/// Mixed into the seed so source selection does not consume simulation draws.
const SELECTION_SALT: u64 = 0x5E1E_C7ED_50A7_CE55;

/// Output of one simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub trajectory: Trajectory,
    pub signals: Vec<MixedSignal>,
}

/// Where a run reads from and writes to.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub distance_map: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimePointSummary {
    pub time_index: usize,
    pub offset: usize,
    pub min_range_m: f64,
    pub guard_steps: usize,
    pub peak: f64,
    pub clamped_samples: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: String,
    pub seed: u64,
    pub config: SynthConfig,
    pub sources: Vec<String>,
    pub sample_rate: u32,
    pub sample_width: u16,
    pub corpus_samples: usize,
    pub output_samples: usize,
    pub initial_ranges_m: Vec<f64>,
    pub time_points: Vec<TimePointSummary>,
    pub outputs: OutputFiles,
}

/// Runs the kinematic model and the mixing engine on an in-memory corpus.
///
/// Draw order on `rng`: displacement magnitudes, displacement headings,
/// initial ranges (skipped when the corpus carries fixed ranges), initial
/// azimuths, then one temporal offset per time point after the first.
pub fn simulate<R: Rng + ?Sized>(
    config: &SynthConfig,
    corpus: &SourceCorpus,
    rng: &mut R,
) -> Result<Simulation, SynthError> {
    // Fail on a short corpus before any draws are made.
    output_length(corpus.num_samples(), corpus.sample_rate(), config.temporal_shift)?;

    let trajectory =
        Trajectory::generate(config, corpus.num_sources(), corpus.initial_ranges(), rng)?;
    let signals = mix_trajectory(corpus, &trajectory, config.temporal_shift, rng)?;

    Ok(Simulation {
        trajectory,
        signals,
    })
}

/// Loads the sources, simulates, and writes the dataset into `paths.output_dir`.
pub fn run_dataset(config: &SynthConfig, paths: &RunPaths) -> Result<RunSummary, SynthError> {
    config.validate()?;

    let seed = config.seed.unwrap_or_else(rand::random);
    info!(seed, "starting synthetic dataset run");

    let distance_map = paths
        .distance_map
        .as_deref()
        .map(DistanceMap::from_yaml_file)
        .transpose()?;

    let mut selection_rng = ChaCha8Rng::seed_from_u64(seed ^ SELECTION_SALT);
    let corpus = load_corpus(
        &paths.data_dir,
        config.num_active_sources,
        distance_map.as_ref(),
        &mut selection_rng,
    )?;
    info!(
        sources = corpus.num_sources(),
        samples = corpus.num_samples(),
        sample_rate = corpus.sample_rate(),
        sample_width = corpus.sample_width(),
        fixed_ranges = corpus.initial_ranges().is_some(),
        "corpus ready"
    );

    info!(
        time_points = config.num_time_points,
        temporal_shift = config.temporal_shift,
        range_guard = ?config.range_guard,
        "generating synthetic audio clips"
    );
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let simulation = simulate(config, &corpus, &mut rng)?;

    ensure_outdir(&paths.output_dir)?;
    let outputs = OutputFiles::new(&paths.output_dir, simulation.signals.len());

    info!(dir = %paths.output_dir.display(), "saving metadata");
    write_sources_yaml(&outputs.sources_path, corpus.ids())?;
    write_positions_csv(
        &outputs.positions_path,
        &position_records(&simulation.trajectory, corpus.ids()),
    )?;

    info!(count = simulation.signals.len(), "saving synthetic audio clips");
    let mut time_points = Vec::with_capacity(simulation.signals.len());
    for (signal, files) in simulation.signals.iter().zip(&outputs.time_points) {
        write_signal_csv(&files.csv_path, signal)?;
        let clamped_samples = write_signal_wav(
            &files.wav_path,
            signal,
            corpus.sample_rate(),
            corpus.sample_width(),
        )?;

        let ranges = simulation.trajectory.ranges_at(signal.time_index);
        time_points.push(TimePointSummary {
            time_index: signal.time_index,
            offset: signal.offset,
            min_range_m: ranges.iter().copied().fold(f64::INFINITY, f64::min),
            guard_steps: simulation.trajectory.guard_steps()[signal.time_index],
            peak: signal.peak(),
            clamped_samples,
        });
    }

    let summary = RunSummary {
        generated_at: chrono::Utc::now().to_rfc3339(),
        seed,
        config: config.clone(),
        sources: corpus.ids().to_vec(),
        sample_rate: corpus.sample_rate(),
        sample_width: corpus.sample_width(),
        corpus_samples: corpus.num_samples(),
        output_samples: simulation.signals.first().map_or(0, MixedSignal::len),
        initial_ranges_m: simulation.trajectory.initial_ranges(),
        time_points,
        outputs,
    };
    write_summary(&summary.outputs.summary_path, &summary)?;

    Ok(summary)
}
