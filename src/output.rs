use std::fs;
use std::path::{Path, PathBuf};

use csv::{Writer, WriterBuilder};
use hound::{SampleFormat, WavSpec, WavWriter};
use serde::Serialize;
use tracing::warn;

use crate::kinematics::Trajectory;
use crate::mixing::{attenuation_factors, MixedSignal};
use crate::SynthError;

/// Integer PCM samples plus the number that had to be clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantized {
    pub samples: Vec<i32>,
    pub clamped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionRecord {
    pub time_index: usize,
    pub source: String,
    pub x_m: f64,
    pub y_m: f64,
    pub range_m: f64,
    pub attenuation: f64,
    pub guard_steps: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimePointFiles {
    pub time_index: usize,
    pub csv_path: PathBuf,
    pub wav_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputFiles {
    pub output_dir: PathBuf,
    pub sources_path: PathBuf,
    pub positions_path: PathBuf,
    pub summary_path: PathBuf,
    pub time_points: Vec<TimePointFiles>,
}

impl OutputFiles {
    pub fn new(output_dir: &Path, num_time_points: usize) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            sources_path: output_dir.join("sources.yaml"),
            positions_path: output_dir.join("positions.csv"),
            summary_path: output_dir.join("summary.json"),
            time_points: (0..num_time_points)
                .map(|time_index| TimePointFiles {
                    time_index,
                    csv_path: output_dir.join(format!("t-{time_index}.csv")),
                    wav_path: output_dir.join(format!("t-{time_index}.wav")),
                })
                .collect(),
        }
    }
}

/// Signed range representable with `sample_width` bytes.
pub fn sample_bounds(sample_width: u16) -> Result<(i64, i64), SynthError> {
    if !(1..=4).contains(&sample_width) {
        return Err(SynthError::UnsupportedFormat {
            id: "output".to_string(),
            reason: format!("{sample_width}-byte samples"),
        });
    }
    let bits = 8 * u32::from(sample_width);
    let max = (1_i64 << (bits - 1)) - 1;
    Ok((-max - 1, max))
}

/// Rounds half to even and clamps into the sample width's range.
pub fn quantize(samples: &[f64], sample_width: u16) -> Result<Quantized, SynthError> {
    let (min, max) = sample_bounds(sample_width)?;
    let (lo, hi) = (min as f64, max as f64);

    let mut clamped = 0;
    let samples = samples
        .iter()
        .map(|&value| {
            let rounded = value.round_ties_even();
            if rounded < lo || rounded > hi {
                clamped += 1;
            }
            // NaN lands on 0 through the saturating cast
            rounded.clamp(lo, hi) as i32
        })
        .collect();

    Ok(Quantized { samples, clamped })
}

pub fn ensure_outdir(dir: &Path) -> Result<(), SynthError> {
    fs::create_dir_all(dir)?;
    Ok(())
}

pub fn write_sources_yaml(path: &Path, ids: &[String]) -> Result<(), SynthError> {
    let payload = serde_yaml::to_string(ids)?;
    fs::write(path, payload)?;
    Ok(())
}

/// One value per line, no header.
pub fn write_signal_csv(path: &Path, signal: &MixedSignal) -> Result<(), SynthError> {
    let mut writer = WriterBuilder::new().has_headers(false).from_path(path)?;
    for value in &signal.samples {
        writer.write_record([format!("{value:.18e}")])?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes a mono WAV file and returns how many samples were clamped.
pub fn write_signal_wav(
    path: &Path,
    signal: &MixedSignal,
    sample_rate: u32,
    sample_width: u16,
) -> Result<usize, SynthError> {
    let quantized = quantize(&signal.samples, sample_width)?;
    if quantized.clamped > 0 {
        warn!(
            time_index = signal.time_index,
            clamped = quantized.clamped,
            sample_width,
            "mixed signal exceeds the sample range; clamping"
        );
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 8 * sample_width,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in &quantized.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    Ok(quantized.clamped)
}

pub fn position_records(trajectory: &Trajectory, ids: &[String]) -> Vec<PositionRecord> {
    let initial_ranges = trajectory.initial_ranges();
    let mut records = Vec::with_capacity(trajectory.num_time_points() * ids.len());

    for time_index in 0..trajectory.num_time_points() {
        let ranges = trajectory.ranges_at(time_index);
        let factors = attenuation_factors(&initial_ranges, &ranges);
        let guard_steps = trajectory.guard_steps()[time_index];

        for (idx, position) in trajectory.positions_at(time_index).iter().enumerate() {
            records.push(PositionRecord {
                time_index,
                source: ids.get(idx).cloned().unwrap_or_else(|| idx.to_string()),
                x_m: position.x(),
                y_m: position.y(),
                range_m: ranges[idx],
                attenuation: factors[idx],
                guard_steps,
            });
        }
    }

    records
}

pub fn write_positions_csv(path: &Path, records: &[PositionRecord]) -> Result<(), SynthError> {
    let mut writer = Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary<T: Serialize>(path: &Path, summary: &T) -> Result<(), SynthError> {
    let data = serde_json::to_string_pretty(summary)?;
    fs::write(path, data)?;
    Ok(())
}
