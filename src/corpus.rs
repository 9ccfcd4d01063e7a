//! Source corpus: loading, selection, and the common-length sample table.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader};
use nalgebra::DMatrix;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::SynthError;

/// One recorded source signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    /// File name, also the distance map key
    pub id: String,
    /// Fixed time-0 range [m], if the distance map provides one
    pub initial_range: Option<f64>,
    /// First-channel PCM values
    pub samples: Vec<f64>,
    /// Sample rate [Hz]
    pub sample_rate: u32,
    /// Bytes per sample
    pub sample_width: u16,
}

/// Range of each source file from the receiver at time 0 [m].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistanceMap(BTreeMap<String, f64>);

impl DistanceMap {
    pub fn from_yaml_str(raw: &str) -> Result<Self, SynthError> {
        let map: DistanceMap = serde_yaml::from_str(raw)?;
        map.validate()?;
        Ok(map)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, SynthError> {
        let raw = fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    fn validate(&self) -> Result<(), SynthError> {
        for (id, &range) in &self.0 {
            if !(range.is_finite() && range > 0.0) {
                return Err(SynthError::InvalidConfig(format!(
                    "distance for '{id}' must be positive, got {range}"
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<f64> {
        self.0.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for DistanceMap {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Active sources truncated to a common length, stored as a
/// `samples x sources` matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCorpus {
    ids: Vec<String>,
    initial_ranges: Option<Vec<f64>>,
    data: DMatrix<f64>,
    sample_rate: u32,
    sample_width: u16,
}

impl SourceCorpus {
    /// Checks that every source shares the sample format and truncates all of
    /// them to the shortest one.
    pub fn from_sources(sources: Vec<Source>) -> Result<Self, SynthError> {
        let first = sources.first().ok_or(SynthError::EmptyCorpus)?;
        let sample_rate = first.sample_rate;
        let sample_width = first.sample_width;

        for source in &sources {
            if source.sample_rate != sample_rate {
                return Err(SynthError::InconsistentFormat {
                    what: "sample rates",
                    first_id: first.id.clone(),
                    first: sample_rate,
                    id: source.id.clone(),
                    found: source.sample_rate,
                });
            }
            if source.sample_width != sample_width {
                return Err(SynthError::InconsistentFormat {
                    what: "sample widths",
                    first_id: first.id.clone(),
                    first: u32::from(sample_width),
                    id: source.id.clone(),
                    found: u32::from(source.sample_width),
                });
            }
        }

        let num_samples = sources
            .iter()
            .map(|source| source.samples.len())
            .min()
            .unwrap_or(0);
        if num_samples == 0 {
            return Err(SynthError::EmptyCorpus);
        }

        let with_range = sources
            .iter()
            .filter(|source| source.initial_range.is_some())
            .count();
        let initial_ranges = if with_range == sources.len() {
            Some(
                sources
                    .iter()
                    .filter_map(|source| source.initial_range)
                    .collect(),
            )
        } else {
            if with_range > 0 {
                warn!(
                    with_range,
                    total = sources.len(),
                    "only some sources have a fixed range; generating all initial ranges"
                );
            }
            None
        };

        let data = DMatrix::from_fn(num_samples, sources.len(), |row, col| {
            sources[col].samples[row]
        });
        let ids = sources.into_iter().map(|source| source.id).collect();

        Ok(Self {
            ids,
            initial_ranges,
            data,
            sample_rate,
            sample_width,
        })
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Fixed time-0 ranges, present only when every source has one.
    pub fn initial_ranges(&self) -> Option<&[f64]> {
        self.initial_ranges.as_deref()
    }

    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    pub fn num_samples(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_sources(&self) -> usize {
        self.data.ncols()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn sample_width(&self) -> u16 {
        self.sample_width
    }
}

/// Lists the `*.wav` files in `dir`, sorted by file name.
pub fn list_wav_files(dir: &Path) -> Result<Vec<PathBuf>, SynthError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_wav = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
        if is_wav && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Picks `count` files without replacement, keeping their listing order.
pub fn select_active<R: Rng + ?Sized>(
    files: &[PathBuf],
    count: usize,
    rng: &mut R,
) -> Result<Vec<PathBuf>, SynthError> {
    if count > files.len() {
        return Err(SynthError::NotEnoughSources {
            requested: count,
            available: files.len(),
        });
    }

    let mut indices = rand::seq::index::sample(rng, files.len(), count).into_vec();
    indices.sort_unstable();
    Ok(indices.into_iter().map(|idx| files[idx].clone()).collect())
}

fn file_id(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Reads the first channel of an integer PCM WAV file.
pub fn load_source(path: &Path, distance_map: Option<&DistanceMap>) -> Result<Source, SynthError> {
    let id = file_id(path);
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.sample_format != SampleFormat::Int {
        return Err(SynthError::UnsupportedFormat {
            id,
            reason: "floating-point samples".to_string(),
        });
    }
    if spec.channels == 0 {
        return Err(SynthError::UnsupportedFormat {
            id,
            reason: "no channels".to_string(),
        });
    }

    let channels = usize::from(spec.channels);
    let samples = reader
        .samples::<i32>()
        .step_by(channels)
        .map(|sample| sample.map(f64::from))
        .collect::<Result<Vec<f64>, hound::Error>>()?;

    let initial_range = match distance_map {
        Some(map) => Some(
            map.get(&id)
                .ok_or_else(|| SynthError::MissingDistance(id.clone()))?,
        ),
        None => None,
    };

    debug!(
        %id,
        samples = samples.len(),
        sample_rate = spec.sample_rate,
        bits = spec.bits_per_sample,
        channels,
        "loaded source"
    );

    Ok(Source {
        id,
        initial_range,
        samples,
        sample_rate: spec.sample_rate,
        sample_width: spec.bits_per_sample.div_ceil(8),
    })
}

/// Selects and loads `count` sources from `dir`.
pub fn load_corpus<R: Rng + ?Sized>(
    dir: &Path,
    count: usize,
    distance_map: Option<&DistanceMap>,
    rng: &mut R,
) -> Result<SourceCorpus, SynthError> {
    let files = list_wav_files(dir)?;
    let active = select_active(&files, count, rng)?;
    info!(available = files.len(), active = active.len(), "loading data");

    let sources = active
        .iter()
        .map(|path| load_source(path, distance_map))
        .collect::<Result<Vec<_>, _>>()?;

    SourceCorpus::from_sources(sources)
}
