//! ica-synth - synthetic datasets for single-sensor, multi-time ICA
//!
//! Simulates a handful of recorded sources moving in a plane around a fixed
//! receiver, attenuates each one by its range, and sums them into one mixed
//! signal per time point.

pub mod config;
pub mod corpus;
pub mod kinematics;
pub mod mixing;
pub mod output;
pub mod sim;

use thiserror::Error;

// Re-export main types
pub use config::{RangeGuard, SynthConfig};
pub use corpus::{DistanceMap, Source, SourceCorpus};
pub use kinematics::{Displacement, Position, Trajectory};
pub use mixing::MixedSignal;
pub use sim::{run_dataset, simulate, RunPaths, RunSummary, Simulation};

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("{what} are not consistent across source clips: {first_id} has {first}, {id} has {found}")]
    InconsistentFormat {
        what: &'static str,
        first_id: String,
        first: u32,
        id: String,
        found: u32,
    },
    #[error("requested {requested} active sources but only {available} audio files are available")]
    NotEnoughSources { requested: usize, available: usize },
    #[error("distance map has no entry for source '{0}'")]
    MissingDistance(String),
    #[error("unsupported audio format in '{id}': {reason}")]
    UnsupportedFormat { id: String, reason: String },
    #[error("source corpus is empty")]
    EmptyCorpus,
    #[error("corpus has {num_samples} samples; temporal shift needs more than {required}")]
    CorpusTooShort { num_samples: usize, required: usize },
    #[error(
        "sources still closer than {min_range} m at time point {time_index} after {retries} extra steps"
    )]
    RangeGuardExhausted {
        time_index: usize,
        retries: usize,
        min_range: f64,
    },
}
