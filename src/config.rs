use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::SynthError;

/// How the kinematic model treats sources that drift inside the minimum range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RangeGuard {
    /// Keep stepping every source along its heading until all of them are at
    /// least `min_range_m` from the receiver.
    #[default]
    Resample,
    /// Only the initial positions are floored; later steps are unchecked.
    InitialOnly,
}

/// Run configuration for one synthetic dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Number of simultaneously active sources
    pub num_active_sources: usize,
    /// Number of time points to generate data at
    pub num_time_points: usize,
    /// Minimum allowable range of sources from the receiver after time 0 [m]
    pub min_range_m: f64,
    /// Floor for generated initial ranges [m]; falls back to `min_range_m`
    pub min_initial_range_m: Option<f64>,
    /// Mean of generated initial ranges [m]
    pub avg_initial_range_m: f64,
    /// Mean distance travelled between time points [m]
    pub avg_step_m: f64,
    /// Minimum distance travelled between time points [m]
    pub min_step_m: f64,
    /// Apply one random sample offset per time point when mixing
    pub temporal_shift: bool,
    pub range_guard: RangeGuard,
    /// Cap on extra guard steps at a single time point
    pub max_range_retries: usize,
    /// RNG seed; drawn from OS entropy when absent
    pub seed: Option<u64>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            num_active_sources: 3,
            num_time_points: 4,
            min_range_m: 400.0,
            min_initial_range_m: None,
            avg_initial_range_m: 500.0,
            avg_step_m: 250.0,
            min_step_m: 200.0,
            temporal_shift: false,
            range_guard: RangeGuard::Resample,
            max_range_retries: 10_000,
            seed: None,
        }
    }
}

impl SynthConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, SynthError> {
        let raw = fs::read_to_string(path)?;
        let config: SynthConfig = toml::from_str(&raw)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SynthError> {
        if self.num_active_sources == 0 {
            return Err(SynthError::InvalidConfig(
                "number of active sources must be positive".to_string(),
            ));
        }

        if self.num_time_points == 0 {
            return Err(SynthError::InvalidConfig(
                "number of time points must be positive".to_string(),
            ));
        }

        ensure_positive(
            self.min_range_m,
            "minimum distance of sources from the receiver",
        )?;
        if let Some(floor) = self.min_initial_range_m {
            ensure_positive(floor, "minimum initial distance of sources from the receiver")?;
        }
        ensure_positive(
            self.avg_initial_range_m,
            "average initial distance of sources from the receiver",
        )?;
        ensure_positive(
            self.avg_step_m,
            "average distance travelled by sources between time points",
        )?;
        ensure_positive(
            self.min_step_m,
            "minimum distance travelled by sources between time points",
        )?;

        if self.max_range_retries == 0 {
            return Err(SynthError::InvalidConfig(
                "max_range_retries must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn initial_range_floor(&self) -> f64 {
        self.min_initial_range_m.unwrap_or(self.min_range_m)
    }
}

fn ensure_positive(value: f64, what: &str) -> Result<(), SynthError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SynthError::InvalidConfig(format!("{what} must be positive")))
    }
}
