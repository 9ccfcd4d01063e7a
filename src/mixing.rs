//! Attenuation and mixing engine
//!
//! Each source is scaled by `range_0 / range_t` and the scaled windows are
//! summed into the single channel a receiver at the origin would record.

use nalgebra::DVector;
use rand::Rng;
use tracing::debug;

use crate::corpus::SourceCorpus;
use crate::kinematics::Trajectory;
use crate::SynthError;

/// Receiver signal at one time point.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedSignal {
    pub time_index: usize,
    /// Start of the source window [samples]
    pub offset: usize,
    pub samples: Vec<f64>,
}

impl MixedSignal {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn peak(&self) -> f64 {
        self.samples.iter().fold(0.0_f64, |acc, &v| acc.max(v.abs()))
    }
}

/// Inverse-range amplitude factors, `initial[k] / current[k]`.
pub fn attenuation_factors(initial_ranges: &[f64], ranges: &[f64]) -> DVector<f64> {
    DVector::from_iterator(
        ranges.len(),
        initial_ranges
            .iter()
            .zip(ranges)
            .map(|(&initial, &current)| initial / current),
    )
}

/// Samples per mixed signal. A temporal shift reserves one second of audio
/// so every offset in `[0, sample_rate)` stays inside the corpus.
pub fn output_length(
    num_samples: usize,
    sample_rate: u32,
    temporal_shift: bool,
) -> Result<usize, SynthError> {
    if !temporal_shift {
        return Ok(num_samples);
    }

    let reserve = sample_rate as usize;
    if num_samples <= reserve {
        return Err(SynthError::CorpusTooShort {
            num_samples,
            required: reserve,
        });
    }
    Ok(num_samples - reserve)
}

/// Mixes windows of a fixed corpus into receiver signals.
#[derive(Debug)]
pub struct Mixer<'a> {
    corpus: &'a SourceCorpus,
    output_len: usize,
    temporal_shift: bool,
}

impl<'a> Mixer<'a> {
    pub fn new(corpus: &'a SourceCorpus, temporal_shift: bool) -> Result<Self, SynthError> {
        let output_len = output_length(corpus.num_samples(), corpus.sample_rate(), temporal_shift)?;
        Ok(Self {
            corpus,
            output_len,
            temporal_shift,
        })
    }

    pub fn output_len(&self) -> usize {
        self.output_len
    }

    /// Offset for one time point: uniform in `[0, sample_rate)` when the
    /// temporal shift is on, otherwise 0 and no draw is made.
    pub fn draw_offset<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        if self.temporal_shift {
            rng.gen_range(0..self.corpus.sample_rate() as usize)
        } else {
            0
        }
    }

    /// Scales the window starting at `offset` by `factors` and sums across sources.
    pub fn mix(&self, time_index: usize, factors: &DVector<f64>, offset: usize) -> MixedSignal {
        let window = self.corpus.data().rows(offset, self.output_len);
        let mixed = window * factors;

        MixedSignal {
            time_index,
            offset,
            samples: mixed.iter().copied().collect(),
        }
    }

    /// Time 0: every source unscaled, no offset.
    pub fn mix_initial(&self) -> MixedSignal {
        let unit = DVector::from_element(self.corpus.num_sources(), 1.0);
        self.mix(0, &unit, 0)
    }
}

/// One mixed signal per trajectory time point. Offsets for `t >= 1` are drawn
/// from `rng` in time order.
pub fn mix_trajectory<R: Rng + ?Sized>(
    corpus: &SourceCorpus,
    trajectory: &Trajectory,
    temporal_shift: bool,
    rng: &mut R,
) -> Result<Vec<MixedSignal>, SynthError> {
    if trajectory.num_sources() != corpus.num_sources() {
        return Err(SynthError::InvalidConfig(format!(
            "trajectory has {} sources but corpus has {}",
            trajectory.num_sources(),
            corpus.num_sources()
        )));
    }

    let mixer = Mixer::new(corpus, temporal_shift)?;
    let initial_ranges = trajectory.initial_ranges();

    let mut signals = Vec::with_capacity(trajectory.num_time_points());
    signals.push(mixer.mix_initial());

    for time_index in 1..trajectory.num_time_points() {
        let offset = mixer.draw_offset(rng);
        let factors = attenuation_factors(&initial_ranges, &trajectory.ranges_at(time_index));
        debug!(time_index, offset, factors = ?factors.as_slice(), "mixing time point");
        signals.push(mixer.mix(time_index, &factors, offset));
    }

    Ok(signals)
}
