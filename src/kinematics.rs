//! Kinematic model
//!
//! Sources start at a random (or mapped) range and a uniform azimuth, then
//! travel in a straight line with a fixed per-step displacement. The receiver
//! sits at the origin.

use std::f64::consts::TAU;

use nalgebra::Vector2;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use crate::config::{RangeGuard, SynthConfig};
use crate::SynthError;

/// Standard deviation of generated ranges and step lengths, relative to their mean.
pub const RELATIVE_SPREAD: f64 = 0.1;

/// Planar source position relative to the receiver [m].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    xy: Vector2<f64>,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            xy: Vector2::new(x, y),
        }
    }

    pub fn from_polar(range: f64, angle: f64) -> Self {
        Self::new(range * angle.cos(), range * angle.sin())
    }

    pub fn x(&self) -> f64 {
        self.xy.x
    }

    pub fn y(&self) -> f64 {
        self.xy.y
    }

    /// Distance to the receiver.
    pub fn range(&self) -> f64 {
        self.xy.norm()
    }

    /// Azimuth in `[0, 2*pi)`.
    pub fn angle(&self) -> f64 {
        let angle = self.xy.y.atan2(self.xy.x).rem_euclid(TAU);
        if angle >= TAU {
            0.0
        } else {
            angle
        }
    }

    pub fn translated(&self, displacement: &Displacement) -> Self {
        Self {
            xy: self.xy + displacement.vector(),
        }
    }
}

/// Per-step translation of one source, constant for the whole run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Displacement {
    magnitude: f64,
    angle: f64,
}

impl Displacement {
    pub fn new(magnitude: f64, angle: f64) -> Self {
        Self { magnitude, angle }
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn vector(&self) -> Vector2<f64> {
        Vector2::new(
            self.magnitude * self.angle.cos(),
            self.magnitude * self.angle.sin(),
        )
    }
}

/// Minimum-range rule applied after every step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeConstraint {
    pub mode: RangeGuard,
    pub min_range_m: f64,
    pub max_retries: usize,
}

impl RangeConstraint {
    pub fn from_config(config: &SynthConfig) -> Self {
        Self {
            mode: config.range_guard,
            min_range_m: config.min_range_m,
            max_retries: config.max_range_retries,
        }
    }
}

/// `mean * Z` with `Z ~ N(1, RELATIVE_SPREAD)`, floored at `floor`.
fn scaled_normal_draws<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    mean: f64,
    floor: f64,
) -> Result<Vec<f64>, SynthError> {
    let unit = Normal::new(1.0, RELATIVE_SPREAD)
        .map_err(|err| SynthError::InvalidConfig(format!("bad spread distribution: {err}")))?;

    Ok((0..count)
        .map(|_| (mean * unit.sample(rng)).max(floor))
        .collect())
}

fn uniform_angles<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<f64> {
    (0..count).map(|_| rng.gen_range(0.0..TAU)).collect()
}

/// Draws one displacement per source: all magnitudes first, then all headings.
pub fn draw_displacements<R: Rng + ?Sized>(
    config: &SynthConfig,
    num_sources: usize,
    rng: &mut R,
) -> Result<Vec<Displacement>, SynthError> {
    let magnitudes = scaled_normal_draws(rng, num_sources, config.avg_step_m, config.min_step_m)?;
    let angles = uniform_angles(rng, num_sources);

    Ok(magnitudes
        .into_iter()
        .zip(angles)
        .map(|(magnitude, angle)| Displacement::new(magnitude, angle))
        .collect())
}

/// Draws the time-0 positions. Fixed ranges, when given, replace the range
/// draws entirely; azimuths are always random.
pub fn draw_initial_positions<R: Rng + ?Sized>(
    config: &SynthConfig,
    num_sources: usize,
    fixed_ranges: Option<&[f64]>,
    rng: &mut R,
) -> Result<Vec<Position>, SynthError> {
    let ranges = match fixed_ranges {
        Some(ranges) => {
            if ranges.len() != num_sources {
                return Err(SynthError::InvalidConfig(format!(
                    "expected {num_sources} fixed initial ranges, got {}",
                    ranges.len()
                )));
            }
            ranges.to_vec()
        }
        None => scaled_normal_draws(
            rng,
            num_sources,
            config.avg_initial_range_m,
            config.initial_range_floor(),
        )?,
    };
    let angles = uniform_angles(rng, num_sources);

    Ok(ranges
        .into_iter()
        .zip(angles)
        .map(|(range, angle)| Position::from_polar(range, angle))
        .collect())
}

fn closest_range(positions: &[Position]) -> f64 {
    positions
        .iter()
        .map(Position::range)
        .fold(f64::INFINITY, f64::min)
}

fn advance(positions: &mut [Position], displacements: &[Displacement]) {
    for (position, displacement) in positions.iter_mut().zip(displacements) {
        *position = position.translated(displacement);
    }
}

/// Source positions for every time point, indexed `[time][source]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    positions: Vec<Vec<Position>>,
    displacements: Vec<Displacement>,
    guard_steps: Vec<usize>,
}

impl Trajectory {
    /// Draws displacements and initial positions from `rng`, then propagates.
    pub fn generate<R: Rng + ?Sized>(
        config: &SynthConfig,
        num_sources: usize,
        fixed_ranges: Option<&[f64]>,
        rng: &mut R,
    ) -> Result<Self, SynthError> {
        let displacements = draw_displacements(config, num_sources, rng)?;
        let initial = draw_initial_positions(config, num_sources, fixed_ranges, rng)?;

        Self::propagate(
            initial,
            displacements,
            config.num_time_points,
            RangeConstraint::from_config(config),
        )
    }

    /// Deterministic part of the model: step every source by its displacement
    /// and apply the range constraint.
    ///
    /// With [`RangeGuard::Resample`], a single source inside the minimum range
    /// pushes *every* source one more step along its heading, until all of
    /// them clear it or `max_retries` extra steps have been taken.
    pub fn propagate(
        initial: Vec<Position>,
        displacements: Vec<Displacement>,
        num_time_points: usize,
        constraint: RangeConstraint,
    ) -> Result<Self, SynthError> {
        if initial.len() != displacements.len() {
            return Err(SynthError::InvalidConfig(format!(
                "{} initial positions but {} displacements",
                initial.len(),
                displacements.len()
            )));
        }
        if num_time_points == 0 {
            return Err(SynthError::InvalidConfig(
                "number of time points must be positive".to_string(),
            ));
        }

        let mut positions = Vec::with_capacity(num_time_points);
        let mut guard_steps = Vec::with_capacity(num_time_points);
        positions.push(initial);
        guard_steps.push(0);

        for time_index in 1..num_time_points {
            let mut current = positions[time_index - 1].clone();
            advance(&mut current, &displacements);

            let mut retries = 0;
            if constraint.mode == RangeGuard::Resample {
                while closest_range(&current) < constraint.min_range_m {
                    if retries == constraint.max_retries {
                        return Err(SynthError::RangeGuardExhausted {
                            time_index,
                            retries,
                            min_range: constraint.min_range_m,
                        });
                    }
                    advance(&mut current, &displacements);
                    retries += 1;
                }
                if retries > 0 {
                    debug!(time_index, retries, "stepped sources clear of the minimum range");
                }
            }

            positions.push(current);
            guard_steps.push(retries);
        }

        Ok(Self {
            positions,
            displacements,
            guard_steps,
        })
    }

    pub fn num_time_points(&self) -> usize {
        self.positions.len()
    }

    pub fn num_sources(&self) -> usize {
        self.displacements.len()
    }

    pub fn positions_at(&self, time_index: usize) -> &[Position] {
        &self.positions[time_index]
    }

    pub fn ranges_at(&self, time_index: usize) -> Vec<f64> {
        self.positions[time_index]
            .iter()
            .map(Position::range)
            .collect()
    }

    pub fn initial_ranges(&self) -> Vec<f64> {
        self.ranges_at(0)
    }

    pub fn displacements(&self) -> &[Displacement] {
        &self.displacements
    }

    /// Extra guard steps taken at each time point (always 0 at time 0).
    pub fn guard_steps(&self) -> &[usize] {
        &self.guard_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn constraint(mode: RangeGuard, min_range_m: f64, max_retries: usize) -> RangeConstraint {
        RangeConstraint {
            mode,
            min_range_m,
            max_retries,
        }
    }

    #[test]
    fn polar_angle_is_normalized() {
        let p = Position::from_polar(2.0, -FRAC_PI_2);
        assert!((p.range() - 2.0).abs() < 1e-12);
        assert!((p.angle() - 1.5 * PI).abs() < 1e-12);
        assert!(p.angle() < TAU);
    }

    #[test]
    fn two_source_closed_form_ranges() {
        // A starts 150 m east moving away; B starts 200 m north moving west.
        let initial = vec![
            Position::from_polar(150.0, 0.0),
            Position::from_polar(200.0, FRAC_PI_2),
        ];
        let displacements = vec![Displacement::new(50.0, 0.0), Displacement::new(30.0, PI)];

        let trajectory = Trajectory::propagate(
            initial,
            displacements,
            3,
            constraint(RangeGuard::Resample, 100.0, 100),
        )
        .expect("propagation should succeed");

        assert_eq!(trajectory.num_time_points(), 3);
        for t in 0..3 {
            let ranges = trajectory.ranges_at(t);
            let step = t as f64;
            let expected_a = 150.0 + 50.0 * step;
            let expected_b = (200.0_f64.powi(2) + (30.0 * step).powi(2)).sqrt();
            assert!((ranges[0] - expected_a).abs() < 1e-9);
            assert!((ranges[1] - expected_b).abs() < 1e-9);
        }
        assert!(trajectory.guard_steps().iter().all(|&steps| steps == 0));
    }

    #[test]
    fn resample_guard_steps_every_source() {
        let initial = vec![
            Position::from_polar(150.0, 0.0),
            Position::from_polar(1000.0, FRAC_PI_2),
        ];
        let displacements = vec![
            Displacement::new(100.0, PI),
            Displacement::new(10.0, FRAC_PI_2),
        ];

        let trajectory = Trajectory::propagate(
            initial,
            displacements,
            3,
            constraint(RangeGuard::Resample, 100.0, 100),
        )
        .expect("propagation should succeed");

        // x: 150 -> 50 (too close) -> -50 (too close) -> -150
        assert_eq!(trajectory.guard_steps(), &[0, 2, 0]);
        let at_one = trajectory.positions_at(1);
        assert!((at_one[0].x() + 150.0).abs() < 1e-9);
        assert!((at_one[1].y() - 1030.0).abs() < 1e-9);
        assert!((trajectory.positions_at(2)[0].x() + 250.0).abs() < 1e-9);

        for t in 1..trajectory.num_time_points() {
            assert!(trajectory.ranges_at(t).iter().all(|&r| r >= 100.0));
        }
    }

    #[test]
    fn initial_only_guard_allows_close_passes() {
        let initial = vec![Position::from_polar(150.0, 0.0)];
        let displacements = vec![Displacement::new(100.0, PI)];

        let trajectory = Trajectory::propagate(
            initial,
            displacements,
            2,
            constraint(RangeGuard::InitialOnly, 100.0, 100),
        )
        .expect("propagation should succeed");

        assert!((trajectory.ranges_at(1)[0] - 50.0).abs() < 1e-9);
        assert_eq!(trajectory.guard_steps(), &[0, 0]);
    }

    #[test]
    fn guard_gives_up_after_retry_cap() {
        let initial = vec![Position::from_polar(50.0, 0.0)];
        let displacements = vec![Displacement::new(1.0, PI)];

        let err = Trajectory::propagate(
            initial,
            displacements,
            2,
            constraint(RangeGuard::Resample, 100.0, 5),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            SynthError::RangeGuardExhausted {
                time_index: 1,
                retries: 5,
                ..
            }
        ));
    }

    #[test]
    fn generated_trajectory_respects_floors() {
        let config = SynthConfig {
            num_time_points: 25,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let trajectory =
            Trajectory::generate(&config, 4, None, &mut rng).expect("generation should succeed");

        assert_eq!(trajectory.num_sources(), 4);
        assert!(trajectory
            .initial_ranges()
            .iter()
            .all(|&r| r >= config.initial_range_floor() - 1e-9));
        assert!(trajectory
            .displacements()
            .iter()
            .all(|d| d.magnitude() >= config.min_step_m));
        for t in 1..trajectory.num_time_points() {
            assert!(trajectory
                .ranges_at(t)
                .iter()
                .all(|&r| r >= config.min_range_m));
        }
    }

    #[test]
    fn floors_clamp_instead_of_resampling() {
        let config = SynthConfig {
            min_step_m: 1000.0,
            min_initial_range_m: Some(5000.0),
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let displacements = draw_displacements(&config, 5, &mut rng).expect("draws");
        assert!(displacements.iter().all(|d| d.magnitude() == 1000.0));

        let initial = draw_initial_positions(&config, 5, None, &mut rng).expect("draws");
        assert!(initial.iter().all(|p| (p.range() - 5000.0).abs() < 1e-9));
    }

    #[test]
    fn fixed_ranges_replace_range_draws() {
        let config = SynthConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let initial = draw_initial_positions(&config, 2, Some(&[150.0, 200.0]), &mut rng)
            .expect("draws");
        assert!((initial[0].range() - 150.0).abs() < 1e-9);
        assert!((initial[1].range() - 200.0).abs() < 1e-9);

        let err = draw_initial_positions(&config, 3, Some(&[150.0, 200.0]), &mut rng);
        assert!(matches!(err, Err(SynthError::InvalidConfig(_))));
    }

    #[test]
    fn same_seed_reproduces_trajectory() {
        let config = SynthConfig {
            num_time_points: 8,
            ..Default::default()
        };

        let mut rng_a = ChaCha8Rng::seed_from_u64(2024);
        let mut rng_b = ChaCha8Rng::seed_from_u64(2024);
        let a = Trajectory::generate(&config, 3, None, &mut rng_a).expect("generation");
        let b = Trajectory::generate(&config, 3, None, &mut rng_b).expect("generation");
        assert_eq!(a, b);

        let mut rng_c = ChaCha8Rng::seed_from_u64(2025);
        let c = Trajectory::generate(&config, 3, None, &mut rng_c).expect("generation");
        assert_ne!(a, c);
    }
}
