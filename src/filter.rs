//! The FastSLAM particle ensemble.
//!
//! The filter owns a fixed-size set of particles and a parallel vector of
//! unnormalised importance weights. Each update drains a queue of
//! observations: every particle sees the front of the queue at an
//! independently sampled pose before the queue advances, and its weight
//! contribution is folded into the weight vector. After the queue drains the
//! ensemble is resampled with replacement, deep-copying the winners so that
//! no state is shared between the old and new particle sets.

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use crate::linalg::covariance_square_root;
use crate::math::{gen_cdf, sample_normal, sample_uniform};
use crate::particle::Particle;
use crate::robot::RobotManager;
use crate::{Observation2D, Point2D, Pose2D};

/// How per-observation weight contributions are folded into a particle's
/// running weight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightCombination {
    /// Add contributions into the weight slot. This matches the reference
    /// behaviour and is the default.
    #[default]
    Additive,
    /// Multiply contributions into the weight slot, as a strict Bayesian
    /// update would.
    Multiplicative,
    /// Accumulate log-contributions; weights are exponentiated through a
    /// log-sum-exp normalisation when the distribution is needed.
    LogAdditive,
}

/// Filter configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Number of particles in the ensemble.
    pub num_particles: usize,
    /// Pose every particle starts from.
    pub starting_pose: Pose2D,
    /// Minimum correspondence density for associating an observation with an
    /// existing landmark (`w0`). Below it, a new landmark is hypothesised.
    pub importance_factor: f64,
    /// Weight accumulation rule.
    pub weight_combination: WeightCombination,
    /// Reset weights to uniform after each resampling step. Off by default:
    /// the reference behaviour accumulates on top of stale weights.
    pub reset_weights_on_resample: bool,
    /// RNG seed. Runs with the same seed, configuration, and inputs are
    /// identical.
    pub seed: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_particles: 100,
            starting_pose: Pose2D::default(),
            importance_factor: 1e-2,
            weight_combination: WeightCombination::Additive,
            reset_weights_on_resample: false,
            seed: 0,
        }
    }
}

/// Locate the CDF interval a sample falls into.
///
/// Returns the unique `j` such that `cdf[j-1] <= sample < cdf[j]` (with an
/// implicit leading zero), found by binary search; zero-weight plateaus are
/// skipped. Returns `None` when the sample lies outside `[0, total]` or the
/// CDF is empty. A sample exactly at the total clamps to the last index.
pub fn draw_with_replacement(cdf: &[f64], sample: f64) -> Option<usize> {
    let total = *cdf.last()?;
    if sample < 0.0 || sample > total {
        return None;
    }
    let idx = cdf.partition_point(|&edge| edge <= sample);
    Some(idx.min(cdf.len() - 1))
}

/// Rao-Blackwellised FastSLAM particle filter.
///
/// # Example
/// ```
/// use std::collections::VecDeque;
/// use std::sync::Arc;
/// use fastslam::{FastSlamFilter, FilterConfig, Observation2D, Pose2D, RangeBearingManager};
///
/// let robot = Arc::new(RangeBearingManager::default());
/// let config = FilterConfig { num_particles: 50, seed: 42, ..FilterConfig::default() };
/// let mut filter = FastSlamFilter::new(robot, config);
///
/// let mut sightings = VecDeque::from([Observation2D::new(4.0, 0.2)]);
/// filter.update_filter(&Pose2D::default(), &mut sightings);
/// let map = filter.sample_landmarks();
/// assert_eq!(map.len(), 1);
/// ```
pub struct FastSlamFilter {
    config: FilterConfig,
    robot: Arc<dyn RobotManager>,
    particles: Vec<Particle>,
    weights: Vec<f64>,
    rng: StdRng,
}

impl Debug for FastSlamFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FastSlamFilter")
            .field("num_particles", &self.particles.len())
            .field("weight_combination", &self.config.weight_combination)
            .field("seed", &self.config.seed)
            .finish()
    }
}

impl Display for FastSlamFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FastSlamFilter(N={}, combination={:?})",
            self.particles.len(),
            self.config.weight_combination
        )
    }
}

impl FastSlamFilter {
    /// Create a filter with every particle at the configured starting pose,
    /// an empty landmark bank, and a uniform weight of `1/N`.
    pub fn new(robot: Arc<dyn RobotManager>, config: FilterConfig) -> Self {
        assert!(config.num_particles > 0, "particle count must be positive");

        let particles = (0..config.num_particles)
            .map(|_| {
                Particle::new(
                    config.importance_factor,
                    config.starting_pose,
                    Some(Arc::clone(&robot)),
                )
            })
            .collect();

        let rng = StdRng::seed_from_u64(config.seed);
        let weights = vec![Self::initial_weight(&config); config.num_particles];

        FastSlamFilter {
            config,
            robot,
            particles,
            weights,
            rng,
        }
    }

    /// Create a filter with the default configuration.
    pub fn with_defaults(robot: Arc<dyn RobotManager>) -> Self {
        FastSlamFilter::new(robot, FilterConfig::default())
    }

    fn initial_weight(config: &FilterConfig) -> f64 {
        match config.weight_combination {
            // Uniform in the log domain.
            WeightCombination::LogAdditive => 0.0,
            _ => 1.0 / config.num_particles as f64,
        }
    }

    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    /// Current particles, in slot order (for introspection and tests).
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Current raw weight accumulators, parallel to [`particles`](Self::particles).
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Overwrite a particle's weight accumulator.
    pub fn set_weight(&mut self, index: usize, weight: f64) {
        self.weights[index] = weight;
    }

    /// Draw a pose from `N(pose_mean, Q)` where `Q` is the robot's process
    /// noise covariance.
    ///
    /// `Q` is factored as `L * L^T`, by Cholesky when positive definite and
    /// by a clamped symmetric eigendecomposition otherwise, and the pose
    /// mean is perturbed by `L * z` with `z` standard normal. Zero process
    /// noise therefore reproduces the mean exactly.
    pub fn sample_pose(&mut self, pose_mean: &Pose2D) -> Pose2D {
        let root = covariance_square_root(&self.robot.process_noise());
        let z = Vector3::new(
            sample_normal(&mut self.rng, 0.0, 1.0),
            sample_normal(&mut self.rng, 0.0, 1.0),
            sample_normal(&mut self.rng, 0.0, 1.0),
        );
        *pose_mean + root * z
    }

    /// Resample the ensemble with replacement from the current weight
    /// distribution.
    ///
    /// Every slot draws independently from `U[0, total)` and receives a deep
    /// copy of the winning particle; a failed draw keeps the slot's original
    /// particle. The new set is built in full before replacing the old one,
    /// so the pre- and post-resampling ensembles never alias. Weights are
    /// left untouched unless `reset_weights_on_resample` is set.
    pub fn resample_particles(&mut self) {
        let effective = self.effective_weights();
        let (cdf, total) = gen_cdf(&effective);
        if total <= 0.0 {
            log::warn!("total particle weight is zero; keeping current ensemble");
            return;
        }

        let mut aux_set = Vec::with_capacity(self.particles.len());
        for slot in 0..self.particles.len() {
            let sampled_weight = sample_uniform(&mut self.rng, 0.0, total);
            let winner = draw_with_replacement(&cdf, sampled_weight).unwrap_or(slot);
            aux_set.push(self.particles[winner].clone());
        }
        self.particles = aux_set;

        if self.config.reset_weights_on_resample {
            let uniform = Self::initial_weight(&self.config);
            self.weights.fill(uniform);
        }
    }

    /// Drain a queue of observations, then resample.
    ///
    /// Every particle sees the same observation (the queue front) at an
    /// independently sampled pose before the queue advances; weight
    /// contributions accumulate across observations under the configured
    /// combination rule. A particle whose update fails is logged and keeps
    /// its weight unchanged for that observation.
    pub fn update_filter(
        &mut self,
        pose_mean: &Pose2D,
        sightings: &mut VecDeque<Observation2D>,
    ) {
        while let Some(obs) = sightings.front().copied() {
            for idx in 0..self.particles.len() {
                let pose_sampled = self.sample_pose(pose_mean);
                match self.particles[idx].update_particle(&obs, pose_sampled) {
                    Ok(contribution) => self.accumulate_weight(idx, contribution),
                    Err(err) => {
                        log::warn!("particle {idx} skipped an observation: {err}");
                    }
                }
            }
            sightings.pop_front();
        }
        self.resample_particles();
    }

    /// Landmark estimates of one particle drawn from the weight distribution.
    ///
    /// This is a cheap "current map guess" without maximum-a-posteriori
    /// semantics; a failed draw falls back to the first particle.
    pub fn sample_landmarks(&mut self) -> Vec<Point2D> {
        let effective = self.effective_weights();
        let (cdf, total) = gen_cdf(&effective);
        let sampled_weight = sample_uniform(&mut self.rng, 0.0, total);
        let winner = draw_with_replacement(&cdf, sampled_weight).unwrap_or(0);
        self.particles[winner].landmark_coordinates()
    }

    fn accumulate_weight(&mut self, index: usize, contribution: f64) {
        match self.config.weight_combination {
            WeightCombination::Additive => self.weights[index] += contribution,
            WeightCombination::Multiplicative => self.weights[index] *= contribution,
            WeightCombination::LogAdditive => {
                self.weights[index] += contribution.max(f64::MIN_POSITIVE).ln();
            }
        }
    }

    /// Weights as a sampleable distribution: the raw accumulators for the
    /// additive and multiplicative rules, and a log-sum-exp normalisation
    /// for the log-additive rule.
    fn effective_weights(&self) -> Vec<f64> {
        match self.config.weight_combination {
            WeightCombination::LogAdditive => {
                let max_log = self
                    .weights
                    .iter()
                    .copied()
                    .fold(f64::NEG_INFINITY, f64::max);
                if !max_log.is_finite() {
                    return vec![1.0; self.weights.len()];
                }
                self.weights.iter().map(|w| (w - max_log).exp()).collect()
            }
            _ => self.weights.clone(),
        }
    }
}
