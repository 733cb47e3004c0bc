//! FastSLAM toolbox for planar landmark-based simultaneous localization and mapping
//!
//! This crate implements a Rao-Blackwellised particle filter for a mobile robot observing
//! point landmarks in the plane. The joint posterior over the robot trajectory and the map
//! is factored into a particle distribution over pose hypotheses and, conditional on each
//! hypothesis, a bank of independent two-dimensional Kalman filters, one per landmark. The
//! factorisation keeps the per-update cost linear in the number of particles times the
//! number of landmarks, instead of the quadratic map covariance a monolithic EKF-SLAM
//! filter would maintain. The primary reference text is _Probabilistic Robotics_ by Thrun,
//! Burgard, and Fox; the algorithm follows the FastSLAM 1.0 formulation with per-particle
//! maximum-likelihood data association.
//!
//! This crate is primarily built off of three additional dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the linear algebra tools for
//!   the filters.
//! - [`rand`](https://crates.io/crates/rand) and
//!   [`rand_distr`](https://crates.io/crates/rand_distr): Provides seeded random number
//!   generation for pose proposals and resampling.
//!
//! All other functionality is built on top of these crates or is auxiliary functionality
//! (error types, logging). The filter core is single-threaded and synchronous; all
//! randomness flows through one seeded generator owned by the filter, so runs are
//! reproducible given a fixed configuration.
//!
//! ## Crate overview
//!
//! This crate is organized into several modules:
//! - [error]: Error types shared by the filter components.
//! - [math]: Scalar sampling, cumulative-distribution construction, and distance helpers.
//! - [linalg]: Covariance square roots with a Cholesky-to-eigendecomposition fallback.
//! - [robot]: The robot manager abstraction (motion and measurement models) and a concrete
//!   range-bearing implementation.
//! - [landmark]: The per-landmark extended Kalman filter.
//! - [particle]: A single map hypothesis: pose, landmark bank, and data association.
//! - [filter]: The particle ensemble: pose sampling, the update loop, low-variance
//!   resampling, and landmark readout.
//!
//! ## Update cycle
//!
//! Each call to [`filter::FastSlamFilter::update_filter`] drains a queue of observations.
//! For every observation, every particle independently samples a pose from the correlated
//! Gaussian motion model, associates the observation against its landmark bank by
//! correspondence likelihood, and either updates the matched landmark filter or inserts a
//! new one. The winning correspondence likelihood becomes the particle's weight
//! contribution. After the queue drains the ensemble is resampled with replacement from
//! the accumulated weights, collapsing low-weight hypotheses.
//!
//! Poses are `(x, y, theta)` with `theta` in radians. The core never normalises `theta`;
//! angle wrapping is the concern of the measurement model (see
//! [`math::normalize_angle`]).

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

pub mod error;
pub mod filter;
pub mod landmark;
pub mod linalg;
pub mod math;
pub mod particle;
pub mod robot;

pub use error::FilterError;
pub use filter::{FastSlamFilter, FilterConfig, WeightCombination};
pub use landmark::LandmarkEkf;
pub use particle::Particle;
pub use robot::{RangeBearingManager, RobotManager};

/// A planar robot pose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    /// Heading in radians. Not normalised by the core.
    pub theta: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose2D { x, y, theta }
    }
}

impl Add<Vector3<f64>> for Pose2D {
    type Output = Pose2D;

    /// Perturb the pose componentwise. The heading is left unwrapped.
    fn add(self, rhs: Vector3<f64>) -> Pose2D {
        Pose2D {
            x: self.x + rhs[0],
            y: self.y + rhs[1],
            theta: self.theta + rhs[2],
        }
    }
}

impl AddAssign<Vector3<f64>> for Pose2D {
    fn add_assign(&mut self, rhs: Vector3<f64>) {
        *self = *self + rhs;
    }
}

/// A planar position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Point2D { x, y }
    }
}

/// A landmark sighting in the robot's local frame.
///
/// The filter core passes observations through to the robot manager and the
/// landmark filters without interpreting the fields itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation2D {
    /// Distance to the sighted landmark.
    pub range: f64,
    /// Bearing to the sighted landmark, radians, relative to the robot heading.
    pub bearing: f64,
}

impl Observation2D {
    pub fn new(range: f64, bearing: f64) -> Self {
        Observation2D { range, bearing }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_perturbation() {
        let pose = Pose2D::new(1.0, 2.0, 0.5);
        let perturbed = pose + Vector3::new(0.1, -0.2, 0.3);
        assert_eq!(perturbed, Pose2D::new(1.1, 1.8, 0.8));
    }

    #[test]
    fn test_pose_perturbation_does_not_wrap_theta() {
        let pose = Pose2D::new(0.0, 0.0, 3.0);
        let perturbed = pose + Vector3::new(0.0, 0.0, 3.0);
        assert_eq!(perturbed.theta, 6.0);
    }

    #[test]
    fn test_pose_add_assign() {
        let mut pose = Pose2D::new(0.0, 0.0, 0.0);
        pose += Vector3::new(1.0, 1.0, 1.0);
        assert_eq!(pose, Pose2D::new(1.0, 1.0, 1.0));
    }
}
