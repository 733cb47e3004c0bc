//! Per-landmark extended Kalman filter.
//!
//! Each landmark a particle has sighted is tracked by its own two-dimensional
//! Gaussian: a mean position and a 2x2 covariance. The filter buffers the most
//! recent observation; [`LandmarkEkf::calc_cpd`] scores that observation
//! against the current estimate for data association, and
//! [`LandmarkEkf::update`] folds it into the estimate. Conditioning on the
//! particle's pose happens through the `pose` argument: every particle holds
//! its own pose hypothesis, so the pose cannot live inside the landmark
//! filter.

use nalgebra::Matrix2;
use std::f64::consts::PI;
use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::error::{FilterError, Result};
use crate::robot::RobotManager;
use crate::{Observation2D, Point2D, Pose2D};

/// A single landmark estimate: mean, covariance, and the buffered observation.
///
/// Cloning produces a fully independent filter; the robot manager handle is
/// shared but never mutated.
#[derive(Clone)]
pub struct LandmarkEkf {
    mean: Point2D,
    covariance: Matrix2<f64>,
    last_obs: Option<Observation2D>,
    robot: Option<Arc<dyn RobotManager>>,
}

impl Debug for LandmarkEkf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LandmarkEkf")
            .field("mean", &self.mean)
            .field("covariance", &self.covariance)
            .field("last_obs", &self.last_obs)
            .finish()
    }
}

impl LandmarkEkf {
    pub fn new(mean: Point2D, covariance: Matrix2<f64>, robot: Option<Arc<dyn RobotManager>>) -> Self {
        LandmarkEkf {
            mean,
            covariance,
            last_obs: None,
            robot,
        }
    }

    /// Buffer the latest observation for the next [`update`](Self::update)
    /// and [`calc_cpd`](Self::calc_cpd).
    pub fn update_observation(&mut self, obs: Observation2D) {
        self.last_obs = Some(obs);
    }

    /// Current landmark mean.
    pub fn estimate(&self) -> Point2D {
        self.mean
    }

    /// Current landmark covariance.
    pub fn covariance(&self) -> Matrix2<f64> {
        self.covariance
    }

    /// Kalman update of the buffered observation, conditioned on `pose`.
    ///
    /// With nothing buffered this is a no-op. Fails with
    /// [`FilterError::MatrixInversion`] when the innovation covariance cannot
    /// be inverted; the estimate is left untouched in that case.
    pub fn update(&mut self, pose: &Pose2D) -> Result<()> {
        let robot = match self.robot.as_ref() {
            Some(robot) => robot,
            None => return Err(FilterError::EmptyRobotManager),
        };
        let obs = match self.last_obs {
            Some(obs) => obs,
            None => return Ok(()),
        };

        let predicted = robot.predict_meas(pose, &self.mean);
        let nu = robot.innovation(&obs, &predicted);
        let h = robot.meas_jacobian(pose, &self.mean);

        let s = h * self.covariance * h.transpose() + robot.meas_noise();
        let s_inv = match s.try_inverse() {
            Some(inv) => inv,
            None => return Err(FilterError::MatrixInversion),
        };

        let gain = self.covariance * h.transpose() * s_inv;
        let delta = gain * nu;
        self.mean.x += delta[0];
        self.mean.y += delta[1];
        self.covariance = (Matrix2::identity() - gain * h) * self.covariance;
        Ok(())
    }

    /// Correspondence probability density of the buffered observation under
    /// the current estimate, conditioned on `pose`.
    ///
    /// Returns 0.0 when nothing is buffered, no robot manager is attached, or
    /// the innovation covariance is degenerate; a zero density can never win
    /// a data association.
    pub fn calc_cpd(&self, pose: &Pose2D) -> f64 {
        let (robot, obs) = match (self.robot.as_ref(), self.last_obs.as_ref()) {
            (Some(robot), Some(obs)) => (robot, obs),
            _ => return 0.0,
        };

        let predicted = robot.predict_meas(pose, &self.mean);
        let nu = robot.innovation(obs, &predicted);
        let h = robot.meas_jacobian(pose, &self.mean);

        let s = h * self.covariance * h.transpose() + robot.meas_noise();
        let det = s.determinant();
        if det <= 0.0 {
            return 0.0;
        }
        let s_inv = match s.try_inverse() {
            Some(inv) => inv,
            None => return 0.0,
        };

        let mahalanobis = (nu.transpose() * s_inv * nu)[(0, 0)];
        (-0.5 * mahalanobis).exp() / (2.0 * PI * det.sqrt())
    }
}
