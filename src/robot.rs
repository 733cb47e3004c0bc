//! Robot motion and measurement model abstraction.
//!
//! The filter core is generic over the robot it tracks: every quantity that
//! depends on the platform (process noise, measurement noise, the measurement
//! model and its Jacobian) is obtained through the [`RobotManager`] trait.
//! Particles and landmark filters hold a shared, non-owning handle to one
//! manager; the manager outlives the filter and is never mutated by it.
//!
//! [`RangeBearingManager`] provides the standard range/bearing sensor model
//! used by wheeled platforms with a scanning sensor.

use nalgebra::{Matrix2, Matrix3, Vector2};

use crate::math::normalize_angle;
use crate::{Observation2D, Point2D, Pose2D};

/// Platform-specific models consumed by the filter core.
///
/// Implementations must be deterministic: the filter may evaluate these
/// methods once per particle per observation and relies on identical inputs
/// producing identical outputs.
pub trait RobotManager {
    /// Process noise covariance Q of the pose transition, 3x3 symmetric.
    fn process_noise(&self) -> Matrix3<f64>;

    /// Measurement noise covariance R in the robot frame, 2x2 SPD.
    fn meas_noise(&self) -> Matrix2<f64>;

    /// Predicted observation of `landmark` from `pose`.
    fn predict_meas(&self, pose: &Pose2D, landmark: &Point2D) -> Observation2D;

    /// World-frame landmark position implied by `obs` taken from `pose`.
    fn inverse_meas(&self, pose: &Pose2D, obs: &Observation2D) -> Point2D;

    /// Jacobian of the measurement model with respect to the landmark
    /// position, evaluated at `landmark` as seen from `pose`.
    fn meas_jacobian(&self, pose: &Pose2D, landmark: &Point2D) -> Matrix2<f64>;

    /// Measurement residual `obs - predicted`, with any angular components
    /// wrapped. Owning the residual here keeps the landmark filters agnostic
    /// of which observation components are angles.
    fn innovation(&self, obs: &Observation2D, predicted: &Observation2D) -> Vector2<f64>;

    /// Maximum distance at which the robot is assumed to sight landmarks.
    fn perceptual_range(&self) -> f64;
}

/// Range/bearing measurement model with fixed noise covariances.
#[derive(Clone, Debug)]
pub struct RangeBearingManager {
    process_noise: Matrix3<f64>,
    meas_noise: Matrix2<f64>,
    perceptual_range: f64,
}

impl RangeBearingManager {
    pub fn new(
        process_noise: Matrix3<f64>,
        meas_noise: Matrix2<f64>,
        perceptual_range: f64,
    ) -> Self {
        RangeBearingManager {
            process_noise,
            meas_noise,
            perceptual_range,
        }
    }
}

impl Default for RangeBearingManager {
    /// Moderate noise figures for an indoor differential-drive platform:
    /// centimetre-scale translation noise, ~1 degree heading and bearing
    /// noise, 20 m sensing range.
    fn default() -> Self {
        RangeBearingManager {
            process_noise: Matrix3::from_diagonal(&nalgebra::Vector3::new(1e-2, 1e-2, 3e-4)),
            meas_noise: Matrix2::from_diagonal(&Vector2::new(1e-2, 3e-4)),
            perceptual_range: 20.0,
        }
    }
}

impl RobotManager for RangeBearingManager {
    fn process_noise(&self) -> Matrix3<f64> {
        self.process_noise
    }

    fn meas_noise(&self) -> Matrix2<f64> {
        self.meas_noise
    }

    fn predict_meas(&self, pose: &Pose2D, landmark: &Point2D) -> Observation2D {
        let dx = landmark.x - pose.x;
        let dy = landmark.y - pose.y;
        Observation2D {
            range: (dx * dx + dy * dy).sqrt(),
            bearing: normalize_angle(dy.atan2(dx) - pose.theta),
        }
    }

    fn inverse_meas(&self, pose: &Pose2D, obs: &Observation2D) -> Point2D {
        let heading = pose.theta + obs.bearing;
        Point2D {
            x: pose.x + obs.range * heading.cos(),
            y: pose.y + obs.range * heading.sin(),
        }
    }

    fn meas_jacobian(&self, pose: &Pose2D, landmark: &Point2D) -> Matrix2<f64> {
        let dx = landmark.x - pose.x;
        let dy = landmark.y - pose.y;
        let d2 = dx * dx + dy * dy;
        if d2 <= f64::EPSILON {
            // Landmark on top of the robot: the model is singular there.
            // A zero Jacobian routes callers into their fallback paths.
            return Matrix2::zeros();
        }
        let d = d2.sqrt();
        Matrix2::new(dx / d, dy / d, -dy / d2, dx / d2)
    }

    fn innovation(&self, obs: &Observation2D, predicted: &Observation2D) -> Vector2<f64> {
        Vector2::new(
            obs.range - predicted.range,
            normalize_angle(obs.bearing - predicted.bearing),
        )
    }

    fn perceptual_range(&self) -> f64 {
        self.perceptual_range
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_inverse_meas_round_trip() {
        let robot = RangeBearingManager::default();
        let pose = Pose2D::new(1.0, -2.0, 0.7);
        let obs = Observation2D::new(5.0, -0.3);

        let landmark = robot.inverse_meas(&pose, &obs);
        let predicted = robot.predict_meas(&pose, &landmark);

        assert_approx_eq!(predicted.range, obs.range, 1e-9);
        assert_approx_eq!(predicted.bearing, obs.bearing, 1e-9);
    }

    #[test]
    fn test_predict_meas_ahead_of_robot() {
        let robot = RangeBearingManager::default();
        let pose = Pose2D::new(0.0, 0.0, FRAC_PI_2);
        let landmark = Point2D::new(0.0, 3.0);

        let obs = robot.predict_meas(&pose, &landmark);
        assert_approx_eq!(obs.range, 3.0, 1e-12);
        assert_approx_eq!(obs.bearing, 0.0, 1e-12);
    }

    #[test]
    fn test_meas_jacobian_is_invertible_away_from_robot() {
        let robot = RangeBearingManager::default();
        let pose = Pose2D::new(0.0, 0.0, 0.0);
        let landmark = Point2D::new(4.0, 3.0);

        let jacobian = robot.meas_jacobian(&pose, &landmark);
        // det H = 1 / d for the range-bearing model.
        assert_approx_eq!(jacobian.determinant(), 1.0 / 5.0, 1e-12);
    }

    #[test]
    fn test_meas_jacobian_singular_at_robot_position() {
        let robot = RangeBearingManager::default();
        let pose = Pose2D::new(2.0, 2.0, 0.0);
        let landmark = Point2D::new(2.0, 2.0);

        let jacobian = robot.meas_jacobian(&pose, &landmark);
        assert_eq!(jacobian.determinant(), 0.0);
    }

    #[test]
    fn test_innovation_wraps_bearing_residual() {
        let robot = RangeBearingManager::default();
        let obs = Observation2D::new(1.0, 3.0);
        let predicted = Observation2D::new(1.0, -3.0);

        let nu = robot.innovation(&obs, &predicted);
        assert_approx_eq!(nu[0], 0.0, 1e-12);
        // 6.0 rad wraps to just under -0.28 rad.
        assert_approx_eq!(nu[1], 6.0 - 2.0 * std::f64::consts::PI, 1e-12);
    }
}
