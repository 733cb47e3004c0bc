//! A single FastSLAM hypothesis: a sampled pose and a bank of landmark filters.
//!
//! Each particle owns its landmark estimates outright. Data association is
//! per-particle maximum likelihood: an incoming observation is scored against
//! every landmark filter in the bank, and the best correspondence density wins
//! if it clears the importance factor `w0`; otherwise the observation spawns
//! a new landmark. The winning density doubles as the particle's weight
//! contribution for that observation.
//!
//! Every landmark filter is paired with an existence counter, incremented on
//! each successful re-observation. With the `sighting-cleanup` feature enabled
//! the counter is also decremented for landmarks that were inside the sensor's
//! range but not matched, and landmarks whose counter reaches zero are pruned.

use nalgebra::Matrix2;
use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::error::{FilterError, Result};
use crate::landmark::LandmarkEkf;
use crate::robot::RobotManager;
use crate::{Observation2D, Point2D, Pose2D};

/// One pose-and-map hypothesis.
///
/// Cloning deep-copies the entire landmark bank; two clones share no mutable
/// state and diverge independently under subsequent updates.
#[derive(Clone)]
pub struct Particle {
    /// Weight floor for associating with an existing landmark (`w0`).
    importance_factor: f64,
    pose: Pose2D,
    /// Landmark filters with their existence counters, in insertion order.
    bank: Vec<(LandmarkEkf, u32)>,
    /// Association result of the last `match_landmark` call. `bank.len()`
    /// means "new landmark".
    data_label: usize,
    /// Winning correspondence density of the last association. Never below
    /// `importance_factor`.
    curr_max_wn: f64,
    robot: Option<Arc<dyn RobotManager>>,
}

impl Debug for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("pose", &self.pose)
            .field("num_landmarks", &self.bank.len())
            .field("data_label", &self.data_label)
            .field("curr_max_wn", &self.curr_max_wn)
            .finish()
    }
}

impl Particle {
    pub fn new(
        importance_factor: f64,
        pose: Pose2D,
        robot: Option<Arc<dyn RobotManager>>,
    ) -> Self {
        Particle {
            importance_factor,
            pose,
            bank: Vec::new(),
            data_label: 0,
            curr_max_wn: importance_factor,
            robot,
        }
    }

    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    pub fn update_pose(&mut self, new_pose: Pose2D) {
        self.pose = new_pose;
    }

    /// Landmark filters and their existence counters, in insertion order.
    pub fn landmarks(&self) -> &[(LandmarkEkf, u32)] {
        &self.bank
    }

    /// Winning correspondence density of the most recent association.
    pub fn current_max_correspondence(&self) -> f64 {
        self.curr_max_wn
    }

    /// Associate `obs` against the landmark bank.
    ///
    /// Feeds the observation to every landmark filter in index order and
    /// compares correspondence densities against the running maximum, seeded
    /// with the importance factor. Returns the matched index, or `bank.len()`
    /// when no landmark clears the floor and a new one should be spawned.
    /// Ties keep the earlier candidate (strict `>` comparison).
    pub fn match_landmark(&mut self, obs: &Observation2D) -> usize {
        let mut landmark_id = self.bank.len();
        let mut max_wn = self.importance_factor;

        for (idx, (ekf, _)) in self.bank.iter_mut().enumerate() {
            ekf.update_observation(*obs);
            let wn = ekf.calc_cpd(&self.pose);
            if wn > max_wn {
                landmark_id = idx;
                max_wn = wn;
            }
        }

        self.data_label = landmark_id;
        self.curr_max_wn = max_wn;
        landmark_id
    }

    /// Fold `obs` into the landmark selected by the last association.
    ///
    /// On the new-landmark path the proposed covariance is
    /// `H^-1 * R * H^-T`; a singular measurement Jacobian falls back to the
    /// identity, so the landmark is still inserted, just with an
    /// uninformative prior.
    pub fn update_lm_belief(&mut self, obs: &Observation2D) -> Result<()> {
        let robot = match self.robot.as_ref() {
            Some(robot) => Arc::clone(robot),
            None => {
                log::warn!("particle update requested without a robot manager");
                return Err(FilterError::EmptyRobotManager);
            }
        };

        if self.data_label == self.bank.len() {
            let proposed_mean = robot.inverse_meas(&self.pose, obs);
            let jacobian = robot.meas_jacobian(&self.pose, &proposed_mean);
            let proposed_cov = match jacobian.try_inverse() {
                Some(jacobian_inv) => jacobian_inv * robot.meas_noise() * jacobian_inv.transpose(),
                None => {
                    log::info!("singular measurement Jacobian; seeding landmark with identity covariance");
                    Matrix2::identity()
                }
            };
            self.bank
                .push((LandmarkEkf::new(proposed_mean, proposed_cov, Some(robot)), 1));
            return Ok(());
        }

        let (ekf, count) = &mut self.bank[self.data_label];
        ekf.update_observation(*obs);
        if let Err(err) = ekf.update(&self.pose) {
            log::warn!("landmark {} update failed: {err}", self.data_label);
            return Err(err);
        }
        *count += 1;
        Ok(())
    }

    /// Run one full observation update at a freshly sampled pose.
    ///
    /// Returns the particle's weight contribution for this observation: the
    /// winning correspondence density when an existing landmark was matched,
    /// and the importance factor when a new landmark was spawned. A failed
    /// update surfaces as an error and must leave the caller's weight
    /// accumulator unchanged.
    pub fn update_particle(&mut self, obs: &Observation2D, sampled_pose: Pose2D) -> Result<f64> {
        if self.robot.is_none() {
            log::warn!("particle update requested without a robot manager");
            return Err(FilterError::EmptyRobotManager);
        }

        self.pose = sampled_pose;
        self.match_landmark(obs);
        self.update_lm_belief(obs)?;

        #[cfg(feature = "sighting-cleanup")]
        self.clean_up_sightings();

        Ok(self.curr_max_wn)
    }

    /// Current landmark position estimates, in bank order.
    pub fn landmark_coordinates(&self) -> Vec<Point2D> {
        self.bank.iter().map(|(ekf, _)| ekf.estimate()).collect()
    }

    /// Penalise landmarks that sat inside the perceptual range but were not
    /// the one just updated: their existence counter drops by one, and
    /// landmarks reaching zero are pruned from the bank.
    #[cfg(feature = "sighting-cleanup")]
    fn clean_up_sightings(&mut self) {
        use crate::math::find_dist;

        let range = match self.robot.as_ref() {
            Some(robot) => robot.perceptual_range(),
            None => return,
        };

        for (idx, (ekf, count)) in self.bank.iter_mut().enumerate() {
            if idx == self.data_label {
                continue;
            }
            if find_dist(&ekf.estimate(), &self.pose) <= range {
                *count = count.saturating_sub(1);
            }
        }

        // Pruning shifts indices; keep the label pointing at the updated
        // landmark, which always survives with a positive counter.
        let surviving_before = self.bank[..self.data_label]
            .iter()
            .filter(|(_, count)| *count > 0)
            .count();
        self.bank.retain(|(_, count)| *count > 0);
        self.data_label = surviving_before;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::RangeBearingManager;
    use nalgebra::{Matrix3, Vector2};

    fn test_robot() -> Arc<dyn RobotManager> {
        Arc::new(RangeBearingManager::new(
            Matrix3::zeros(),
            Matrix2::from_diagonal(&Vector2::new(1e-2, 1e-2)),
            20.0,
        ))
    }

    fn test_particle() -> Particle {
        Particle::new(1e-2, Pose2D::default(), Some(test_robot()))
    }

    #[test]
    fn test_first_observation_proposes_new_landmark() {
        let mut particle = test_particle();
        let label = particle.match_landmark(&Observation2D::new(2.0, 0.0));
        // Empty bank: "new landmark" is index 0.
        assert_eq!(label, 0);
        assert_eq!(particle.current_max_correspondence(), 1e-2);
    }

    #[test]
    fn test_new_landmark_inserted_with_unit_count() {
        let mut particle = test_particle();
        let obs = Observation2D::new(2.0, 0.0);
        particle.match_landmark(&obs);
        particle.update_lm_belief(&obs).unwrap();

        assert_eq!(particle.landmarks().len(), 1);
        assert_eq!(particle.landmarks()[0].1, 1);
        let landmark = particle.landmark_coordinates()[0];
        assert!((landmark.x - 2.0).abs() < 1e-9);
        assert!(landmark.y.abs() < 1e-9);
    }

    #[test]
    fn test_reobservation_matches_and_increments_count() {
        let mut particle = test_particle();
        let obs = Observation2D::new(2.0, 0.0);

        let first = particle.update_particle(&obs, Pose2D::default()).unwrap();
        assert_eq!(first, 1e-2); // new-landmark path yields w0

        let second = particle.update_particle(&obs, Pose2D::default()).unwrap();
        assert!(second > 1e-2); // matched path yields the winning density

        assert_eq!(particle.landmarks().len(), 1);
        assert_eq!(particle.landmarks()[0].1, 2);
    }

    #[cfg(not(feature = "sighting-cleanup"))]
    #[test]
    fn test_distant_observation_spawns_second_landmark() {
        let mut particle = test_particle();
        particle
            .update_particle(&Observation2D::new(2.0, 0.0), Pose2D::default())
            .unwrap();
        particle
            .update_particle(&Observation2D::new(12.0, 0.0), Pose2D::default())
            .unwrap();

        assert_eq!(particle.landmarks().len(), 2);
        assert_eq!(particle.landmarks()[0].1, 1);
        assert_eq!(particle.landmarks()[1].1, 1);
    }

    #[test]
    fn test_update_without_robot_manager_fails() {
        let mut particle = Particle::new(1e-2, Pose2D::default(), None);
        assert_eq!(
            particle.update_particle(&Observation2D::new(2.0, 0.0), Pose2D::default()),
            Err(FilterError::EmptyRobotManager)
        );
        assert!(particle.landmarks().is_empty());
    }

    #[test]
    fn test_singular_jacobian_falls_back_to_identity_covariance() {
        let mut particle = test_particle();
        // Zero range puts the proposed landmark on top of the robot.
        let obs = Observation2D::new(0.0, 0.0);
        particle.match_landmark(&obs);
        particle.update_lm_belief(&obs).unwrap();

        assert_eq!(particle.landmarks().len(), 1);
        let cov = particle.landmarks()[0].0.covariance();
        assert_eq!(cov, Matrix2::identity());
    }

    #[test]
    fn test_clone_deep_copies_the_bank() {
        let mut original = test_particle();
        original
            .update_particle(&Observation2D::new(2.0, 0.0), Pose2D::default())
            .unwrap();

        let mut copy = original.clone();
        copy.update_particle(&Observation2D::new(2.0, 0.0), Pose2D::default())
            .unwrap();

        // The copy re-observed its landmark; the original did not.
        assert_eq!(copy.landmarks()[0].1, 2);
        assert_eq!(original.landmarks()[0].1, 1);
        assert_eq!(original.landmarks().len(), 1);
    }

    #[test]
    fn test_update_pose() {
        let mut particle = test_particle();
        particle.update_pose(Pose2D::new(1.0, 2.0, 3.0));
        assert_eq!(particle.pose(), Pose2D::new(1.0, 2.0, 3.0));
    }

    #[cfg(feature = "sighting-cleanup")]
    #[test]
    fn test_unmatched_landmark_in_range_is_eventually_pruned() {
        let mut particle = test_particle();
        let ahead = Observation2D::new(2.0, 0.0);
        let behind = Observation2D::new(2.0, std::f64::consts::PI);

        // Sight the forward landmark twice, then one behind the robot. All
        // landmarks sit inside the 20 m perceptual range throughout.
        particle.update_particle(&ahead, Pose2D::default()).unwrap();
        particle.update_particle(&ahead, Pose2D::default()).unwrap();
        particle.update_particle(&behind, Pose2D::default()).unwrap();
        assert_eq!(particle.landmarks().len(), 2);
        // The forward landmark missed one sighting: two hits, one decrement.
        assert_eq!(particle.landmarks()[0].1, 1);

        // Re-observing the forward landmark drops the rear one to zero.
        particle.update_particle(&ahead, Pose2D::default()).unwrap();

        assert_eq!(particle.landmarks().len(), 1);
        let survivor = particle.landmark_coordinates()[0];
        assert!((survivor.x - 2.0).abs() < 1e-6);
        assert_eq!(particle.landmarks()[0].1, 2);
    }
}
