//! Scalar sampling and bookkeeping utilities shared by the filter components.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;

use crate::{Point2D, Pose2D};

/// Draw a sample from N(mean, std_dev²).
pub fn sample_normal<R: Rng>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    Normal::new(mean, std_dev).unwrap().sample(rng)
}

/// Draw a sample from the half-open uniform interval [low, high).
///
/// A degenerate interval (high <= low) yields `low`.
pub fn sample_uniform<R: Rng>(rng: &mut R, low: f64, high: f64) -> f64 {
    if high <= low {
        return low;
    }
    rng.random_range(low..high)
}

/// Build the cumulative distribution over a non-negative weight vector.
///
/// Returns the running-sum vector (`cdf[i] = w_0 + … + w_i`) together with
/// the final total. An empty input yields an empty CDF and total 0.
pub fn gen_cdf(weights: &[f64]) -> (Vec<f64>, f64) {
    let mut cdf = Vec::with_capacity(weights.len());
    let mut total = 0.0;
    for weight in weights {
        total += weight;
        cdf.push(total);
    }
    (cdf, total)
}

/// Euclidean distance from a point to the position of a pose.
pub fn find_dist(point: &Point2D, pose: &Pose2D) -> f64 {
    let dx = point.x - pose.x;
    let dy = point.y - pose.y;
    (dx * dx + dy * dy).sqrt()
}

/// Wrap an angle to (-pi, pi].
pub fn normalize_angle(angle: f64) -> f64 {
    let mut wrapped = angle % (2.0 * PI);
    if wrapped > PI {
        wrapped -= 2.0 * PI;
    } else if wrapped < -PI {
        wrapped += 2.0 * PI;
    }
    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_gen_cdf_running_sum() {
        let (cdf, total) = gen_cdf(&[0.5, 0.25, 0.25]);
        assert_eq!(cdf.len(), 3);
        assert_approx_eq!(cdf[0], 0.5, 1e-12);
        assert_approx_eq!(cdf[1], 0.75, 1e-12);
        assert_approx_eq!(cdf[2], 1.0, 1e-12);
        assert_approx_eq!(total, 1.0, 1e-12);
    }

    #[test]
    fn test_gen_cdf_empty_input() {
        let (cdf, total) = gen_cdf(&[]);
        assert!(cdf.is_empty());
        assert_eq!(total, 0.0);
    }

    #[test]
    fn test_gen_cdf_is_non_decreasing() {
        let (cdf, _) = gen_cdf(&[0.1, 0.0, 0.3, 0.0, 0.2]);
        for pair in cdf.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[test]
    fn test_sample_uniform_stays_in_interval() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let sample = sample_uniform(&mut rng, -2.0, 3.0);
            assert!((-2.0..3.0).contains(&sample));
        }
    }

    #[test]
    fn test_sample_uniform_degenerate_interval() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(sample_uniform(&mut rng, 1.5, 1.5), 1.5);
    }

    #[test]
    fn test_sample_normal_zero_std_is_exact() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(sample_normal(&mut rng, 4.0, 0.0), 4.0);
    }

    #[test]
    fn test_find_dist() {
        let point = Point2D::new(3.0, 4.0);
        let pose = Pose2D::new(0.0, 0.0, 1.0);
        assert_approx_eq!(find_dist(&point, &pose), 5.0, 1e-12);
    }

    #[test]
    fn test_normalize_angle() {
        assert_approx_eq!(normalize_angle(2.5 * PI), 0.5 * PI, 1e-12);
        assert_approx_eq!(normalize_angle(-2.5 * PI), -0.5 * PI, 1e-12);
        assert_approx_eq!(normalize_angle(0.5), 0.5, 1e-12);
    }
}
