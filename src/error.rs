//! Error types for the FastSLAM filter.

use thiserror::Error;

/// Errors surfaced by particle and landmark-filter updates.
///
/// Numerical fallbacks (non-positive-definite process noise, singular
/// measurement Jacobians) are handled silently inside the filter and are
/// *not* errors; these variants cover the cases where an update genuinely
/// cannot proceed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterError {
    /// An update was requested on a particle or landmark filter that has no
    /// robot manager attached.
    #[error("no robot manager attached")]
    EmptyRobotManager,

    /// The innovation covariance of a landmark Kalman update was not
    /// invertible. The landmark estimate is left untouched.
    #[error("innovation covariance is not invertible")]
    MatrixInversion,
}

pub type Result<T> = std::result::Result<T, FilterError>;
