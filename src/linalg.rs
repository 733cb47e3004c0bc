//! Linear algebra helpers for covariance factorisation.
//!
//! Sampling a correlated Gaussian perturbation requires a square root `L` of
//! the process noise covariance such that `Q = L * L^T`. Cholesky
//! decomposition is attempted first; when it fails (Q positive semi-definite
//! or numerically degenerate) a symmetric eigendecomposition is used instead,
//! with eigenvalues clamped to be non-negative before the square root.

use nalgebra::Matrix3;

/// Compute a square root `L` of a symmetric covariance matrix, `Q = L * L^T`.
///
/// Cholesky yields the lower-triangular factor when `Q` is positive definite.
/// The fallback builds `L = V * diag(sqrt(max(lambda, 0)))` from the
/// eigenvectors `V` and eigenvalues `lambda`; it always succeeds for a
/// symmetric input, so this function is total.
pub fn covariance_square_root(matrix: &Matrix3<f64>) -> Matrix3<f64> {
    match matrix.cholesky() {
        Some(cholesky) => cholesky.l(),
        None => {
            log::info!("Cholesky factorisation failed; using eigendecomposition square root");
            let eigen = matrix.symmetric_eigen();
            let sqrt_eigenvalues =
                Matrix3::from_diagonal(&eigen.eigenvalues.map(|v| v.max(0.0).sqrt()));
            eigen.eigenvectors * sqrt_eigenvalues
        }
    }
}
