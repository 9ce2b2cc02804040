//! Dense linear solves for equilibrium problems.

use nalgebra::{DMatrix, DVector};

/// Pivots smaller than this fraction of the largest pivot count as zero.
pub const RELATIVE_PIVOT_TOLERANCE: f64 = 1e-14;

/// Solve `A x = b` by LU decomposition with partial pivoting.
///
/// # Returns
/// `None` when `A` is not square, its size does not match `b`, it is
/// singular to working precision, or the solution is not finite.
///
/// # Example
/// ```
/// use c14_core::utils::linear_algebra::solve_dense;
/// use nalgebra::{dmatrix, dvector};
///
/// let a = dmatrix![2.0, -1.0, 0.0; -1.0, 2.0, -1.0; 0.0, -1.0, 2.0];
/// let x = solve_dense(&a, &dvector![1.0, 0.0, 1.0]).unwrap();
/// assert!((x - dvector![1.0, 1.0, 1.0]).norm() < 1e-12);
/// ```
pub fn solve_dense(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    if !a.is_square() || a.nrows() != b.len() {
        return None;
    }
    if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
        return None;
    }
    if a.nrows() == 0 {
        return Some(DVector::zeros(0));
    }

    let lu = a.clone().lu();
    let pivots = lu.u().diagonal().map(f64::abs);
    let largest = pivots.max();
    if largest == 0.0 || pivots.min() <= RELATIVE_PIVOT_TOLERANCE * largest {
        return None;
    }

    lu.solve(b).filter(|x| x.iter().all(|v| v.is_finite()))
}
