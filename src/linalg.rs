//! Small bridge between `ndarray` and `nalgebra` for the dense solves the
//! estimators need. Every routine returns `None` when the system is singular
//! so callers can turn that into a failed fit instead of an error.
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

fn to_dmatrix(a: ArrayView2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

fn to_dvector(b: ArrayView1<f64>) -> DVector<f64> {
    DVector::from_iterator(b.len(), b.iter().copied())
}

fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Solves `a x = b` for a symmetric positive definite `a`, falling back to LU
/// when the Cholesky factorisation fails.
pub fn solve_spd(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Option<Array1<f64>> {
    if a.nrows() != a.ncols() || a.nrows() != b.len() {
        return None;
    }
    let m = to_dmatrix(a);
    let rhs = to_dvector(b);
    let solution = match m.clone().cholesky() {
        Some(chol) => chol.solve(&rhs),
        None => m.lu().solve(&rhs)?,
    };
    if solution.iter().all(|v| v.is_finite()) {
        Some(Array1::from_iter(solution.iter().copied()))
    } else {
        None
    }
}

/// Inverse of a symmetric positive definite matrix.
pub fn invert_spd(a: ArrayView2<f64>) -> Option<Array2<f64>> {
    if a.nrows() != a.ncols() {
        return None;
    }
    let m = to_dmatrix(a);
    let inverse = match m.clone().cholesky() {
        Some(chol) => chol.inverse(),
        None => m.try_inverse()?,
    };
    if inverse.iter().all(|v| v.is_finite()) {
        Some(from_dmatrix(&inverse))
    } else {
        None
    }
}

/// Quadratic form `v' m v`.
pub fn quadratic_form(v: ArrayView1<f64>, m: ArrayView2<f64>) -> f64 {
    v.dot(&m.dot(&v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_solve_spd() {
        let a = array![[4.0, 1.0], [1.0, 3.0]];
        let b = array![1.0, 2.0];
        let x = solve_spd(a.view(), b.view()).unwrap();
        let back = a.dot(&x);
        assert_abs_diff_eq!(back[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(back[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_is_none() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(invert_spd(a.view()).is_none());
        assert!(solve_spd(a.view(), array![1.0, 1.0].view()).is_none());
    }

    #[test]
    fn test_inverse_times_matrix_is_identity() {
        let a = array![[2.0, 0.5], [0.5, 1.0]];
        let inv = invert_spd(a.view()).unwrap();
        let id = a.dot(&inv);
        assert_abs_diff_eq!(id[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(id[[0, 1]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(id[[1, 1]], 1.0, epsilon = 1e-12);
    }
}
