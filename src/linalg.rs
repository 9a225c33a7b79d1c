//! Dense linear algebra on ndarray matrices, backed by nalgebra
//!
//! The rest of the crate works on `ndarray` arrays; matrices are copied into
//! `DMatrix` for factorizations and copied back.

use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::Rng;

use crate::error::{OrthoConvError, Result};

/// Diagonal entries of `R` smaller than this mark a rank-deficient draw
const RANK_EPSILON: f64 = 1e-12;

fn to_dmatrix(a: ArrayView2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

fn to_array(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn(m.shape(), |(i, j)| m[(i, j)])
}

/// Solve `a * x = b` for `x` through an LU decomposition with partial pivoting
pub fn solve(a: ArrayView2<f64>, b: ArrayView2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(OrthoConvError::dimension_mismatch(
            "square matrix".to_string(),
            format!("{}x{}", a.nrows(), a.ncols()),
        ));
    }
    if b.nrows() != n {
        return Err(OrthoConvError::dimension_mismatch(
            format!("right-hand side with {} rows", n),
            format!("{} rows", b.nrows()),
        ));
    }

    let x = to_dmatrix(a)
        .lu()
        .solve(&to_dmatrix(b))
        .ok_or_else(|| OrthoConvError::NumericalError(format!("{}x{} matrix is singular", n, n)))?;
    Ok(to_array(&x))
}

/// Kronecker product `a ⊗ b`
///
/// Block `(i, j)` of the result is `a[[i, j]] * b`.
pub fn kron(a: ArrayView2<f64>, b: ArrayView2<f64>) -> Array2<f64> {
    to_array(&to_dmatrix(a).kronecker(&to_dmatrix(b)))
}

/// Draw an `n x n` matrix uniformly (Haar measure) from the orthogonal group
///
/// Takes the `Q` factor of a standard Gaussian matrix and flips each column
/// by the sign of the matching diagonal entry of `R`, i.e. `Q * diag(sign(R_ii))`.
pub fn haar_orthogonal<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Result<Array2<f64>> {
    if n == 0 {
        return Ok(Array2::zeros((0, 0)));
    }
    loop {
        let gaussian: Array2<f64> = Array2::random_using((n, n), StandardNormal, rng);
        let qr = to_dmatrix(gaussian.view()).qr();
        let r = qr.r();
        // Rank-deficient draws have probability zero; just draw again.
        if r.diagonal().iter().any(|d| d.abs() < RANK_EPSILON) {
            continue;
        }

        let mut q = qr.q();
        for (j, d) in r.diagonal().iter().enumerate() {
            if *d < 0.0 {
                q.column_mut(j).neg_mut();
            }
        }
        return Ok(to_array(&q));
    }
}

/// Largest absolute entry of `mᵗm − I`
pub fn orthogonality_residual(m: ArrayView2<f64>) -> f64 {
    let m = to_dmatrix(m);
    let gram = m.transpose() * &m - DMatrix::<f64>::identity(m.ncols(), m.ncols());
    gram.amax()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn assert_close(a: &Array2<f64>, b: &Array2<f64>) {
        assert_eq!(a.dim(), b.dim());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-12, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_solve_for_inverse() {
        let a = arr2(&[[4.0, 7.0], [2.0, 6.0]]);
        let inv = solve(a.view(), Array2::eye(2).view()).unwrap();
        assert_close(&inv, &arr2(&[[0.6, -0.7], [-0.2, 0.4]]));
    }

    #[test]
    fn test_solve_needs_pivoting() {
        // Zero in the leading position forces a row swap
        let a = arr2(&[[0.0, 1.0], [1.0, 0.0]]);
        let b = arr2(&[[2.0], [3.0]]);
        let x = solve(a.view(), b.view()).unwrap();
        assert_close(&x, &arr2(&[[3.0], [2.0]]));
    }

    #[test]
    fn test_singular_matrix_is_rejected() {
        let a = arr2(&[[1.0, 2.0], [2.0, 4.0]]);
        assert!(matches!(
            solve(a.view(), Array2::eye(2).view()),
            Err(OrthoConvError::NumericalError(_))
        ));
    }

    #[test]
    fn test_solve_shape_errors() {
        let a = Array2::<f64>::zeros((2, 3));
        assert!(solve(a.view(), Array2::eye(2).view()).is_err());
        let a = Array2::<f64>::eye(3);
        assert!(matches!(
            solve(a.view(), Array2::eye(2).view()),
            Err(OrthoConvError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_kron_layout() {
        let a = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let b = arr2(&[[0.0, 1.0], [1.0, 0.0]]);
        let k = kron(a.view(), b.view());
        assert_eq!(
            k,
            arr2(&[
                [0.0, 1.0, 0.0, 2.0],
                [1.0, 0.0, 2.0, 0.0],
                [0.0, 3.0, 0.0, 4.0],
                [3.0, 0.0, 4.0, 0.0],
            ])
        );
    }

    #[test]
    fn test_haar_orthogonal_is_orthogonal() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in 1..=8 {
            let q = haar_orthogonal(n, &mut rng).unwrap();
            assert_eq!(q.dim(), (n, n));
            assert!(orthogonality_residual(q.view()) < 1e-10);
        }
    }

    #[test]
    fn test_haar_orthogonal_has_no_sign_bias() {
        // Q[0, 0] of a Haar sample is symmetric around zero
        let mut rng = StdRng::seed_from_u64(21);
        let draws = 2000;
        let positive = (0..draws)
            .filter(|_| haar_orthogonal(3, &mut rng).unwrap()[[0, 0]] > 0.0)
            .count();
        let fraction = positive as f64 / draws as f64;
        assert!((fraction - 0.5).abs() < 0.05, "{}", fraction);
    }

    #[test]
    fn test_residual_of_non_orthogonal() {
        let m = arr2(&[[2.0, 0.0], [0.0, 1.0]]);
        assert!((orthogonality_residual(m.view()) - 3.0).abs() < 1e-12);
    }
}
