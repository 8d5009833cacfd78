//! Dense linear-algebra primitives on top of `ndarray-linalg`.
//!
//! Everything above this module works in terms of `Array2<f64>` and the
//! crate's `GspiceError`; LAPACK errors are translated here and nowhere else.

use crate::types::GspiceError;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2, OwnedRepr};
use ndarray_linalg::cholesky::CholeskyFactorized;
use ndarray_linalg::{FactorizeC, Inverse, InverseCInto, SolveC, UPLO};

fn ensure_square<S: Data<Elem = f64>>(
    m: &ArrayBase<S, Ix2>,
    name: &str,
) -> Result<usize, GspiceError> {
    let (rows, cols) = m.dim();
    if rows != cols {
        return Err(GspiceError::dimension(format!(
            "{name} must be a square matrix, got {rows}x{cols}"
        )));
    }
    Ok(rows)
}

/// Copies the lower triangle into the upper triangle in place.
pub fn symmetrize_from_lower(m: &mut Array2<f64>) {
    let n = m.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            m[(i, j)] = m[(j, i)];
        }
    }
}

/// Inverts a symmetric positive-definite matrix through its lower Cholesky factor.
///
/// The lower triangle of the LAPACK result is authoritative and is mirrored into
/// the upper triangle, so the returned matrix is exactly symmetric.
pub fn cholesky_inverse<S: Data<Elem = f64>>(
    m: &ArrayBase<S, Ix2>,
) -> Result<Array2<f64>, GspiceError> {
    let n = ensure_square(m, "Cholesky input")?;
    if n == 0 {
        return Ok(Array2::zeros((0, 0)));
    }
    let mut inverse = m
        .factorizec(UPLO::Lower)
        .map_err(GspiceError::NotPositiveDefinite)?
        .invc_into()
        .map_err(GspiceError::NotPositiveDefinite)?;
    symmetrize_from_lower(&mut inverse);
    Ok(inverse)
}

/// General dense inverse (LU based), for blocks that are not factorized elsewhere.
pub fn dense_inverse<S: Data<Elem = f64>>(
    m: &ArrayBase<S, Ix2>,
) -> Result<Array2<f64>, GspiceError> {
    let n = ensure_square(m, "inverse input")?;
    if n == 0 {
        return Ok(Array2::zeros((0, 0)));
    }
    m.inv().map_err(GspiceError::Singular)
}

/// Gathers the `rows x cols` block of `m`.
pub fn select_block<S: Data<Elem = f64>>(
    m: &ArrayBase<S, Ix2>,
    rows: &[usize],
    cols: &[usize],
) -> Array2<f64> {
    m.select(Axis(0), rows).select(Axis(1), cols)
}

/// A Cholesky factorization kept around for repeated solves.
pub struct CholeskySolver {
    factor: CholeskyFactorized<OwnedRepr<f64>>,
    dim: usize,
}

impl CholeskySolver {
    pub fn new<S: Data<Elem = f64>>(m: &ArrayBase<S, Ix2>) -> Result<Self, GspiceError> {
        let dim = ensure_square(m, "Cholesky input")?;
        let factor = m
            .factorizec(UPLO::Lower)
            .map_err(GspiceError::NotPositiveDefinite)?;
        Ok(Self { factor, dim })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn solve_vec<S: Data<Elem = f64>>(
        &self,
        rhs: &ArrayBase<S, Ix1>,
    ) -> Result<Array1<f64>, GspiceError> {
        if rhs.len() != self.dim {
            return Err(GspiceError::dimension(format!(
                "right-hand side has {} rows, factor has {}",
                rhs.len(),
                self.dim
            )));
        }
        self.factor
            .solvec(rhs)
            .map_err(GspiceError::NotPositiveDefinite)
    }

    /// Solves `M X = rhs` column by column.
    pub fn solve_mat<S: Data<Elem = f64>>(
        &self,
        rhs: &ArrayBase<S, Ix2>,
    ) -> Result<Array2<f64>, GspiceError> {
        if rhs.nrows() != self.dim {
            return Err(GspiceError::dimension(format!(
                "right-hand side has {} rows, factor has {}",
                rhs.nrows(),
                self.dim
            )));
        }
        let mut solution = Array2::zeros(rhs.raw_dim());
        for (col, mut out) in rhs.columns().into_iter().zip(solution.columns_mut()) {
            let x = self.solve_vec(&col)?;
            out.assign(&x);
        }
        Ok(solution)
    }
}
