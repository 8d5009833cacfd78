//! # Submatrix inverses from a known parent inverse
//!
//! Let `M` be a symmetric positive-definite block matrix with a known inverse:
//!
//! ```text
//!          | A   B |                   | P   Q |
//!     M  = |       |      M^{-1}  =    |       |
//!          | Bᵀ  D |                   | Qᵀ  U |
//! ```
//!
//! The inverse of the kept block `A` is the Schur complement of `U`:
//!
//! ```text
//!     A^{-1} = P - Q U^{-1} Qᵀ
//! ```
//!
//! so removing `Nr` rows/columns costs one `Nr x Nr` factorization instead of a
//! fresh `Nk x Nk` inversion. The "kept" and "removed" blocks need not be
//! contiguous; an [`IndexMask`] selects them.

use crate::linalg::{CholeskySolver, cholesky_inverse, dense_inverse, select_block};
use crate::types::{GspiceError, IndexMask};
use ndarray::{Array2, ArrayView2, Axis, s};
use std::ops::Range;

/// Output layout of [`SubmatrixInverseStrategy::inverse_multiply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// `N x Nspec`, with every removed row exactly zero.
    Padded,
    /// `Nk x Nspec`, kept rows only.
    Compact,
}

/// A way of computing `A^{-1}` and `A^{-1} Y` for the kept block `A` of `M`.
///
/// [`SchurComplement`] is the production implementation. [`DirectInverse`]
/// inverts `A` from scratch and exists to validate it.
pub trait SubmatrixInverseStrategy {
    /// Inverse of the kept block, `Nk x Nk`.
    fn inverse(
        &self,
        m: ArrayView2<f64>,
        minv: ArrayView2<f64>,
        mask: &IndexMask,
    ) -> Result<Array2<f64>, GspiceError>;

    /// `A^{-1} Y[keep, :]`, given `Y` (`N x Nspec`) and `M^{-1} Y`.
    fn inverse_multiply(
        &self,
        m: ArrayView2<f64>,
        minv: ArrayView2<f64>,
        mask: &IndexMask,
        y: ArrayView2<f64>,
        minv_y: ArrayView2<f64>,
        padding: Padding,
    ) -> Result<Array2<f64>, GspiceError>;
}

/// Schur-complement update of the cached parent inverse.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchurComplement;

/// Brute-force inversion of the kept block. Slow; use only for testing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectInverse;

/// Inverse of the kept submatrix of `m`, via [`SchurComplement`].
pub fn submatrix_inverse(
    m: ArrayView2<f64>,
    minv: ArrayView2<f64>,
    mask: &IndexMask,
) -> Result<Array2<f64>, GspiceError> {
    SchurComplement.inverse(m, minv, mask)
}

/// Inverse of the kept submatrix of `m` times `y`, via [`SchurComplement`].
pub fn submatrix_inverse_multiply(
    m: ArrayView2<f64>,
    minv: ArrayView2<f64>,
    mask: &IndexMask,
    y: ArrayView2<f64>,
    minv_y: ArrayView2<f64>,
    padding: Padding,
) -> Result<Array2<f64>, GspiceError> {
    SchurComplement.inverse_multiply(m, minv, mask, y, minv_y, padding)
}

fn validate_partition(
    m: &ArrayView2<f64>,
    minv: &ArrayView2<f64>,
    mask: &IndexMask,
) -> Result<usize, GspiceError> {
    let (rows, cols) = m.dim();
    if rows != cols {
        return Err(GspiceError::dimension(format!(
            "M must be a square matrix, got {rows}x{cols}"
        )));
    }
    if minv.dim() != (rows, cols) {
        return Err(GspiceError::dimension(format!(
            "M is {rows}x{cols} but its inverse is {}x{}",
            minv.nrows(),
            minv.ncols()
        )));
    }
    if mask.len() != rows {
        return Err(GspiceError::dimension(format!(
            "M ({rows}x{cols}) and mask (length {}) have incompatible dimensions",
            mask.len()
        )));
    }
    Ok(rows)
}

fn validate_rhs(
    n: usize,
    y: &ArrayView2<f64>,
    minv_y: &ArrayView2<f64>,
) -> Result<(), GspiceError> {
    if y.nrows() != n {
        return Err(GspiceError::dimension(format!(
            "Y has {} rows but M has {n}",
            y.nrows()
        )));
    }
    if minv_y.dim() != y.dim() {
        return Err(GspiceError::dimension(format!(
            "MinvY is {}x{} but Y is {}x{}",
            minv_y.nrows(),
            minv_y.ncols(),
            y.nrows(),
            y.ncols()
        )));
    }
    Ok(())
}

/// Solves `U x = rhs` for the removed block.
///
/// A 1x1 block is a scalar division; larger blocks are principal submatrices of
/// an SPD inverse and are Cholesky factorized.
fn solve_removed_block(u: ArrayView2<f64>, rhs: &Array2<f64>) -> Result<Array2<f64>, GspiceError> {
    if u.nrows() == 1 && u[(0, 0)] > 0.0 {
        return Ok(rhs / u[(0, 0)]);
    }
    CholeskySolver::new(&u)?.solve_mat(rhs)
}

/// `Qᵀ (U^{-1} Qᵀ Y + Y_r)` restricted to kept rows, with the removed block gathered.
fn gathered_correction(
    minv: ArrayView2<f64>,
    mask: &IndexMask,
    y: ArrayView2<f64>,
    minv_y: ArrayView2<f64>,
) -> Result<Array2<f64>, GspiceError> {
    let keep = mask.kept_indices();
    let remove = mask.removed_indices();

    // Qᵀ Y = M^{-1} Y - U Y_r on the removed rows.
    let u = select_block(&minv, &remove, &remove);
    let y_r = y.select(Axis(0), &remove);
    let qty = minv_y.select(Axis(0), &remove) - &u.dot(&y_r);

    let z = solve_removed_block(u.view(), &qty)? + &y_r;

    // Qt is cheaper to gather than Q.
    let qt = select_block(&minv, &remove, &keep);
    Ok(qt.t().dot(&z))
}

/// Same as [`gathered_correction`] for a contiguous removed run, using slices only.
fn contiguous_correction(
    minv: ArrayView2<f64>,
    removed: Range<usize>,
    y: ArrayView2<f64>,
    minv_y: ArrayView2<f64>,
) -> Result<Array2<f64>, GspiceError> {
    let (a, b) = (removed.start, removed.end);
    let n = minv.nrows();

    let u = minv.slice(s![a..b, a..b]);
    let y_r = y.slice(s![a..b, ..]);
    let qty = &minv_y.slice(s![a..b, ..]) - &u.dot(&y_r);

    let z = solve_removed_block(u, &qty)? + &y_r;

    let mut correction = Array2::zeros((n - (b - a), y.ncols()));
    correction
        .slice_mut(s![..a, ..])
        .assign(&minv.slice(s![..a, a..b]).dot(&z));
    correction
        .slice_mut(s![a.., ..])
        .assign(&minv.slice(s![b.., a..b]).dot(&z));
    Ok(correction)
}

impl SubmatrixInverseStrategy for SchurComplement {
    fn inverse(
        &self,
        m: ArrayView2<f64>,
        minv: ArrayView2<f64>,
        mask: &IndexMask,
    ) -> Result<Array2<f64>, GspiceError> {
        validate_partition(&m, &minv, mask)?;

        if mask.n_remove() == 0 {
            log::trace!("mask does not remove any rows/columns; returning the parent inverse");
            return Ok(minv.to_owned());
        }

        let keep = mask.kept_indices();
        let remove = mask.removed_indices();

        let u_inv = dense_inverse(&select_block(&minv, &remove, &remove))?;
        let qt = select_block(&minv, &remove, &keep);
        let p = select_block(&minv, &keep, &keep);
        Ok(p - qt.t().dot(&u_inv.dot(&qt)))
    }

    fn inverse_multiply(
        &self,
        m: ArrayView2<f64>,
        minv: ArrayView2<f64>,
        mask: &IndexMask,
        y: ArrayView2<f64>,
        minv_y: ArrayView2<f64>,
        padding: Padding,
    ) -> Result<Array2<f64>, GspiceError> {
        let n = validate_partition(&m, &minv, mask)?;
        validate_rhs(n, &y, &minv_y)?;

        if mask.n_remove() == 0 {
            log::trace!("mask does not remove any rows/columns; returning MinvY");
            return Ok(minv_y.to_owned());
        }

        // A^{-1} Y = P Y - Q U^{-1} Qᵀ Y, with P Y = M^{-1} Y - Q Y_r.
        let correction = match mask.contiguous_removed() {
            Some(range) => contiguous_correction(minv, range, y, minv_y)?,
            None => gathered_correction(minv, mask, y, minv_y)?,
        };

        let keep = mask.kept_indices();
        match padding {
            Padding::Compact => Ok(minv_y.select(Axis(0), &keep) - &correction),
            Padding::Padded => {
                let mut out = minv_y.to_owned();
                for (row, &k) in keep.iter().enumerate() {
                    out.row_mut(k).scaled_add(-1.0, &correction.row(row));
                }
                for (r, mut row) in out.rows_mut().into_iter().enumerate() {
                    if !mask.is_kept(r) {
                        row.fill(0.0);
                    }
                }
                Ok(out)
            }
        }
    }
}

impl SubmatrixInverseStrategy for DirectInverse {
    fn inverse(
        &self,
        m: ArrayView2<f64>,
        minv: ArrayView2<f64>,
        mask: &IndexMask,
    ) -> Result<Array2<f64>, GspiceError> {
        validate_partition(&m, &minv, mask)?;
        let keep = mask.kept_indices();
        cholesky_inverse(&select_block(&m, &keep, &keep))
    }

    fn inverse_multiply(
        &self,
        m: ArrayView2<f64>,
        minv: ArrayView2<f64>,
        mask: &IndexMask,
        y: ArrayView2<f64>,
        minv_y: ArrayView2<f64>,
        padding: Padding,
    ) -> Result<Array2<f64>, GspiceError> {
        let n = validate_partition(&m, &minv, mask)?;
        validate_rhs(n, &y, &minv_y)?;

        let keep = mask.kept_indices();
        let a_inv = cholesky_inverse(&select_block(&m, &keep, &keep))?;
        let a_inv_y = a_inv.dot(&y.select(Axis(0), &keep));

        match padding {
            Padding::Compact => Ok(a_inv_y),
            Padding::Padded => {
                let mut out = Array2::zeros((n, y.ncols()));
                for (row, &k) in keep.iter().enumerate() {
                    out.row_mut(k).assign(&a_inv_y.row(row));
                }
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{
        assert_matrix_close, banded_five, random_matrix, random_spd, smooth_covariance,
    };
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct Case {
        m: Array2<f64>,
        minv: Array2<f64>,
        y: Array2<f64>,
        minv_y: Array2<f64>,
    }

    fn case(n: usize, nspec: usize, seed: u64) -> Case {
        let mut rng = StdRng::seed_from_u64(seed);
        let m = random_spd(n, &mut rng);
        let minv = cholesky_inverse(&m).unwrap();
        let y = random_matrix(n, nspec, &mut rng);
        let minv_y = minv.dot(&y);
        Case { m, minv, y, minv_y }
    }

    fn both_paths(c: &Case, mask: &IndexMask, padding: Padding) -> (Array2<f64>, Array2<f64>) {
        let fast = SchurComplement
            .inverse_multiply(
                c.m.view(),
                c.minv.view(),
                mask,
                c.y.view(),
                c.minv_y.view(),
                padding,
            )
            .unwrap();
        let reference = DirectInverse
            .inverse_multiply(
                c.m.view(),
                c.minv.view(),
                mask,
                c.y.view(),
                c.minv_y.view(),
                padding,
            )
            .unwrap();
        (fast, reference)
    }

    #[test]
    fn schur_inverse_matches_direct_inverse() {
        let c = case(10, 1, 1);
        for flags in [
            vec![1, 1, 0, 1, 1, 1, 1, 1, 1, 1],
            vec![1, 0, 0, 0, 1, 1, 1, 1, 1, 1],
            vec![0, 1, 1, 0, 1, 0, 1, 1, 1, 0],
        ] {
            let mask = IndexMask::from_flags(&flags);
            let fast = submatrix_inverse(c.m.view(), c.minv.view(), &mask).unwrap();
            let reference = DirectInverse
                .inverse(c.m.view(), c.minv.view(), &mask)
                .unwrap();
            assert_eq!(fast.dim(), (mask.n_keep(), mask.n_keep()));
            assert_matrix_close(&fast, &reference, 1e-8);
        }
    }

    #[test]
    fn inverse_multiply_single_removed_row_uses_scalar_path() {
        let c = case(8, 3, 2);
        let mask = IndexMask::excluding(8, 4..5);
        for padding in [Padding::Padded, Padding::Compact] {
            let (fast, reference) = both_paths(&c, &mask, padding);
            assert_matrix_close(&fast, &reference, 1e-8);
        }
    }

    #[test]
    fn inverse_multiply_block_removal_matches_direct() {
        let c = case(12, 4, 3);
        let contiguous = IndexMask::excluding(12, 3..8);
        let scattered = IndexMask::from_flags(&[1, 0, 1, 1, 0, 0, 1, 1, 1, 0, 1, 1]);
        for mask in [contiguous, scattered] {
            for padding in [Padding::Padded, Padding::Compact] {
                let (fast, reference) = both_paths(&c, &mask, padding);
                assert_matrix_close(&fast, &reference, 1e-8);
            }
        }
    }

    #[test]
    fn padded_output_zeroes_removed_rows_exactly() {
        let c = case(9, 2, 4);
        let mask = IndexMask::from_flags(&[1, 1, 0, 1, 0, 1, 1, 1, 0]);
        let padded = submatrix_inverse_multiply(
            c.m.view(),
            c.minv.view(),
            &mask,
            c.y.view(),
            c.minv_y.view(),
            Padding::Padded,
        )
        .unwrap();
        assert_eq!(padded.dim(), (9, 2));
        for r in mask.removed_indices() {
            assert!(padded.row(r).iter().all(|&v| v == 0.0));
        }
        let compact = submatrix_inverse_multiply(
            c.m.view(),
            c.minv.view(),
            &mask,
            c.y.view(),
            c.minv_y.view(),
            Padding::Compact,
        )
        .unwrap();
        assert_matrix_close(&padded.select(Axis(0), &mask.kept_indices()), &compact, 1e-12);
    }

    #[test]
    fn contiguous_path_matches_gathered_path() {
        let m = smooth_covariance(15, 2.0);
        let minv = cholesky_inverse(&m).unwrap();
        let y = m.slice(s![.., 5..7]).to_owned();
        let minv_y = minv.dot(&y);
        for range in [0..3, 4..9, 12..15, 7..8] {
            let mask = IndexMask::excluding(15, range.clone());
            let gathered = gathered_correction(minv.view(), &mask, y.view(), minv_y.view()).unwrap();
            let sliced = contiguous_correction(minv.view(), range, y.view(), minv_y.view()).unwrap();
            assert_matrix_close(&sliced, &gathered, 1e-10);
        }
    }

    #[test]
    fn keeping_everything_is_a_no_op() {
        let c = case(6, 2, 5);
        let mask = IndexMask::all_kept(6);
        let inv = submatrix_inverse(c.m.view(), c.minv.view(), &mask).unwrap();
        assert_eq!(inv, c.minv);
        let ainv_y = submatrix_inverse_multiply(
            c.m.view(),
            c.minv.view(),
            &mask,
            c.y.view(),
            c.minv_y.view(),
            Padding::Padded,
        )
        .unwrap();
        assert_eq!(ainv_y, c.minv_y);
    }

    #[test]
    fn mask_length_mismatch_is_rejected() {
        let m = banded_five();
        let minv = cholesky_inverse(&m).unwrap();
        let mask = IndexMask::from_flags(&[1, 0, 1, 1]);
        let err = submatrix_inverse(m.view(), minv.view(), &mask).unwrap_err();
        assert!(matches!(err, GspiceError::DimensionMismatch(_)));
        let err = DirectInverse
            .inverse(m.view(), minv.view(), &mask)
            .unwrap_err();
        assert!(matches!(err, GspiceError::DimensionMismatch(_)));
    }

    #[test]
    fn non_square_and_mismatched_rhs_are_rejected() {
        let rect = Array2::<f64>::zeros((4, 5));
        let mask = IndexMask::all_kept(4);
        assert!(matches!(
            submatrix_inverse(rect.view(), rect.view(), &mask),
            Err(GspiceError::DimensionMismatch(_))
        ));

        let c = case(5, 2, 6);
        let mask = IndexMask::excluding(5, 1..2);
        let short_y = Array2::<f64>::zeros((4, 2));
        assert!(matches!(
            submatrix_inverse_multiply(
                c.m.view(),
                c.minv.view(),
                &mask,
                short_y.view(),
                c.minv_y.view(),
                Padding::Compact,
            ),
            Err(GspiceError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn result_does_not_depend_on_removed_rows_of_y() {
        let c = case(7, 1, 8);
        let mask = IndexMask::excluding(7, 2..4);
        let mut y_zeroed = c.y.clone();
        y_zeroed.slice_mut(s![2..4, ..]).fill(0.0);
        let minv_y_zeroed = c.minv.dot(&y_zeroed);
        let with_rows = submatrix_inverse_multiply(
            c.m.view(),
            c.minv.view(),
            &mask,
            c.y.view(),
            c.minv_y.view(),
            Padding::Compact,
        )
        .unwrap();
        let without_rows = submatrix_inverse_multiply(
            c.m.view(),
            c.minv.view(),
            &mask,
            y_zeroed.view(),
            minv_y_zeroed.view(),
            Padding::Compact,
        )
        .unwrap();
        assert_matrix_close(&with_rows, &without_rows, 1e-10);
    }

    #[test]
    fn non_positive_single_pivot_is_not_divided() {
        let rhs = Array2::from_elem((1, 2), 1.0);
        for pivot in [0.0, -1.0] {
            let u = Array2::from_elem((1, 1), pivot);
            assert!(matches!(
                solve_removed_block(u.view(), &rhs),
                Err(GspiceError::NotPositiveDefinite(_))
            ));
        }
        let u = Array2::from_elem((1, 1), 4.0);
        assert_eq!(solve_removed_block(u.view(), &rhs).unwrap(), Array2::from_elem((1, 2), 0.25));
    }
}
