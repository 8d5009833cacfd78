//! Gaussian conditional estimation of target pixels from reference pixels.
//!
//! Notation follows Rasmussen & Williams, Chapter 2: `k` are the reference
//! indices (where data is trusted) and `k*` the indices to predict. Pixels in
//! neither set, such as a guard window, are simply left out of both.

use crate::linalg::select_block;
use crate::submatrix::{Padding, SubmatrixInverseStrategy};
use crate::types::{GspiceError, IndexMask, Spectra};
use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Whether to form the conditional mean immediately or leave it to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeanMode {
    Compute,
    /// Skip the `Nspec x N` multiply; the caller batches it over many calls.
    Defer,
}

#[derive(Debug, Clone)]
pub struct ConditionalEstimate {
    /// Predicted mean, `Nspec x Nk*`. `None` under [`MeanMode::Defer`].
    pub mean: Option<Array2<f64>>,
    /// Conditional covariance of the target pixels, `Nk* x Nk*`.
    pub covariance: Array2<f64>,
    /// `Σ_kk^{-1} Σ_kk*` zero-padded to `N x Nk*`; the mean is `data · weights`.
    pub weights: Array2<f64>,
}

impl ConditionalEstimate {
    pub fn variances(&self) -> Array1<f64> {
        self.covariance.diag().to_owned()
    }
}

/// Conditional estimator bound to one covariance matrix and its inverse.
pub struct GaussianConditionalEstimator<'a, S: ?Sized> {
    strategy: &'a S,
    cov: ArrayView2<'a, f64>,
    covinv: ArrayView2<'a, f64>,
}

impl<'a, S> GaussianConditionalEstimator<'a, S>
where
    S: SubmatrixInverseStrategy + ?Sized,
{
    pub fn new(
        strategy: &'a S,
        cov: ArrayView2<'a, f64>,
        covinv: ArrayView2<'a, f64>,
    ) -> Result<Self, GspiceError> {
        let (rows, cols) = cov.dim();
        if rows != cols {
            return Err(GspiceError::dimension(format!(
                "covariance must be a square matrix, got {rows}x{cols}"
            )));
        }
        if covinv.dim() != cov.dim() {
            return Err(GspiceError::dimension(format!(
                "covariance is {rows}x{cols} but its inverse is {}x{}",
                covinv.nrows(),
                covinv.ncols()
            )));
        }
        Ok(Self {
            strategy,
            cov,
            covinv,
        })
    }

    pub fn dim(&self) -> usize {
        self.cov.nrows()
    }

    pub fn estimate(
        &self,
        reference: &IndexMask,
        target: &IndexMask,
        data: Spectra<'_>,
        mean_mode: MeanMode,
    ) -> Result<ConditionalEstimate, GspiceError> {
        let n = self.dim();
        if reference.len() != n || target.len() != n {
            return Err(GspiceError::dimension(format!(
                "reference mask (length {}) and target mask (length {}) must match the {n}x{n} covariance",
                reference.len(),
                target.len()
            )));
        }
        if data.n_pixels() != n {
            return Err(GspiceError::dimension(format!(
                "data has {} pixels but the covariance is {n}x{n}",
                data.n_pixels()
            )));
        }

        let kstar = target.kept_indices();

        // Σ_kk^{-1} Σ_kk*, computed as A^{-1} Y with Y = Σ[:, k*].
        let y = self.cov.select(Axis(1), &kstar);
        let minv_y = self.covinv.dot(&y);
        let weights = self.strategy.inverse_multiply(
            self.cov,
            self.covinv,
            reference,
            y.view(),
            minv_y.view(),
            Padding::Padded,
        )?;

        // Σ_k*k* - Σ_k*k Σ_kk^{-1} Σ_kk*
        let covariance = select_block(&self.cov, &kstar, &kstar) - y.t().dot(&weights);

        let mean = match mean_mode {
            MeanMode::Compute => Some(data.as_matrix().dot(&weights)),
            MeanMode::Defer => None,
        };

        log::trace!(
            "conditional estimate: {} reference, {} target, {} spectra",
            reference.n_keep(),
            kstar.len(),
            data.n_spectra()
        );

        Ok(ConditionalEstimate {
            mean,
            covariance,
            weights,
        })
    }
}

/// One-shot form of [`GaussianConditionalEstimator::estimate`].
pub fn gaussian_conditional_estimate<S>(
    strategy: &S,
    cov: ArrayView2<f64>,
    covinv: ArrayView2<f64>,
    reference: &IndexMask,
    target: &IndexMask,
    data: Spectra<'_>,
    mean_mode: MeanMode,
) -> Result<ConditionalEstimate, GspiceError>
where
    S: SubmatrixInverseStrategy + ?Sized,
{
    GaussianConditionalEstimator::new(strategy, cov.view(), covinv.view())?.estimate(
        reference, target, data, mean_mode,
    )
}
