#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! Gaussian conditional estimation of spectral pixels over a fixed covariance.
//!
//! The covariance is inverted once per scan; every held-out window afterwards
//! costs a Schur-complement update of that inverse instead of a fresh inversion.

pub mod conditional;
pub mod config;
pub mod io;
pub mod linalg;
pub mod progress;
pub mod scan;
pub mod submatrix;
pub mod types;

#[cfg(test)]
mod test_fixtures;

pub use conditional::{
    ConditionalEstimate, GaussianConditionalEstimator, MeanMode, gaussian_conditional_estimate,
};
pub use config::{DEFAULT_GUARD_WIDTH, ScanConfig};
pub use linalg::cholesky_inverse;
pub use scan::{CancellationToken, PixelwiseScanner, ScanOutput, exclusion_window, pixelwise_scan};
pub use submatrix::{
    DirectInverse, Padding, SchurComplement, SubmatrixInverseStrategy, submatrix_inverse,
    submatrix_inverse_multiply,
};
pub use types::{GspiceError, IndexMask, PixelRange, Spectra};
