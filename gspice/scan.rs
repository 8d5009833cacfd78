// ========================================================================================
//
//                      THE PIXELWISE SCANNER: LEAVE-WINDOW-OUT PREDICTION
//
// ========================================================================================
//
// Every pixel is predicted from all other pixels except a guard window around it.
// The scan runs in two phases:
//
// 1.  **Write phase:** for each scanned pixel, one conditional estimate with the mean
//     deferred. Each pixel produces a prediction-weights column and a variance, and
//     writes them to its own column of the accumulator. Pixels share only the
//     read-only covariance and its inverse, so this phase may run on rayon workers.
//
// 2.  **Finalize phase:** one bulk `Nspec x N` by `N x W` multiply turns the weights
//     into predictions for every spectrum at once.

use crate::conditional::{GaussianConditionalEstimator, MeanMode};
use crate::config::ScanConfig;
use crate::linalg::cholesky_inverse;
use crate::progress::{NoopScanProgress, ScanProgressObserver};
use crate::submatrix::{SchurComplement, SubmatrixInverseStrategy};
use crate::types::{GspiceError, IndexMask, PixelRange, Spectra};
use ndarray::{Array1, Array2, ArrayView2, ArrayViewMut1, Axis};
use rayon::prelude::*;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

/// Pixels between debug-level timing reports.
const TIMING_REPORT_INTERVAL: usize = 10;

/// Result of a scan. Both matrices are `Nspec x W` for `W` scanned pixels.
#[derive(Debug, Clone)]
pub struct ScanOutput {
    pub prediction: Array2<f64>,
    /// Identical across spectra for a given pixel; it depends only on the covariance.
    pub variance: Array2<f64>,
}

/// Pixels excluded from the reference set when predicting `index`.
///
/// The window `[index - guard_width, index + guard_width]` is clipped to `0..n`.
pub fn exclusion_window(index: usize, guard_width: usize, n: usize) -> Range<usize> {
    let start = index.saturating_sub(guard_width);
    let end = index.saturating_add(guard_width).saturating_add(1).min(n);
    start..end
}

/// Shared flag checked between pixels; setting it aborts the scan.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-pixel buffers filled during the write phase. Column `j` belongs to pixel `first + j`.
struct ScanAccumulator {
    first: usize,
    weights: Array2<f64>,
    variance: Array1<f64>,
}

impl ScanAccumulator {
    fn new(n: usize, pixels: &Range<usize>) -> Self {
        let width = pixels.len();
        Self {
            first: pixels.start,
            weights: Array2::zeros((n, width)),
            variance: Array1::zeros(width),
        }
    }

    fn finalize(self, data: ArrayView2<f64>) -> ScanOutput {
        let prediction = data.dot(&self.weights);
        let variance = Array2::from_shape_fn((data.nrows(), self.variance.len()), |(_, j)| {
            self.variance[j]
        });
        ScanOutput {
            prediction,
            variance,
        }
    }
}

/// Drives the conditional estimator over a range of pixels.
#[derive(Debug, Clone)]
pub struct PixelwiseScanner {
    guard_width: usize,
    range: Option<PixelRange>,
    parallel: bool,
    cancellation: Option<CancellationToken>,
}

impl PixelwiseScanner {
    pub fn new(guard_width: usize) -> Self {
        Self {
            guard_width,
            range: None,
            parallel: true,
            cancellation: None,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            guard_width: config.guard_width,
            range: config.range,
            parallel: config.parallel,
            cancellation: None,
        }
    }

    pub fn with_range(mut self, range: Option<PixelRange>) -> Self {
        self.range = range;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn scan(&self, data: Spectra<'_>, cov: ArrayView2<f64>) -> Result<ScanOutput, GspiceError> {
        self.scan_with(&SchurComplement, data, cov, &NoopScanProgress)
    }

    /// Full scan with an explicit submatrix strategy and progress observer.
    pub fn scan_with<S, P>(
        &self,
        strategy: &S,
        data: Spectra<'_>,
        cov: ArrayView2<f64>,
        progress: &P,
    ) -> Result<ScanOutput, GspiceError>
    where
        S: SubmatrixInverseStrategy + Sync + ?Sized,
        P: ScanProgressObserver + ?Sized,
    {
        let (rows, cols) = cov.dim();
        if rows != cols {
            return Err(GspiceError::dimension(format!(
                "cov must be a square matrix, got {rows}x{cols}"
            )));
        }
        let n = rows;
        if data.n_pixels() != n {
            return Err(GspiceError::dimension(format!(
                "data ({} pixels) and cov ({n}x{n}) have incompatible dimensions",
                data.n_pixels()
            )));
        }
        let pixels = match self.range {
            Some(range) => range.to_half_open(n)?,
            None => 0..n,
        };

        log::info!(
            "pixelwise scan: npix {n}, nspec {}, scanning {} pixels, guard width {}",
            data.n_spectra(),
            pixels.len(),
            self.guard_width
        );
        let start = Instant::now();

        let covinv = cholesky_inverse(&cov)?;
        log::debug!(
            "inverse covariance computed in {:.3}s",
            start.elapsed().as_secs_f64()
        );

        let estimator = GaussianConditionalEstimator::new(strategy, cov.view(), covinv.view())?;
        let mut accumulator = ScanAccumulator::new(n, &pixels);

        progress.on_scan_start(pixels.len());
        if self.parallel {
            let completed = AtomicUsize::new(0);
            let first = accumulator.first;
            accumulator
                .weights
                .axis_iter_mut(Axis(1))
                .into_par_iter()
                .zip(accumulator.variance.axis_iter_mut(Axis(0)).into_par_iter())
                .enumerate()
                .try_for_each(|(col, (weights, mut variance))| -> Result<(), GspiceError> {
                    self.check_cancelled(completed.load(Ordering::Relaxed))?;
                    let pixel = first + col;
                    variance.fill(self.estimate_pixel(&estimator, data, pixel, weights)?);
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    self.report(pixel, done, &start, progress);
                    Ok(())
                })?;
        } else {
            for (col, pixel) in pixels.clone().enumerate() {
                self.check_cancelled(col)?;
                accumulator.variance[col] = self.estimate_pixel(
                    &estimator,
                    data,
                    pixel,
                    accumulator.weights.column_mut(col),
                )?;
                self.report(pixel, col + 1, &start, progress);
            }
        }
        progress.on_scan_finish();

        let output = accumulator.finalize(data.as_matrix());
        log::info!(
            "pixelwise scan finished in {:.3}s (including final matrix multiply)",
            start.elapsed().as_secs_f64()
        );
        Ok(output)
    }

    fn check_cancelled(&self, completed: usize) -> Result<(), GspiceError> {
        match &self.cancellation {
            Some(token) if token.is_cancelled() => Err(GspiceError::Cancelled { completed }),
            _ => Ok(()),
        }
    }

    /// Writes the prediction weights of `pixel` into `weights` and returns its variance.
    fn estimate_pixel<S>(
        &self,
        estimator: &GaussianConditionalEstimator<'_, S>,
        data: Spectra<'_>,
        pixel: usize,
        mut weights: ArrayViewMut1<f64>,
    ) -> Result<f64, GspiceError>
    where
        S: SubmatrixInverseStrategy + ?Sized,
    {
        let n = estimator.dim();
        let target = IndexMask::single(n, pixel);
        let reference = IndexMask::excluding(n, exclusion_window(pixel, self.guard_width, n));
        let estimate = estimator.estimate(&reference, &target, data, MeanMode::Defer)?;
        weights.assign(&estimate.weights.column(0));
        Ok(estimate.covariance[(0, 0)])
    }

    fn report<P>(&self, pixel: usize, done: usize, start: &Instant, progress: &P)
    where
        P: ScanProgressObserver + ?Sized,
    {
        progress.on_pixel_done(pixel);
        if done % TIMING_REPORT_INTERVAL == 0 {
            log::debug!(
                " {:5} pixels {:12.3}s",
                done,
                start.elapsed().as_secs_f64()
            );
        }
    }
}

/// Scans `range` (inclusive; all pixels when `None`) with the given guard width.
pub fn pixelwise_scan(
    data: Spectra<'_>,
    cov: ArrayView2<f64>,
    range: Option<PixelRange>,
    guard_width: usize,
) -> Result<ScanOutput, GspiceError> {
    PixelwiseScanner::new(guard_width)
        .with_range(range)
        .scan(data, cov)
}
