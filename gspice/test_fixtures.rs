//! Test fixtures shared by the unit tests of the numerical modules.

use ndarray::{Array2, ArrayBase, Data, Ix2};
use rand::Rng;
use rand::rngs::StdRng;

/// A well-conditioned random SPD matrix: `G Gᵀ / n + I`.
pub fn random_spd(n: usize, rng: &mut StdRng) -> Array2<f64> {
    let g = Array2::from_shape_fn((n, n), |_| rng.gen_range(-1.0..1.0));
    g.dot(&g.t()) / n as f64 + Array2::<f64>::eye(n)
}

/// Smooth covariance resembling neighbouring spectral pixels.
pub fn smooth_covariance(n: usize, length_scale: f64) -> Array2<f64> {
    Array2::from_shape_fn((n, n), |(i, j)| {
        let d = i as f64 - j as f64;
        (-0.5 * d * d / (length_scale * length_scale)).exp() + if i == j { 0.05 } else { 0.0 }
    })
}

/// The five-pixel banded covariance used in the worked examples.
pub fn banded_five() -> Array2<f64> {
    ndarray::array![
        [4.0, 2.0, 1.0, 0.0, 0.0],
        [2.0, 4.0, 2.0, 1.0, 0.0],
        [1.0, 2.0, 4.0, 2.0, 1.0],
        [0.0, 1.0, 2.0, 4.0, 2.0],
        [0.0, 0.0, 1.0, 2.0, 4.0]
    ]
}

pub fn random_matrix(rows: usize, cols: usize, rng: &mut StdRng) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-2.0..2.0))
}

pub fn assert_matrix_close<S1, S2>(
    actual: &ArrayBase<S1, Ix2>,
    expected: &ArrayBase<S2, Ix2>,
    tol: f64,
) where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    assert_eq!(actual.dim(), expected.dim(), "shape mismatch");
    for ((idx, &a), &e) in actual.indexed_iter().zip(expected.iter()) {
        let scale = 1.0_f64.max(e.abs());
        assert!(
            (a - e).abs() <= tol * scale,
            "mismatch at {:?}: {} vs {}",
            idx,
            a,
            e
        );
    }
}
