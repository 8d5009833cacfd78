// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are used in one file.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::error::LinalgError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use thiserror::Error;

/// The error taxonomy shared by every numerical entry point of the crate.
///
/// Shape problems are always reported before any heavy computation starts, so a
/// `DimensionMismatch` never leaves partially written output behind.
#[derive(Error, Debug)]
pub enum GspiceError {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Cholesky factorization failed; the matrix is not positive definite: {0}")]
    NotPositiveDefinite(#[source] LinalgError),

    #[error("Dense matrix inversion failed; the matrix is singular: {0}")]
    Singular(#[source] LinalgError),

    #[error("Scan cancelled after {completed} pixels.")]
    Cancelled { completed: usize },
}

impl GspiceError {
    pub(crate) fn dimension(message: impl Into<String>) -> Self {
        GspiceError::DimensionMismatch(message.into())
    }
}

/// Partition of `0..N` into kept (reference) and removed indices.
///
/// `true` marks a kept row/column, `false` a removed one. A mask is built once
/// per target index and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMask {
    keep: Vec<bool>,
    n_keep: usize,
}

impl IndexMask {
    pub fn from_bools(keep: Vec<bool>) -> Self {
        let n_keep = keep.iter().filter(|&&k| k).count();
        Self { keep, n_keep }
    }

    /// Builds a mask from integer flags, where any non-zero flag means "keep".
    pub fn from_flags(flags: &[u8]) -> Self {
        Self::from_bools(flags.iter().map(|&f| f != 0).collect())
    }

    pub fn all_kept(n: usize) -> Self {
        Self {
            keep: vec![true; n],
            n_keep: n,
        }
    }

    /// A mask selecting exactly one index. Used as the target mask of a scan.
    pub fn single(n: usize, index: usize) -> Self {
        let mut keep = vec![false; n];
        if index < n {
            keep[index] = true;
        }
        Self::from_bools(keep)
    }

    /// Keeps everything except `removed`, which is clipped to `0..n`.
    pub fn excluding(n: usize, removed: Range<usize>) -> Self {
        let start = removed.start.min(n);
        let end = removed.end.min(n).max(start);
        let mut keep = vec![true; n];
        keep[start..end].iter_mut().for_each(|k| *k = false);
        Self {
            keep,
            n_keep: n - (end - start),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keep.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keep.is_empty()
    }

    #[inline]
    pub fn n_keep(&self) -> usize {
        self.n_keep
    }

    #[inline]
    pub fn n_remove(&self) -> usize {
        self.keep.len() - self.n_keep
    }

    #[inline]
    pub fn is_kept(&self, index: usize) -> bool {
        self.keep[index]
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.keep
    }

    pub fn kept_indices(&self) -> Vec<usize> {
        self.keep
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| k.then_some(i))
            .collect()
    }

    pub fn removed_indices(&self) -> Vec<usize> {
        self.keep
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| (!k).then_some(i))
            .collect()
    }

    /// Returns the removed indices as one half-open range when they are contiguous.
    pub fn contiguous_removed(&self) -> Option<Range<usize>> {
        let start = self.keep.iter().position(|&k| !k)?;
        let end = start + self.keep[start..].iter().take_while(|&&k| !k).count();
        if self.keep[end..].iter().all(|&k| k) {
            Some(start..end)
        } else {
            None
        }
    }
}

/// Inclusive pixel range `[first, last]`, as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRange {
    pub first: usize,
    pub last: usize,
}

impl PixelRange {
    pub fn new(first: usize, last: usize) -> Self {
        Self { first, last }
    }

    /// Converts to a half-open range, validating against a matrix of dimension `n`.
    pub fn to_half_open(self, n: usize) -> Result<Range<usize>, GspiceError> {
        if self.first > self.last {
            return Err(GspiceError::dimension(format!(
                "pixel range {self} is reversed"
            )));
        }
        if self.last >= n {
            return Err(GspiceError::dimension(format!(
                "pixel range {self} exceeds the {n} available pixels"
            )));
        }
        Ok(self.first..self.last + 1)
    }
}

impl fmt::Display for PixelRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.first, self.last)
    }
}

impl std::str::FromStr for PixelRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (first, last) = s
            .split_once(':')
            .ok_or_else(|| format!("Invalid pixel range '{s}'. Expected FIRST:LAST."))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| format!("Invalid pixel index '{}' in range '{s}'.", v.trim()))
        };
        Ok(Self::new(parse(first)?, parse(last)?))
    }
}

/// Observed spectra sharing one covariance: either a single vector or an
/// `Nspec x N` matrix. A single vector behaves as a `1 x N` matrix.
#[derive(Debug, Clone, Copy)]
pub enum Spectra<'a> {
    Single(ArrayView1<'a, f64>),
    Many(ArrayView2<'a, f64>),
}

impl<'a> Spectra<'a> {
    pub fn as_matrix(&self) -> ArrayView2<'a, f64> {
        match *self {
            Spectra::Single(v) => v.insert_axis(Axis(0)),
            Spectra::Many(m) => m,
        }
    }

    pub fn n_spectra(&self) -> usize {
        match self {
            Spectra::Single(_) => 1,
            Spectra::Many(m) => m.nrows(),
        }
    }

    pub fn n_pixels(&self) -> usize {
        match self {
            Spectra::Single(v) => v.len(),
            Spectra::Many(m) => m.ncols(),
        }
    }
}

impl<'a> From<&'a Array1<f64>> for Spectra<'a> {
    fn from(v: &'a Array1<f64>) -> Self {
        Spectra::Single(v.view())
    }
}

impl<'a> From<ArrayView1<'a, f64>> for Spectra<'a> {
    fn from(v: ArrayView1<'a, f64>) -> Self {
        Spectra::Single(v)
    }
}

impl<'a> From<&'a Array2<f64>> for Spectra<'a> {
    fn from(m: &'a Array2<f64>) -> Self {
        Spectra::Many(m.view())
    }
}

impl<'a> From<ArrayView2<'a, f64>> for Spectra<'a> {
    fn from(m: ArrayView2<'a, f64>) -> Self {
        Spectra::Many(m)
    }
}
