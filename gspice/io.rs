//! # Matrix I/O for the command-line tool
//!
//! Covariance matrices and spectra are exchanged as headerless CSV files, one
//! matrix row per line. A file holding a single line is a single spectrum.

use ndarray::{Array2, ArrayBase, Data, Ix2};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatrixIoError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Invalid number '{value}' at row {row}, column {column}.")]
    ParseError {
        value: String,
        row: usize,
        column: usize,
    },
    #[error("Row {row} has {found} columns, but the first row has {expected}.")]
    RaggedRows {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("The file '{0}' contains no data.")]
    Empty(String),
}

/// Reads a headerless CSV file of floating-point values into a dense matrix.
pub fn read_matrix_csv(path: impl AsRef<Path>) -> Result<Array2<f64>, MatrixIoError> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut values = Vec::new();
    let mut ncols = None;
    let mut nrows = 0;
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let expected = *ncols.get_or_insert(record.len());
        if record.len() != expected {
            return Err(MatrixIoError::RaggedRows {
                row: row + 1,
                found: record.len(),
                expected,
            });
        }
        for (column, field) in record.iter().enumerate() {
            let value = field
                .parse::<f64>()
                .map_err(|_| MatrixIoError::ParseError {
                    value: field.to_string(),
                    row: row + 1,
                    column: column + 1,
                })?;
            values.push(value);
        }
        nrows += 1;
    }

    let ncols = match ncols {
        Some(c) if c > 0 => c,
        _ => return Err(MatrixIoError::Empty(path.display().to_string())),
    };
    Array2::from_shape_vec((nrows, ncols), values)
        .map_err(|_| MatrixIoError::Empty(path.display().to_string()))
}

/// Writes a matrix as headerless CSV, one row per line.
pub fn write_matrix_csv<S: Data<Elem = f64>>(
    path: impl AsRef<Path>,
    matrix: &ArrayBase<S, Ix2>,
) -> Result<(), MatrixIoError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    for row in matrix.rows() {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}
