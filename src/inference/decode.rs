//! Request decoding.

use ndarray::Array2;

use super::error::{InferenceError, PredictionError};

/// The only request content type the pipeline accepts.
pub const TEXT_CSV: &str = "text/csv";

/// Rows of string fields, in payload order.
///
/// No header is assumed and fields are kept verbatim; rows may be ragged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedBatch {
    rows: Vec<Vec<String>>,
}

impl DecodedBatch {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    #[inline]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.rows
    }

    /// Parse every field as `f64` into a row-major feature matrix.
    ///
    /// With `n_features` set every row must have exactly that many fields;
    /// otherwise every row must match the first row's width. Widths are
    /// checked before anything is allocated, so the matrix never outgrows
    /// the payload.
    pub fn to_features(&self, n_features: Option<usize>) -> Result<Array2<f64>, PredictionError> {
        let n_rows = self.rows.len();
        let n_cols = n_features.unwrap_or_else(|| self.rows.first().map_or(0, Vec::len));
        self.check_widths(n_cols, n_features.is_some())?;

        let mut values = Vec::with_capacity(self.rows.iter().map(Vec::len).sum());
        for (row_idx, row) in self.rows.iter().enumerate() {
            for (col_idx, field) in row.iter().enumerate() {
                let value = field.trim().parse::<f64>().map_err(|_| {
                    PredictionError::NonNumericField {
                        row: row_idx,
                        column: col_idx,
                        value: field.clone(),
                    }
                })?;
                values.push(value);
            }
        }

        Ok(Array2::from_shape_vec((n_rows, n_cols), values)?)
    }

    fn check_widths(&self, expected: usize, declared: bool) -> Result<(), PredictionError> {
        let Some((row, fields)) = self
            .rows
            .iter()
            .enumerate()
            .find(|(_, fields)| fields.len() != expected)
        else {
            return Ok(());
        };

        let actual = fields.len();
        Err(if declared {
            PredictionError::FeatureCountMismatch { row, expected, actual }
        } else {
            PredictionError::RaggedBatch { row, expected, actual }
        })
    }
}

/// Split a `text/csv` payload into records (lines) and fields (commas).
///
/// Quoting and escaping are not supported: every comma separates fields.
/// A trailing newline does not produce an empty record.
pub fn decode(payload: &str, content_type: &str) -> Result<DecodedBatch, InferenceError> {
    if content_type != TEXT_CSV {
        return Err(InferenceError::UnsupportedContentType(content_type.to_string()));
    }

    let rows = payload
        .lines()
        .map(|line| line.split(',').map(str::to_string).collect())
        .collect();

    Ok(DecodedBatch { rows })
}

/// [`decode`] for a raw byte payload, which must be UTF-8.
pub fn decode_bytes(payload: &[u8], content_type: &str) -> Result<DecodedBatch, InferenceError> {
    if content_type != TEXT_CSV {
        return Err(InferenceError::UnsupportedContentType(content_type.to_string()));
    }
    decode(std::str::from_utf8(payload)?, content_type)
}
