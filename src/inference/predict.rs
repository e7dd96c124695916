//! Batch scoring.

use ndarray::{aview1, Array2, ArrayView2};

use super::decode::DecodedBatch;
use super::error::PredictionError;
use crate::model::Model;

/// Anything that can score one feature row at a time.
///
/// Implementations must be read-only: the same instance is shared across
/// concurrent requests.
pub trait Predictor: Send + Sync {
    /// Required input width, or `None` to accept any width that is
    /// consistent within a batch.
    fn n_features(&self) -> Option<usize>;

    /// Number of scores produced per row.
    fn n_outputs(&self) -> usize;

    /// Score one row into `out` (length [`n_outputs`](Self::n_outputs)).
    fn predict_row(&self, features: &[f64], out: &mut [f64]);
}

impl Predictor for Model {
    fn n_features(&self) -> Option<usize> {
        Some(Model::n_features(self))
    }

    fn n_outputs(&self) -> usize {
        Model::n_outputs(self)
    }

    fn predict_row(&self, features: &[f64], out: &mut [f64]) {
        self.predict_row_into(features, out);
    }
}

/// Scores for a batch: one row per input record, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    scores: Array2<f64>,
}

impl PredictionResult {
    pub fn new(scores: Array2<f64>) -> Self {
        Self { scores }
    }

    #[inline]
    pub fn scores(&self) -> ArrayView2<'_, f64> {
        self.scores.view()
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.scores.nrows()
    }

    #[inline]
    pub fn n_outputs(&self) -> usize {
        self.scores.ncols()
    }

    pub fn into_scores(self) -> Array2<f64> {
        self.scores
    }
}

/// Score every row of `batch` with `model`.
///
/// Fails if any field is not numeric or a row has the wrong width; in that
/// case no partial result is returned.
pub fn predict<P>(batch: &DecodedBatch, model: &P) -> Result<PredictionResult, PredictionError>
where
    P: Predictor + ?Sized,
{
    let features = batch.to_features(model.n_features())?;
    let n_outputs = model.n_outputs();

    let mut scores = Array2::<f64>::zeros((features.nrows(), n_outputs));
    let mut buf = vec![0.0; n_outputs];
    for (row, mut out) in features.rows().into_iter().zip(scores.rows_mut()) {
        buf.fill(0.0);
        // Rows of a freshly built standard-layout matrix are contiguous.
        match row.as_slice() {
            Some(slice) => model.predict_row(slice, &mut buf),
            None => model.predict_row(&row.to_vec(), &mut buf),
        }
        out.assign(&aview1(&buf));
    }

    Ok(PredictionResult { scores })
}
