//! Per-request error taxonomy.

/// Failure of one pipeline step. Never affects the loaded model.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// Request content type other than `text/csv`.
    #[error("unsupported content type: {0:?}")]
    UnsupportedContentType(String),

    /// No supported encoding matches the accept value.
    #[error("unsupported accept type: {0:?}")]
    UnsupportedAcceptType(String),

    /// Payload bytes are not valid UTF-8 text.
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] std::str::Utf8Error),

    #[error(transparent)]
    Prediction(#[from] PredictionError),

    #[error("cannot encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl InferenceError {
    /// True when the request itself was at fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, InferenceError::Encode(_))
    }
}

/// The model could not score the decoded batch.
#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("row {row}: expected {expected} features, got {actual}")]
    FeatureCountMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("row {row}: expected {expected} fields like the first row, got {actual}")]
    RaggedBatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("row {row}, column {column}: {value:?} is not a number")]
    NonNumericField {
        row: usize,
        column: usize,
        value: String,
    },

    #[error("feature matrix shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
}
