//! The request-scoped decode → predict → encode chain.

use std::sync::Arc;

use super::decode::decode_bytes;
use super::encode::{encode, EncodedResponse};
use super::error::InferenceError;
use super::predict::{predict, Predictor};
use crate::model::Model;

/// Inference pipeline around a shared, read-only model.
///
/// The model is handed in at construction; the pipeline keeps no other
/// state, so clones are cheap and can serve requests concurrently.
#[derive(Debug)]
pub struct Pipeline<P: ?Sized = Model> {
    model: Arc<P>,
}

impl<P: ?Sized> Clone for Pipeline<P> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
        }
    }
}

impl<P: Predictor + ?Sized> Pipeline<P> {
    pub fn new(model: Arc<P>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &P {
        &self.model
    }

    /// Run one request through decode, predict and encode.
    pub fn invoke(
        &self,
        payload: &[u8],
        content_type: &str,
        accept: Option<&str>,
    ) -> Result<EncodedResponse, InferenceError> {
        let result = self.run(payload, content_type, accept);
        if let Err(err) = &result {
            tracing::warn!(error = %err, content_type, accept, "inference failed");
        }
        result
    }

    fn run(
        &self,
        payload: &[u8],
        content_type: &str,
        accept: Option<&str>,
    ) -> Result<EncodedResponse, InferenceError> {
        let batch = decode_bytes(payload, content_type)?;
        tracing::debug!(rows = batch.n_rows(), bytes = payload.len(), "decoded request");

        let result = predict(&batch, self.model.as_ref())?;
        tracing::debug!(rows = result.n_rows(), outputs = result.n_outputs(), "predicted");

        let encoded = encode(&result, accept)?;
        tracing::debug!(
            content_type = encoded.content_type,
            bytes = encoded.body.len(),
            "encoded response"
        );
        Ok(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{PredictionError, TEXT_CSV};
    use crate::testing::{ConstantPredictor, RowSumPredictor};

    #[test]
    fn constant_model_end_to_end() {
        let pipeline = Pipeline::new(Arc::new(ConstantPredictor::new(0.5)));
        let response = pipeline.invoke(b"1,2,3\n4,5,6\n", TEXT_CSV, Some(TEXT_CSV)).unwrap();
        assert_eq!(response.text(), "0.5\n0.5\n");
        assert_eq!(response.content_type, TEXT_CSV);
    }

    #[test]
    fn errors_leave_pipeline_usable() {
        let pipeline = Pipeline::new(Arc::new(RowSumPredictor));

        assert!(matches!(
            pipeline.invoke(b"1,2", "application/json", None),
            Err(InferenceError::UnsupportedContentType(_))
        ));
        assert!(matches!(
            pipeline.invoke(b"1,a", TEXT_CSV, None),
            Err(InferenceError::Prediction(PredictionError::NonNumericField { .. }))
        ));
        assert!(matches!(
            pipeline.invoke(b"1,2", TEXT_CSV, Some("application/xml")),
            Err(InferenceError::UnsupportedAcceptType(_))
        ));

        let response = pipeline.invoke(b"1,2\n", TEXT_CSV, None).unwrap();
        assert_eq!(response.text(), "3\n");
    }

    #[test]
    fn clones_share_the_model() {
        let model = Arc::new(ConstantPredictor::new(1.0));
        let pipeline = Pipeline::new(Arc::clone(&model));
        let clone = pipeline.clone();
        assert_eq!(Arc::strong_count(&model), 3);
        assert_eq!(clone.model().value(), 1.0);
    }

    #[test]
    fn accepts_trait_objects() {
        let model: Arc<dyn Predictor> = Arc::new(ConstantPredictor::new(0.25));
        let pipeline = Pipeline::new(model);
        let response = pipeline.invoke(b"9\n", TEXT_CSV, None).unwrap();
        assert_eq!(response.text(), "0.25\n");
    }
}
