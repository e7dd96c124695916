//! Inference request pipeline.
//!
//! Turns one raw request into one raw response around a preloaded model:
//!
//! 1. [`decode`]: payload + content type → [`DecodedBatch`] (string rows)
//! 2. [`predict`]: batch + [`Predictor`] → [`PredictionResult`] (one row of scores per input row)
//! 3. [`encode`]: result + accept type → [`EncodedResponse`]
//!
//! [`Pipeline`] chains the three steps around a shared model and emits a
//! tracing event at each boundary.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use boosters_serve::{inference::Pipeline, Model};
//!
//! let pipeline = Pipeline::new(Arc::new(Model::load(path)?));
//! let response = pipeline.invoke(b"1,2,3\n4,5,6\n", "text/csv", Some("application/json"))?;
//! ```

mod decode;
mod encode;
mod error;
mod pipeline;
mod predict;

pub use decode::{decode, decode_bytes, DecodedBatch, TEXT_CSV};
pub use encode::{encode, EncodedResponse, ResponseFormat, APPLICATION_JSON, APPLICATION_JSONLINES};
pub use error::{InferenceError, PredictionError};
pub use pipeline::Pipeline;
pub use predict::{predict, PredictionResult, Predictor};
