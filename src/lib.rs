//! boosters-serve: LightGBM inference behind a managed hosting contract.
//!
//! The crate loads a LightGBM text model once, then answers requests by
//! decoding a CSV payload, scoring every row with the boosted forest and
//! encoding the scores for the client. Around that core sit the HTTP server
//! of the hosting container, the training job entry point and an endpoint
//! status monitor.
//!
//! # Modules
//!
//! - [`compat`]: LightGBM text model parser and converter
//! - [`repr`]: native forest representation and traversal
//! - [`model`]: the loaded [`Model`] with its output transform
//! - [`inference`]: decode → predict → encode, and the [`Pipeline`]
//! - [`serve`]: `GET /ping` and `POST /invocations`
//! - [`training`]: hyperparameters, channel staging, training backend
//! - [`monitor`]: endpoint status polling

pub mod compat;
pub mod inference;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod repr;
pub mod serve;
pub mod testing;
pub mod training;

pub use inference::{
    decode, encode, predict, DecodedBatch, EncodedResponse, InferenceError, Pipeline,
    PredictionError, PredictionResult, Predictor,
};
pub use model::{Model, ModelLoadError, OutputTransform};

// Re-export approx traits for users who want to compare predictions.
pub use approx;
