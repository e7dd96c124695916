//! Training container entry point.
//!
//! - [`params`]: typed `hyperparameters.json`
//! - [`job`]: directory layout, channel staging, failure reporting
//! - [`backend`]: the [`Trainer`] seam and the `lightgbm` CLI backend

pub mod backend;
pub mod job;
pub mod params;

pub use backend::{LightGbmCli, TrainRequest, Trainer, TrainerError};
pub use job::{
    failure_report, stage_channel, Channel, JobPaths, StagedDataset, TrainingError, TrainingJob,
    MODEL_FILE_NAME, TRAIN_CHANNEL, VALIDATION_CHANNEL,
};
pub use params::{BoostingType, HyperParameterError, HyperParameters, Objective, ParamValidationError};
