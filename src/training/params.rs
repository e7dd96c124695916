//! Typed training hyperparameters.
//!
//! The platform writes `hyperparameters.json` with every value as a string;
//! hand-written files tend to use JSON numbers. Both are accepted, unknown
//! keys are not.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoostingType {
    #[default]
    #[serde(alias = "gbrt")]
    Gbdt,
    #[serde(alias = "random_forest")]
    Rf,
    Dart,
    Goss,
}

impl BoostingType {
    pub fn as_str(self) -> &'static str {
        match self {
            BoostingType::Gbdt => "gbdt",
            BoostingType::Rf => "rf",
            BoostingType::Dart => "dart",
            BoostingType::Goss => "goss",
        }
    }
}

/// Training objectives the job knows how to pass through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    #[serde(alias = "regression_l2", alias = "l2", alias = "mse", alias = "rmse")]
    Regression,
    #[serde(alias = "l1", alias = "mae")]
    RegressionL1,
    Huber,
    Fair,
    Poisson,
    Quantile,
    Mape,
    Gamma,
    Tweedie,
    Binary,
    #[serde(alias = "softmax")]
    Multiclass,
    #[serde(alias = "ova", alias = "ovr", alias = "multiclass_ova")]
    Multiclassova,
    #[serde(alias = "xentropy")]
    CrossEntropy,
}

impl Objective {
    pub fn as_str(self) -> &'static str {
        match self {
            Objective::Regression => "regression",
            Objective::RegressionL1 => "regression_l1",
            Objective::Huber => "huber",
            Objective::Fair => "fair",
            Objective::Poisson => "poisson",
            Objective::Quantile => "quantile",
            Objective::Mape => "mape",
            Objective::Gamma => "gamma",
            Objective::Tweedie => "tweedie",
            Objective::Binary => "binary",
            Objective::Multiclass => "multiclass",
            Objective::Multiclassova => "multiclassova",
            Objective::CrossEntropy => "cross_entropy",
        }
    }

    pub fn is_multiclass(self) -> bool {
        matches!(self, Objective::Multiclass | Objective::Multiclassova)
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamValidationError {
    #[error("num_leaves must be in [2, 131072], got {0}")]
    NumLeaves(u32),

    #[error("learning_rate must be > 0, got {0}")]
    LearningRate(f64),

    #[error("{name} must be in (0, 1], got {value}")]
    Fraction { name: &'static str, value: f64 },

    #[error("num_boost_round must be > 0")]
    NumBoostRound,

    #[error("objective {objective} requires num_class >= 2, got {num_class}")]
    TooFewClasses { objective: Objective, num_class: u32 },

    #[error("objective {objective} is not multiclass, num_class must be 1, got {num_class}")]
    UnexpectedNumClass { objective: Objective, num_class: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum HyperParameterError {
    #[error("cannot read hyperparameters {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed hyperparameters: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid hyperparameters: {0}")]
    Invalid(#[from] ParamValidationError),
}

fn default_num_class() -> u32 {
    1
}
fn default_num_leaves() -> u32 {
    31
}
fn default_learning_rate() -> f64 {
    0.1
}
fn default_fraction() -> f64 {
    1.0
}
fn default_verbose() -> i32 {
    1
}
fn default_num_boost_round() -> u32 {
    20
}
fn default_early_stopping_rounds() -> u32 {
    5
}

/// Hyperparameters of one training job.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HyperParameters {
    #[serde(default)]
    pub boosting_type: BoostingType,

    #[serde(default)]
    pub objective: Objective,

    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default = "default_num_class")]
    pub num_class: u32,

    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default = "default_num_leaves")]
    pub num_leaves: u32,

    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default = "default_fraction")]
    pub feature_fraction: f64,

    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default = "default_fraction")]
    pub bagging_fraction: f64,

    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    pub bagging_freq: u32,

    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default = "default_verbose")]
    pub verbose: i32,

    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default = "default_num_boost_round")]
    pub num_boost_round: u32,

    /// Stop after this many rounds without validation improvement; 0 disables.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default = "default_early_stopping_rounds")]
    pub early_stopping_rounds: u32,
}

impl Default for HyperParameters {
    fn default() -> Self {
        Self {
            boosting_type: BoostingType::default(),
            objective: Objective::default(),
            num_class: default_num_class(),
            num_leaves: default_num_leaves(),
            learning_rate: default_learning_rate(),
            feature_fraction: default_fraction(),
            bagging_fraction: default_fraction(),
            bagging_freq: 0,
            verbose: default_verbose(),
            num_boost_round: default_num_boost_round(),
            early_stopping_rounds: default_early_stopping_rounds(),
        }
    }
}

impl HyperParameters {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, HyperParameterError> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    /// Read, parse and validate `hyperparameters.json`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HyperParameterError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| HyperParameterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ParamValidationError> {
        if !(2..=131_072).contains(&self.num_leaves) {
            return Err(ParamValidationError::NumLeaves(self.num_leaves));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(ParamValidationError::LearningRate(self.learning_rate));
        }
        for (name, value) in [
            ("feature_fraction", self.feature_fraction),
            ("bagging_fraction", self.bagging_fraction),
        ] {
            if value.is_nan() || value <= 0.0 || value > 1.0 {
                return Err(ParamValidationError::Fraction { name, value });
            }
        }
        if self.num_boost_round == 0 {
            return Err(ParamValidationError::NumBoostRound);
        }

        let objective = self.objective;
        let num_class = self.num_class;
        if objective.is_multiclass() && num_class < 2 {
            return Err(ParamValidationError::TooFewClasses { objective, num_class });
        }
        if !objective.is_multiclass() && num_class != 1 {
            return Err(ParamValidationError::UnexpectedNumClass { objective, num_class });
        }
        Ok(())
    }

    /// `key=value` pairs in LightGBM's parameter vocabulary.
    pub fn to_lightgbm_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("boosting", self.boosting_type.as_str().to_string()),
            ("objective", self.objective.as_str().to_string()),
        ];
        if self.objective.is_multiclass() {
            params.push(("num_class", self.num_class.to_string()));
        }
        params.extend([
            ("num_leaves", self.num_leaves.to_string()),
            ("learning_rate", self.learning_rate.to_string()),
            ("feature_fraction", self.feature_fraction.to_string()),
            ("bagging_fraction", self.bagging_fraction.to_string()),
            ("bagging_freq", self.bagging_freq.to_string()),
            ("verbose", self.verbose.to_string()),
            ("num_iterations", self.num_boost_round.to_string()),
        ]);
        if self.early_stopping_rounds > 0 {
            params.push(("early_stopping_round", self.early_stopping_rounds.to_string()));
        }
        params
    }
}
