//! Loaded model handle.
//!
//! [`Model`] wraps a converted LightGBM forest together with the output
//! transform implied by its objective and the metadata needed to validate
//! requests. It is loaded once at process start and shared read-only by
//! every request.
//!
//! ```ignore
//! use boosters_serve::Model;
//!
//! let model = Model::load("/opt/ml/model/lightgbm-regression-model.txt")?;
//! let scores = model.predict_row(&[1.0, 2.0, 3.0]);
//! ```

mod transform;

pub use transform::OutputTransform;

use std::path::{Path, PathBuf};

use crate::compat::lightgbm::{ConversionError, LgbModel, ParseError};
use crate::repr::gbdt::Forest;

/// Failure to bring a model into memory. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("cannot read model file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse model file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
    #[error("unsupported model: {0}")]
    Conversion(#[from] ConversionError),
}

/// Descriptive metadata carried over from the model file.
#[derive(Debug, Clone, Default)]
pub struct ModelMeta {
    /// Number of input features.
    pub n_features: usize,
    /// Number of output values per row.
    pub n_outputs: usize,
    /// Feature names in column order (may be empty).
    pub feature_names: Vec<String>,
    /// Objective name, if the model file declares one.
    pub objective: Option<String>,
    /// Model format version (e.g. "v4").
    pub version: String,
}

/// A loaded boosted-tree model.
#[derive(Debug, Clone)]
pub struct Model {
    forest: Forest,
    transform: OutputTransform,
    meta: ModelMeta,
}

impl Model {
    /// Load a LightGBM text model from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = LgbModel::from_string(&content).map_err(|source| ModelLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let model = Self::from_lightgbm(&parsed)?;

        tracing::info!(
            path = %path.display(),
            n_trees = model.forest.n_trees(),
            n_features = model.meta.n_features,
            n_outputs = model.meta.n_outputs,
            objective = model.meta.objective.as_deref().unwrap_or("none"),
            "model loaded"
        );
        Ok(model)
    }

    /// Build a model from an already parsed LightGBM model.
    pub fn from_lightgbm(parsed: &LgbModel) -> Result<Self, ConversionError> {
        let forest = parsed.to_forest()?;
        let objective = parsed.header.objective.as_ref();
        let meta = ModelMeta {
            n_features: parsed.num_features(),
            n_outputs: forest.n_groups() as usize,
            feature_names: parsed.header.feature_names.clone(),
            objective: objective.map(|o| o.name().to_string()),
            version: parsed.header.version.clone(),
        };

        Ok(Self {
            forest,
            transform: OutputTransform::for_objective(objective),
            meta,
        })
    }

    /// Assemble a model from parts.
    pub fn new(forest: Forest, transform: OutputTransform, n_features: usize) -> Self {
        let meta = ModelMeta {
            n_features,
            n_outputs: forest.n_groups() as usize,
            ..Default::default()
        };
        Self { forest, transform, meta }
    }

    #[inline]
    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    #[inline]
    pub fn transform(&self) -> OutputTransform {
        self.transform
    }

    #[inline]
    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.meta.n_features
    }

    #[inline]
    pub fn n_outputs(&self) -> usize {
        self.meta.n_outputs
    }

    /// Raw margins for one row, written into `out` (length `n_outputs`).
    pub fn predict_raw_row_into(&self, features: &[f64], out: &mut [f64]) {
        self.forest.predict_row_into(features, out);
    }

    /// Transformed predictions for one row, written into `out`.
    pub fn predict_row_into(&self, features: &[f64], out: &mut [f64]) {
        self.forest.predict_row_into(features, out);
        self.transform.transform_row(out);
    }

    /// Transformed predictions for one row.
    pub fn predict_row(&self, features: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.n_outputs()];
        self.predict_row_into(features, &mut out);
        out
    }
}
