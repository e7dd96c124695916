//! Output transformation for inference.
//!
//! The [`OutputTransform`] enum defines how raw model outputs (margins)
//! are converted to final predictions. It is derived from the objective a
//! model was trained with.
//!
//! # Variants
//!
//! - [`Identity`](OutputTransform::Identity): No transformation (regression, raw margins)
//! - [`Exp`](OutputTransform::Exp): Inverse log link (poisson, gamma, tweedie)
//! - [`SquaredSign`](OutputTransform::SquaredSign): Undo `reg_sqrt` label scaling
//! - [`Softplus`](OutputTransform::Softplus): Cross-entropy with lambda parametrization
//! - [`Sigmoid`](OutputTransform::Sigmoid): Scaled logistic sigmoid (binary, one-vs-all)
//! - [`Softmax`](OutputTransform::Softmax): Softmax for multiclass classification

use crate::compat::lightgbm::LgbObjective;

/// Inference-time output transformation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum OutputTransform {
    /// No transformation; output = margin.
    #[default]
    Identity,

    /// output = exp(margin).
    Exp,

    /// output = sign(margin) * margin².
    SquaredSign,

    /// output = ln(1 + exp(margin)).
    Softplus,

    /// output = 1 / (1 + exp(-scale * margin)), applied to every output.
    Sigmoid { scale: f64 },

    /// output_i = exp(margin_i) / sum(exp(margin_j)) per row.
    Softmax,
}

impl OutputTransform {
    /// Transform implied by a LightGBM objective.
    ///
    /// Models without an objective, or with one this crate does not know,
    /// return raw margins.
    pub fn for_objective(objective: Option<&LgbObjective>) -> Self {
        use LgbObjective::*;

        match objective {
            Some(
                Regression { sqrt: true }
                | RegressionL1 { sqrt: true }
                | Huber { sqrt: true }
                | Fair { sqrt: true }
                | Quantile { sqrt: true }
                | Mape { sqrt: true },
            ) => OutputTransform::SquaredSign,
            Some(Poisson | Gamma | Tweedie) => OutputTransform::Exp,
            Some(Binary { sigmoid } | MulticlassOva { sigmoid, .. }) => {
                OutputTransform::Sigmoid { scale: *sigmoid }
            }
            Some(CrossEntropy) => OutputTransform::Sigmoid { scale: 1.0 },
            Some(CrossEntropyLambda) => OutputTransform::Softplus,
            Some(Multiclass { .. }) => OutputTransform::Softmax,
            _ => OutputTransform::Identity,
        }
    }

    /// Apply the transformation in-place to one row of outputs.
    ///
    /// NaN and Inf inputs propagate through without panics.
    #[inline]
    pub fn transform_row(&self, row: &mut [f64]) {
        match self {
            OutputTransform::Identity => {}
            OutputTransform::Exp => {
                for x in row.iter_mut() {
                    *x = x.exp();
                }
            }
            OutputTransform::SquaredSign => {
                for x in row.iter_mut() {
                    *x = x.signum() * *x * *x;
                }
            }
            OutputTransform::Softplus => {
                for x in row.iter_mut() {
                    *x = softplus(*x);
                }
            }
            OutputTransform::Sigmoid { scale } => {
                for x in row.iter_mut() {
                    *x = sigmoid(*scale * *x);
                }
            }
            OutputTransform::Softmax => softmax_inplace(row),
        }
    }
}

/// Numerically stable sigmoid.
#[inline]
fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^x)` without overflow for large `x`.
#[inline]
fn softplus(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

/// Numerically stable softmax in-place.
/// Subtracts max before exponentiating to avoid overflow.
#[inline]
fn softmax_inplace(row: &mut [f64]) {
    if row.is_empty() {
        return;
    }

    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut sum = 0.0;
    for x in row.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }

    if sum > 0.0 {
        for x in row.iter_mut() {
            *x /= sum;
        }
    }
}
