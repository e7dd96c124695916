//! Testing utilities shared by unit and integration tests.
//!
//! Stand-in predictors for exercising the pipeline without a model file,
//! fixture lookup, and float assertions over prediction results.
//!
//! ```ignore
//! use boosters_serve::testing::{ConstantPredictor, assert_scores_eq};
//! ```

use std::path::PathBuf;

use approx::AbsDiffEq;
use ndarray::ArrayView2;

use crate::inference::Predictor;

/// Default tolerance for floating point comparisons.
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

// =============================================================================
// Predictors
// =============================================================================

/// Scores every row with the same value, whatever its width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantPredictor {
    value: f64,
    n_outputs: usize,
}

impl ConstantPredictor {
    pub fn new(value: f64) -> Self {
        Self { value, n_outputs: 1 }
    }

    pub fn with_outputs(value: f64, n_outputs: usize) -> Self {
        Self { value, n_outputs }
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl Predictor for ConstantPredictor {
    fn n_features(&self) -> Option<usize> {
        None
    }

    fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    fn predict_row(&self, _features: &[f64], out: &mut [f64]) {
        out.fill(self.value);
    }
}

/// Scores a row with the sum of its features, so outputs identify inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowSumPredictor;

impl Predictor for RowSumPredictor {
    fn n_features(&self) -> Option<usize> {
        None
    }

    fn n_outputs(&self) -> usize {
        1
    }

    fn predict_row(&self, features: &[f64], out: &mut [f64]) {
        out[0] = features.iter().sum();
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Path of a LightGBM fixture model under `tests/test-cases/lightgbm/inference`.
pub fn lightgbm_fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/test-cases/lightgbm/inference")
        .join(name)
        .join("model.txt")
}

// =============================================================================
// Assertions
// =============================================================================

/// Assert that two score matrices match within `epsilon`.
///
/// On failure the message lists every differing row as expected (`-`)
/// against actual (`+`).
pub fn assert_scores_eq(actual: ArrayView2<'_, f64>, expected: ArrayView2<'_, f64>, epsilon: f64) {
    assert_eq!(
        actual.dim(),
        expected.dim(),
        "shape mismatch: got {:?}, expected {:?}",
        actual.dim(),
        expected.dim()
    );

    let mut diff = String::new();
    for (i, (act_row, exp_row)) in actual.rows().into_iter().zip(expected.rows()).enumerate() {
        let differs = act_row
            .iter()
            .zip(exp_row.iter())
            .any(|(a, e)| !a.abs_diff_eq(e, epsilon));
        if differs {
            diff.push_str(&format!("[{i:3}] - {exp_row}\n      + {act_row}\n"));
        }
    }

    assert!(diff.is_empty(), "scores differ (epsilon {epsilon:.0e}):\n{diff}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn constant_predictor_fills_every_output() {
        let predictor = ConstantPredictor::with_outputs(0.5, 3);
        let mut out = [0.0; 3];
        predictor.predict_row(&[1.0], &mut out);
        assert_eq!(out, [0.5; 3]);
    }

    #[test]
    fn row_sum_predictor_sums() {
        let mut out = [0.0];
        RowSumPredictor.predict_row(&[1.0, 2.5, -0.5], &mut out);
        assert_eq!(out, [3.0]);
    }

    #[test]
    fn fixtures_exist() {
        for name in ["regression", "binary", "multiclass"] {
            assert!(lightgbm_fixture(name).is_file(), "missing fixture {name}");
        }
    }

    #[test]
    fn scores_within_epsilon_pass() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let b = array![[1.0 + 1e-12, 2.0], [3.0, 4.0 - 1e-12]];
        assert_scores_eq(a.view(), b.view(), DEFAULT_TOLERANCE);
    }

    #[test]
    #[should_panic(expected = "scores differ")]
    fn scores_outside_epsilon_fail() {
        let a = array![[1.0], [2.0]];
        let b = array![[1.0], [2.5]];
        assert_scores_eq(a.view(), b.view(), DEFAULT_TOLERANCE);
    }
}
