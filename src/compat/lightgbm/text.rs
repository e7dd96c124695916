//! LightGBM text model parser.
//!
//! A model saved with `save_model()` is a header block of `key=value` lines,
//! then one block per tree opened by `Tree=N`, then `end of trees` and a
//! footer of importances and training parameters that inference ignores.

use std::collections::HashMap;
use std::iter::Peekable;
use std::path::Path;
use std::str::{FromStr, Lines};

use crate::repr::gbdt::MissingType;

/// Error raised while reading a LightGBM text model.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
    #[error("array size mismatch for {field}: expected {expected}, got {actual}")]
    ArraySizeMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("unexpected end of input while parsing {context}")]
    UnexpectedEnd { context: String },
    #[error("invalid tree format: {0}")]
    InvalidTreeFormat(String),
}

/// Split flags packed into LightGBM's `decision_type` byte.
///
/// Bit 0 marks a categorical split, bit 1 sends missing values left and
/// bits 2-3 hold the missing type (0 none, 1 zero, 2 NaN).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionType {
    pub is_categorical: bool,
    pub default_left: bool,
    pub missing_type: MissingType,
}

impl DecisionType {
    pub fn from_i8(value: i8) -> Self {
        let bits = value as u8;
        DecisionType {
            is_categorical: bits & 0b01 != 0,
            default_left: bits & 0b10 != 0,
            missing_type: MissingType::from_bits((bits >> 2) & 0b11),
        }
    }
}

/// One `Tree=N` block.
///
/// Split arrays have `num_leaves - 1` entries. Negative child indices
/// encode leaves as `!leaf`.
#[derive(Debug, Clone)]
pub struct LgbTree {
    pub num_leaves: usize,
    pub num_cat: usize,
    pub split_feature: Vec<i32>,
    /// Numeric threshold, or the categorical slot for categorical splits.
    pub threshold: Vec<f64>,
    pub decision_type: Vec<i8>,
    pub left_child: Vec<i32>,
    pub right_child: Vec<i32>,
    pub leaf_value: Vec<f64>,
    /// Already folded into `leaf_value`; kept for diagnostics.
    pub shrinkage: f64,
    pub is_linear: bool,
    /// Offsets into `cat_threshold`, `num_cat + 1` entries.
    pub cat_boundaries: Vec<i32>,
    pub cat_threshold: Vec<u32>,
}

/// Objective line of the header, e.g. `binary sigmoid:1`.
///
/// `sqrt` marks regression losses trained on `sign(y)·sqrt(|y|)`
/// (`reg_sqrt=true`); their scores must be squared back.
#[derive(Debug, Clone, PartialEq)]
pub enum LgbObjective {
    Regression { sqrt: bool },
    RegressionL1 { sqrt: bool },
    Huber { sqrt: bool },
    Fair { sqrt: bool },
    Quantile { sqrt: bool },
    Mape { sqrt: bool },
    Poisson,
    Gamma,
    Tweedie,
    Binary { sigmoid: f64 },
    CrossEntropy,
    CrossEntropyLambda,
    Multiclass { num_class: usize },
    MulticlassOva { num_class: usize, sigmoid: f64 },
    /// Anything else, kept verbatim.
    Unknown(String),
}

impl LgbObjective {
    pub fn parse(s: &str) -> Self {
        let mut tokens = s.split_whitespace();
        let name = tokens.next().unwrap_or_default();
        let mut options: HashMap<&str, &str> = HashMap::new();
        let mut sqrt = false;
        for token in tokens {
            match token.split_once(':') {
                Some((key, value)) => {
                    options.insert(key, value);
                }
                None => sqrt |= token == "sqrt",
            }
        }

        let sigmoid = options.get("sigmoid").and_then(|v| v.parse().ok()).unwrap_or(1.0);
        let num_class = options.get("num_class").and_then(|v| v.parse().ok()).unwrap_or(2);

        match name {
            "regression" => Self::Regression { sqrt },
            "regression_l1" => Self::RegressionL1 { sqrt },
            "huber" => Self::Huber { sqrt },
            "fair" => Self::Fair { sqrt },
            "quantile" => Self::Quantile { sqrt },
            "mape" => Self::Mape { sqrt },
            "poisson" => Self::Poisson,
            "gamma" => Self::Gamma,
            "tweedie" => Self::Tweedie,
            "binary" => Self::Binary { sigmoid },
            "cross_entropy" | "xentropy" => Self::CrossEntropy,
            "cross_entropy_lambda" | "xentlambda" => Self::CrossEntropyLambda,
            "multiclass" => Self::Multiclass { num_class },
            "multiclassova" => Self::MulticlassOva { num_class, sigmoid },
            _ => Self::Unknown(s.to_string()),
        }
    }

    /// Objective name as LightGBM writes it.
    pub fn name(&self) -> &str {
        match self {
            Self::Regression { .. } => "regression",
            Self::RegressionL1 { .. } => "regression_l1",
            Self::Huber { .. } => "huber",
            Self::Fair { .. } => "fair",
            Self::Quantile { .. } => "quantile",
            Self::Mape { .. } => "mape",
            Self::Poisson => "poisson",
            Self::Gamma => "gamma",
            Self::Tweedie => "tweedie",
            Self::Binary { .. } => "binary",
            Self::CrossEntropy => "cross_entropy",
            Self::CrossEntropyLambda => "cross_entropy_lambda",
            Self::Multiclass { .. } => "multiclass",
            Self::MulticlassOva { .. } => "multiclassova",
            Self::Unknown(raw) => raw,
        }
    }
}

/// Header fields that affect inference.
#[derive(Debug, Clone)]
pub struct LgbHeader {
    /// Format version, e.g. `v4`. Empty when absent.
    pub version: String,
    pub num_class: usize,
    pub num_tree_per_iteration: usize,
    pub max_feature_idx: usize,
    pub objective: Option<LgbObjective>,
    pub average_output: bool,
    pub feature_names: Vec<String>,
}

/// A parsed LightGBM text model.
#[derive(Debug, Clone)]
pub struct LgbModel {
    pub header: LgbHeader,
    pub trees: Vec<LgbTree>,
}

impl LgbModel {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_string(&content)
    }

    pub fn from_string(content: &str) -> Result<Self, ParseError> {
        let mut lines = content.lines().peekable();
        let header = read_header(&mut lines)?;

        let mut trees = Vec::new();
        while let Some(line) = lines.next() {
            if line == "end of trees" {
                break;
            }
            if line.starts_with("Tree=") {
                trees.push(read_tree(&mut lines)?);
            }
        }

        Ok(LgbModel { header, trees })
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn num_class(&self) -> usize {
        self.header.num_class
    }

    /// Trees per boosting iteration, i.e. output groups.
    pub fn num_groups(&self) -> usize {
        self.header.num_tree_per_iteration.max(1)
    }

    pub fn num_features(&self) -> usize {
        self.header.max_feature_idx.saturating_add(1)
    }
}

type LineIter<'a> = Peekable<Lines<'a>>;

/// `key=value` lines of one block, with typed accessors.
#[derive(Default)]
struct Section<'a> {
    fields: HashMap<&'a str, &'a str>,
    flags: Vec<&'a str>,
}

impl<'a> Section<'a> {
    fn push(&mut self, line: &'a str) {
        match line.split_once('=') {
            Some((key, value)) => {
                self.fields.insert(key, value);
            }
            None => self.flags.push(line),
        }
    }

    fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| *f == flag)
    }

    fn text(&self, field: &str) -> Option<&'a str> {
        self.fields.get(field).copied()
    }

    /// Present-but-malformed is an error, absent is `None`.
    fn optional<T: FromStr>(&self, field: &'static str) -> Result<Option<T>, ParseError> {
        self.text(field)
            .map(|raw| {
                raw.trim().parse().map_err(|_| ParseError::InvalidValue {
                    field,
                    message: format!("cannot parse {raw:?}"),
                })
            })
            .transpose()
    }

    fn required<T: FromStr>(&self, field: &'static str) -> Result<T, ParseError> {
        self.optional(field)?.ok_or(ParseError::MissingField(field))
    }

    fn array<T: FromStr>(&self, field: &'static str) -> Result<Option<Vec<T>>, ParseError> {
        let Some(raw) = self.text(field) else {
            return Ok(None);
        };
        raw.split_whitespace()
            .map(|item| {
                item.parse().map_err(|_| ParseError::InvalidValue {
                    field,
                    message: format!("invalid element: {item}"),
                })
            })
            .collect::<Result<Vec<T>, _>>()
            .map(Some)
    }

    /// Required array that must hold exactly `len` elements.
    fn array_of_len<T: FromStr>(&self, field: &'static str, len: usize) -> Result<Vec<T>, ParseError> {
        let values = self.array(field)?.ok_or(ParseError::MissingField(field))?;
        check_len(field, &values, len)?;
        Ok(values)
    }
}

fn check_len<T>(field: &'static str, values: &[T], expected: usize) -> Result<(), ParseError> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(ParseError::ArraySizeMismatch {
            field,
            expected,
            actual: values.len(),
        })
    }
}

/// Reads up to `tree_sizes=`, a blank line or the first tree.
///
/// The leading `tree` type line is optional.
fn read_header(lines: &mut LineIter<'_>) -> Result<LgbHeader, ParseError> {
    if lines.peek().is_none() {
        return Err(ParseError::UnexpectedEnd {
            context: "header".to_string(),
        });
    }

    let mut section = Section::default();
    while let Some(line) = lines.next_if(|l| !l.is_empty() && !l.starts_with("Tree=")) {
        if line.starts_with("tree_sizes=") {
            break;
        }
        section.push(line);
    }

    let num_class: usize = section.required("num_class")?;
    let max_feature_idx: usize = section.required("max_feature_idx")?;
    if max_feature_idx.checked_add(1).is_none() {
        return Err(ParseError::InvalidValue {
            field: "max_feature_idx",
            message: format!("{max_feature_idx} leaves no room for a feature count"),
        });
    }

    Ok(LgbHeader {
        version: section.text("version").unwrap_or_default().to_string(),
        num_class,
        num_tree_per_iteration: section
            .optional("num_tree_per_iteration")?
            .unwrap_or(num_class.max(1)),
        max_feature_idx,
        objective: section.text("objective").map(LgbObjective::parse),
        average_output: section.has_flag("average_output"),
        feature_names: section
            .text("feature_names")
            .map(|names| names.split(' ').map(str::to_string).collect())
            .unwrap_or_default(),
    })
}

/// Reads the lines after `Tree=N` up to the next blank line.
fn read_tree(lines: &mut LineIter<'_>) -> Result<LgbTree, ParseError> {
    let mut section = Section::default();
    while let Some(line) =
        lines.next_if(|l| !l.starts_with("Tree=") && !l.starts_with("end of trees"))
    {
        if line.is_empty() {
            break;
        }
        section.push(line);
    }

    let num_leaves: usize = section.required("num_leaves")?;
    if num_leaves == 0 {
        return Err(ParseError::InvalidTreeFormat("num_leaves must be >= 1".to_string()));
    }
    let num_cat: usize = section.optional("num_cat")?.unwrap_or(0);
    let shrinkage = section.optional("shrinkage")?.unwrap_or(1.0);
    let is_linear = section.optional::<i32>("is_linear")?.is_some_and(|v| v != 0);

    if num_leaves == 1 {
        // Constant trees may write an empty or missing leaf_value.
        let mut leaf_value: Vec<f64> = section.array("leaf_value")?.unwrap_or_default();
        leaf_value.resize(1, 0.0);
        return Ok(LgbTree {
            num_leaves,
            num_cat,
            split_feature: Vec::new(),
            threshold: Vec::new(),
            decision_type: Vec::new(),
            left_child: Vec::new(),
            right_child: Vec::new(),
            leaf_value,
            shrinkage,
            is_linear,
            cat_boundaries: Vec::new(),
            cat_threshold: Vec::new(),
        });
    }

    let n_splits = num_leaves - 1;
    let split_feature = section.array_of_len("split_feature", n_splits)?;
    let threshold = section.array_of_len("threshold", n_splits)?;
    let decision_type = match section.array("decision_type")? {
        Some(types) => {
            check_len("decision_type", &types, n_splits)?;
            types
        }
        None => vec![0; n_splits],
    };
    let left_child = section.array_of_len("left_child", n_splits)?;
    let right_child = section.array_of_len("right_child", n_splits)?;
    let leaf_value = section.array_of_len("leaf_value", num_leaves)?;

    let (cat_boundaries, cat_threshold) = if num_cat > 0 {
        let boundaries: Vec<i32> = section.array_of_len("cat_boundaries", num_cat + 1)?;
        let bitsets: Vec<u32> = section
            .array("cat_threshold")?
            .ok_or(ParseError::MissingField("cat_threshold"))?;
        check_cat_boundaries(&boundaries, bitsets.len())?;
        (boundaries, bitsets)
    } else {
        (Vec::new(), Vec::new())
    };

    Ok(LgbTree {
        num_leaves,
        num_cat,
        split_feature,
        threshold,
        decision_type,
        left_child,
        right_child,
        leaf_value,
        shrinkage,
        is_linear,
        cat_boundaries,
        cat_threshold,
    })
}

/// Boundaries must start at a valid offset, never decrease and end at the
/// bitset length.
fn check_cat_boundaries(boundaries: &[i32], n_words: usize) -> Result<(), ParseError> {
    let starts_ok = boundaries.first().is_some_and(|&b| b >= 0);
    let sorted = boundaries.windows(2).all(|w| w[0] <= w[1]);
    let ends_ok = boundaries.last().is_some_and(|&b| b as usize == n_words);
    if starts_ok && sorted && ends_ok {
        Ok(())
    } else {
        Err(ParseError::InvalidTreeFormat(format!(
            "cat_boundaries {boundaries:?} do not index cat_threshold of length {n_words}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::lightgbm_fixture;

    const HEADER: &str = "tree\nversion=v4\nnum_class=1\nmax_feature_idx=1\n\n";

    fn one_tree(body: &str) -> Result<LgbModel, ParseError> {
        LgbModel::from_string(&format!("{HEADER}Tree=0\n{body}\n\nend of trees\n"))
    }

    #[test]
    fn decision_type_bits() {
        let cases = [
            (0, false, false, MissingType::None),
            (1, true, false, MissingType::None),
            (2, false, true, MissingType::None),
            (4, false, false, MissingType::Zero),
            (10, false, true, MissingType::NaN),
            (9, true, false, MissingType::NaN),
        ];
        for (raw, categorical, left, missing) in cases {
            let dt = DecisionType::from_i8(raw);
            assert_eq!(
                dt,
                DecisionType {
                    is_categorical: categorical,
                    default_left: left,
                    missing_type: missing,
                },
                "decision_type={raw}"
            );
        }
    }

    #[test]
    fn objective_options() {
        assert_eq!(
            LgbObjective::parse("regression"),
            LgbObjective::Regression { sqrt: false }
        );
        assert_eq!(
            LgbObjective::parse("regression sqrt"),
            LgbObjective::Regression { sqrt: true }
        );
        assert_eq!(
            LgbObjective::parse("huber sqrt alpha:0.9"),
            LgbObjective::Huber { sqrt: true }
        );
        assert_eq!(LgbObjective::parse("cross_entropy_lambda"), LgbObjective::CrossEntropyLambda);
        assert_eq!(LgbObjective::parse("xentlambda").name(), "cross_entropy_lambda");
        assert_eq!(LgbObjective::parse("tweedie tweedie_variance_power:1.5"), LgbObjective::Tweedie);
        assert_eq!(
            LgbObjective::parse("binary sigmoid:0.5"),
            LgbObjective::Binary { sigmoid: 0.5 }
        );
        assert_eq!(
            LgbObjective::parse("multiclassova num_class:5 sigmoid:2"),
            LgbObjective::MulticlassOva { num_class: 5, sigmoid: 2.0 }
        );

        let unknown = LgbObjective::parse("lambdarank");
        assert_eq!(unknown.name(), "lambdarank");
        assert_eq!(LgbObjective::parse("xentropy").name(), "cross_entropy");
    }

    #[test]
    fn regression_fixture_header_and_trees() {
        let model = LgbModel::from_file(lightgbm_fixture("regression")).expect("parse");

        assert_eq!(model.header.version, "v4");
        assert_eq!(model.num_features(), 3);
        assert_eq!(model.num_groups(), 1);
        assert_eq!(model.header.feature_names, ["f0", "f1", "f2"]);
        assert_eq!(model.header.objective, Some(LgbObjective::Regression { sqrt: false }));

        assert_eq!(model.num_trees(), 2);
        let first = &model.trees[0];
        assert_eq!(first.split_feature, [0, 1]);
        assert_eq!(first.left_child, [-1, -2]);
        assert_eq!(first.right_child, [1, -3]);
        assert_eq!(first.leaf_value, [1.0, 2.0, 3.0]);
        assert_eq!(model.trees[1].decision_type, [10]);
    }

    #[test]
    fn multiclass_fixture_groups() {
        let model = LgbModel::from_file(lightgbm_fixture("multiclass")).expect("parse");
        assert_eq!(model.num_class(), 3);
        assert_eq!(model.num_groups(), 3);
        assert_eq!(model.num_trees(), 6);
        assert_eq!(model.trees[1].leaf_value, [0.0]);
    }

    #[test]
    fn type_line_is_optional_and_flags_are_read() {
        let model = LgbModel::from_string(
            "num_class=1\nmax_feature_idx=0\naverage_output\n\nTree=0\nnum_leaves=1\nleaf_value=2.5\n",
        )
        .expect("parse");
        assert!(model.header.average_output);
        assert!(model.header.version.is_empty());
        assert_eq!(model.trees[0].leaf_value, [2.5]);
    }

    #[test]
    fn header_errors() {
        assert!(matches!(
            LgbModel::from_string("").unwrap_err(),
            ParseError::UnexpectedEnd { .. }
        ));
        assert!(matches!(
            LgbModel::from_string("tree\nmax_feature_idx=1\n").unwrap_err(),
            ParseError::MissingField("num_class")
        ));
        assert!(matches!(
            LgbModel::from_string("tree\nnum_class=two\nmax_feature_idx=1\n").unwrap_err(),
            ParseError::InvalidValue { field: "num_class", .. }
        ));

        let overflowing = format!("tree\nnum_class=1\nmax_feature_idx={}\n", usize::MAX);
        assert!(matches!(
            LgbModel::from_string(&overflowing).unwrap_err(),
            ParseError::InvalidValue { field: "max_feature_idx", .. }
        ));
    }

    #[test]
    fn tree_errors() {
        let err = one_tree("num_leaves=0").unwrap_err();
        assert!(matches!(err, ParseError::InvalidTreeFormat(_)));

        let err = one_tree(
            "num_leaves=2\nsplit_feature=0\nthreshold=1\nleft_child=-1\nright_child=-2\nleaf_value=1",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ParseError::ArraySizeMismatch { field: "leaf_value", expected: 2, actual: 1 }
        ));

        let err = one_tree("num_leaves=2\nsplit_feature=0\nthreshold=x").unwrap_err();
        assert!(matches!(err, ParseError::InvalidValue { field: "threshold", .. }));

        let err = one_tree("num_leaves=2\nsplit_feature=0\nthreshold=1").unwrap_err();
        assert!(matches!(err, ParseError::MissingField("left_child")));
    }

    #[test]
    fn categorical_blocks() {
        let ok = one_tree(
            "num_leaves=2\nnum_cat=1\nsplit_feature=1\nthreshold=0\ndecision_type=1\n\
             left_child=-1\nright_child=-2\nleaf_value=1 2\ncat_boundaries=0 1\ncat_threshold=6",
        )
        .expect("parse");
        assert_eq!(ok.trees[0].cat_threshold, [6]);

        let err = one_tree(
            "num_leaves=2\nnum_cat=1\nsplit_feature=1\nthreshold=0\ndecision_type=1\n\
             left_child=-1\nright_child=-2\nleaf_value=1 2\ncat_boundaries=0 3\ncat_threshold=6",
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::InvalidTreeFormat(_)));
    }
}
