//! Canonical tree representation (SoA) and mutable construction API.
//!
//! This module provides:
//! - [`Tree`]: Immutable SoA tree storage for traversal
//! - [`MutableTree`]: Builder used by model conversion
//!
//! Split decisions follow LightGBM: numeric splits go left when
//! `value <= threshold`, with per-node missing value handling.

// Allow many constructor arguments for splits with all their fields.
#![allow(clippy::too_many_arguments)]

use super::categories::{float_to_category, CategoriesStorage};
use super::node::{MissingType, SplitType};
use super::NodeId;

/// Magnitude below which a value counts as zero for [`MissingType::Zero`].
const ZERO_THRESHOLD: f64 = 1e-35;

// ============================================================================
// TreeValidationError
// ============================================================================

/// Structural validation errors for [`Tree`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeValidationError {
    /// Tree has no nodes.
    #[error("tree has no nodes")]
    EmptyTree,
    /// A child pointer references an out-of-bounds node.
    #[error("node {node}: {side} child {child} out of bounds ({n_nodes} nodes)")]
    ChildOutOfBounds {
        node: NodeId,
        side: &'static str,
        child: NodeId,
        n_nodes: usize,
    },
    /// A node references itself as a child.
    #[error("node {node} references itself")]
    SelfLoop { node: NodeId },
    /// A node was reached by more than one path.
    #[error("node {node} reached by more than one path")]
    DuplicateVisit { node: NodeId },
    /// A cycle was detected during traversal.
    #[error("cycle detected at node {node}")]
    CycleDetected { node: NodeId },
    /// A node exists in storage but is unreachable from the root.
    #[error("node {node} is unreachable from the root")]
    UnreachableNode { node: NodeId },
}

// ============================================================================
// Tree
// ============================================================================

/// Structure-of-Arrays tree storage.
///
/// Child indices are local to this tree (0 = root).
#[derive(Debug, Clone)]
pub struct Tree {
    split_indices: Box<[u32]>,
    split_thresholds: Box<[f64]>,
    left_children: Box<[NodeId]>,
    right_children: Box<[NodeId]>,
    default_left: Box<[bool]>,
    missing_types: Box<[MissingType]>,
    split_types: Box<[SplitType]>,
    is_leaf: Box<[bool]>,
    leaf_values: Box<[f64]>,
    categories: CategoriesStorage,
}

impl Tree {
    /// A tree with a single leaf.
    pub fn constant(value: f64) -> Self {
        let mut tree = MutableTree::with_capacity(1);
        let root = tree.init_root_with_num_nodes(1);
        tree.make_leaf(root, value);
        tree.freeze()
    }

    /// Number of nodes in this tree.
    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    /// Number of leaves in this tree.
    pub fn n_leaves(&self) -> usize {
        self.is_leaf.iter().filter(|&&leaf| leaf).count()
    }

    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.is_leaf[node as usize]
    }

    #[inline]
    pub fn split_index(&self, node: NodeId) -> u32 {
        self.split_indices[node as usize]
    }

    #[inline]
    pub fn split_threshold(&self, node: NodeId) -> f64 {
        self.split_thresholds[node as usize]
    }

    #[inline]
    pub fn left_child(&self, node: NodeId) -> NodeId {
        self.left_children[node as usize]
    }

    #[inline]
    pub fn right_child(&self, node: NodeId) -> NodeId {
        self.right_children[node as usize]
    }

    #[inline]
    pub fn default_left(&self, node: NodeId) -> bool {
        self.default_left[node as usize]
    }

    #[inline]
    pub fn missing_type(&self, node: NodeId) -> MissingType {
        self.missing_types[node as usize]
    }

    #[inline]
    pub fn split_type(&self, node: NodeId) -> SplitType {
        self.split_types[node as usize]
    }

    #[inline]
    pub fn leaf_value(&self, node: NodeId) -> f64 {
        self.leaf_values[node as usize]
    }

    /// Check if this tree has any categorical splits.
    #[inline]
    pub fn has_categorical(&self) -> bool {
        !self.categories.is_empty()
    }

    #[inline]
    pub fn categories(&self) -> &CategoriesStorage {
        &self.categories
    }

    /// Traverse the tree and return the leaf value for `features`.
    ///
    /// A split feature beyond the end of `features` reads as NaN.
    pub fn predict_row(&self, features: &[f64]) -> f64 {
        let mut idx: NodeId = 0;

        while !self.is_leaf(idx) {
            let feat_idx = self.split_index(idx) as usize;
            let fvalue = features.get(feat_idx).copied().unwrap_or(f64::NAN);

            idx = match self.split_type(idx) {
                SplitType::Numeric => self.numeric_decision(idx, fvalue),
                SplitType::Categorical => self.categorical_decision(idx, fvalue),
            };
        }

        self.leaf_value(idx)
    }

    #[inline]
    fn numeric_decision(&self, node: NodeId, fvalue: f64) -> NodeId {
        let missing = self.missing_type(node);
        let value = if missing != MissingType::NaN && fvalue.is_nan() {
            0.0
        } else {
            fvalue
        };

        let is_missing = match missing {
            MissingType::None => false,
            MissingType::Zero => (-ZERO_THRESHOLD..=ZERO_THRESHOLD).contains(&value),
            MissingType::NaN => value.is_nan(),
        };

        if is_missing {
            if self.default_left(node) {
                self.left_child(node)
            } else {
                self.right_child(node)
            }
        } else if value <= self.split_threshold(node) {
            self.left_child(node)
        } else {
            self.right_child(node)
        }
    }

    #[inline]
    fn categorical_decision(&self, node: NodeId, fvalue: f64) -> NodeId {
        match float_to_category(fvalue) {
            Some(category) if self.categories.contains(node, category) => self.left_child(node),
            _ => self.right_child(node),
        }
    }

    /// Validate basic structural invariants for this tree.
    ///
    /// Every node must be reachable from the root exactly once.
    pub fn validate(&self) -> Result<(), TreeValidationError> {
        let n_nodes = self.n_nodes();
        if n_nodes == 0 {
            return Err(TreeValidationError::EmptyTree);
        }

        // Iterative DFS with color marking.
        // 0 = unvisited, 1 = visiting, 2 = done
        let mut color = vec![0u8; n_nodes];
        let mut stack: Vec<(NodeId, u8)> = vec![(0, 0)];

        while let Some((node, phase)) = stack.pop() {
            let node_usize = node as usize;

            if phase == 1 {
                color[node_usize] = 2;
                continue;
            }

            match color[node_usize] {
                0 => {}
                1 => return Err(TreeValidationError::CycleDetected { node }),
                _ => return Err(TreeValidationError::DuplicateVisit { node }),
            }

            color[node_usize] = 1;
            stack.push((node, 1));

            if self.is_leaf(node) {
                continue;
            }

            let left = self.left_child(node);
            let right = self.right_child(node);

            if left == node || right == node {
                return Err(TreeValidationError::SelfLoop { node });
            }

            for (side, child) in [("left", left), ("right", right)] {
                if child as usize >= n_nodes {
                    return Err(TreeValidationError::ChildOutOfBounds {
                        node,
                        side,
                        child,
                        n_nodes,
                    });
                }
            }

            stack.push((right, 0));
            stack.push((left, 0));
        }

        if let Some(node) = color.iter().position(|&c| c == 0) {
            return Err(TreeValidationError::UnreachableNode { node: node as NodeId });
        }

        Ok(())
    }
}

// ============================================================================
// MutableTree
// ============================================================================

/// Builder for [`Tree`].
///
/// Nodes are allocated up front with [`init_root_with_num_nodes`] and then
/// filled in any order. Unfilled nodes are leaves with value `0.0`.
///
/// [`init_root_with_num_nodes`]: MutableTree::init_root_with_num_nodes
#[derive(Debug, Clone, Default)]
pub struct MutableTree {
    split_indices: Vec<u32>,
    split_thresholds: Vec<f64>,
    left_children: Vec<NodeId>,
    right_children: Vec<NodeId>,
    default_left: Vec<bool>,
    missing_types: Vec<MissingType>,
    split_types: Vec<SplitType>,
    is_leaf: Vec<bool>,
    leaf_values: Vec<f64>,
    category_bitsets: Vec<u32>,
    category_segments: Vec<(u32, u32)>,
}

impl MutableTree {
    pub fn with_capacity(n_nodes: usize) -> Self {
        Self {
            split_indices: Vec::with_capacity(n_nodes),
            split_thresholds: Vec::with_capacity(n_nodes),
            left_children: Vec::with_capacity(n_nodes),
            right_children: Vec::with_capacity(n_nodes),
            default_left: Vec::with_capacity(n_nodes),
            missing_types: Vec::with_capacity(n_nodes),
            split_types: Vec::with_capacity(n_nodes),
            is_leaf: Vec::with_capacity(n_nodes),
            leaf_values: Vec::with_capacity(n_nodes),
            category_bitsets: Vec::new(),
            category_segments: Vec::with_capacity(n_nodes),
        }
    }

    /// Allocate `n_nodes` nodes and return the root id.
    pub fn init_root_with_num_nodes(&mut self, n_nodes: usize) -> NodeId {
        self.split_indices = vec![0; n_nodes];
        self.split_thresholds = vec![0.0; n_nodes];
        self.left_children = vec![0; n_nodes];
        self.right_children = vec![0; n_nodes];
        self.default_left = vec![false; n_nodes];
        self.missing_types = vec![MissingType::None; n_nodes];
        self.split_types = vec![SplitType::Numeric; n_nodes];
        self.is_leaf = vec![true; n_nodes];
        self.leaf_values = vec![0.0; n_nodes];
        self.category_bitsets.clear();
        self.category_segments = vec![(0, 0); n_nodes];
        0
    }

    pub fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    /// Turn `node` into a numeric split.
    pub fn set_numeric_split(
        &mut self,
        node: NodeId,
        feature: u32,
        threshold: f64,
        default_left: bool,
        missing_type: MissingType,
        left: NodeId,
        right: NodeId,
    ) {
        let i = node as usize;
        self.split_indices[i] = feature;
        self.split_thresholds[i] = threshold;
        self.default_left[i] = default_left;
        self.missing_types[i] = missing_type;
        self.split_types[i] = SplitType::Numeric;
        self.left_children[i] = left;
        self.right_children[i] = right;
        self.is_leaf[i] = false;
    }

    /// Turn `node` into a categorical split; categories in `bitset` go left.
    pub fn set_categorical_split(
        &mut self,
        node: NodeId,
        feature: u32,
        bitset: &[u32],
        left: NodeId,
        right: NodeId,
    ) {
        let i = node as usize;
        let start = self.category_bitsets.len() as u32;
        self.category_bitsets.extend_from_slice(bitset);
        self.category_segments[i] = (start, bitset.len() as u32);

        self.split_indices[i] = feature;
        self.split_types[i] = SplitType::Categorical;
        self.left_children[i] = left;
        self.right_children[i] = right;
        self.is_leaf[i] = false;
    }

    pub fn make_leaf(&mut self, node: NodeId, value: f64) {
        let i = node as usize;
        self.is_leaf[i] = true;
        self.leaf_values[i] = value;
    }

    /// Finish construction.
    pub fn freeze(self) -> Tree {
        let categories = if self.category_bitsets.is_empty() {
            CategoriesStorage::empty()
        } else {
            CategoriesStorage::new(self.category_bitsets, self.category_segments)
        };

        Tree {
            split_indices: self.split_indices.into_boxed_slice(),
            split_thresholds: self.split_thresholds.into_boxed_slice(),
            left_children: self.left_children.into_boxed_slice(),
            right_children: self.right_children.into_boxed_slice(),
            default_left: self.default_left.into_boxed_slice(),
            missing_types: self.missing_types.into_boxed_slice(),
            split_types: self.split_types.into_boxed_slice(),
            is_leaf: self.is_leaf.into_boxed_slice(),
            leaf_values: self.leaf_values.into_boxed_slice(),
            categories,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// `f0 <= threshold ? left_val : right_val`
    fn stump(threshold: f64, missing: MissingType, default_left: bool) -> Tree {
        let mut t = MutableTree::with_capacity(3);
        let root = t.init_root_with_num_nodes(3);
        t.set_numeric_split(root, 0, threshold, default_left, missing, 1, 2);
        t.make_leaf(1, -1.0);
        t.make_leaf(2, 1.0);
        t.freeze()
    }

    #[test]
    fn numeric_split_is_inclusive_on_the_left() {
        let tree = stump(0.5, MissingType::None, false);
        assert_eq!(tree.predict_row(&[0.4]), -1.0);
        assert_eq!(tree.predict_row(&[0.5]), -1.0);
        assert_eq!(tree.predict_row(&[0.6]), 1.0);
    }

    #[test]
    fn missing_none_reads_nan_as_zero() {
        // 0.0 <= 0.5 goes left regardless of the default direction
        let tree = stump(0.5, MissingType::None, false);
        assert_eq!(tree.predict_row(&[f64::NAN]), -1.0);

        let tree = stump(-0.5, MissingType::None, true);
        assert_eq!(tree.predict_row(&[f64::NAN]), 1.0);
    }

    #[test]
    fn missing_nan_follows_default_direction() {
        let tree = stump(0.5, MissingType::NaN, false);
        assert_eq!(tree.predict_row(&[f64::NAN]), 1.0);
        assert_eq!(tree.predict_row(&[0.0]), -1.0);

        let tree = stump(-0.5, MissingType::NaN, true);
        assert_eq!(tree.predict_row(&[f64::NAN]), -1.0);
    }

    #[test]
    fn missing_zero_routes_zero_and_nan_by_default() {
        let tree = stump(0.5, MissingType::Zero, false);
        assert_eq!(tree.predict_row(&[0.0]), 1.0);
        assert_eq!(tree.predict_row(&[f64::NAN]), 1.0);
        assert_eq!(tree.predict_row(&[0.25]), -1.0);
    }

    #[test]
    fn out_of_range_feature_reads_as_missing() {
        let tree = stump(0.5, MissingType::NaN, false);
        assert_eq!(tree.predict_row(&[]), 1.0);
    }

    #[test]
    fn categorical_split_uses_bitset_membership() {
        let mut t = MutableTree::with_capacity(3);
        let root = t.init_root_with_num_nodes(3);
        // categories {1, 3} go left
        t.set_categorical_split(root, 0, &[0b1010], 1, 2);
        t.make_leaf(1, 10.0);
        t.make_leaf(2, 20.0);
        let tree = t.freeze();

        assert!(tree.has_categorical());
        assert_eq!(tree.predict_row(&[1.0]), 10.0);
        assert_eq!(tree.predict_row(&[3.0]), 10.0);
        assert_eq!(tree.predict_row(&[2.0]), 20.0);
        assert_eq!(tree.predict_row(&[100.0]), 20.0);
        assert_eq!(tree.predict_row(&[-1.0]), 20.0);
        assert_eq!(tree.predict_row(&[f64::NAN]), 20.0);
    }

    #[test]
    fn constant_tree_has_one_leaf() {
        let tree = Tree::constant(0.25);
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.predict_row(&[1.0, 2.0]), 0.25);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn validate_accepts_well_formed_tree() {
        assert!(stump(0.0, MissingType::None, false).validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_bounds_child() {
        let mut t = MutableTree::with_capacity(3);
        let root = t.init_root_with_num_nodes(3);
        t.set_numeric_split(root, 0, 0.0, false, MissingType::None, 1, 7);
        let err = t.freeze().validate().unwrap_err();
        assert!(matches!(
            err,
            TreeValidationError::ChildOutOfBounds { node: 0, side: "right", child: 7, .. }
        ));
    }

    #[test]
    fn validate_rejects_unreachable_and_shared_nodes() {
        let mut t = MutableTree::with_capacity(4);
        let root = t.init_root_with_num_nodes(4);
        t.set_numeric_split(root, 0, 0.0, false, MissingType::None, 1, 2);
        let err = t.clone().freeze().validate().unwrap_err();
        assert_eq!(err, TreeValidationError::UnreachableNode { node: 3 });

        t.set_numeric_split(root, 0, 0.0, false, MissingType::None, 1, 1);
        let err = t.freeze().validate().unwrap_err();
        assert_eq!(err, TreeValidationError::DuplicateVisit { node: 1 });
    }

    #[test]
    fn validate_rejects_cycles() {
        let mut t = MutableTree::with_capacity(3);
        let root = t.init_root_with_num_nodes(3);
        t.set_numeric_split(root, 0, 0.0, false, MissingType::None, 1, 2);
        t.set_numeric_split(1, 0, 0.0, false, MissingType::None, 0, 2);
        let err = t.freeze().validate().unwrap_err();
        assert!(matches!(
            err,
            TreeValidationError::CycleDetected { node: 0 } | TreeValidationError::DuplicateVisit { .. }
        ));
    }
}
