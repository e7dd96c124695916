//! Conversion from LightGBM parsed types to native forest types.

use crate::repr::gbdt::{Forest, MutableTree, NodeId, Tree, TreeValidationError};

use super::text::{DecisionType, LgbModel, LgbTree};

/// Error type for LightGBM model conversion.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("tree {0} has no nodes")]
    EmptyTree(usize),
    #[error("tree {tree}: invalid child index {child} at node {node}")]
    InvalidChildIndex {
        tree: usize,
        node: usize,
        child: i32,
    },
    #[error("tree {tree}: invalid split feature {feature} at node {node}")]
    InvalidSplitFeature {
        tree: usize,
        node: usize,
        feature: i32,
    },
    #[error("tree {tree}: categorical split at node {node} references missing category slot {slot}")]
    InvalidCategorySlot {
        tree: usize,
        node: usize,
        slot: usize,
    },
    #[error("tree {tree}: {source}")]
    InvalidStructure {
        tree: usize,
        #[source]
        source: TreeValidationError,
    },
    #[error("linear trees are not supported")]
    LinearTreesNotSupported,
}

impl LgbModel {
    /// Convert to a native [`Forest`].
    ///
    /// Trees are assigned to output groups round-robin, as LightGBM stores
    /// them: `trees[iteration * num_groups + group]`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let model = LgbModel::from_file("model.txt")?;
    /// let forest = model.to_forest()?;
    /// let predictions = forest.predict_row(&features);
    /// ```
    pub fn to_forest(&self) -> Result<Forest, ConversionError> {
        for (idx, tree) in self.trees.iter().enumerate() {
            if tree.is_linear {
                return Err(ConversionError::LinearTreesNotSupported);
            }
            if tree.num_leaves == 0 {
                return Err(ConversionError::EmptyTree(idx));
            }
        }

        let num_groups = self.num_groups() as u32;

        // LightGBM folds the initial score into the first tree's leaves.
        let mut forest = Forest::new(num_groups).with_average_output(self.header.average_output);

        for (tree_idx, lgb_tree) in self.trees.iter().enumerate() {
            let tree_group = (tree_idx % num_groups as usize) as u32;
            let native_tree = convert_tree(lgb_tree, tree_idx)?;
            forest.push_tree(native_tree, tree_group);
        }

        Ok(forest)
    }
}

/// Convert a single LightGBM tree to a canonical [`Tree`].
fn convert_tree(lgb_tree: &LgbTree, tree_idx: usize) -> Result<Tree, ConversionError> {
    if lgb_tree.num_leaves == 1 {
        let leaf_value = lgb_tree.leaf_value.first().copied().unwrap_or(0.0);
        return Ok(Tree::constant(leaf_value));
    }

    // LightGBM tree structure:
    // - Internal nodes: indices 0 to num_leaves-2
    // - Leaves: referenced as negative values in left_child/right_child,
    //   leaf index = !child
    //
    // Leaves are laid out after the internal nodes.
    let num_internal = lgb_tree.num_leaves - 1;
    let total_nodes = num_internal + lgb_tree.num_leaves;

    let mut tree = MutableTree::with_capacity(total_nodes);
    tree.init_root_with_num_nodes(total_nodes);

    for node_idx in 0..num_internal {
        let dt = DecisionType::from_i8(lgb_tree.decision_type[node_idx]);

        let child = |child: i32| {
            convert_child_ref(child, num_internal, lgb_tree.num_leaves).ok_or(
                ConversionError::InvalidChildIndex {
                    tree: tree_idx,
                    node: node_idx,
                    child,
                },
            )
        };
        let left_child = child(lgb_tree.left_child[node_idx])?;
        let right_child = child(lgb_tree.right_child[node_idx])?;

        let feature = lgb_tree.split_feature[node_idx];
        let feature_index = u32::try_from(feature).map_err(|_| ConversionError::InvalidSplitFeature {
            tree: tree_idx,
            node: node_idx,
            feature,
        })?;

        if dt.is_categorical {
            let slot = lgb_tree.threshold[node_idx] as usize;
            let bitset = extract_categorical_bitset(lgb_tree, slot).ok_or(
                ConversionError::InvalidCategorySlot {
                    tree: tree_idx,
                    node: node_idx,
                    slot,
                },
            )?;
            tree.set_categorical_split(node_idx as NodeId, feature_index, bitset, left_child, right_child);
        } else {
            tree.set_numeric_split(
                node_idx as NodeId,
                feature_index,
                lgb_tree.threshold[node_idx],
                dt.default_left,
                dt.missing_type,
                left_child,
                right_child,
            );
        }
    }

    // Leaf values already have shrinkage applied.
    for (leaf_idx, &value) in lgb_tree.leaf_value.iter().enumerate() {
        tree.make_leaf((num_internal + leaf_idx) as NodeId, value);
    }

    let tree = tree.freeze();
    tree.validate()
        .map_err(|source| ConversionError::InvalidStructure { tree: tree_idx, source })?;
    Ok(tree)
}

/// Convert a LightGBM child reference to a node id.
///
/// Internal nodes keep their index, leaf `!child` becomes `num_internal + !child`.
fn convert_child_ref(child: i32, num_internal: usize, num_leaves: usize) -> Option<NodeId> {
    if child < 0 {
        let leaf_idx = !child as usize;
        (leaf_idx < num_leaves).then_some((num_internal + leaf_idx) as NodeId)
    } else {
        let node = child as usize;
        (node < num_internal).then_some(node as NodeId)
    }
}

/// Bitset words for the categorical split stored in category slot `slot`.
fn extract_categorical_bitset(lgb_tree: &LgbTree, slot: usize) -> Option<&[u32]> {
    let start = *lgb_tree.cat_boundaries.get(slot)? as usize;
    let end = *lgb_tree.cat_boundaries.get(slot + 1)? as usize;
    lgb_tree.cat_threshold.get(start..end)
}
