//! Boosted forest: trees assigned to output groups.

use super::Tree;

/// Trees of a boosted model, each tagged with the output group it adds to.
///
/// LightGBM writes trees iteration by iteration, so group `g` of iteration
/// `i` is tree `i * n_groups + g`. Any initial score is already folded into
/// the first iteration's leaves.
#[derive(Debug, Clone)]
pub struct Forest {
    trees: Vec<Tree>,
    groups: Vec<u32>,
    n_groups: u32,
    average_output: bool,
}

impl Forest {
    pub fn new(n_groups: u32) -> Self {
        Self {
            trees: Vec::new(),
            groups: Vec::new(),
            n_groups: n_groups.max(1),
            average_output: false,
        }
    }

    /// Single output group.
    pub fn for_regression() -> Self {
        Self::new(1)
    }

    /// Divide each group's sum by the iteration count (random forest mode).
    pub fn with_average_output(mut self, average_output: bool) -> Self {
        self.average_output = average_output;
        self
    }

    pub fn push_tree(&mut self, tree: Tree, group: u32) {
        debug_assert!(group < self.n_groups, "group {group} out of range");
        self.trees.push(tree);
        self.groups.push(group);
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    #[inline]
    pub fn n_groups(&self) -> u32 {
        self.n_groups
    }

    /// Completed boosting iterations.
    #[inline]
    pub fn n_iterations(&self) -> usize {
        self.trees.len() / self.n_groups as usize
    }

    #[inline]
    pub fn average_output(&self) -> bool {
        self.average_output
    }

    #[inline]
    pub fn tree(&self, idx: usize) -> &Tree {
        &self.trees[idx]
    }

    #[inline]
    pub fn tree_group(&self, idx: usize) -> u32 {
        self.groups[idx]
    }

    /// Raw margins for one row; `output` has one slot per group.
    pub fn predict_row_into(&self, features: &[f64], output: &mut [f64]) {
        debug_assert_eq!(output.len(), self.n_groups as usize);
        output.fill(0.0);

        for (tree, &group) in self.trees.iter().zip(&self.groups) {
            output[group as usize] += tree.predict_row(features);
        }

        let n_iterations = self.n_iterations();
        if self.average_output && n_iterations > 0 {
            let scale = 1.0 / n_iterations as f64;
            output.iter_mut().for_each(|v| *v *= scale);
        }
    }

    pub fn predict_row(&self, features: &[f64]) -> Vec<f64> {
        let mut output = vec![0.0; self.n_groups as usize];
        self.predict_row_into(features, &mut output);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::gbdt::{MissingType, MutableTree};
    use rstest::rstest;

    /// `f0 <= 0.5` → `left`, else `right`.
    fn stump(left: f64, right: f64) -> Tree {
        let mut t = MutableTree::with_capacity(3);
        let root = t.init_root_with_num_nodes(3);
        t.set_numeric_split(root, 0, 0.5, true, MissingType::None, 1, 2);
        t.make_leaf(1, left);
        t.make_leaf(2, right);
        t.freeze()
    }

    #[rstest]
    #[case(&[0.3], 1.5)]
    #[case(&[0.5], 1.5)]
    #[case(&[0.7], 3.5)]
    fn trees_in_one_group_add_up(#[case] row: &[f64], #[case] expected: f64) {
        let mut forest = Forest::for_regression();
        forest.push_tree(stump(1.0, 2.0), 0);
        forest.push_tree(stump(0.5, 1.5), 0);

        assert_eq!(forest.predict_row(row), vec![expected]);
    }

    #[test]
    fn groups_accumulate_separately() {
        let mut forest = Forest::new(2);
        for (value, group) in [(1.0, 0), (-1.0, 1), (2.0, 0), (-2.0, 1)] {
            forest.push_tree(Tree::constant(value), group);
        }

        assert_eq!(forest.n_iterations(), 2);
        assert_eq!(forest.predict_row(&[]), vec![3.0, -3.0]);
    }

    #[test]
    fn average_output_divides_by_iterations() {
        let mut forest = Forest::for_regression().with_average_output(true);
        for value in [1.0, 2.0, 6.0] {
            forest.push_tree(Tree::constant(value), 0);
        }
        assert_eq!(forest.predict_row(&[]), vec![3.0]);
    }

    #[test]
    fn output_buffer_is_reset_between_rows() {
        let mut forest = Forest::for_regression();
        forest.push_tree(stump(1.0, 2.0), 0);

        let mut out = [10.0];
        forest.predict_row_into(&[0.0], &mut out);
        assert_eq!(out, [1.0]);
        forest.predict_row_into(&[1.0], &mut out);
        assert_eq!(out, [2.0]);
    }

    #[test]
    fn empty_forest_predicts_zero() {
        let forest = Forest::new(3);
        assert_eq!(forest.n_iterations(), 0);
        assert_eq!(forest.predict_row(&[1.0]), vec![0.0; 3]);
    }
}
