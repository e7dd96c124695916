//! Gradient-boosted decision tree (GBDT) canonical representations.

/// Canonical node identifier used by the GBDT representation.
///
/// Internally this is just an index into the tree's SoA arrays.
pub type NodeId = u32;

pub mod categories;
pub mod forest;
pub mod node;
pub mod tree;

pub use categories::{float_to_category, CategoriesStorage};
pub use forest::Forest;
pub use node::{MissingType, SplitType};
pub use tree::{MutableTree, Tree, TreeValidationError};
