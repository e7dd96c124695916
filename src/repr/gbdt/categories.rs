//! Bitset storage for categorical splits.

use super::NodeId;

/// Category bitsets for every categorical node of a tree.
///
/// Bitsets of all nodes live in one flat buffer; `segments[node]` holds the
/// `(start, len)` word range of that node's bitset. Nodes without a
/// categorical split have an empty segment.
#[derive(Debug, Clone, Default)]
pub struct CategoriesStorage {
    bitsets: Box<[u32]>,
    segments: Box<[(u32, u32)]>,
}

impl CategoriesStorage {
    /// Storage for a tree with no categorical splits.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create storage from a flat bitset buffer and per-node segments.
    pub fn new(bitsets: Vec<u32>, segments: Vec<(u32, u32)>) -> Self {
        debug_assert!(segments
            .iter()
            .all(|&(start, len)| (start + len) as usize <= bitsets.len()));
        Self {
            bitsets: bitsets.into_boxed_slice(),
            segments: segments.into_boxed_slice(),
        }
    }

    /// True when no node carries a bitset.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bitsets.is_empty()
    }

    /// Per-node `(start, len)` segments.
    #[inline]
    pub fn segments(&self) -> &[(u32, u32)] {
        &self.segments
    }

    /// Bitset words of a node (empty for non-categorical nodes).
    pub fn bitset(&self, node: NodeId) -> &[u32] {
        match self.segments.get(node as usize) {
            Some(&(start, len)) => &self.bitsets[start as usize..(start + len) as usize],
            None => &[],
        }
    }

    /// Whether `category` is a member of the node's bitset.
    #[inline]
    pub fn contains(&self, node: NodeId, category: u32) -> bool {
        let words = self.bitset(node);
        let word = (category / 32) as usize;
        match words.get(word) {
            Some(bits) => (bits >> (category % 32)) & 1 == 1,
            None => false,
        }
    }
}

/// Convert a raw feature value to a category index.
///
/// Values are truncated toward zero. NaN and negative categories have no
/// index and always take the right branch.
#[inline]
pub fn float_to_category(value: f64) -> Option<u32> {
    if value.is_nan() {
        return None;
    }
    let truncated = value.trunc();
    if truncated < 0.0 || truncated > u32::MAX as f64 {
        None
    } else {
        Some(truncated as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_reads_bits_across_words() {
        // node 0: categories {1, 33}; node 1: none
        let storage = CategoriesStorage::new(vec![0b10, 0b10], vec![(0, 2), (0, 0)]);

        assert!(storage.contains(0, 1));
        assert!(storage.contains(0, 33));
        assert!(!storage.contains(0, 0));
        assert!(!storage.contains(0, 32));
        assert!(!storage.contains(0, 64));
        assert!(!storage.contains(1, 1));
        assert!(!storage.contains(7, 1));
    }

    #[test]
    fn float_to_category_truncates() {
        assert_eq!(float_to_category(3.0), Some(3));
        assert_eq!(float_to_category(3.9), Some(3));
        assert_eq!(float_to_category(-0.5), Some(0));
        assert_eq!(float_to_category(-1.0), None);
        assert_eq!(float_to_category(f64::NAN), None);
    }
}
