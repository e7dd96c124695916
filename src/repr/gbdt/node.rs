//! Per-node split metadata.

/// Kind of split stored at an internal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitType {
    /// `value <= threshold` goes left.
    #[default]
    Numeric,
    /// Category membership in the node's bitset goes left.
    Categorical,
}

/// Which feature values a numeric split routes along its default direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingType {
    /// No special missing value handling; NaN is read as zero.
    #[default]
    None,
    /// Values within `±1e-35` are missing.
    Zero,
    /// NaN is missing.
    NaN,
}

impl MissingType {
    /// Decode the two-bit missing type used by LightGBM's `decision_type`.
    ///
    /// Unknown encodings fall back to [`MissingType::None`].
    pub fn from_bits(bits: u8) -> Self {
        match bits {
            1 => MissingType::Zero,
            2 => MissingType::NaN,
            _ => MissingType::None,
        }
    }
}
