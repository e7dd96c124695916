//! External format compatibility loaders.
//!
//! Models trained by external frameworks are parsed here and converted to
//! the native types in [`crate::repr`].

pub mod lightgbm;

pub use lightgbm::{ConversionError, LgbModel, ParseError};
