//! Internal modules ported from external libraries.
//!
//! These modules contain code adapted from:
//! - scipy: vector distances and linear sum assignment
//! - numpy: point-set shape validation

pub mod scipy;
pub mod numpy;
