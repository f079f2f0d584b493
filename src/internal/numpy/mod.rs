//! NumPy-like array helpers.

mod array;

pub use array::*;
