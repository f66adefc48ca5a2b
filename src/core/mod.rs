//! Core traits: scalar field, shape, capability queries, operator interface.

pub mod traits;

pub use traits::{Capabilities, NormKind, OpScalar, OpShape, Operator};
