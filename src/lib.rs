//! linop: composable linear and affine operators for iterative solvers.
//!
//! The crate provides a uniform algebraic interface (apply, solve, adjoint,
//! factorization) over operators whose representation ranges from a dense
//! matrix to a matrix-free callable to a lazy Kronecker product of other
//! operators. Operators are time- and parameter-dependent: an update hook
//! refreshes their coefficients before each application.

pub mod core;
pub mod error;
pub mod factorize;
pub mod matrix;
pub mod operator;

// Re-exports for convenience
pub use crate::core::traits::{Capabilities, NormKind, OpScalar, OpShape, Operator};
pub use error::OpError;
pub use factorize::{bunchkaufman, cholesky, factorize, ldlt, lu, qr, svd};
pub use operator::{
    cache_operator, kron, kron_all, left_apply, left_apply_into, left_solve, left_solve_in_place,
    AdjointOperator, AffineOperator, FactorKind, FnTraits, FunctionOperator, IdentityOperator,
    InvertibleOperator, LinOp, MatKind, MatrixOperator, OpFn, OpNorm, TensorProductOperator,
    TransposeOperator,
};
