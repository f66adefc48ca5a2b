//! Factorization entry points.
//!
//! Each entry materializes the operator to a dense matrix, factors it with
//! the corresponding Faer kernel, and wraps the result in an
//! [`InvertibleOperator`]. The operator must be square and materializable;
//! matrix-free operators have no factorization path.

use crate::core::traits::OpScalar;
use crate::error::OpError;
use crate::operator::{FactorKind, InvertibleOperator, LinOp};

fn with_kind<T: OpScalar>(l: &LinOp<T>, kind: FactorKind) -> Result<LinOp<T>, OpError> {
    let a = l.to_dense()?;
    if a.nrows() != a.ncols() {
        return Err(OpError::unsupported("factorize", l.kind_name(), l.size()));
    }
    Ok(LinOp::Invertible(InvertibleOperator::new(kind, a)?))
}

/// Factor with the default direct kernel (LU with full pivoting).
pub fn factorize<T: OpScalar>(l: &LinOp<T>) -> Result<LinOp<T>, OpError> {
    with_kind(l, FactorKind::Lu)
}

/// LU factorization with full pivoting.
pub fn lu<T: OpScalar>(l: &LinOp<T>) -> Result<LinOp<T>, OpError> {
    with_kind(l, FactorKind::Lu)
}

/// QR factorization.
pub fn qr<T: OpScalar>(l: &LinOp<T>) -> Result<LinOp<T>, OpError> {
    with_kind(l, FactorKind::Qr)
}

/// Cholesky LLᵀ factorization; fails on matrices that are not positive
/// definite.
pub fn cholesky<T: OpScalar>(l: &LinOp<T>) -> Result<LinOp<T>, OpError> {
    with_kind(l, FactorKind::Cholesky)
}

/// LDLᵀ factorization.
pub fn ldlt<T: OpScalar>(l: &LinOp<T>) -> Result<LinOp<T>, OpError> {
    with_kind(l, FactorKind::Ldlt)
}

/// Bunch–Kaufman LBLᵀ factorization for symmetric indefinite matrices.
pub fn bunchkaufman<T: OpScalar>(l: &LinOp<T>) -> Result<LinOp<T>, OpError> {
    with_kind(l, FactorKind::BunchKaufman)
}

/// Singular value decomposition.
pub fn svd<T: OpScalar>(l: &LinOp<T>) -> Result<LinOp<T>, OpError> {
    with_kind(l, FactorKind::Svd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::MatrixOperator;
    use approx::assert_abs_diff_eq;
    use faer::Mat;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn factorize_defaults_to_lu() {
        let mut rng = StdRng::seed_from_u64(0);
        let a = Mat::from_fn(5, 5, |i, j| {
            if i == j {
                6.0 + rng.gen::<f64>()
            } else {
                rng.gen::<f64>() - 0.5
            }
        });
        let op = LinOp::Matrix(MatrixOperator::new(a.clone()));
        let f = factorize(&op).unwrap();
        assert!(matches!(f, LinOp::Invertible(_)));
        // materialization recovers the factored matrix
        let d = f.to_dense().unwrap();
        for j in 0..5 {
            for i in 0..5 {
                assert_abs_diff_eq!(d[(i, j)], a[(i, j)], epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn function_operators_cannot_factor() {
        use crate::operator::{FnTraits, FunctionOperator, OpFn};
        let op: LinOp<f64> = LinOp::Function(FunctionOperator::new(
            OpFn::out_of_place(|u, _p, _t| u.to_owned()),
            (3, 3),
            FnTraits::default(),
        ));
        assert!(factorize(&op).is_err());
    }
}
