//! Core operator traits for linop.

use faer::sparse::SparseRowMat;
use faer::traits::{ComplexField, RealField};
use faer::{Mat, MatRef};
use num_traits::{Float, NumAssign};

use crate::error::OpError;
use crate::operator::LinOp;

/// Scalar field shared by every operator: a real floating-point type that
/// faer's dense kernels and factorizations accept.
pub trait OpScalar: Float + NumAssign + ComplexField + RealField + 'static {}

impl<T: Float + NumAssign + ComplexField + RealField + 'static> OpScalar for T {}

/// Matrix norms understood by `opnorm`.
///
/// `Two` is the induced spectral norm; for concrete matrices it is estimated
/// iteratively rather than via a full SVD.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NormKind {
    One,
    Two,
    Inf,
    Frobenius,
}

/// Shape metadata: every operator has a well-defined `(rows, cols)`.
pub trait OpShape {
    /// Number of rows (output leading dimension).
    fn nrows(&self) -> usize;
    /// Number of columns (input leading dimension).
    fn ncols(&self) -> usize;
    /// Shape as `(nrows, ncols)`.
    fn size(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }
}

/// Capability queries: which operations an operator variant supports.
///
/// Callers are expected to consult these before invoking the corresponding
/// operation; invoking an unadvertised operation yields
/// [`OpError::Unsupported`].
pub trait Capabilities: OpShape {
    /// Allocating apply `u ↦ L·u` is available.
    fn has_mul(&self) -> bool {
        true
    }
    /// In-place apply `v ← L·u` is available.
    fn has_mul_inplace(&self) -> bool {
        true
    }
    /// Allocating solve `u ↦ L⁻¹·u` is available.
    fn has_ldiv(&self) -> bool {
        false
    }
    /// In-place solve `v ← L⁻¹·u` / `u ← L⁻¹·u` is available.
    fn has_ldiv_inplace(&self) -> bool {
        false
    }
    /// `adjoint(L)` produces a native adjoint (no lazy wrapper needed).
    fn has_adjoint(&self) -> bool {
        true
    }
    /// Coefficients never change under `update_coefficients`.
    fn is_constant(&self) -> bool {
        false
    }
    /// The map is linear (affine operators answer `false`).
    fn is_linear(&self) -> bool {
        true
    }
    fn is_square(&self) -> bool {
        self.nrows() == self.ncols()
    }
    fn is_zero(&self) -> bool {
        false
    }
    fn is_symmetric(&self) -> bool {
        false
    }
    fn is_hermitian(&self) -> bool {
        false
    }
    fn is_posdef(&self) -> bool {
        false
    }
    fn is_singular(&self) -> bool {
        false
    }
}

/// The uniform algebraic interface over all operator variants.
///
/// Inputs and outputs are faer matrices; a vector is a single-column matrix
/// and an operator acts column-wise on a `k`-column input. In-place entry
/// points take `&mut self` because some variants route through internal
/// workspaces allocated by [`cache_operator`](crate::cache_operator).
pub trait Operator<T: OpScalar>: Capabilities {
    /// Freshly allocated `v = L·u`.
    fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError>;

    /// `v ← L·u`.
    fn apply_into(&mut self, v: &mut Mat<T>, u: MatRef<'_, T>) -> Result<(), OpError>;

    /// `v ← α·(L·u) + β·v`.
    fn gemm_into(
        &mut self,
        v: &mut Mat<T>,
        u: MatRef<'_, T>,
        alpha: T,
        beta: T,
    ) -> Result<(), OpError>;

    /// Freshly allocated `v = L⁻¹·u`.
    fn solve(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError>;

    /// `v ← L⁻¹·u`.
    fn solve_into(&mut self, v: &mut Mat<T>, u: MatRef<'_, T>) -> Result<(), OpError>;

    /// `u ← L⁻¹·u`.
    fn solve_in_place(&mut self, u: &mut Mat<T>) -> Result<(), OpError>;

    /// Refresh internal coefficients for a new state/parameter/time triple.
    ///
    /// Must be ordered before any apply that is meant to observe the new
    /// `(p, t)`; it never changes the caching state.
    fn update_coefficients(&mut self, u: MatRef<'_, T>, p: &[T], t: T);

    /// Conjugate-transpose of the operator.
    fn adjoint(&self) -> LinOp<T>;

    /// Transpose of the operator.
    fn transpose(&self) -> LinOp<T>;

    /// Elementwise conjugate of the operator.
    fn conjugate(&self) -> LinOp<T>;

    /// Operator norm of the requested kind.
    fn opnorm(&self, kind: NormKind) -> Result<T, OpError>;

    /// Materialize as a dense matrix.
    fn to_dense(&self) -> Result<Mat<T>, OpError>;

    /// Materialize as a CSR matrix, dropping explicit zeros.
    fn to_sparse(&self) -> Result<SparseRowMat<usize, T>, OpError>;
}
