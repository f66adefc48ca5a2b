//! Operator variants and the tagged union tying them together.
//!
//! [`LinOp`] is the value type the rest of the crate (and downstream solvers)
//! traffic in: a tagged union over the concrete operator variants, exposing
//! the uniform interface of [`Operator`] plus the capability queries of
//! [`Capabilities`]. Construction goes through the variant types or the
//! combinators ([`kron`], [`kron_all`], [`crate::factorize`]); workspaces are
//! attached with [`cache_operator`].

pub mod adjoint;
pub mod affine;
pub mod function;
pub mod invertible;
pub mod matrix_op;
pub mod tensor;

use faer::sparse::SparseRowMat;
use faer::{Mat, MatRef};

use crate::core::traits::{Capabilities, NormKind, OpScalar, Operator, OpShape};
use crate::error::OpError;
use crate::matrix::{dense, sparse};

pub use adjoint::{AdjointOperator, TransposeOperator};
pub use affine::AffineOperator;
pub use function::{FnTraits, FunctionOperator, OpFn, OpNorm};
pub use invertible::{FactorKind, InvertibleOperator};
pub use matrix_op::{MatKind, MatrixOperator};
pub use tensor::TensorProductOperator;

/// The identity on a space of a given dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentityOperator {
    dim: usize,
}

impl IdentityOperator {
    pub(crate) const KIND: &'static str = "identity";

    pub fn new(dim: usize) -> Self {
        IdentityOperator { dim }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn check<T: OpScalar>(&self, u: MatRef<'_, T>) -> Result<(), OpError> {
        if u.nrows() != self.dim {
            return Err(OpError::shape(
                Self::KIND,
                (self.dim, self.dim),
                (u.nrows(), u.ncols()),
            ));
        }
        Ok(())
    }
}

/// A composable linear (or affine) operator.
///
/// Cheap to copy: concrete matrix storage and factorizations are shared by
/// reference between copies, while workspaces stay exclusive to each value.
#[derive(Clone, Debug)]
pub enum LinOp<T: OpScalar> {
    Identity(IdentityOperator),
    Matrix(MatrixOperator<T>),
    Invertible(InvertibleOperator<T>),
    Affine(AffineOperator<T>),
    Function(FunctionOperator<T>),
    TensorProduct(TensorProductOperator<T>),
    Adjoint(AdjointOperator<T>),
    Transpose(TransposeOperator<T>),
}

impl<T: OpScalar> LinOp<T> {
    /// Human-readable variant name, used in error payloads.
    pub fn kind_name(&self) -> &'static str {
        match self {
            LinOp::Identity(_) => IdentityOperator::KIND,
            LinOp::Matrix(_) => MatrixOperator::<T>::KIND,
            LinOp::Invertible(_) => InvertibleOperator::<T>::KIND,
            LinOp::Affine(_) => AffineOperator::<T>::KIND,
            LinOp::Function(_) => FunctionOperator::<T>::KIND,
            LinOp::TensorProduct(_) => TensorProductOperator::<T>::KIND,
            LinOp::Adjoint(_) => AdjointOperator::<T>::KIND,
            LinOp::Transpose(_) => TransposeOperator::<T>::KIND,
        }
    }

    pub fn nrows(&self) -> usize {
        match self {
            LinOp::Identity(op) => op.dim,
            LinOp::Matrix(op) => op.nrows(),
            LinOp::Invertible(op) => op.nrows(),
            LinOp::Affine(op) => op.nrows(),
            LinOp::Function(op) => op.nrows(),
            LinOp::TensorProduct(op) => op.nrows(),
            LinOp::Adjoint(op) => op.nrows(),
            LinOp::Transpose(op) => op.nrows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            LinOp::Identity(op) => op.dim,
            LinOp::Matrix(op) => op.ncols(),
            LinOp::Invertible(op) => op.ncols(),
            LinOp::Affine(op) => op.ncols(),
            LinOp::Function(op) => op.ncols(),
            LinOp::TensorProduct(op) => op.ncols(),
            LinOp::Adjoint(op) => op.ncols(),
            LinOp::Transpose(op) => op.ncols(),
        }
    }

    pub fn size(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    pub fn is_square(&self) -> bool {
        self.nrows() == self.ncols()
    }

    /// Freshly allocated `v = L·u`.
    pub fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        match self {
            LinOp::Identity(op) => {
                op.check(u)?;
                Ok(u.to_owned())
            }
            LinOp::Matrix(op) => op.apply(u),
            LinOp::Invertible(op) => op.apply(u),
            LinOp::Affine(op) => op.apply(u),
            LinOp::Function(op) => op.apply(u),
            LinOp::TensorProduct(op) => op.apply(u),
            LinOp::Adjoint(op) => op.apply(u),
            LinOp::Transpose(op) => op.apply(u),
        }
    }

    /// `v ← L·u`.
    pub fn apply_into(&mut self, v: &mut Mat<T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        match self {
            LinOp::Identity(op) => {
                op.check(u)?;
                if v.nrows() != u.nrows() || v.ncols() != u.ncols() {
                    return Err(OpError::shape(
                        IdentityOperator::KIND,
                        (op.dim, op.dim),
                        (v.nrows(), v.ncols()),
                    ));
                }
                v.copy_from(u);
                Ok(())
            }
            LinOp::Matrix(op) => op.apply_into(v, u),
            LinOp::Invertible(op) => op.gemm_into(v, u, T::one(), T::zero()),
            LinOp::Affine(op) => op.apply_into(v, u),
            LinOp::Function(op) => op.apply_into(v, u),
            LinOp::TensorProduct(op) => op.apply_into(v, u),
            LinOp::Adjoint(op) => Err(OpError::unsupported(
                "mul!",
                AdjointOperator::<T>::KIND,
                op.size(),
            )),
            LinOp::Transpose(op) => Err(OpError::unsupported(
                "mul!",
                TransposeOperator::<T>::KIND,
                op.size(),
            )),
        }
    }

    /// `v ← α·(L·u) + β·v`.
    pub fn gemm_into(
        &mut self,
        v: &mut Mat<T>,
        u: MatRef<'_, T>,
        alpha: T,
        beta: T,
    ) -> Result<(), OpError> {
        match self {
            LinOp::Identity(op) => {
                op.check(u)?;
                if v.nrows() != u.nrows() || v.ncols() != u.ncols() {
                    return Err(OpError::shape(
                        IdentityOperator::KIND,
                        (op.dim, op.dim),
                        (v.nrows(), v.ncols()),
                    ));
                }
                dense::axpby_in_place(v, alpha, u, beta);
                Ok(())
            }
            LinOp::Matrix(op) => op.gemm_into(v, u, alpha, beta),
            LinOp::Invertible(op) => op.gemm_into(v, u, alpha, beta),
            LinOp::Affine(op) => op.gemm_into(v, u, alpha, beta),
            LinOp::Function(op) => op.gemm_into(v, u, alpha, beta),
            LinOp::TensorProduct(op) => op.gemm_into(v, u, alpha, beta),
            LinOp::Adjoint(op) => Err(OpError::unsupported(
                "mul!",
                AdjointOperator::<T>::KIND,
                op.size(),
            )),
            LinOp::Transpose(op) => Err(OpError::unsupported(
                "mul!",
                TransposeOperator::<T>::KIND,
                op.size(),
            )),
        }
    }

    /// Freshly allocated `v = L⁻¹·u`.
    pub fn solve(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        match self {
            LinOp::Identity(op) => {
                op.check(u)?;
                Ok(u.to_owned())
            }
            LinOp::Matrix(op) => op.solve(u),
            LinOp::Invertible(op) => op.solve(u),
            LinOp::Affine(op) => op.solve(u),
            LinOp::Function(op) => op.solve(u),
            LinOp::TensorProduct(op) => op.solve(u),
            LinOp::Adjoint(op) => op.solve(u),
            LinOp::Transpose(op) => op.solve(u),
        }
    }

    /// `v ← L⁻¹·u`.
    pub fn solve_into(&mut self, v: &mut Mat<T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        match self {
            LinOp::Identity(op) => {
                op.check(u)?;
                if v.nrows() != u.nrows() || v.ncols() != u.ncols() {
                    return Err(OpError::shape(
                        IdentityOperator::KIND,
                        (op.dim, op.dim),
                        (v.nrows(), v.ncols()),
                    ));
                }
                v.copy_from(u);
                Ok(())
            }
            LinOp::Matrix(op) => op.solve_into(v, u),
            LinOp::Invertible(op) => op.solve_into(v, u),
            LinOp::Affine(op) => op.solve_into(v, u),
            LinOp::Function(op) => op.solve_into(v, u),
            LinOp::TensorProduct(op) => op.solve_into(v, u),
            LinOp::Adjoint(op) => Err(OpError::unsupported(
                "ldiv!",
                AdjointOperator::<T>::KIND,
                op.size(),
            )),
            LinOp::Transpose(op) => Err(OpError::unsupported(
                "ldiv!",
                TransposeOperator::<T>::KIND,
                op.size(),
            )),
        }
    }

    /// `u ← L⁻¹·u`.
    pub fn solve_in_place(&mut self, u: &mut Mat<T>) -> Result<(), OpError> {
        match self {
            LinOp::Identity(op) => op.check(u.as_ref()),
            LinOp::Matrix(op) => op.solve_in_place(u),
            LinOp::Invertible(op) => op.solve_in_place(u),
            LinOp::Affine(op) => op.solve_in_place(u),
            LinOp::Function(op) => op.solve_in_place(u),
            LinOp::TensorProduct(op) => op.solve_in_place(u),
            LinOp::Adjoint(op) => Err(OpError::unsupported(
                "ldiv!",
                AdjointOperator::<T>::KIND,
                op.size(),
            )),
            LinOp::Transpose(op) => Err(OpError::unsupported(
                "ldiv!",
                TransposeOperator::<T>::KIND,
                op.size(),
            )),
        }
    }

    /// Refresh coefficients for a new `(u, p, t)`.
    pub fn update_coefficients(&mut self, u: MatRef<'_, T>, p: &[T], t: T) {
        match self {
            LinOp::Identity(_) | LinOp::Invertible(_) => {}
            LinOp::Matrix(op) => op.update_coefficients(u, p, t),
            LinOp::Affine(op) => op.update_coefficients(u, p, t),
            LinOp::Function(op) => op.update_coefficients(u, p, t),
            LinOp::TensorProduct(op) => op.update_coefficients(u, p, t),
            LinOp::Adjoint(op) => op.update_coefficients(u, p, t),
            LinOp::Transpose(op) => op.update_coefficients(u, p, t),
        }
    }

    /// Conjugate-transpose. Variants with a native adjoint return it; the
    /// rest are wrapped lazily.
    pub fn adjoint(&self) -> LinOp<T> {
        match self {
            LinOp::Identity(op) => LinOp::Identity(*op),
            LinOp::Matrix(op) => LinOp::Matrix(op.adjoint_operator()),
            LinOp::Invertible(op) => LinOp::Invertible(op.adjoint_operator()),
            LinOp::Affine(_) => LinOp::Adjoint(AdjointOperator::new(self.clone())),
            LinOp::Function(op) => match op.adjoint_operator() {
                Some(adj) => LinOp::Function(adj),
                None => LinOp::Adjoint(AdjointOperator::new(self.clone())),
            },
            LinOp::TensorProduct(op) => match op.adjoint_operator() {
                Some(adj) => LinOp::TensorProduct(adj),
                None => LinOp::Adjoint(AdjointOperator::new(self.clone())),
            },
            LinOp::Adjoint(op) => op.inner().clone(),
            LinOp::Transpose(op) => op.inner().conjugate(),
        }
    }

    /// Transpose. Over the real scalar field this coincides with the
    /// adjoint for every concrete variant.
    pub fn transpose(&self) -> LinOp<T> {
        match self {
            LinOp::Identity(op) => LinOp::Identity(*op),
            LinOp::Matrix(op) => LinOp::Matrix(op.transpose_operator()),
            LinOp::Invertible(op) => LinOp::Invertible(op.adjoint_operator()),
            LinOp::Affine(_) => LinOp::Transpose(TransposeOperator::new(self.clone())),
            LinOp::Function(op) => match op.adjoint_operator() {
                Some(adj) => LinOp::Function(adj),
                None => LinOp::Transpose(TransposeOperator::new(self.clone())),
            },
            LinOp::TensorProduct(op) => match op.transpose_operator() {
                Some(tr) => LinOp::TensorProduct(tr),
                None => LinOp::Transpose(TransposeOperator::new(self.clone())),
            },
            LinOp::Adjoint(op) => op.inner().conjugate(),
            LinOp::Transpose(op) => op.inner().clone(),
        }
    }

    /// Elementwise conjugate: the identity over the real scalar field, except
    /// that it swaps the two lazy wrapper kinds (`conj(Aᴴ) = Aᵀ`).
    pub fn conjugate(&self) -> LinOp<T> {
        match self {
            LinOp::Adjoint(op) => LinOp::Transpose(TransposeOperator::new(op.inner().clone())),
            LinOp::Transpose(op) => LinOp::Adjoint(AdjointOperator::new(op.inner().clone())),
            other => other.clone(),
        }
    }

    /// Operator norm of the requested kind.
    pub fn opnorm(&self, kind: NormKind) -> Result<T, OpError> {
        match self {
            LinOp::Identity(_) => Ok(T::one()),
            LinOp::Matrix(op) => Ok(op.opnorm(kind)),
            LinOp::Invertible(op) => Ok(op.opnorm(kind)),
            LinOp::Affine(op) => Err(OpError::unsupported("opnorm", self.kind_name(), op.size())),
            LinOp::Function(op) => op.opnorm(kind),
            LinOp::TensorProduct(op) => op.opnorm(kind),
            LinOp::Adjoint(op) => op.opnorm(kind),
            LinOp::Transpose(op) => op.opnorm(kind),
        }
    }

    /// Materialize as a dense matrix. Affine and matrix-free operators have
    /// no materialization path.
    pub fn to_dense(&self) -> Result<Mat<T>, OpError> {
        match self {
            LinOp::Identity(op) => Ok(Mat::from_fn(op.dim, op.dim, |i, j| {
                if i == j {
                    T::one()
                } else {
                    T::zero()
                }
            })),
            LinOp::Matrix(op) => Ok(op.to_dense()),
            LinOp::Invertible(op) => Ok(op.to_dense()),
            LinOp::Affine(op) => {
                Err(OpError::unsupported("convert", self.kind_name(), op.size()))
            }
            LinOp::Function(op) => {
                Err(OpError::unsupported("convert", self.kind_name(), op.size()))
            }
            LinOp::TensorProduct(op) => op.to_dense(),
            LinOp::Adjoint(op) => op.to_dense(),
            LinOp::Transpose(op) => op.to_dense(),
        }
    }

    /// Materialize as CSR, dropping explicit zeros.
    pub fn to_sparse(&self) -> Result<SparseRowMat<usize, T>, OpError> {
        let a = self.to_dense()?;
        Ok(sparse::dense_to_csr(a.as_ref()))
    }

    /// Allocate workspaces sized for a representative input `u`, recursing
    /// into sub-operators. Idempotent for a same-shape `u`.
    pub(crate) fn allocate_caches(&mut self, u: MatRef<'_, T>) -> Result<(), OpError> {
        match self {
            LinOp::Identity(op) => op.check(u),
            LinOp::Matrix(op) => {
                if u.nrows() != op.ncols() {
                    return Err(OpError::shape(
                        MatrixOperator::<T>::KIND,
                        op.size(),
                        (u.nrows(), u.ncols()),
                    ));
                }
                Ok(())
            }
            LinOp::Invertible(op) => {
                if u.nrows() != op.ncols() {
                    return Err(OpError::shape(
                        InvertibleOperator::<T>::KIND,
                        op.size(),
                        (u.nrows(), u.ncols()),
                    ));
                }
                Ok(())
            }
            LinOp::Affine(op) => op.allocate_caches(u),
            LinOp::Function(op) => op.allocate_caches(u),
            LinOp::TensorProduct(op) => op.allocate_caches(u),
            LinOp::Adjoint(op) => op.allocate_caches(u),
            LinOp::Transpose(op) => op.allocate_caches(u),
        }
    }

    pub fn has_mul(&self) -> bool {
        match self {
            LinOp::Identity(_) | LinOp::Matrix(_) | LinOp::Invertible(_) => true,
            LinOp::Affine(op) => op.forward_caps().has_mul(),
            LinOp::Function(op) => op.has_mul(),
            LinOp::TensorProduct(op) => op.outer().has_mul() && op.inner().has_mul(),
            LinOp::Adjoint(op) => op.inner().has_mul(),
            LinOp::Transpose(op) => op.inner().has_mul(),
        }
    }

    pub fn has_mul_inplace(&self) -> bool {
        match self {
            LinOp::Identity(_) | LinOp::Matrix(_) | LinOp::Invertible(_) => true,
            LinOp::Affine(op) => op.forward_caps().has_mul_inplace(),
            LinOp::Function(op) => op.has_mul_inplace(),
            LinOp::TensorProduct(op) => {
                op.outer().has_mul_inplace() && op.inner().has_mul_inplace()
            }
            LinOp::Adjoint(op) => op.inner().has_mul_inplace(),
            LinOp::Transpose(op) => op.inner().has_mul_inplace(),
        }
    }

    pub fn has_ldiv(&self) -> bool {
        match self {
            LinOp::Identity(_) | LinOp::Invertible(_) => true,
            LinOp::Matrix(op) => op.has_ldiv(),
            LinOp::Affine(op) => op.forward_caps().has_ldiv(),
            LinOp::Function(op) => op.has_ldiv(),
            LinOp::TensorProduct(op) => op.outer().has_ldiv() && op.inner().has_ldiv(),
            LinOp::Adjoint(op) => op.inner().has_ldiv(),
            LinOp::Transpose(op) => op.inner().has_ldiv(),
        }
    }

    pub fn has_ldiv_inplace(&self) -> bool {
        match self {
            LinOp::Identity(_) | LinOp::Invertible(_) => true,
            LinOp::Matrix(op) => op.has_ldiv(),
            LinOp::Affine(op) => op.forward_caps().has_ldiv_inplace(),
            LinOp::Function(op) => op.has_ldiv_inplace(),
            LinOp::TensorProduct(op) => {
                op.outer().has_ldiv_inplace() && op.inner().has_ldiv_inplace()
            }
            LinOp::Adjoint(op) => op.inner().has_ldiv_inplace(),
            LinOp::Transpose(op) => op.inner().has_ldiv_inplace(),
        }
    }

    pub fn has_adjoint(&self) -> bool {
        match self {
            LinOp::Identity(_) | LinOp::Matrix(_) | LinOp::Invertible(_) => true,
            LinOp::Affine(_) => false,
            LinOp::Function(op) => op.has_adjoint(),
            LinOp::TensorProduct(op) => op.outer().has_adjoint() && op.inner().has_adjoint(),
            LinOp::Adjoint(_) | LinOp::Transpose(_) => true,
        }
    }

    pub fn is_constant(&self) -> bool {
        match self {
            LinOp::Identity(_) | LinOp::Invertible(_) => true,
            LinOp::Matrix(op) => op.is_constant(),
            LinOp::Affine(op) => op.forward_caps().is_constant(),
            LinOp::Function(op) => op.is_constant(),
            LinOp::TensorProduct(op) => op.outer().is_constant() && op.inner().is_constant(),
            LinOp::Adjoint(op) => op.inner().is_constant(),
            LinOp::Transpose(op) => op.inner().is_constant(),
        }
    }

    pub fn is_linear(&self) -> bool {
        match self {
            LinOp::Affine(_) => false,
            LinOp::Adjoint(op) => op.inner().is_linear(),
            LinOp::Transpose(op) => op.inner().is_linear(),
            _ => true,
        }
    }

    pub fn is_zero(&self) -> bool {
        false
    }

    pub fn is_symmetric(&self) -> bool {
        match self {
            LinOp::Identity(_) => true,
            LinOp::Matrix(op) => op.is_symmetric(),
            LinOp::Invertible(op) => dense::is_symmetric_dense(op.to_dense().as_ref()),
            LinOp::Affine(_) => false,
            LinOp::Function(op) => op.is_symmetric(),
            LinOp::TensorProduct(op) => op.outer().is_symmetric() && op.inner().is_symmetric(),
            LinOp::Adjoint(op) => op.inner().is_symmetric(),
            LinOp::Transpose(op) => op.inner().is_symmetric(),
        }
    }

    pub fn is_hermitian(&self) -> bool {
        match self {
            LinOp::Function(op) => op.is_hermitian(),
            LinOp::TensorProduct(op) => op.outer().is_hermitian() && op.inner().is_hermitian(),
            LinOp::Adjoint(op) => op.inner().is_hermitian(),
            LinOp::Transpose(op) => op.inner().is_hermitian(),
            // real scalar field: hermitian coincides with symmetric
            other => other.is_symmetric(),
        }
    }

    pub fn is_posdef(&self) -> bool {
        match self {
            LinOp::Identity(_) => true,
            LinOp::Matrix(op) => op.is_posdef(),
            LinOp::Invertible(op) => op.factor_kind() == FactorKind::Cholesky,
            LinOp::Affine(_) => false,
            LinOp::Function(op) => op.is_posdef(),
            LinOp::TensorProduct(op) => op.outer().is_posdef() && op.inner().is_posdef(),
            LinOp::Adjoint(op) => op.inner().is_posdef(),
            LinOp::Transpose(op) => op.inner().is_posdef(),
        }
    }

    pub fn is_singular(&self) -> bool {
        match self {
            LinOp::Matrix(op) => op.is_singular(),
            LinOp::TensorProduct(op) => op.outer().is_singular() || op.inner().is_singular(),
            LinOp::Adjoint(op) => op.inner().is_singular(),
            LinOp::Transpose(op) => op.inner().is_singular(),
            _ => false,
        }
    }
}

impl<T: OpScalar> OpShape for LinOp<T> {
    fn nrows(&self) -> usize {
        LinOp::nrows(self)
    }

    fn ncols(&self) -> usize {
        LinOp::ncols(self)
    }
}

impl<T: OpScalar> Capabilities for LinOp<T> {
    fn has_mul(&self) -> bool {
        LinOp::has_mul(self)
    }
    fn has_mul_inplace(&self) -> bool {
        LinOp::has_mul_inplace(self)
    }
    fn has_ldiv(&self) -> bool {
        LinOp::has_ldiv(self)
    }
    fn has_ldiv_inplace(&self) -> bool {
        LinOp::has_ldiv_inplace(self)
    }
    fn has_adjoint(&self) -> bool {
        LinOp::has_adjoint(self)
    }
    fn is_constant(&self) -> bool {
        LinOp::is_constant(self)
    }
    fn is_linear(&self) -> bool {
        LinOp::is_linear(self)
    }
    fn is_square(&self) -> bool {
        LinOp::is_square(self)
    }
    fn is_zero(&self) -> bool {
        LinOp::is_zero(self)
    }
    fn is_symmetric(&self) -> bool {
        LinOp::is_symmetric(self)
    }
    fn is_hermitian(&self) -> bool {
        LinOp::is_hermitian(self)
    }
    fn is_posdef(&self) -> bool {
        LinOp::is_posdef(self)
    }
    fn is_singular(&self) -> bool {
        LinOp::is_singular(self)
    }
}

impl<T: OpScalar> Operator<T> for LinOp<T> {
    fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        LinOp::apply(self, u)
    }
    fn apply_into(&mut self, v: &mut Mat<T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        LinOp::apply_into(self, v, u)
    }
    fn gemm_into(
        &mut self,
        v: &mut Mat<T>,
        u: MatRef<'_, T>,
        alpha: T,
        beta: T,
    ) -> Result<(), OpError> {
        LinOp::gemm_into(self, v, u, alpha, beta)
    }
    fn solve(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        LinOp::solve(self, u)
    }
    fn solve_into(&mut self, v: &mut Mat<T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        LinOp::solve_into(self, v, u)
    }
    fn solve_in_place(&mut self, u: &mut Mat<T>) -> Result<(), OpError> {
        LinOp::solve_in_place(self, u)
    }
    fn update_coefficients(&mut self, u: MatRef<'_, T>, p: &[T], t: T) {
        LinOp::update_coefficients(self, u, p, t)
    }
    fn adjoint(&self) -> LinOp<T> {
        LinOp::adjoint(self)
    }
    fn transpose(&self) -> LinOp<T> {
        LinOp::transpose(self)
    }
    fn conjugate(&self) -> LinOp<T> {
        LinOp::conjugate(self)
    }
    fn opnorm(&self, kind: NormKind) -> Result<T, OpError> {
        LinOp::opnorm(self, kind)
    }
    fn to_dense(&self) -> Result<Mat<T>, OpError> {
        LinOp::to_dense(self)
    }
    fn to_sparse(&self) -> Result<SparseRowMat<usize, T>, OpError> {
        LinOp::to_sparse(self)
    }
}

impl<T: OpScalar> From<Mat<T>> for LinOp<T> {
    fn from(a: Mat<T>) -> Self {
        LinOp::Matrix(MatrixOperator::new(a))
    }
}

impl<T: OpScalar> From<IdentityOperator> for LinOp<T> {
    fn from(op: IdentityOperator) -> Self {
        LinOp::Identity(op)
    }
}

impl<T: OpScalar> From<MatrixOperator<T>> for LinOp<T> {
    fn from(op: MatrixOperator<T>) -> Self {
        LinOp::Matrix(op)
    }
}

impl<T: OpScalar> From<InvertibleOperator<T>> for LinOp<T> {
    fn from(op: InvertibleOperator<T>) -> Self {
        LinOp::Invertible(op)
    }
}

impl<T: OpScalar> From<AffineOperator<T>> for LinOp<T> {
    fn from(op: AffineOperator<T>) -> Self {
        LinOp::Affine(op)
    }
}

impl<T: OpScalar> From<FunctionOperator<T>> for LinOp<T> {
    fn from(op: FunctionOperator<T>) -> Self {
        LinOp::Function(op)
    }
}

impl<T: OpScalar> From<TensorProductOperator<T>> for LinOp<T> {
    fn from(op: TensorProductOperator<T>) -> Self {
        LinOp::TensorProduct(op)
    }
}

/// Kronecker product `outer ⊗ inner`. Matrices are promoted to operators,
/// and the product of two identities collapses to a larger identity.
pub fn kron<T: OpScalar>(outer: impl Into<LinOp<T>>, inner: impl Into<LinOp<T>>) -> LinOp<T> {
    let (outer, inner) = (outer.into(), inner.into());
    if let (LinOp::Identity(a), LinOp::Identity(b)) = (&outer, &inner) {
        return LinOp::Identity(IdentityOperator::new(a.dim() * b.dim()));
    }
    LinOp::TensorProduct(TensorProductOperator::new(outer, inner))
}

/// Right-folded Kronecker product of a sequence:
/// `⊗(a, b, c) = a ⊗ (b ⊗ c)`. A single operator is returned unchanged;
/// an empty sequence yields `None`.
pub fn kron_all<T: OpScalar>(ops: Vec<LinOp<T>>) -> Option<LinOp<T>> {
    let mut it = ops.into_iter().rev();
    let last = it.next()?;
    Some(it.fold(last, |acc, op| kron(op, acc)))
}

/// Attach workspaces sized for a representative input `u` and return the
/// operator value carrying them. Idempotent: re-caching for a same-shape `u`
/// keeps the existing buffers.
pub fn cache_operator<T: OpScalar>(mut op: LinOp<T>, u: MatRef<'_, T>) -> Result<LinOp<T>, OpError> {
    op.allocate_caches(u)?;
    Ok(op)
}

/// `(uᴴ·L)ᴴ`, i.e. the operator applied on the right of a row vector.
pub fn left_apply<T: OpScalar>(l: &LinOp<T>, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
    l.adjoint().apply(u)
}

/// In-place form of [`left_apply`]. Falls back to the allocating path when
/// the dualized operator has no workspace of its own.
pub fn left_apply_into<T: OpScalar>(
    v: &mut Mat<T>,
    l: &LinOp<T>,
    u: MatRef<'_, T>,
) -> Result<(), OpError> {
    let mut dual = l.adjoint();
    match dual.apply_into(v, u) {
        Err(OpError::CacheNotInitialized { .. }) => {
            let w = dual.apply(u)?;
            v.copy_from(&w);
            Ok(())
        }
        other => other,
    }
}

/// `Lᴴ \ u`, the solve against the dualized operator.
pub fn left_solve<T: OpScalar>(l: &LinOp<T>, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
    l.adjoint().solve(u)
}

/// `u ← Lᴴ \ u`.
pub fn left_solve_in_place<T: OpScalar>(l: &LinOp<T>, u: &mut Mat<T>) -> Result<(), OpError> {
    let mut dual = l.adjoint();
    match dual.solve_in_place(u) {
        Err(OpError::CacheNotInitialized { .. }) => {
            let w = dual.solve(u.as_ref())?;
            u.copy_from(&w);
            Ok(())
        }
        other => other,
    }
}
