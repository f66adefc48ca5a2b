//! Lazy adjoint and transpose wrappers.
//!
//! These wrap an operator that lacks a native adjoint. A wrapper reverses
//! the inner shape and supports the *dual* application forms only: by
//! `(uᴴ·Aᴴ)ᴴ = A·u`, left-applying the wrapper routes through the inner
//! operator's forward apply, and `adjoint` unwraps back to the inner
//! operator. Right-applying a wrapper is an unsupported-capability fault.

use std::fmt;

use faer::{Mat, MatRef};

use crate::core::traits::{NormKind, OpScalar};
use crate::error::OpError;
use crate::operator::LinOp;

macro_rules! dual_wrapper {
    ($name:ident, $kind:literal) => {
        #[derive(Clone)]
        pub struct $name<T: OpScalar> {
            inner: Box<LinOp<T>>,
        }

        impl<T: OpScalar> $name<T> {
            pub(crate) const KIND: &'static str = $kind;

            pub fn new(inner: LinOp<T>) -> Self {
                $name {
                    inner: Box::new(inner),
                }
            }

            /// The wrapped operator.
            pub fn into_inner(self) -> LinOp<T> {
                *self.inner
            }

            pub fn inner(&self) -> &LinOp<T> {
                &self.inner
            }

            pub fn nrows(&self) -> usize {
                self.inner.ncols()
            }

            pub fn ncols(&self) -> usize {
                self.inner.nrows()
            }

            pub fn size(&self) -> (usize, usize) {
                (self.nrows(), self.ncols())
            }

            pub fn apply(&self, _u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
                Err(OpError::unsupported("mul", Self::KIND, self.size()))
            }

            pub fn solve(&self, _u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
                Err(OpError::unsupported("ldiv", Self::KIND, self.size()))
            }

            pub fn update_coefficients(&mut self, u: MatRef<'_, T>, p: &[T], t: T) {
                self.inner.update_coefficients(u, p, t);
            }

            pub(crate) fn allocate_caches(&mut self, _u: MatRef<'_, T>) -> Result<(), OpError> {
                // the dual forms route through the inner operator's
                // allocating entry points, which need no workspace
                Ok(())
            }

            pub fn to_dense(&self) -> Result<Mat<T>, OpError> {
                Ok(self.inner.to_dense()?.as_ref().transpose().to_owned())
            }

            pub fn opnorm(&self, kind: NormKind) -> Result<T, OpError> {
                // ‖Aᴴ‖₁ = ‖A‖∞ and vice versa; the spectral and Frobenius
                // norms are invariant.
                let dual = match kind {
                    NormKind::One => NormKind::Inf,
                    NormKind::Inf => NormKind::One,
                    other => other,
                };
                self.inner.opnorm(dual)
            }
        }

        impl<T: OpScalar> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("size", &self.size())
                    .finish()
            }
        }
    };
}

dual_wrapper!(AdjointOperator, "adjoint");
dual_wrapper!(TransposeOperator, "transpose");
