//! Operator wrapping a dense factorization.
//!
//! `InvertibleOperator` holds a factorization of a square matrix together
//! with the matrix it was computed from. The factorization drives `solve`;
//! the stored matrix serves the forward apply, materialization, and the
//! operator norm. The adjoint is a handle over the same factorization that
//! switches to the transpose-solve view.

use std::fmt;
use std::rc::Rc;

use faer::linalg::solvers::{FullPivLu, Lblt, Ldlt, Llt, Qr, SolveCore, Svd};
use faer::{Conj, Mat, MatMut, MatRef, Side};

use crate::core::traits::{NormKind, OpScalar};
use crate::error::OpError;
use crate::matrix::dense;

/// Factorization kinds accepted by [`crate::factorize`] and friends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FactorKind {
    /// LU with full pivoting.
    Lu,
    Qr,
    /// Cholesky LLᵀ; requires positive definiteness.
    Cholesky,
    Ldlt,
    /// Bunch–Kaufman LBLᵀ.
    BunchKaufman,
    Svd,
}

pub enum Factorization<T: OpScalar> {
    Lu(FullPivLu<T>),
    Qr(Qr<T>),
    Llt(Llt<T>),
    Ldlt(Ldlt<T>),
    Lblt(Lblt<T>),
    Svd(Svd<T>),
}

fn solve_dispatch<T: OpScalar, F: SolveCore<T>>(f: &F, rhs: MatMut<'_, T>, transposed: bool) {
    if transposed {
        f.solve_transpose_in_place_with_conj(Conj::No, rhs);
    } else {
        f.solve_in_place_with_conj(Conj::No, rhs);
    }
}

impl<T: OpScalar> Factorization<T> {
    /// Factor a square matrix. The fallible kernels (Cholesky, LDLᵀ, SVD)
    /// surface their failure here.
    pub fn compute(kind: FactorKind, a: MatRef<'_, T>) -> Result<Self, OpError> {
        Ok(match kind {
            FactorKind::Lu => Factorization::Lu(FullPivLu::new(a)),
            FactorKind::Qr => Factorization::Qr(Qr::new(a)),
            FactorKind::Cholesky => Factorization::Llt(
                Llt::new(a, Side::Lower).map_err(|e| OpError::FactorError(format!("{e:?}")))?,
            ),
            FactorKind::Ldlt => Factorization::Ldlt(
                Ldlt::new(a, Side::Lower).map_err(|e| OpError::FactorError(format!("{e:?}")))?,
            ),
            FactorKind::BunchKaufman => Factorization::Lblt(Lblt::new(a, Side::Lower)),
            FactorKind::Svd => Factorization::Svd(
                Svd::new(a).map_err(|e| OpError::FactorError(format!("{e:?}")))?,
            ),
        })
    }

    /// Solve in place, optionally against the transposed factorization.
    fn solve_in_place(&self, rhs: MatMut<'_, T>, transposed: bool) {
        match self {
            Factorization::Lu(f) => solve_dispatch(f, rhs, transposed),
            Factorization::Qr(f) => solve_dispatch(f, rhs, transposed),
            Factorization::Llt(f) => solve_dispatch(f, rhs, transposed),
            Factorization::Ldlt(f) => solve_dispatch(f, rhs, transposed),
            Factorization::Lblt(f) => solve_dispatch(f, rhs, transposed),
            Factorization::Svd(f) => solve_dispatch(f, rhs, transposed),
        }
    }

    fn kind(&self) -> FactorKind {
        match self {
            Factorization::Lu(_) => FactorKind::Lu,
            Factorization::Qr(_) => FactorKind::Qr,
            Factorization::Llt(_) => FactorKind::Cholesky,
            Factorization::Ldlt(_) => FactorKind::Ldlt,
            Factorization::Lblt(_) => FactorKind::BunchKaufman,
            Factorization::Svd(_) => FactorKind::Svd,
        }
    }
}

#[derive(Clone)]
pub struct InvertibleOperator<T: OpScalar> {
    factor: Rc<Factorization<T>>,
    source: Rc<Mat<T>>,
    adjoint: bool,
}

impl<T: OpScalar> InvertibleOperator<T> {
    pub(crate) const KIND: &'static str = "invertible";

    /// Factor `a` and wrap the result. `a` must be square.
    pub fn new(kind: FactorKind, a: Mat<T>) -> Result<Self, OpError> {
        if a.nrows() != a.ncols() {
            return Err(OpError::unsupported(
                "factorize",
                Self::KIND,
                (a.nrows(), a.ncols()),
            ));
        }
        let factor = Factorization::compute(kind, a.as_ref())?;
        Ok(InvertibleOperator {
            factor: Rc::new(factor),
            source: Rc::new(a),
            adjoint: false,
        })
    }

    /// Kind of the wrapped factorization.
    pub fn factor_kind(&self) -> FactorKind {
        self.factor.kind()
    }

    /// Whether the factorization succeeded. Fallible kernels reject at
    /// construction, so a held value always answers `true`; the query is kept
    /// for post-hoc use after [`Self::new`].
    pub fn is_success(&self) -> bool {
        true
    }

    pub fn nrows(&self) -> usize {
        self.source.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.source.ncols()
    }

    pub fn size(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    fn source_view(&self) -> MatRef<'_, T> {
        if self.adjoint {
            (*self.source).as_ref().transpose()
        } else {
            (*self.source).as_ref()
        }
    }

    fn check_rows(&self, u: MatRef<'_, T>) -> Result<(), OpError> {
        if u.nrows() != self.nrows() {
            return Err(OpError::shape(Self::KIND, self.size(), (u.nrows(), u.ncols())));
        }
        Ok(())
    }

    /// Forward apply through the factored matrix.
    pub fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        self.check_rows(u)?;
        let mut v = Mat::zeros(self.nrows(), u.ncols());
        dense::gemm_into(&mut v, self.source_view(), u, T::one(), T::zero());
        Ok(v)
    }

    pub fn gemm_into(
        &self,
        v: &mut Mat<T>,
        u: MatRef<'_, T>,
        alpha: T,
        beta: T,
    ) -> Result<(), OpError> {
        self.check_rows(u)?;
        if v.nrows() != self.nrows() || v.ncols() != u.ncols() {
            return Err(OpError::shape(Self::KIND, self.size(), (v.nrows(), v.ncols())));
        }
        dense::gemm_into(v, self.source_view(), u, alpha, beta);
        Ok(())
    }

    pub fn solve(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        self.check_rows(u)?;
        let mut v = u.to_owned();
        self.factor.solve_in_place(v.as_mut(), self.adjoint);
        Ok(v)
    }

    pub fn solve_into(&self, v: &mut Mat<T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.check_rows(u)?;
        if v.nrows() != self.nrows() || v.ncols() != u.ncols() {
            return Err(OpError::shape(Self::KIND, self.size(), (v.nrows(), v.ncols())));
        }
        v.copy_from(u);
        self.factor.solve_in_place(v.as_mut(), self.adjoint);
        Ok(())
    }

    pub fn solve_in_place(&self, u: &mut Mat<T>) -> Result<(), OpError> {
        self.check_rows(u.as_ref())?;
        self.factor.solve_in_place(u.as_mut(), self.adjoint);
        Ok(())
    }

    /// Adjoint handle over the same factorization (transpose-solve view).
    pub fn adjoint_operator(&self) -> InvertibleOperator<T> {
        InvertibleOperator {
            factor: Rc::clone(&self.factor),
            source: Rc::clone(&self.source),
            adjoint: !self.adjoint,
        }
    }

    /// Reciprocal of the factored matrix's norm: an optimistic bound for the
    /// condition of a solve through this operator.
    pub fn opnorm(&self, kind: NormKind) -> T {
        T::one() / dense::opnorm_dense(self.source_view(), kind)
    }

    pub fn to_dense(&self) -> Mat<T> {
        self.source_view().to_owned()
    }
}

impl<T: OpScalar> fmt::Debug for InvertibleOperator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvertibleOperator")
            .field("size", &self.size())
            .field("factor", &self.factor.kind())
            .field("adjoint", &self.adjoint)
            .finish()
    }
}
