//! Lazy Kronecker product of two operators.
//!
//! `TensorProductOperator` represents `outer ⊗ inner` without forming the
//! product matrix, under the convention
//! `(outer ⊗ inner)·vec(U) = vec(inner · U · outerᵀ)` where a length
//! `ncols(inner)·ncols(outer)` vector reshapes into `U` with `ncols(inner)`
//! rows (inner index varies fastest).
//!
//! Applying to a `k`-column input runs the three-axis pipeline: reshape the
//! input to `(nᵢ, nₒ·k)`, apply `inner`, permute axes `(2,1,3)` to
//! `(nₒ, mᵢ·k)`, apply `outer`, and permute back into the output. The
//! permutes are strided copies; the two products go through the
//! sub-operators, so they hit GEMM whenever the sub-operator is concrete.
//! Solving runs the same pipeline with `inner⁻¹` and `outer⁻¹`.
//!
//! Two shapes short-circuit: an identity `outer` skips the second product
//! entirely, and a single-column input replaces the permute with a transposed
//! view fed straight to the outer apply.

use std::fmt;

use faer::{Mat, MatRef};

use crate::core::traits::{NormKind, OpScalar};
use crate::error::OpError;
use crate::matrix::dense;
use crate::operator::LinOp;

/// Workspace set sized for a representative `k`-column input.
#[derive(Clone, Debug)]
struct TensorCache<T> {
    /// Reshaped input, `(nᵢ, nₒ·k)`.
    stage: Mat<T>,
    /// Inner product, `(mᵢ, nₒ·k)`.
    inner_out: Mat<T>,
    /// Permuted inner product, `(nₒ, mᵢ·k)`.
    perm: Mat<T>,
    /// Outer product, `(mₒ, mᵢ·k)`.
    outer_out: Mat<T>,
    /// Output snapshot for the 5-argument form, `(mₒ·mᵢ, k)`.
    snapshot: Mat<T>,
    k: usize,
}

#[derive(Clone)]
pub struct TensorProductOperator<T: OpScalar> {
    outer: Box<LinOp<T>>,
    inner: Box<LinOp<T>>,
    cache: Option<TensorCache<T>>,
}

/// stage (nᵢ, nₒ·k) ← u (nᵢ·nₒ, k).
fn stage_from_input<T: OpScalar>(stage: &mut Mat<T>, u: MatRef<'_, T>, ni: usize, no: usize) {
    for j in 0..u.ncols() {
        for o in 0..no {
            for i in 0..ni {
                stage[(i, o + j * no)] = u[(i + o * ni, j)];
            }
        }
    }
}

/// perm (nₒ, mᵢ·k) ← c (mᵢ, nₒ·k): the (2,1,3) axis permutation.
fn permute_axes<T: OpScalar>(perm: &mut Mat<T>, c: MatRef<'_, T>, mi: usize, no: usize) {
    let k = c.ncols() / no;
    for j in 0..k {
        for o in 0..no {
            for i in 0..mi {
                perm[(o, i + j * mi)] = c[(i, o + j * no)];
            }
        }
    }
}

/// v (mₒ·mᵢ, k) ← w (mₒ, mᵢ·k): the inverse permutation into the output.
fn unpermute_into<T: OpScalar>(v: &mut Mat<T>, w: MatRef<'_, T>, mi: usize, mo: usize) {
    let k = w.ncols() / mi;
    for j in 0..k {
        for o in 0..mo {
            for i in 0..mi {
                v[(i + o * mi, j)] = w[(o, i + j * mi)];
            }
        }
    }
}

/// v (nₒ·mᵢ, k) ← c (mᵢ, nₒ·k): identity-outer shortcut, a pure gather.
fn gather_into<T: OpScalar>(v: &mut Mat<T>, c: MatRef<'_, T>, mi: usize, no: usize) {
    let k = c.ncols() / no;
    for j in 0..k {
        for o in 0..no {
            for i in 0..mi {
                v[(i + o * mi, j)] = c[(i, o + j * no)];
            }
        }
    }
}

impl<T: OpScalar> TensorProductOperator<T> {
    pub(crate) const KIND: &'static str = "tensor-product";

    pub fn new(outer: impl Into<LinOp<T>>, inner: impl Into<LinOp<T>>) -> Self {
        TensorProductOperator {
            outer: Box::new(outer.into()),
            inner: Box::new(inner.into()),
            cache: None,
        }
    }

    pub fn outer(&self) -> &LinOp<T> {
        &self.outer
    }

    pub fn inner(&self) -> &LinOp<T> {
        &self.inner
    }

    pub fn nrows(&self) -> usize {
        self.outer.nrows() * self.inner.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.outer.ncols() * self.inner.ncols()
    }

    pub fn size(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    fn identity_outer(&self) -> bool {
        matches!(self.outer.as_ref(), LinOp::Identity(_))
    }

    fn dims(&self) -> (usize, usize, usize, usize) {
        let (mo, no) = self.outer.size();
        let (mi, ni) = self.inner.size();
        (mo, no, mi, ni)
    }

    fn check_apply_input(&self, u: MatRef<'_, T>) -> Result<(), OpError> {
        if u.nrows() != self.ncols() {
            return Err(OpError::shape(Self::KIND, self.size(), (u.nrows(), u.ncols())));
        }
        Ok(())
    }

    fn check_solve_input(&self, u: MatRef<'_, T>) -> Result<(), OpError> {
        if !self.outer.is_square() || !self.inner.is_square() {
            return Err(OpError::unsupported("ldiv", Self::KIND, self.size()));
        }
        if u.nrows() != self.nrows() {
            return Err(OpError::shape(Self::KIND, self.size(), (u.nrows(), u.ncols())));
        }
        Ok(())
    }

    pub fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        self.check_apply_input(u)?;
        let (mo, no, mi, ni) = self.dims();
        let k = u.ncols();
        let mut stage = Mat::zeros(ni, no * k);
        stage_from_input(&mut stage, u, ni, no);
        let c = self.inner.apply(stage.as_ref())?;
        let mut v = Mat::zeros(mo * mi, k);
        if self.identity_outer() {
            gather_into(&mut v, c.as_ref(), mi, no);
        } else if k == 1 {
            let w = self.outer.apply(c.as_ref().transpose())?;
            unpermute_into(&mut v, w.as_ref(), mi, mo);
        } else {
            let mut perm = Mat::zeros(no, mi * k);
            permute_axes(&mut perm, c.as_ref(), mi, no);
            let w = self.outer.apply(perm.as_ref())?;
            unpermute_into(&mut v, w.as_ref(), mi, mo);
        }
        Ok(v)
    }

    pub fn apply_into(&mut self, v: &mut Mat<T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.check_apply_input(u)?;
        let size = self.size();
        let (mo, no, mi, ni) = self.dims();
        let k = u.ncols();
        if v.nrows() != mo * mi || v.ncols() != k {
            return Err(OpError::shape(Self::KIND, size, (v.nrows(), v.ncols())));
        }
        let identity_outer = self.identity_outer();
        let Some(cache) = self.cache.as_mut().filter(|c| c.k == k) else {
            return Err(OpError::cache(Self::KIND, size));
        };
        let TensorCache {
            stage,
            inner_out,
            perm,
            outer_out,
            ..
        } = cache;
        stage_from_input(stage, u, ni, no);
        self.inner.apply_into(inner_out, stage.as_ref())?;
        if identity_outer {
            gather_into(v, inner_out.as_ref(), mi, no);
            return Ok(());
        }
        if k == 1 {
            self.outer
                .apply_into(outer_out, inner_out.as_ref().transpose())?;
        } else {
            permute_axes(perm, inner_out.as_ref(), mi, no);
            self.outer.apply_into(outer_out, perm.as_ref())?;
        }
        unpermute_into(v, outer_out.as_ref(), mi, mo);
        Ok(())
    }

    /// `v ← α·(L·u) + β·v` through the snapshot workspace.
    pub fn gemm_into(
        &mut self,
        v: &mut Mat<T>,
        u: MatRef<'_, T>,
        alpha: T,
        beta: T,
    ) -> Result<(), OpError> {
        let size = self.size();
        {
            let Some(cache) = self.cache.as_mut().filter(|c| c.k == u.ncols()) else {
                return Err(OpError::cache(Self::KIND, size));
            };
            if cache.snapshot.nrows() != v.nrows() || cache.snapshot.ncols() != v.ncols() {
                return Err(OpError::shape(Self::KIND, size, (v.nrows(), v.ncols())));
            }
            cache.snapshot.copy_from(&*v);
        }
        self.apply_into(v, u)?;
        let Some(cache) = self.cache.as_ref() else {
            return Err(OpError::cache(Self::KIND, size));
        };
        dense::axpby_in_place(v, beta, cache.snapshot.as_ref(), alpha);
        Ok(())
    }

    pub fn solve(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        self.check_solve_input(u)?;
        let (mo, no, mi, ni) = self.dims();
        let k = u.ncols();
        let mut stage = Mat::zeros(ni, no * k);
        stage_from_input(&mut stage, u, ni, no);
        let c = self.inner.solve(stage.as_ref())?;
        let mut v = Mat::zeros(mo * mi, k);
        if self.identity_outer() {
            gather_into(&mut v, c.as_ref(), mi, no);
        } else if k == 1 {
            let w = self.outer.solve(c.as_ref().transpose())?;
            unpermute_into(&mut v, w.as_ref(), mi, mo);
        } else {
            let mut perm = Mat::zeros(no, mi * k);
            permute_axes(&mut perm, c.as_ref(), mi, no);
            let w = self.outer.solve(perm.as_ref())?;
            unpermute_into(&mut v, w.as_ref(), mi, mo);
        }
        Ok(v)
    }

    pub fn solve_into(&mut self, v: &mut Mat<T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.check_solve_input(u)?;
        let size = self.size();
        let (mo, no, mi, ni) = self.dims();
        let k = u.ncols();
        if v.nrows() != mo * mi || v.ncols() != k {
            return Err(OpError::shape(Self::KIND, size, (v.nrows(), v.ncols())));
        }
        let identity_outer = self.identity_outer();
        let Some(cache) = self.cache.as_mut().filter(|c| c.k == k) else {
            return Err(OpError::cache(Self::KIND, size));
        };
        let TensorCache {
            stage,
            inner_out,
            perm,
            outer_out,
            ..
        } = cache;
        stage_from_input(stage, u, ni, no);
        self.inner.solve_into(inner_out, stage.as_ref())?;
        if identity_outer {
            gather_into(v, inner_out.as_ref(), mi, no);
            return Ok(());
        }
        if k == 1 {
            self.outer
                .solve_into(outer_out, inner_out.as_ref().transpose())?;
        } else {
            permute_axes(perm, inner_out.as_ref(), mi, no);
            self.outer.solve_into(outer_out, perm.as_ref())?;
        }
        unpermute_into(v, outer_out.as_ref(), mi, mo);
        Ok(())
    }

    pub fn solve_in_place(&mut self, u: &mut Mat<T>) -> Result<(), OpError> {
        self.check_solve_input(u.as_ref())?;
        let size = self.size();
        let (mo, no, mi, ni) = self.dims();
        let k = u.ncols();
        let identity_outer = self.identity_outer();
        let Some(cache) = self.cache.as_mut().filter(|c| c.k == k) else {
            return Err(OpError::cache(Self::KIND, size));
        };
        let TensorCache {
            stage,
            inner_out,
            perm,
            outer_out,
            ..
        } = cache;
        stage_from_input(stage, u.as_ref(), ni, no);
        self.inner.solve_into(inner_out, stage.as_ref())?;
        if identity_outer {
            gather_into(u, inner_out.as_ref(), mi, no);
            return Ok(());
        }
        if k == 1 {
            self.outer
                .solve_into(outer_out, inner_out.as_ref().transpose())?;
        } else {
            permute_axes(perm, inner_out.as_ref(), mi, no);
            self.outer.solve_into(outer_out, perm.as_ref())?;
        }
        unpermute_into(u, outer_out.as_ref(), mi, mo);
        Ok(())
    }

    pub fn update_coefficients(&mut self, u: MatRef<'_, T>, p: &[T], t: T) {
        self.outer.update_coefficients(u, p, t);
        self.inner.update_coefficients(u, p, t);
    }

    /// Native adjoint, distributing over the factors; `None` when either
    /// factor lacks one.
    pub fn adjoint_operator(&self) -> Option<TensorProductOperator<T>> {
        if !(self.outer.has_adjoint() && self.inner.has_adjoint()) {
            return None;
        }
        Some(TensorProductOperator {
            outer: Box::new(self.outer.adjoint()),
            inner: Box::new(self.inner.adjoint()),
            cache: None,
        })
    }

    pub fn transpose_operator(&self) -> Option<TensorProductOperator<T>> {
        if !(self.outer.has_adjoint() && self.inner.has_adjoint()) {
            return None;
        }
        Some(TensorProductOperator {
            outer: Box::new(self.outer.transpose()),
            inner: Box::new(self.inner.transpose()),
            cache: None,
        })
    }

    /// Induced norms and the Frobenius norm are multiplicative over ⊗.
    pub fn opnorm(&self, kind: NormKind) -> Result<T, OpError> {
        Ok(self.outer.opnorm(kind)? * self.inner.opnorm(kind)?)
    }

    pub fn to_dense(&self) -> Result<Mat<T>, OpError> {
        let outer = self.outer.to_dense()?;
        let inner = self.inner.to_dense()?;
        Ok(dense::kron_dense(outer.as_ref(), inner.as_ref()))
    }

    /// Allocate (or retarget) the workspace set for inputs shaped like `u`,
    /// then forward caching into the factors: the staging buffer is the
    /// representative input for `inner`, the permuted buffer for `outer`.
    /// Idempotent for a same-shape `u`.
    pub(crate) fn allocate_caches(&mut self, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.check_apply_input(u)?;
        let (mo, no, mi, ni) = self.dims();
        let k = u.ncols().max(1);
        let cache = match self.cache.take() {
            Some(c) if c.k == k => c,
            _ => TensorCache {
                stage: Mat::zeros(ni, no * k),
                inner_out: Mat::zeros(mi, no * k),
                perm: Mat::zeros(no, mi * k),
                outer_out: Mat::zeros(mo, mi * k),
                snapshot: Mat::zeros(mo * mi, k),
                k,
            },
        };
        self.inner.allocate_caches(cache.stage.as_ref())?;
        self.outer.allocate_caches(cache.perm.as_ref())?;
        self.cache = Some(cache);
        Ok(())
    }

    pub(crate) fn is_cached(&self) -> bool {
        self.cache.is_some()
    }
}

impl<T: OpScalar> fmt::Debug for TensorProductOperator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorProductOperator")
            .field("size", &self.size())
            .field("outer", &self.outer.size())
            .field("inner", &self.inner.size())
            .field("cached", &self.is_cached())
            .finish()
    }
}
