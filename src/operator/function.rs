//! Matrix-free operator defined by user callables.
//!
//! A `FunctionOperator` carries up to four callables: forward, adjoint,
//! inverse, and adjoint-inverse. Each callable is either out-of-place
//! (`op(u, p, t) → v`) or in-place (`op(v, u, p, t)`, expected to be
//! allocation-free); the placement of the forward callable fixes the
//! placement for all four and decides which half of the interface the
//! operator advertises. The current `(p, t)` pair is stored on the operator
//! and rebound by `update_coefficients`.

use std::fmt;
use std::rc::Rc;

use faer::{Mat, MatRef};

use crate::core::traits::{NormKind, OpScalar};
use crate::error::OpError;
use crate::matrix::dense;

/// Out-of-place callable: `(u, p, t) → v`.
pub type OopFn<T> = Rc<dyn Fn(MatRef<'_, T>, &[T], T) -> Mat<T>>;

/// In-place callable: `(v, u, p, t)`, writing `v` without allocating.
pub type IipFn<T> = Rc<dyn Fn(&mut Mat<T>, MatRef<'_, T>, &[T], T)>;

/// A user callable in one of the two placements.
#[derive(Clone)]
pub enum OpFn<T> {
    OutOfPlace(OopFn<T>),
    InPlace(IipFn<T>),
}

impl<T> OpFn<T> {
    pub fn out_of_place(f: impl Fn(MatRef<'_, T>, &[T], T) -> Mat<T> + 'static) -> Self {
        OpFn::OutOfPlace(Rc::new(f))
    }

    pub fn in_place(f: impl Fn(&mut Mat<T>, MatRef<'_, T>, &[T], T) + 'static) -> Self {
        OpFn::InPlace(Rc::new(f))
    }

    fn is_in_place(&self) -> bool {
        matches!(self, OpFn::InPlace(_))
    }
}

/// Stored operator norm: a constant or a norm-kind-dependent closure.
#[derive(Clone)]
pub enum OpNorm<T> {
    Value(T),
    Func(Rc<dyn Fn(NormKind) -> T>),
}

/// Declared properties of a matrix-free operator.
#[derive(Clone)]
pub struct FnTraits<T> {
    pub opnorm: Option<OpNorm<T>>,
    pub symmetric: bool,
    pub hermitian: bool,
    pub posdef: bool,
    pub constant: bool,
}

impl<T> Default for FnTraits<T> {
    fn default() -> Self {
        FnTraits {
            opnorm: None,
            symmetric: false,
            hermitian: false,
            posdef: false,
            constant: false,
        }
    }
}

#[derive(Clone)]
pub struct FunctionOperator<T: OpScalar> {
    fwd: OpFn<T>,
    adj: Option<OpFn<T>>,
    inv: Option<OpFn<T>>,
    adj_inv: Option<OpFn<T>>,
    size: (usize, usize),
    traits: FnTraits<T>,
    p: Vec<T>,
    t: T,
    cache: Option<Mat<T>>,
}

impl<T: OpScalar> FunctionOperator<T> {
    pub(crate) const KIND: &'static str = "function";

    /// New operator from a forward callable, its shape, and its declared
    /// traits. `t` starts at zero and `p` empty until rebound.
    pub fn new(fwd: OpFn<T>, size: (usize, usize), traits: FnTraits<T>) -> Self {
        FunctionOperator {
            fwd,
            adj: None,
            inv: None,
            adj_inv: None,
            size,
            traits,
            p: Vec::new(),
            t: T::zero(),
            cache: None,
        }
    }

    /// Attach an adjoint callable.
    ///
    /// # Panics
    /// Panics if the placement disagrees with the forward callable.
    pub fn with_adjoint(mut self, f: OpFn<T>) -> Self {
        assert_eq!(
            f.is_in_place(),
            self.iip(),
            "adjoint callable placement must match the forward callable"
        );
        self.adj = Some(f);
        self
    }

    /// Attach an inverse callable.
    ///
    /// # Panics
    /// Panics if the placement disagrees with the forward callable.
    pub fn with_inverse(mut self, f: OpFn<T>) -> Self {
        assert_eq!(
            f.is_in_place(),
            self.iip(),
            "inverse callable placement must match the forward callable"
        );
        self.inv = Some(f);
        self
    }

    /// Attach an adjoint-inverse callable.
    ///
    /// # Panics
    /// Panics if the placement disagrees with the forward callable.
    pub fn with_adjoint_inverse(mut self, f: OpFn<T>) -> Self {
        assert_eq!(
            f.is_in_place(),
            self.iip(),
            "adjoint-inverse callable placement must match the forward callable"
        );
        self.adj_inv = Some(f);
        self
    }

    /// Bind initial parameters.
    pub fn with_params(mut self, p: &[T]) -> Self {
        self.p = p.to_vec();
        self
    }

    /// Bind an initial time.
    pub fn at_time(mut self, t: T) -> Self {
        self.t = t;
        self
    }

    /// In-place flag: fixed by the forward callable's placement.
    pub fn iip(&self) -> bool {
        self.fwd.is_in_place()
    }

    pub fn nrows(&self) -> usize {
        self.size.0
    }

    pub fn ncols(&self) -> usize {
        self.size.1
    }

    pub fn size(&self) -> (usize, usize) {
        self.size
    }

    pub fn is_square(&self) -> bool {
        self.size.0 == self.size.1
    }

    /// Self-adjoint by declaration: hermitian, or symmetric over the real
    /// scalar field.
    pub fn self_adjoint(&self) -> bool {
        self.traits.hermitian || self.traits.symmetric
    }

    /// Adjoint callable, deriving it from the forward callable for a
    /// self-adjoint operator.
    fn adjoint_fn(&self) -> Option<&OpFn<T>> {
        self.adj
            .as_ref()
            .or_else(|| self.self_adjoint().then_some(&self.fwd))
    }

    /// Adjoint-inverse callable, deriving it from the inverse for a
    /// self-adjoint operator.
    fn adjoint_inverse_fn(&self) -> Option<&OpFn<T>> {
        self.adj_inv
            .as_ref()
            .or_else(|| self.self_adjoint().then(|| self.inv.as_ref()).flatten())
    }

    pub fn has_mul(&self) -> bool {
        !self.iip()
    }

    pub fn has_mul_inplace(&self) -> bool {
        self.iip()
    }

    pub fn has_ldiv(&self) -> bool {
        self.inv.is_some() && !self.iip()
    }

    pub fn has_ldiv_inplace(&self) -> bool {
        self.inv.is_some() && self.iip()
    }

    pub fn has_adjoint(&self) -> bool {
        self.adjoint_fn().is_some()
    }

    pub fn is_constant(&self) -> bool {
        self.traits.constant
    }

    pub fn is_symmetric(&self) -> bool {
        self.traits.symmetric
    }

    pub fn is_hermitian(&self) -> bool {
        self.traits.hermitian
    }

    pub fn is_posdef(&self) -> bool {
        self.traits.posdef
    }

    fn check_input(&self, rows: usize, u: MatRef<'_, T>) -> Result<(), OpError> {
        if u.nrows() != rows {
            return Err(OpError::shape(Self::KIND, self.size, (u.nrows(), u.ncols())));
        }
        Ok(())
    }

    pub fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        self.check_input(self.size.1, u)?;
        match &self.fwd {
            OpFn::OutOfPlace(f) => Ok(f(u, &self.p, self.t)),
            OpFn::InPlace(_) => Err(OpError::unsupported("mul", Self::KIND, self.size)),
        }
    }

    pub fn apply_into(&self, v: &mut Mat<T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.check_input(self.size.1, u)?;
        if v.nrows() != self.size.0 || v.ncols() != u.ncols() {
            return Err(OpError::shape(Self::KIND, self.size, (v.nrows(), v.ncols())));
        }
        match &self.fwd {
            OpFn::InPlace(f) => {
                f(v, u, &self.p, self.t);
                Ok(())
            }
            OpFn::OutOfPlace(_) => Err(OpError::unsupported("mul!", Self::KIND, self.size)),
        }
    }

    /// `v ← α·(L·u) + β·v`: snapshots `v` into the workspace, computes the
    /// operator into `v`, then recombines.
    pub fn gemm_into(
        &mut self,
        v: &mut Mat<T>,
        u: MatRef<'_, T>,
        alpha: T,
        beta: T,
    ) -> Result<(), OpError> {
        self.check_input(self.size.1, u)?;
        let f = match &self.fwd {
            OpFn::InPlace(f) => Rc::clone(f),
            OpFn::OutOfPlace(_) => {
                return Err(OpError::unsupported("mul!", Self::KIND, self.size))
            }
        };
        let cache = self
            .cache
            .as_mut()
            .filter(|c| c.nrows() == v.nrows() && c.ncols() == v.ncols())
            .ok_or_else(|| OpError::cache(Self::KIND, self.size))?;
        cache.copy_from(&*v);
        f(v, u, &self.p, self.t);
        dense::scale_in_place(v, alpha);
        dense::axpy_in_place(v, beta, cache.as_ref());
        Ok(())
    }

    pub fn solve(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        self.check_input(self.size.0, u)?;
        match &self.inv {
            Some(OpFn::OutOfPlace(f)) => Ok(f(u, &self.p, self.t)),
            _ => Err(OpError::unsupported("ldiv", Self::KIND, self.size)),
        }
    }

    pub fn solve_into(&self, v: &mut Mat<T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.check_input(self.size.0, u)?;
        if v.nrows() != self.size.1 || v.ncols() != u.ncols() {
            return Err(OpError::shape(Self::KIND, self.size, (v.nrows(), v.ncols())));
        }
        match &self.inv {
            Some(OpFn::InPlace(f)) => {
                f(v, u, &self.p, self.t);
                Ok(())
            }
            _ => Err(OpError::unsupported("ldiv!", Self::KIND, self.size)),
        }
    }

    /// `u ← L⁻¹·u`: snapshots `u` into the workspace and re-solves into `u`.
    pub fn solve_in_place(&mut self, u: &mut Mat<T>) -> Result<(), OpError> {
        self.check_input(self.size.0, u.as_ref())?;
        let f = match &self.inv {
            Some(OpFn::InPlace(f)) => Rc::clone(f),
            _ => return Err(OpError::unsupported("ldiv!", Self::KIND, self.size)),
        };
        let cache = self
            .cache
            .as_mut()
            .filter(|c| c.nrows() == u.nrows() && c.ncols() == u.ncols())
            .ok_or_else(|| OpError::cache(Self::KIND, self.size))?;
        cache.copy_from(&*u);
        f(u, cache.as_ref(), &self.p, self.t);
        Ok(())
    }

    /// Rebind `(p, t)`; subsequent applies observe the new pair.
    pub fn update_coefficients(&mut self, _u: MatRef<'_, T>, p: &[T], t: T) {
        self.p = p.to_vec();
        self.t = t;
    }

    /// Native adjoint: `None` when no adjoint callable exists (callers fall
    /// back to the lazy wrapper). A self-adjoint operator returns itself
    /// unchanged; otherwise the callable pairs swap, the shape reverses, and
    /// the workspace survives only when the operator is square.
    pub fn adjoint_operator(&self) -> Option<FunctionOperator<T>> {
        if self.self_adjoint() {
            return Some(self.clone());
        }
        let fwd = self.adjoint_fn()?.clone();
        Some(FunctionOperator {
            fwd,
            adj: Some(self.fwd.clone()),
            inv: self.adjoint_inverse_fn().cloned(),
            adj_inv: self.inv.clone(),
            size: (self.size.1, self.size.0),
            traits: self.traits.clone(),
            p: self.p.clone(),
            t: self.t,
            cache: if self.is_square() {
                self.cache.clone()
            } else {
                None
            },
        })
    }

    /// Stored operator norm from the traits record.
    pub fn opnorm(&self, kind: NormKind) -> Result<T, OpError> {
        match &self.traits.opnorm {
            Some(OpNorm::Value(x)) => Ok(*x),
            Some(OpNorm::Func(f)) => Ok(f(kind)),
            None => Err(OpError::attribute(Self::KIND, self.size, "opnorm")),
        }
    }

    /// Workspace the shape of the output, for the 5-argument form and the
    /// self-solve. Idempotent for a same-shape representative input.
    pub(crate) fn allocate_caches(&mut self, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.check_input(self.size.1, u)?;
        let (rows, cols) = (self.size.0, u.ncols());
        let fits = self
            .cache
            .as_ref()
            .is_some_and(|c| c.nrows() == rows && c.ncols() == cols);
        if !fits {
            self.cache = Some(Mat::zeros(rows, cols));
        }
        Ok(())
    }

    pub(crate) fn is_cached(&self) -> bool {
        self.cache.is_some()
    }
}

impl<T: OpScalar> fmt::Debug for FunctionOperator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionOperator")
            .field("size", &self.size)
            .field("iip", &self.iip())
            .field("has_adjoint", &self.has_adjoint())
            .field("has_ldiv", &(self.inv.is_some()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use faer::Mat;

    fn scaling_op(factor: f64, n: usize) -> FunctionOperator<f64> {
        FunctionOperator::new(
            OpFn::out_of_place(move |u, _p, _t| {
                Mat::from_fn(u.nrows(), u.ncols(), |i, j| factor * u[(i, j)])
            }),
            (n, n),
            FnTraits {
                symmetric: true,
                ..FnTraits::default()
            },
        )
        .with_inverse(OpFn::out_of_place(move |u, _p, _t| {
            Mat::from_fn(u.nrows(), u.ncols(), |i, j| u[(i, j)] / factor)
        }))
    }

    #[test]
    fn out_of_place_apply_and_solve() {
        let op = scaling_op(3.0, 4);
        assert!(op.has_mul());
        assert!(!op.has_mul_inplace());
        assert!(op.has_ldiv());
        assert!(!op.has_ldiv_inplace());
        let u = Mat::from_fn(4, 1, |i, _| (i + 1) as f64);
        let v = op.apply(u.as_ref()).unwrap();
        let w = op.solve(v.as_ref()).unwrap();
        for i in 0..4 {
            assert_abs_diff_eq!(v[(i, 0)], 3.0 * (i + 1) as f64, epsilon = 1e-14);
            assert_abs_diff_eq!(w[(i, 0)], (i + 1) as f64, epsilon = 1e-14);
        }
    }

    #[test]
    fn self_adjoint_reuses_forward() {
        let op = scaling_op(2.0, 3);
        assert!(op.has_adjoint());
        let adj = op.adjoint_operator().unwrap();
        let u = Mat::from_fn(3, 1, |i, _| i as f64);
        let a = adj.apply(u.as_ref()).unwrap();
        let b = op.apply(u.as_ref()).unwrap();
        for i in 0..3 {
            assert_eq!(a[(i, 0)], b[(i, 0)]);
        }
    }

    #[test]
    fn in_place_gemm_requires_cache() {
        let mut op = FunctionOperator::new(
            OpFn::in_place(|v: &mut Mat<f64>, u, _p, _t| {
                for j in 0..u.ncols() {
                    for i in 0..u.nrows() {
                        v[(i, j)] = 2.0 * u[(i, j)];
                    }
                }
            }),
            (3, 3),
            FnTraits::default(),
        );
        let u = Mat::from_fn(3, 1, |i, _| (i + 1) as f64);
        let mut v = Mat::from_fn(3, 1, |_, _| 1.0);
        assert!(matches!(
            op.gemm_into(&mut v, u.as_ref(), 1.0, 1.0),
            Err(OpError::CacheNotInitialized { .. })
        ));
        op.allocate_caches(u.as_ref()).unwrap();
        op.gemm_into(&mut v, u.as_ref(), 3.0, 2.0).unwrap();
        // v = 3*2*u + 2*1
        for i in 0..3 {
            assert_abs_diff_eq!(v[(i, 0)], 6.0 * (i + 1) as f64 + 2.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn update_rebinds_time() {
        let mut op = FunctionOperator::new(
            OpFn::out_of_place(|u, _p, t| Mat::from_fn(u.nrows(), u.ncols(), |_, _| t)),
            (2, 2),
            FnTraits::default(),
        );
        let u = Mat::zeros(2, 1);
        let before = op.apply(u.as_ref()).unwrap();
        assert_eq!(before[(0, 0)], 0.0);
        op.update_coefficients(u.as_ref(), &[], 5.0);
        let after = op.apply(u.as_ref()).unwrap();
        assert_eq!(after[(0, 0)], 5.0);
    }
}
