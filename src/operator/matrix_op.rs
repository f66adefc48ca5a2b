//! Operator wrapping a mutable dense matrix.
//!
//! `MatrixOperator` owns its matrix behind a shared cell: copying the
//! operator shares the buffer by reference, so an adjoint handle and its
//! parent observe each other's coefficient updates. An optional update hook
//! `φ(A, u, p, t)` refreshes the coefficients in place; an operator without a
//! hook is constant.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use faer::linalg::solvers::Llt;
use faer::{Mat, MatRef, Side};

use crate::core::traits::{NormKind, OpScalar};
use crate::error::OpError;
use crate::matrix::dense;

/// Coefficient refresh hook: mutates the wrapped matrix for a new `(u, p, t)`.
pub type UpdateHook<T> = Rc<dyn Fn(&mut Mat<T>, MatRef<'_, T>, &[T], T)>;

/// Structural class of the wrapped matrix; decides whether a direct solve is
/// advertised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatKind {
    General,
    Diagonal,
    LowerTriangular,
    UpperTriangular,
}

/// Orientation of the shared buffer. Adjoint and transpose handles keep the
/// storage and flip this tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MatView {
    Plain,
    Transpose,
}

#[derive(Clone)]
pub struct MatrixOperator<T> {
    mat: Rc<RefCell<Mat<T>>>,
    view: MatView,
    kind: MatKind,
    hook: Option<UpdateHook<T>>,
}

impl<T: OpScalar> MatrixOperator<T> {
    pub(crate) const KIND: &'static str = "matrix";

    /// Wrap a general matrix.
    pub fn new(a: Mat<T>) -> Self {
        Self::with_kind(a, MatKind::General)
    }

    /// Wrap a matrix with a known structural class. The structure is trusted,
    /// not verified; entries outside the claimed pattern are never read by
    /// the solve kernels.
    pub fn with_kind(a: Mat<T>, kind: MatKind) -> Self {
        MatrixOperator {
            mat: Rc::new(RefCell::new(a)),
            view: MatView::Plain,
            kind,
            hook: None,
        }
    }

    /// Diagonal operator from the diagonal entries.
    pub fn from_diagonal(diag: &[T]) -> Self {
        let n = diag.len();
        let a = Mat::from_fn(n, n, |i, j| if i == j { diag[i] } else { T::zero() });
        Self::with_kind(a, MatKind::Diagonal)
    }

    /// Attach an update hook; the operator is no longer constant.
    pub fn with_update(mut self, hook: impl Fn(&mut Mat<T>, MatRef<'_, T>, &[T], T) + 'static) -> Self {
        self.hook = Some(Rc::new(hook));
        self
    }

    pub fn kind(&self) -> MatKind {
        self.effective_kind()
    }

    pub fn nrows(&self) -> usize {
        let g = self.mat.borrow();
        match self.view {
            MatView::Plain => g.nrows(),
            MatView::Transpose => g.ncols(),
        }
    }

    pub fn ncols(&self) -> usize {
        let g = self.mat.borrow();
        match self.view {
            MatView::Plain => g.ncols(),
            MatView::Transpose => g.nrows(),
        }
    }

    pub fn size(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    /// Run `f` against the oriented view of the shared buffer.
    fn with_view<R>(&self, f: impl FnOnce(MatRef<'_, T>) -> R) -> R {
        let g = self.mat.borrow();
        match self.view {
            MatView::Plain => f(g.as_ref()),
            MatView::Transpose => f(g.as_ref().transpose()),
        }
    }

    fn effective_kind(&self) -> MatKind {
        match (self.kind, self.view) {
            (MatKind::LowerTriangular, MatView::Transpose) => MatKind::UpperTriangular,
            (MatKind::UpperTriangular, MatView::Transpose) => MatKind::LowerTriangular,
            (kind, _) => kind,
        }
    }

    fn check_rows(&self, expect: usize, u: MatRef<'_, T>) -> Result<(), OpError> {
        if u.nrows() != expect {
            return Err(OpError::shape(Self::KIND, self.size(), (u.nrows(), u.ncols())));
        }
        Ok(())
    }

    pub fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        self.check_rows(self.ncols(), u)?;
        let mut v = Mat::zeros(self.nrows(), u.ncols());
        self.with_view(|a| dense::gemm_into(&mut v, a, u, T::one(), T::zero()));
        Ok(v)
    }

    pub fn apply_into(&self, v: &mut Mat<T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.gemm_into(v, u, T::one(), T::zero())
    }

    pub fn gemm_into(
        &self,
        v: &mut Mat<T>,
        u: MatRef<'_, T>,
        alpha: T,
        beta: T,
    ) -> Result<(), OpError> {
        self.check_rows(self.ncols(), u)?;
        if v.nrows() != self.nrows() || v.ncols() != u.ncols() {
            return Err(OpError::shape(Self::KIND, self.size(), (v.nrows(), v.ncols())));
        }
        self.with_view(|a| dense::gemm_into(v, a, u, alpha, beta));
        Ok(())
    }

    pub fn has_ldiv(&self) -> bool {
        self.effective_kind() != MatKind::General
    }

    pub fn solve(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        self.check_rows(self.nrows(), u)?;
        let mut v = u.to_owned();
        self.solve_buffer(&mut v)?;
        Ok(v)
    }

    pub fn solve_into(&self, v: &mut Mat<T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.check_rows(self.nrows(), u)?;
        if v.nrows() != self.ncols() || v.ncols() != u.ncols() {
            return Err(OpError::shape(Self::KIND, self.size(), (v.nrows(), v.ncols())));
        }
        v.copy_from(u);
        self.solve_buffer(v)
    }

    pub fn solve_in_place(&self, u: &mut Mat<T>) -> Result<(), OpError> {
        if u.nrows() != self.nrows() {
            return Err(OpError::shape(Self::KIND, self.size(), (u.nrows(), u.ncols())));
        }
        self.solve_buffer(u)
    }

    /// Substitution kernels. `u` holds the right-hand side on entry and the
    /// solution on exit.
    fn solve_buffer(&self, u: &mut Mat<T>) -> Result<(), OpError> {
        if !self.is_square() {
            return Err(OpError::unsupported("ldiv", Self::KIND, self.size()));
        }
        let kind = self.effective_kind();
        self.with_view(|a| {
            let n = a.nrows();
            let k = u.ncols();
            match kind {
                MatKind::Diagonal => {
                    for j in 0..k {
                        for i in 0..n {
                            u[(i, j)] = u[(i, j)] / a[(i, i)];
                        }
                    }
                    Ok(())
                }
                MatKind::LowerTriangular => {
                    for j in 0..k {
                        for i in 0..n {
                            let mut s = u[(i, j)];
                            for q in 0..i {
                                s -= a[(i, q)] * u[(q, j)];
                            }
                            u[(i, j)] = s / a[(i, i)];
                        }
                    }
                    Ok(())
                }
                MatKind::UpperTriangular => {
                    for j in 0..k {
                        for i in (0..n).rev() {
                            let mut s = u[(i, j)];
                            for q in (i + 1)..n {
                                s -= a[(i, q)] * u[(q, j)];
                            }
                            u[(i, j)] = s / a[(i, i)];
                        }
                    }
                    Ok(())
                }
                MatKind::General => Err(OpError::unsupported("ldiv", Self::KIND, (n, n))),
            }
        })
    }

    pub fn update_coefficients(&mut self, u: MatRef<'_, T>, p: &[T], t: T) {
        if let Some(hook) = &self.hook {
            hook(&mut self.mat.borrow_mut(), u, p, t);
        }
    }

    /// Adjoint handle over the same buffer. Real scalar field, so this is the
    /// transpose.
    pub fn adjoint_operator(&self) -> MatrixOperator<T> {
        self.transpose_operator()
    }

    /// Transpose handle over the same buffer; the update hook keeps operating
    /// on the underlying matrix, which keeps both handles consistent.
    pub fn transpose_operator(&self) -> MatrixOperator<T> {
        MatrixOperator {
            mat: Rc::clone(&self.mat),
            view: match self.view {
                MatView::Plain => MatView::Transpose,
                MatView::Transpose => MatView::Plain,
            },
            kind: self.kind,
            hook: self.hook.clone(),
        }
    }

    pub fn is_constant(&self) -> bool {
        self.hook.is_none()
    }

    pub fn is_square(&self) -> bool {
        self.nrows() == self.ncols()
    }

    pub fn is_symmetric(&self) -> bool {
        self.with_view(dense::is_symmetric_dense)
    }

    pub fn is_posdef(&self) -> bool {
        self.is_symmetric() && self.with_view(|a| Llt::new(a, Side::Lower).is_ok())
    }

    pub fn is_singular(&self) -> bool {
        match self.effective_kind() {
            MatKind::Diagonal | MatKind::LowerTriangular | MatKind::UpperTriangular => {
                self.with_view(|a| (0..a.nrows().min(a.ncols())).any(|i| a[(i, i)] == T::zero()))
            }
            MatKind::General => false,
        }
    }

    pub fn opnorm(&self, kind: NormKind) -> T {
        self.with_view(|a| dense::opnorm_dense(a, kind))
    }

    pub fn to_dense(&self) -> Mat<T> {
        self.with_view(|a| a.to_owned())
    }
}

impl<T: OpScalar> fmt::Debug for MatrixOperator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixOperator")
            .field("size", &self.size())
            .field("kind", &self.kind)
            .field("constant", &self.is_constant())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use faer::Mat;

    #[test]
    fn apply_matches_dense_product() {
        let a = Mat::from_fn(3, 2, |i, j| (i * 2 + j) as f64);
        let u = Mat::from_fn(2, 1, |i, _| (i + 1) as f64);
        let op = MatrixOperator::new(a.clone());
        let v = op.apply(u.as_ref()).unwrap();
        for i in 0..3 {
            let expected = a[(i, 0)] * 1.0 + a[(i, 1)] * 2.0;
            assert_abs_diff_eq!(v[(i, 0)], expected, epsilon = 1e-14);
        }
    }

    #[test]
    fn diagonal_solve() {
        let op = MatrixOperator::from_diagonal(&[2.0, 4.0, 8.0]);
        let u = Mat::from_fn(3, 1, |i, _| (i + 1) as f64 * 8.0);
        let v = op.solve(u.as_ref()).unwrap();
        assert_abs_diff_eq!(v[(0, 0)], 4.0, epsilon = 1e-14);
        assert_abs_diff_eq!(v[(1, 0)], 4.0, epsilon = 1e-14);
        assert_abs_diff_eq!(v[(2, 0)], 3.0, epsilon = 1e-14);
    }

    #[test]
    fn triangular_solve_round_trip() {
        let n = 4;
        let a = Mat::from_fn(n, n, |i, j| {
            if j <= i {
                (i + j + 1) as f64
            } else {
                0.0
            }
        });
        let op = MatrixOperator::with_kind(a, MatKind::LowerTriangular);
        let u = Mat::from_fn(n, 1, |i, _| (i + 1) as f64);
        let x = op.solve(u.as_ref()).unwrap();
        let back = op.apply(x.as_ref()).unwrap();
        for i in 0..n {
            assert_abs_diff_eq!(back[(i, 0)], u[(i, 0)], epsilon = 1e-12);
        }
    }

    #[test]
    fn transpose_shares_storage() {
        let a = Mat::from_fn(2, 2, |i, j| (i * 2 + j) as f64);
        let mut op = MatrixOperator::new(a).with_update(|a, _u, _p, t| {
            for j in 0..a.ncols() {
                for i in 0..a.nrows() {
                    a[(i, j)] = t;
                }
            }
        });
        let tr = op.transpose_operator();
        let u = Mat::zeros(2, 1);
        op.update_coefficients(u.as_ref(), &[], 7.0);
        let d = tr.to_dense();
        for j in 0..2 {
            for i in 0..2 {
                assert_eq!(d[(i, j)], 7.0);
            }
        }
    }

    #[test]
    fn general_matrix_has_no_solve() {
        let op = MatrixOperator::new(Mat::<f64>::zeros(2, 2));
        assert!(!op.has_ldiv());
        let u = Mat::zeros(2, 1);
        assert!(op.solve(u.as_ref()).is_err());
    }
}
