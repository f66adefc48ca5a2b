//! Affine operator `u ↦ A·u + b`.

use std::fmt;

use faer::{Mat, MatRef};

use crate::core::traits::OpScalar;
use crate::error::OpError;
use crate::operator::LinOp;

/// `L·u = A·u + b` with a linear sub-operator `A` and translation `b`.
///
/// Not linear; solvable exactly when `A` is, via `L⁻¹·u = A⁻¹·(u − b)`.
#[derive(Clone)]
pub struct AffineOperator<T: OpScalar> {
    a: Box<LinOp<T>>,
    b: Mat<T>,
}

impl<T: OpScalar> AffineOperator<T> {
    pub(crate) const KIND: &'static str = "affine";

    /// `b` must be a column of length `a.nrows()`.
    pub fn new(a: impl Into<LinOp<T>>, b: Mat<T>) -> Result<Self, OpError> {
        let a = a.into();
        if b.nrows() != a.nrows() || b.ncols() != 1 {
            return Err(OpError::shape(Self::KIND, a.size(), (b.nrows(), b.ncols())));
        }
        Ok(AffineOperator { a: Box::new(a), b })
    }

    pub fn linear_part(&self) -> &LinOp<T> {
        &self.a
    }

    pub fn translation(&self) -> MatRef<'_, T> {
        self.b.as_ref()
    }

    pub fn nrows(&self) -> usize {
        self.a.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.a.ncols()
    }

    pub fn size(&self) -> (usize, usize) {
        self.a.size()
    }

    /// v[:, j] += α·b for every column j.
    fn add_translation(&self, v: &mut Mat<T>, alpha: T) {
        for j in 0..v.ncols() {
            for i in 0..v.nrows() {
                v[(i, j)] += alpha * self.b[(i, 0)];
            }
        }
    }

    /// v[:, j] -= b for every column j.
    fn sub_translation(&self, v: &mut Mat<T>) {
        for j in 0..v.ncols() {
            for i in 0..v.nrows() {
                v[(i, j)] -= self.b[(i, 0)];
            }
        }
    }

    pub fn apply(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        let mut v = self.a.apply(u)?;
        self.add_translation(&mut v, T::one());
        Ok(v)
    }

    pub fn apply_into(&mut self, v: &mut Mat<T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.a.apply_into(v, u)?;
        self.add_translation(v, T::one());
        Ok(())
    }

    pub fn gemm_into(
        &mut self,
        v: &mut Mat<T>,
        u: MatRef<'_, T>,
        alpha: T,
        beta: T,
    ) -> Result<(), OpError> {
        self.a.gemm_into(v, u, alpha, beta)?;
        self.add_translation(v, alpha);
        Ok(())
    }

    pub fn solve(&self, u: MatRef<'_, T>) -> Result<Mat<T>, OpError> {
        if u.nrows() != self.nrows() {
            return Err(OpError::shape(Self::KIND, self.size(), (u.nrows(), u.ncols())));
        }
        let mut w = u.to_owned();
        self.sub_translation(&mut w);
        self.a.solve(w.as_ref())
    }

    pub fn solve_into(&mut self, v: &mut Mat<T>, u: MatRef<'_, T>) -> Result<(), OpError> {
        if u.nrows() != self.nrows() || v.nrows() != self.ncols() || v.ncols() != u.ncols() {
            return Err(OpError::shape(Self::KIND, self.size(), (u.nrows(), u.ncols())));
        }
        v.copy_from(u);
        self.sub_translation(v);
        self.a.solve_in_place(v)
    }

    pub fn solve_in_place(&mut self, u: &mut Mat<T>) -> Result<(), OpError> {
        if u.nrows() != self.nrows() {
            return Err(OpError::shape(Self::KIND, self.size(), (u.nrows(), u.ncols())));
        }
        self.sub_translation(u);
        self.a.solve_in_place(u)
    }

    pub fn update_coefficients(&mut self, u: MatRef<'_, T>, p: &[T], t: T) {
        self.a.update_coefficients(u, p, t);
    }

    pub(crate) fn allocate_caches(&mut self, u: MatRef<'_, T>) -> Result<(), OpError> {
        self.a.allocate_caches(u)
    }

    pub(crate) fn forward_caps(&self) -> &LinOp<T> {
        &self.a
    }
}

impl<T: OpScalar> fmt::Debug for AffineOperator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AffineOperator")
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::matrix_op::MatrixOperator;
    use approx::assert_abs_diff_eq;
    use faer::Mat;

    #[test]
    fn apply_adds_translation() {
        let d = MatrixOperator::from_diagonal(&[2.0, 3.0]);
        let b = Mat::from_fn(2, 1, |i, _| (i + 10) as f64);
        let op = AffineOperator::new(d, b).unwrap();
        let u = Mat::from_fn(2, 1, |i, _| (i + 1) as f64);
        let v = op.apply(u.as_ref()).unwrap();
        assert_abs_diff_eq!(v[(0, 0)], 2.0 * 1.0 + 10.0, epsilon = 1e-14);
        assert_abs_diff_eq!(v[(1, 0)], 3.0 * 2.0 + 11.0, epsilon = 1e-14);
    }

    #[test]
    fn solve_subtracts_translation_first() {
        let d = MatrixOperator::from_diagonal(&[2.0, 4.0]);
        let b = Mat::from_fn(2, 1, |_, _| 1.0);
        let mut op = AffineOperator::new(d, b).unwrap();
        let u = Mat::from_fn(2, 1, |i, _| (i + 3) as f64);
        let x = op.solve(u.as_ref()).unwrap();
        assert_abs_diff_eq!(x[(0, 0)], (3.0 - 1.0) / 2.0, epsilon = 1e-14);
        assert_abs_diff_eq!(x[(1, 0)], (4.0 - 1.0) / 4.0, epsilon = 1e-14);

        let mut in_place = u.clone();
        op.solve_in_place(&mut in_place).unwrap();
        assert_abs_diff_eq!(in_place[(0, 0)], x[(0, 0)], epsilon = 1e-14);
        assert_abs_diff_eq!(in_place[(1, 0)], x[(1, 0)], epsilon = 1e-14);
    }

    #[test]
    fn gemm_scales_translation() {
        let d = MatrixOperator::from_diagonal(&[1.0, 1.0]);
        let b = Mat::from_fn(2, 1, |_, _| 2.0);
        let mut op = AffineOperator::new(d, b).unwrap();
        let u = Mat::from_fn(2, 1, |_, _| 1.0);
        let mut v = Mat::from_fn(2, 1, |_, _| 10.0);
        // v = 3*(u + b) + 2*v = 3*(1+2) + 20 = 29
        op.gemm_into(&mut v, u.as_ref(), 3.0, 2.0).unwrap();
        assert_abs_diff_eq!(v[(0, 0)], 29.0, epsilon = 1e-14);
    }
}
