//! Dense kernels on top of Faer.
//!
//! This module hosts the low-level routines every operator variant shares:
//! GEMM with alpha/beta accumulation, the Kronecker product, operator norms,
//! and structural probes. Operator code never touches `faer::linalg` directly
//! except through here.

use faer::linalg::matmul::matmul;
use faer::{Accum, Mat, MatRef, Par};

use crate::core::traits::{NormKind, OpScalar};

/// v ← α·(A·u) + β·v.
///
/// `beta == 0` overwrites `v` without reading it, so `v` may hold garbage.
pub fn gemm_into<T: OpScalar>(v: &mut Mat<T>, a: MatRef<'_, T>, u: MatRef<'_, T>, alpha: T, beta: T) {
    if beta == T::zero() {
        matmul(v.as_mut(), Accum::Replace, a, u, alpha, Par::Seq);
    } else {
        if beta != T::one() {
            scale_in_place(v, beta);
        }
        matmul(v.as_mut(), Accum::Add, a, u, alpha, Par::Seq);
    }
}

/// v ← s·v.
pub fn scale_in_place<T: OpScalar>(v: &mut Mat<T>, s: T) {
    for j in 0..v.ncols() {
        for i in 0..v.nrows() {
            v[(i, j)] *= s;
        }
    }
}

/// v ← α·x + v elementwise. Shapes must agree.
pub fn axpy_in_place<T: OpScalar>(v: &mut Mat<T>, alpha: T, x: MatRef<'_, T>) {
    assert_eq!(v.nrows(), x.nrows());
    assert_eq!(v.ncols(), x.ncols());
    for j in 0..v.ncols() {
        for i in 0..v.nrows() {
            v[(i, j)] += alpha * x[(i, j)];
        }
    }
}

/// v ← α·x + β·v elementwise. Shapes must agree.
pub fn axpby_in_place<T: OpScalar>(v: &mut Mat<T>, alpha: T, x: MatRef<'_, T>, beta: T) {
    assert_eq!(v.nrows(), x.nrows());
    assert_eq!(v.ncols(), x.ncols());
    for j in 0..v.ncols() {
        for i in 0..v.nrows() {
            v[(i, j)] = alpha * x[(i, j)] + beta * v[(i, j)];
        }
    }
}

/// Dense Kronecker product `a ⊗ b`.
pub fn kron_dense<T: OpScalar>(a: MatRef<'_, T>, b: MatRef<'_, T>) -> Mat<T> {
    let (p, q) = (b.nrows(), b.ncols());
    Mat::from_fn(a.nrows() * p, a.ncols() * q, |i, j| {
        a[(i / p, j / q)] * b[(i % p, j % q)]
    })
}

/// Operator norm of a dense matrix.
///
/// `One` and `Inf` are the exact column-sum and row-sum norms; `Frobenius`
/// is exact; `Two` runs power iteration on AᵀA from a deterministic start
/// vector and returns the converged singular-value estimate.
pub fn opnorm_dense<T: OpScalar>(a: MatRef<'_, T>, kind: NormKind) -> T {
    let (m, n) = (a.nrows(), a.ncols());
    if m == 0 || n == 0 {
        return T::zero();
    }
    match kind {
        NormKind::One => {
            let mut best = T::zero();
            for j in 0..n {
                let mut sum = T::zero();
                for i in 0..m {
                    sum += a[(i, j)].abs();
                }
                best = best.max(sum);
            }
            best
        }
        NormKind::Inf => {
            let mut best = T::zero();
            for i in 0..m {
                let mut sum = T::zero();
                for j in 0..n {
                    sum += a[(i, j)].abs();
                }
                best = best.max(sum);
            }
            best
        }
        NormKind::Frobenius => {
            let mut sum = T::zero();
            for j in 0..n {
                for i in 0..m {
                    sum += a[(i, j)] * a[(i, j)];
                }
            }
            sum.sqrt()
        }
        NormKind::Two => spectral_norm_estimate(a),
    }
}

/// Largest singular value via power iteration on AᵀA.
fn spectral_norm_estimate<T: OpScalar>(a: MatRef<'_, T>) -> T {
    let (m, n) = (a.nrows(), a.ncols());
    let mut x = Mat::from_fn(n, 1, |_, _| T::one());
    let mut ax = Mat::zeros(m, 1);
    let mut y = Mat::zeros(n, 1);
    let norm = |v: &Mat<T>| {
        let mut s = T::zero();
        for i in 0..v.nrows() {
            s += v[(i, 0)] * v[(i, 0)];
        }
        s.sqrt()
    };
    let x0 = norm(&x);
    if x0 == T::zero() {
        return T::zero();
    }
    scale_in_place(&mut x, T::one() / x0);
    let mut sigma = T::zero();
    for _ in 0..200 {
        matmul(ax.as_mut(), Accum::Replace, a, x.as_ref(), T::one(), Par::Seq);
        let next = norm(&ax);
        matmul(
            y.as_mut(),
            Accum::Replace,
            a.transpose(),
            ax.as_ref(),
            T::one(),
            Par::Seq,
        );
        let yn = norm(&y);
        if yn == T::zero() {
            return next;
        }
        x.copy_from(&y);
        scale_in_place(&mut x, T::one() / yn);
        if (next - sigma).abs() <= T::epsilon() * next.max(T::one()) {
            return next;
        }
        sigma = next;
    }
    sigma
}

/// Exact symmetry probe. Non-square matrices answer `false`.
pub fn is_symmetric_dense<T: OpScalar>(a: MatRef<'_, T>) -> bool {
    if a.nrows() != a.ncols() {
        return false;
    }
    for j in 0..a.ncols() {
        for i in 0..j {
            if a[(i, j)] != a[(j, i)] {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use faer::Mat;

    #[test]
    fn gemm_accumulates() {
        let a = Mat::from_fn(2, 2, |i, j| (i * 2 + j) as f64 + 1.0);
        let u = Mat::from_fn(2, 1, |i, _| (i + 1) as f64);
        let mut v = Mat::from_fn(2, 1, |i, _| (i + 5) as f64);
        // v = 2*(A u) + 3*v
        gemm_into(&mut v, a.as_ref(), u.as_ref(), 2.0, 3.0);
        assert_abs_diff_eq!(v[(0, 0)], 2.0 * 5.0 + 3.0 * 5.0, epsilon = 1e-14);
        assert_abs_diff_eq!(v[(1, 0)], 2.0 * 11.0 + 3.0 * 6.0, epsilon = 1e-14);
    }

    #[test]
    fn kron_matches_block_layout() {
        let a = Mat::from_fn(2, 2, |i, j| (i * 2 + j + 1) as f64);
        let b = Mat::from_fn(2, 2, |i, j| if i == j { 1.0 } else { 0.0 });
        let k = kron_dense(a.as_ref(), b.as_ref());
        assert_eq!(k.nrows(), 4);
        assert_eq!(k[(0, 0)], 1.0);
        assert_eq!(k[(0, 2)], 2.0);
        assert_eq!(k[(2, 0)], 3.0);
        assert_eq!(k[(3, 3)], 4.0);
        assert_eq!(k[(0, 1)], 0.0);
    }

    #[test]
    fn norms_of_diagonal() {
        let d = Mat::from_fn(3, 3, |i, j| if i == j { (i + 1) as f64 } else { 0.0 });
        assert_abs_diff_eq!(opnorm_dense(d.as_ref(), NormKind::One), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(opnorm_dense(d.as_ref(), NormKind::Inf), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(
            opnorm_dense(d.as_ref(), NormKind::Frobenius),
            (1.0f64 + 4.0 + 9.0).sqrt(),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(opnorm_dense(d.as_ref(), NormKind::Two), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn symmetry_probe() {
        let s = Mat::from_fn(3, 3, |i, j| (i + j) as f64);
        assert!(is_symmetric_dense(s.as_ref()));
        let a = Mat::from_fn(3, 3, |i, j| (i * 3 + j) as f64);
        assert!(!is_symmetric_dense(a.as_ref()));
    }
}
