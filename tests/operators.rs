//! End-to-end checks of the operator variants against dense references.

use approx::assert_abs_diff_eq;
use faer::linalg::solvers::{FullPivLu, SolveCore};
use faer::{Conj, Mat, MatRef};
use linop::{
    cache_operator, factorize, left_apply, left_solve, AffineOperator, FnTraits, FunctionOperator,
    LinOp, MatKind, MatrixOperator, NormKind, OpError, OpFn,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const N: usize = 8;

fn rand_mat(rng: &mut StdRng, m: usize, n: usize) -> Mat<f64> {
    Mat::from_fn(m, n, |_, _| rng.gen::<f64>())
}

fn rand_vec(rng: &mut StdRng, n: usize) -> Mat<f64> {
    rand_mat(rng, n, 1)
}

fn assert_mat_eq(a: MatRef<'_, f64>, b: MatRef<'_, f64>, eps: f64) {
    assert_eq!(a.nrows(), b.nrows());
    assert_eq!(a.ncols(), b.ncols());
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            assert_abs_diff_eq!(a[(i, j)], b[(i, j)], epsilon = eps);
        }
    }
}

fn lu_solve(a: &Mat<f64>, u: MatRef<'_, f64>) -> Mat<f64> {
    let f = FullPivLu::new(a.as_ref());
    let mut x = u.to_owned();
    f.solve_in_place_with_conj(Conj::No, x.as_mut());
    x
}

fn dot(a: MatRef<'_, f64>, b: MatRef<'_, f64>) -> f64 {
    let mut s = 0.0;
    for i in 0..a.nrows() {
        s += a[(i, 0)] * b[(i, 0)];
    }
    s
}

#[test]
fn matrix_operator_matches_dense() {
    let mut rng = StdRng::seed_from_u64(0);
    let a = rand_mat(&mut rng, N, N);
    let u = rand_vec(&mut rng, N);
    let mut l = LinOp::from(a.clone());

    let v = l.apply(u.as_ref()).unwrap();
    let expected = a.as_ref() * u.as_ref();
    assert_mat_eq(v.as_ref(), expected.as_ref(), 1e-13);

    // the adjoint stays a matrix operator and equals Aᵀ
    let adj = l.adjoint();
    assert!(matches!(adj, LinOp::Matrix(_)));
    let adj_dense = adj.to_dense().unwrap();
    assert_mat_eq(adj_dense.as_ref(), a.as_ref().transpose(), 0.0);
    let va = adj.apply(u.as_ref()).unwrap();
    let expected = a.as_ref().transpose() * u.as_ref();
    assert_mat_eq(va.as_ref(), expected.as_ref(), 1e-13);

    // 5-argument form against a saved copy of v
    let (alpha, beta) = (0.75, -1.25);
    let mut v = rand_vec(&mut rng, N);
    let w = v.clone();
    l.gemm_into(&mut v, u.as_ref(), alpha, beta).unwrap();
    let au = a.as_ref() * u.as_ref();
    for i in 0..N {
        assert_abs_diff_eq!(
            v[(i, 0)],
            alpha * au[(i, 0)] + beta * w[(i, 0)],
            epsilon = 1e-13
        );
    }
}

#[test]
fn triangular_matrix_operator_solves() {
    let mut rng = StdRng::seed_from_u64(0);
    let a = Mat::from_fn(N, N, |i, j| {
        if j >= i {
            rng.gen::<f64>() + if i == j { 2.0 } else { 0.0 }
        } else {
            0.0
        }
    });
    let op = MatrixOperator::with_kind(a.clone(), MatKind::UpperTriangular);
    let l = LinOp::Matrix(op);
    assert!(l.has_ldiv());
    let u = rand_vec(&mut rng, N);
    let x = l.solve(u.as_ref()).unwrap();
    let expected = lu_solve(&a, u.as_ref());
    assert_mat_eq(x.as_ref(), expected.as_ref(), 1e-11);
}

#[test]
fn factorized_operator_solves() {
    let mut rng = StdRng::seed_from_u64(0);
    let a = rand_mat(&mut rng, N, N);
    let u = rand_vec(&mut rng, N);
    let l = LinOp::from(a.clone());
    assert!(!l.has_ldiv());

    let f = factorize(&l).unwrap();
    assert!(matches!(f, LinOp::Invertible(_)));
    assert!(f.has_ldiv() && f.has_ldiv_inplace());
    let d = f.to_dense().unwrap();
    assert_mat_eq(d.as_ref(), a.as_ref(), 0.0);

    let x = f.solve(u.as_ref()).unwrap();
    assert_mat_eq(x.as_ref(), lu_solve(&a, u.as_ref()).as_ref(), 1e-9);

    // adjoint solve hits the transposed system
    let at = a.as_ref().transpose().to_owned();
    let xt = f.adjoint().solve(u.as_ref()).unwrap();
    assert_mat_eq(xt.as_ref(), lu_solve(&at, u.as_ref()).as_ref(), 1e-9);

    // round trip L·(L⁻¹·u) ≈ u
    let back = f.apply(x.as_ref()).unwrap();
    assert_mat_eq(back.as_ref(), u.as_ref(), 1e-9);
}

#[test]
fn affine_operator_shifts_and_solves() {
    let mut rng = StdRng::seed_from_u64(0);
    let diag: Vec<f64> = (0..N).map(|_| rng.gen::<f64>() + 1.0).collect();
    let b = rand_vec(&mut rng, N);
    let u = rand_vec(&mut rng, N);
    let d = MatrixOperator::from_diagonal(&diag);
    let mut l = LinOp::Affine(AffineOperator::new(d, b.clone()).unwrap());
    assert!(!l.is_linear());

    let v = l.apply(u.as_ref()).unwrap();
    for i in 0..N {
        assert_abs_diff_eq!(v[(i, 0)], diag[i] * u[(i, 0)] + b[(i, 0)], epsilon = 1e-13);
    }

    let x = l.solve(u.as_ref()).unwrap();
    for i in 0..N {
        assert_abs_diff_eq!(x[(i, 0)], (u[(i, 0)] - b[(i, 0)]) / diag[i], epsilon = 1e-13);
    }

    let mut w = u.clone();
    l.solve_in_place(&mut w).unwrap();
    assert_mat_eq(w.as_ref(), x.as_ref(), 1e-13);
}

#[test]
fn function_operator_out_of_place() {
    let mut rng = StdRng::seed_from_u64(0);
    let r = rand_mat(&mut rng, N, N);
    let a = Mat::from_fn(N, N, |i, j| 0.5 * (r[(i, j)] + r[(j, i)]));
    let u = rand_vec(&mut rng, N);

    let a_fwd = a.clone();
    let f = FullPivLu::new(a.as_ref());
    let l = FunctionOperator::new(
        OpFn::out_of_place(move |u, _p, _t| a_fwd.as_ref() * u),
        (N, N),
        FnTraits {
            symmetric: true,
            hermitian: true,
            posdef: true,
            ..FnTraits::default()
        },
    )
    .with_inverse(OpFn::out_of_place(move |u, _p, _t| {
        let mut x = u.to_owned();
        f.solve_in_place_with_conj(Conj::No, x.as_mut());
        x
    }));
    let l = LinOp::Function(l);

    assert!(l.has_mul());
    assert!(!l.has_mul_inplace());
    assert!(l.has_ldiv());
    assert!(!l.has_ldiv_inplace());
    assert!(l.is_symmetric() && l.is_hermitian() && l.is_posdef());

    // self-adjoint: the adjoint stays a function operator with the same action
    let adj = l.adjoint();
    assert!(matches!(adj, LinOp::Function(_)));
    let v1 = adj.apply(u.as_ref()).unwrap();
    let v2 = l.apply(u.as_ref()).unwrap();
    assert_mat_eq(v1.as_ref(), v2.as_ref(), 0.0);

    let expected = a.as_ref() * u.as_ref();
    assert_mat_eq(v2.as_ref(), expected.as_ref(), 1e-13);
    let x = l.solve(u.as_ref()).unwrap();
    assert_mat_eq(x.as_ref(), lu_solve(&a, u.as_ref()).as_ref(), 1e-10);
}

#[test]
fn function_operator_in_place() {
    let mut rng = StdRng::seed_from_u64(0);
    let r = rand_mat(&mut rng, N, N);
    let a = Mat::from_fn(N, N, |i, j| 0.5 * (r[(i, j)] + r[(j, i)]) + if i == j { 4.0 } else { 0.0 });
    let u = rand_vec(&mut rng, N);

    let a_fwd = a.clone();
    let f = FullPivLu::new(a.as_ref());
    let l = FunctionOperator::new(
        OpFn::in_place(move |v: &mut Mat<f64>, u, _p, _t| {
            let w = a_fwd.as_ref() * u;
            v.copy_from(&w);
        }),
        (N, N),
        FnTraits {
            symmetric: true,
            ..FnTraits::default()
        },
    )
    .with_inverse(OpFn::in_place(move |v: &mut Mat<f64>, u, _p, _t| {
        v.copy_from(&u);
        f.solve_in_place_with_conj(Conj::No, v.as_mut());
    }));
    let l = LinOp::Function(l);

    assert!(!l.has_mul());
    assert!(l.has_mul_inplace());
    assert!(!l.has_ldiv());
    assert!(l.has_ldiv_inplace());
    assert!(matches!(l.apply(u.as_ref()), Err(OpError::Unsupported { .. })));

    let mut l = cache_operator(l, u.as_ref()).unwrap();

    let au = a.as_ref() * u.as_ref();
    let mut v = Mat::zeros(N, 1);
    l.apply_into(&mut v, u.as_ref()).unwrap();
    assert_mat_eq(v.as_ref(), au.as_ref(), 1e-13);

    let (alpha, beta) = (1.5, 0.25);
    let mut v = rand_vec(&mut rng, N);
    let w = v.clone();
    l.gemm_into(&mut v, u.as_ref(), alpha, beta).unwrap();
    for i in 0..N {
        assert_abs_diff_eq!(
            v[(i, 0)],
            alpha * au[(i, 0)] + beta * w[(i, 0)],
            epsilon = 1e-12
        );
    }

    let mut x = Mat::zeros(N, 1);
    l.solve_into(&mut x, u.as_ref()).unwrap();
    assert_mat_eq(x.as_ref(), lu_solve(&a, u.as_ref()).as_ref(), 1e-11);

    // two-argument ldiv!: u ← A⁻¹·u
    let pre = rand_vec(&mut rng, N);
    let mut y = pre.clone();
    l.solve_in_place(&mut y).unwrap();
    assert_mat_eq(y.as_ref(), lu_solve(&a, pre.as_ref()).as_ref(), 1e-11);
}

#[test]
fn adjoint_inner_product_law() {
    let mut rng = StdRng::seed_from_u64(0);
    let a = rand_mat(&mut rng, N, N);
    let l = LinOp::from(a.clone());
    let u = rand_vec(&mut rng, N);
    let v = rand_vec(&mut rng, N);
    let lu_ = l.apply(u.as_ref()).unwrap();
    let ladj_v = l.adjoint().apply(v.as_ref()).unwrap();
    assert_abs_diff_eq!(
        dot(lu_.as_ref(), v.as_ref()),
        dot(u.as_ref(), ladj_v.as_ref()),
        epsilon = 1e-12
    );
}

#[test]
fn left_apply_and_left_solve_dualize() {
    let mut rng = StdRng::seed_from_u64(0);
    let a = rand_mat(&mut rng, N, N);
    let l = LinOp::from(a.clone());
    let u = rand_vec(&mut rng, N);

    let v = left_apply(&l, u.as_ref()).unwrap();
    let expected = a.as_ref().transpose() * u.as_ref();
    assert_mat_eq(v.as_ref(), expected.as_ref(), 1e-13);

    let f = factorize(&l).unwrap();
    let x = left_solve(&f, u.as_ref()).unwrap();
    let at = a.as_ref().transpose().to_owned();
    assert_mat_eq(x.as_ref(), lu_solve(&at, u.as_ref()).as_ref(), 1e-9);
}

#[test]
fn update_hook_writes_time_into_coefficients() {
    let mut rng = StdRng::seed_from_u64(0);
    let a = rand_mat(&mut rng, N, N);
    let op = MatrixOperator::new(a).with_update(|a, _u, _p, t| {
        for j in 0..a.ncols() {
            for i in 0..a.nrows() {
                a[(i, j)] = t;
            }
        }
    });
    let mut l = LinOp::Matrix(op);
    assert!(!l.is_constant());
    let u = rand_vec(&mut rng, N);
    l.update_coefficients(u.as_ref(), &[1.0, 2.0], 0.125);
    let d = l.to_dense().unwrap();
    for j in 0..N {
        for i in 0..N {
            assert_eq!(d[(i, j)], 0.125);
        }
    }
}

#[test]
fn opnorm_paths() {
    let diag = [3.0, -5.0, 2.0];
    let l = LinOp::Matrix(MatrixOperator::from_diagonal(&diag));
    assert_abs_diff_eq!(l.opnorm(NormKind::One).unwrap(), 5.0, epsilon = 1e-12);
    assert_abs_diff_eq!(l.opnorm(NormKind::Inf).unwrap(), 5.0, epsilon = 1e-12);

    let with_norm: LinOp<f64> = LinOp::Function(
        FunctionOperator::new(
            OpFn::out_of_place(|u, _p, _t| u.to_owned()),
            (3, 3),
            FnTraits {
                opnorm: Some(linop::OpNorm::Value(1.0)),
                ..FnTraits::default()
            },
        ),
    );
    assert_abs_diff_eq!(with_norm.opnorm(NormKind::Two).unwrap(), 1.0, epsilon = 0.0);

    let without: LinOp<f64> = LinOp::Function(FunctionOperator::new(
        OpFn::out_of_place(|u, _p, _t| u.to_owned()),
        (3, 3),
        FnTraits::default(),
    ));
    assert!(matches!(
        without.opnorm(NormKind::Two),
        Err(OpError::MissingAttribute { .. })
    ));
}

#[test]
fn shape_mismatch_is_reported() {
    let l: LinOp<f64> = LinOp::from(Mat::<f64>::zeros(4, 3));
    let u = Mat::<f64>::zeros(5, 1);
    match l.apply(u.as_ref()) {
        Err(OpError::ShapeMismatch { rows, cols, .. }) => {
            assert_eq!((rows, cols), (4, 3));
        }
        other => panic!("expected shape mismatch, got {other:?}"),
    }
}
