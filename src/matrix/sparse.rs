//! Sparse (CSR) materialization of dense matrices.

use faer::sparse::{SparseRowMat, SymbolicSparseRowMat};
use faer::MatRef;

use crate::core::traits::OpScalar;

/// Build a CSR matrix from a dense one, dropping explicit zeros.
pub fn dense_to_csr<T: OpScalar>(a: MatRef<'_, T>) -> SparseRowMat<usize, T> {
    let (nrows, ncols) = (a.nrows(), a.ncols());
    let mut row_ptr = vec![0usize; nrows + 1];
    let mut col_idx = Vec::new();
    let mut values = Vec::new();
    for i in 0..nrows {
        for j in 0..ncols {
            let v = a[(i, j)];
            if v != T::zero() {
                col_idx.push(j);
                values.push(v);
            }
        }
        row_ptr[i + 1] = col_idx.len();
    }
    let symbolic = SymbolicSparseRowMat::new_checked(nrows, ncols, row_ptr, None, col_idx);
    SparseRowMat::new(symbolic, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat;

    #[test]
    fn zeros_are_dropped() {
        // 2×3 matrix [[1,2,0],[0,3,4]]
        let a = Mat::from_fn(2, 3, |i, j| match (i, j) {
            (0, 0) => 1.0,
            (0, 1) => 2.0,
            (1, 1) => 3.0,
            (1, 2) => 4.0,
            _ => 0.0,
        });
        let m = dense_to_csr(a.as_ref());
        assert_eq!(m.nrows(), 2);
        assert_eq!(m.ncols(), 3);
        let dense = m.to_dense();
        for i in 0..2 {
            for j in 0..3 {
                assert_eq!(dense[(i, j)], a[(i, j)]);
            }
        }
    }
}
