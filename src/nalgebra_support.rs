//! nalgebra adapters for [`Matrix`].
//!
//! `DMatrix` is column-major as well, so conversions copy the buffer as is.

use nalgebra::{DMatrix, DVector, Scalar};
use num_traits::Float;

use crate::matrix::Matrix;

impl<F: Float + Scalar> From<&Matrix<F>> for DMatrix<F> {
    fn from(m: &Matrix<F>) -> Self {
        DMatrix::from_column_slice(m.rows(), m.cols(), m.as_slice())
    }
}

impl<F: Float + Scalar> From<&DMatrix<F>> for Matrix<F> {
    fn from(m: &DMatrix<F>) -> Self {
        Matrix::from_fn(m.nrows(), m.ncols(), |i, j| m[(i, j)])
    }
}

impl<F: Float + Scalar> From<&DVector<F>> for Matrix<F> {
    fn from(v: &DVector<F>) -> Self {
        Matrix::column_vector(v.as_slice())
    }
}

/// Column `col` of `m` as a `DVector`.
pub fn column_nalgebra<F: Float + Scalar>(m: &Matrix<F>, col: usize) -> DVector<F> {
    DVector::from_column_slice(m.col(col))
}
