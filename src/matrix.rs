use num_traits::Float;

use crate::error::{Error, Result};
use crate::linalg;

/// Dense column-major matrix.
///
/// The column stride always equals the row count, so column `j` occupies
/// `data[j * rows..(j + 1) * rows]` and can be borrowed as a contiguous slice.
/// The shape is fixed after construction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Matrix<F> {
    rows: usize,
    cols: usize,
    data: Vec<F>,
}

impl<F: Float> Matrix<F> {
    /// A `rows x cols` matrix filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![F::zero(); rows * cols],
        }
    }

    /// A `rows x cols` matrix with every element set to `value`.
    pub fn filled(rows: usize, cols: usize, value: F) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Wrap a column-major buffer.
    ///
    /// Fails with [`Error::ShapeMismatch`] if `data.len() != rows * cols`.
    pub fn from_column_slice(rows: usize, cols: usize, data: &[F]) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::ShapeMismatch {
                expected: (rows, cols),
                found: (data.len(), 1),
            });
        }
        Ok(Matrix {
            rows,
            cols,
            data: data.to_vec(),
        })
    }

    /// Build a matrix from `f(row, col)`, visiting elements in storage order.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> F) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for j in 0..cols {
            for i in 0..rows {
                data.push(f(i, j));
            }
        }
        Matrix { rows, cols, data }
    }

    /// A column vector (`n x 1`).
    pub fn column_vector(values: &[F]) -> Self {
        Matrix {
            rows: values.len(),
            cols: 1,
            data: values.to_vec(),
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Total number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> F {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[col * self.rows + row]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: F) {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[col * self.rows + row] = value;
    }

    /// Borrow column `col` without copying.
    #[inline]
    pub fn col(&self, col: usize) -> &[F] {
        let start = col * self.rows;
        &self.data[start..start + self.rows]
    }

    #[inline]
    pub fn col_mut(&mut self, col: usize) -> &mut [F] {
        let start = col * self.rows;
        &mut self.data[start..start + self.rows]
    }

    /// Mutable views of two distinct columns at once.
    ///
    /// Panics if `a == b`.
    pub fn col_pair_mut(&mut self, a: usize, b: usize) -> (&mut [F], &mut [F]) {
        assert_ne!(a, b, "col_pair_mut needs two distinct columns");
        let rows = self.rows;
        if a < b {
            let (left, right) = self.data.split_at_mut(b * rows);
            (&mut left[a * rows..(a + 1) * rows], &mut right[..rows])
        } else {
            let (left, right) = self.data.split_at_mut(a * rows);
            (&mut right[..rows], &mut left[b * rows..(b + 1) * rows])
        }
    }

    /// The whole buffer in column-major order.
    #[inline]
    pub fn as_slice(&self) -> &[F] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [F] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<F> {
        self.data
    }

    pub fn fill(&mut self, value: F) {
        linalg::fill(&mut self.data, value);
    }

    /// Overwrite `self` with the values of `other`.
    ///
    /// Both matrices must have the same shape.
    pub fn copy_from(&mut self, other: &Matrix<F>) {
        assert_eq!(self.shape(), other.shape(), "copy_from shape mismatch");
        self.data.copy_from_slice(&other.data);
    }

    /// Frobenius inner product.
    pub fn dot(&self, other: &Matrix<F>) -> F {
        debug_assert_eq!(self.shape(), other.shape());
        linalg::dot(&self.data, &other.data)
    }

    /// Frobenius norm.
    pub fn norm(&self) -> F {
        linalg::norm(&self.data)
    }

    /// `self += alpha * x`.
    pub fn axpy(&mut self, alpha: F, x: &Matrix<F>) {
        debug_assert_eq!(self.shape(), x.shape());
        linalg::axpy(alpha, &x.data, &mut self.data);
    }

    /// `self *= alpha`.
    pub fn scale(&mut self, alpha: F) {
        linalg::scale(alpha, &mut self.data);
    }

    /// `self = a - b`.
    pub fn sub_overwrite(&mut self, a: &Matrix<F>, b: &Matrix<F>) {
        debug_assert_eq!(a.shape(), b.shape());
        debug_assert_eq!(self.shape(), a.shape());
        linalg::sub_overwrite(&a.data, &b.data, &mut self.data);
    }

    /// Returns `Err(ShapeMismatch)` unless `self` has shape `expected`.
    pub fn ensure_shape(&self, expected: (usize, usize)) -> Result<()> {
        if self.shape() != expected {
            return Err(Error::ShapeMismatch {
                expected,
                found: self.shape(),
            });
        }
        Ok(())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, F> {
        self.data.iter()
    }
}

impl<F: Float> std::ops::Index<(usize, usize)> for Matrix<F> {
    type Output = F;

    fn index(&self, (row, col): (usize, usize)) -> &F {
        &self.data[col * self.rows + row]
    }
}

impl<F: Float> std::ops::IndexMut<(usize, usize)> for Matrix<F> {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut F {
        &mut self.data[col * self.rows + row]
    }
}
