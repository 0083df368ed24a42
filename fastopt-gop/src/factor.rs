//! Log-space layout of the `(W, H)` factor pair and the exact NMF objective.
//!
//! Both factors live in one `rank x (num_rows + num_cols)` matrix: column
//! `w_offset + i` holds `log W[i, ·]`, column `h_offset + j` holds
//! `log H[·, j]`. The model value at `(i, j)` is `Σ_r exp(x[r, w_i] + x[r, h_j])`.

use fastopt::{Error, Matrix, Result};

use crate::observations::Observations;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FactorLayout {
    rank: usize,
    num_rows: usize,
    num_cols: usize,
}

impl FactorLayout {
    pub fn new(rank: usize, num_rows: usize, num_cols: usize) -> Result<Self> {
        if rank == 0 {
            return Err(Error::MissingDimension);
        }
        if num_rows == 0 || num_cols == 0 {
            return Err(Error::EmptyInput("data matrix"));
        }
        Ok(FactorLayout {
            rank,
            num_rows,
            num_cols,
        })
    }

    pub fn for_observations(obs: &Observations, rank: usize) -> Result<Self> {
        Self::new(rank, obs.num_rows(), obs.num_cols())
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn w_offset(&self) -> usize {
        0
    }

    pub fn h_offset(&self) -> usize {
        self.num_rows
    }

    /// Shape of the optimization variable.
    pub fn shape(&self) -> (usize, usize) {
        (self.rank, self.num_rows + self.num_cols)
    }

    #[inline]
    pub fn w_col(&self, row: usize) -> usize {
        self.w_offset() + row
    }

    #[inline]
    pub fn h_col(&self, col: usize) -> usize {
        self.h_offset() + col
    }

    /// Original-space factors: `W` is `num_rows x rank`, `H` is `rank x num_cols`.
    pub fn factors(&self, x: &Matrix<f64>) -> (Matrix<f64>, Matrix<f64>) {
        let w = Matrix::from_fn(self.num_rows, self.rank, |i, r| x[(r, self.w_col(i))].exp());
        let h = Matrix::from_fn(self.rank, self.num_cols, |r, j| x[(r, self.h_col(j))].exp());
        (w, h)
    }

    /// Inverse of [`factors`](FactorLayout::factors). Entries must be positive.
    pub fn from_factors(&self, w: &Matrix<f64>, h: &Matrix<f64>) -> Result<Matrix<f64>> {
        w.ensure_shape((self.num_rows, self.rank))?;
        h.ensure_shape((self.rank, self.num_cols))?;
        fastopt::error::ensure(
            w.iter().chain(h.iter()).all(|&v| v > 0.0),
            "factors",
            "must be strictly positive",
        )?;
        let (rows, cols) = self.shape();
        Ok(Matrix::from_fn(rows, cols, |r, c| {
            if c < self.h_offset() {
                w[(c, r)].ln()
            } else {
                h[(r, c - self.h_offset())].ln()
            }
        }))
    }

    /// Model value `(W H)[(row, col)]` with every log-product shifted by `offset`.
    #[inline]
    pub fn model_value(&self, x: &Matrix<f64>, row: usize, col: usize, offset: f64) -> f64 {
        let w = x.col(self.w_col(row));
        let h = x.col(self.h_col(col));
        w.iter().zip(h).map(|(a, b)| (a + b + offset).exp()).sum()
    }
}

/// `Σ (model − v)²` over the observed entries.
pub fn nmf_objective(
    obs: &Observations,
    layout: &FactorLayout,
    offset: f64,
    x: &Matrix<f64>,
) -> f64 {
    obs.iter()
        .map(|(i, j, v)| {
            let e = layout.model_value(x, i, j, offset) - v;
            e * e
        })
        .sum()
}

/// Adds the gradient of [`nmf_objective`] to `grad`.
pub fn add_nmf_gradient(
    obs: &Observations,
    layout: &FactorLayout,
    offset: f64,
    x: &Matrix<f64>,
    grad: &mut Matrix<f64>,
) {
    for (i, j, v) in obs.iter() {
        let e = layout.model_value(x, i, j, offset) - v;
        let (wc, hc) = (layout.w_col(i), layout.h_col(j));
        for r in 0..layout.rank() {
            let d = 2.0 * e * (x[(r, wc)] + x[(r, hc)] + offset).exp();
            grad[(r, wc)] += d;
            grad[(r, hc)] += d;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rank_is_missing_dimension() {
        assert_eq!(FactorLayout::new(0, 2, 2), Err(Error::MissingDimension));
    }

    #[test]
    fn factor_round_trip() {
        let layout = FactorLayout::new(2, 3, 2).unwrap();
        let w = Matrix::from_fn(3, 2, |i, r| 1.0 + i as f64 + 0.5 * r as f64);
        let h = Matrix::from_fn(2, 2, |r, j| 0.25 + r as f64 + j as f64);
        let x = layout.from_factors(&w, &h).unwrap();
        assert_eq!(x.shape(), (2, 5));
        let (w2, h2) = layout.factors(&x);
        for (a, b) in w.iter().zip(w2.iter()).chain(h.iter().zip(h2.iter())) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn model_value_is_the_matrix_product() {
        let layout = FactorLayout::new(2, 1, 1).unwrap();
        let w = Matrix::from_column_slice(1, 2, &[2.0, 3.0]).unwrap();
        let h = Matrix::from_column_slice(2, 1, &[5.0, 7.0]).unwrap();
        let x = layout.from_factors(&w, &h).unwrap();
        assert!((layout.model_value(&x, 0, 0, 0.0) - 31.0).abs() < 1e-12);
    }

    #[test]
    fn exact_factorization_has_zero_objective() {
        let layout = FactorLayout::new(1, 2, 2).unwrap();
        let w = Matrix::column_vector(&[1.0, 2.0]);
        let h = Matrix::from_column_slice(1, 2, &[3.0, 4.0]).unwrap();
        let x = layout.from_factors(&w, &h).unwrap();
        let obs = Observations::new(
            vec![0, 1, 0, 1],
            vec![0, 0, 1, 1],
            vec![3.0, 6.0, 4.0, 8.0],
        )
        .unwrap();
        assert!(nmf_objective(&obs, &layout, 0.0, &x) < 1e-20);
    }
}
