use fastopt::{Error, Matrix, Result};

/// Observed entries `(row, col, value)` of a partially known data matrix.
///
/// Stored as parallel arrays. Every index is within the declared shape.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Observations {
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
    num_rows: usize,
    num_cols: usize,
}

impl Observations {
    /// Triplets with the shape inferred from the largest indices.
    pub fn new(rows: Vec<usize>, cols: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        let num_rows = rows.iter().max().map_or(0, |&r| r + 1);
        let num_cols = cols.iter().max().map_or(0, |&c| c + 1);
        Self::with_shape(rows, cols, values, num_rows, num_cols)
    }

    /// Triplets of a `num_rows x num_cols` matrix.
    pub fn with_shape(
        rows: Vec<usize>,
        cols: Vec<usize>,
        values: Vec<f64>,
        num_rows: usize,
        num_cols: usize,
    ) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::EmptyInput("observations"));
        }
        if cols.len() != rows.len() || values.len() != rows.len() {
            return Err(Error::ShapeMismatch {
                expected: (rows.len(), 3),
                found: (cols.len().min(values.len()), 3),
            });
        }
        if let Some(&r) = rows.iter().find(|&&r| r >= num_rows) {
            return Err(Error::IndexOutOfRange {
                what: "row",
                index: r,
                bound: num_rows,
            });
        }
        if let Some(&c) = cols.iter().find(|&&c| c >= num_cols) {
            return Err(Error::IndexOutOfRange {
                what: "column",
                index: c,
                bound: num_cols,
            });
        }
        fastopt::error::ensure(
            values.iter().all(|v| v.is_finite()),
            "values",
            "must be finite",
        )?;
        Ok(Observations {
            rows,
            cols,
            values,
            num_rows,
            num_cols,
        })
    }

    /// Every strictly positive entry of a dense matrix becomes an observation.
    pub fn from_dense(data: &Matrix<f64>) -> Result<Self> {
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        let mut values = Vec::new();
        for j in 0..data.cols() {
            for (i, &v) in data.col(j).iter().enumerate() {
                if v > 0.0 {
                    rows.push(i);
                    cols.push(j);
                    values.push(v);
                }
            }
        }
        Self::with_shape(rows, cols, values, data.rows(), data.cols())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn cols(&self) -> &[usize] {
        &self.cols
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.rows
            .iter()
            .zip(&self.cols)
            .zip(&self.values)
            .map(|((&r, &c), &v)| (r, c, v))
    }

    /// `Σ v²` over the observed entries.
    pub fn squared_norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum()
    }

    /// Root mean square of the observed values.
    pub fn rms(&self) -> f64 {
        (self.squared_norm() / self.len() as f64).sqrt()
    }

    /// The same pattern with every value multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Observations {
        Observations {
            values: self.values.iter().map(|v| v * factor).collect(),
            ..self.clone()
        }
    }
}
