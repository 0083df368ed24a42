use fastopt::{Error, Matrix, Result};

/// Axis-aligned box `[lower, upper]` over the optimization variable.
///
/// `lower ≤ upper` holds element-wise for every box built through the public
/// constructors.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundBox {
    lower: Matrix<f64>,
    upper: Matrix<f64>,
}

impl BoundBox {
    pub fn new(lower: Matrix<f64>, upper: Matrix<f64>) -> Result<Self> {
        upper.ensure_shape(lower.shape())?;
        for j in 0..lower.cols() {
            for i in 0..lower.rows() {
                if !(lower[(i, j)] <= upper[(i, j)]) {
                    return Err(Error::InvalidBox { row: i, col: j });
                }
            }
        }
        Ok(BoundBox { lower, upper })
    }

    /// The same interval `[lower, upper]` for every element.
    pub fn uniform(rows: usize, cols: usize, lower: f64, upper: f64) -> Result<Self> {
        Self::new(
            Matrix::filled(rows, cols, lower),
            Matrix::filled(rows, cols, upper),
        )
    }

    /// Log-space box for original-space factor entries in `[lower, upper]`.
    pub fn from_original(rows: usize, cols: usize, lower: f64, upper: f64) -> Result<Self> {
        fastopt::error::ensure(lower > 0.0, "lower", "must be positive")?;
        Self::uniform(rows, cols, lower.ln(), upper.ln())
    }

    pub(crate) fn from_parts_unchecked(lower: Matrix<f64>, upper: Matrix<f64>) -> Self {
        BoundBox { lower, upper }
    }

    pub fn lower(&self) -> &Matrix<f64> {
        &self.lower
    }

    pub fn upper(&self) -> &Matrix<f64> {
        &self.upper
    }

    pub fn shape(&self) -> (usize, usize) {
        self.lower.shape()
    }

    pub fn width(&self, row: usize, col: usize) -> f64 {
        self.upper[(row, col)] - self.lower[(row, col)]
    }

    /// Product of the side lengths.
    pub fn volume(&self) -> f64 {
        self.lower
            .iter()
            .zip(self.upper.iter())
            .map(|(lo, up)| up - lo)
            .product()
    }

    /// Coordinate of the longest side and its length. Ties go to the first
    /// element in storage order.
    pub fn widest(&self) -> (usize, usize, f64) {
        let (rows, cols) = self.shape();
        let mut best = (0, 0, f64::NEG_INFINITY);
        for j in 0..cols {
            for i in 0..rows {
                let w = self.width(i, j);
                if w > best.2 {
                    best = (i, j, w);
                }
            }
        }
        best
    }

    pub fn contains(&self, x: &Matrix<f64>) -> bool {
        x.shape() == self.shape()
            && x
                .iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(v, (lo, up))| lo <= v && v <= up)
    }

    /// Clamp `x` element-wise into the box.
    pub fn clamp(&self, x: &mut Matrix<f64>) {
        for ((v, lo), up) in x
            .as_mut_slice()
            .iter_mut()
            .zip(self.lower.iter())
            .zip(self.upper.iter())
        {
            *v = v.max(*lo).min(*up);
        }
    }

    pub fn midpoint(&self) -> Matrix<f64> {
        let (rows, cols) = self.shape();
        Matrix::from_fn(rows, cols, |i, j| {
            0.5 * (self.lower[(i, j)] + self.upper[(i, j)])
        })
    }

    /// Two halves separated by the hyperplane `x[(row, col)] = at`.
    ///
    /// `at` is clamped into the side's interval.
    pub fn bisect(&self, row: usize, col: usize, at: f64) -> (BoundBox, BoundBox) {
        let at = at.max(self.lower[(row, col)]).min(self.upper[(row, col)]);
        let mut left_upper = self.upper.clone();
        left_upper[(row, col)] = at;
        let mut right_lower = self.lower.clone();
        right_lower[(row, col)] = at;
        (
            BoundBox::from_parts_unchecked(self.lower.clone(), left_upper),
            BoundBox::from_parts_unchecked(right_lower, self.upper.clone()),
        )
    }
}
