#![allow(dead_code)]

use fastopt::{ConstrainedProblem, ConvergenceParams, Matrix, Problem};

// ─── Rosenbrock ────────────────────────────────────────────────────────────

/// f(x, y) = (1 − x)² + 100(y − x²)², minimum 0 at (1, 1).
pub struct Rosenbrock {
    pub convergence: ConvergenceParams<f64>,
}

impl Default for Rosenbrock {
    fn default() -> Self {
        Rosenbrock {
            convergence: ConvergenceParams::default(),
        }
    }
}

impl Problem<f64> for Rosenbrock {
    fn evaluate(&mut self, x: &Matrix<f64>) -> f64 {
        generalized_rosenbrock_value(x.as_slice())
    }

    fn gradient(&mut self, x: &Matrix<f64>, grad: &mut Matrix<f64>) {
        generalized_rosenbrock_gradient(x.as_slice(), grad.as_mut_slice());
    }

    fn is_optimization_over(&mut self, _: &Matrix<f64>, g: &Matrix<f64>, step: f64) -> bool {
        self.convergence.is_met(g, step)
    }

    fn initial_point(&mut self) -> Matrix<f64> {
        Matrix::column_vector(&[-1.2, 1.0])
    }
}

// ─── Generalized Rosenbrock ────────────────────────────────────────────────

/// Σᵢ 100(xᵢ₊₁ − xᵢ²)² + (1 − xᵢ)², minimum 0 at (1, …, 1).
pub struct GeneralizedRosenbrock {
    pub dim: usize,
    pub convergence: ConvergenceParams<f64>,
}

impl GeneralizedRosenbrock {
    pub fn new(dim: usize) -> Self {
        GeneralizedRosenbrock {
            dim,
            convergence: ConvergenceParams::default(),
        }
    }
}

pub fn generalized_rosenbrock_value(x: &[f64]) -> f64 {
    let mut sum = 0.0;
    for i in 0..x.len() - 1 {
        let t1 = 1.0 - x[i];
        let t2 = x[i + 1] - x[i] * x[i];
        sum += t1 * t1 + 100.0 * t2 * t2;
    }
    sum
}

pub fn generalized_rosenbrock_gradient(x: &[f64], g: &mut [f64]) {
    let n = x.len();
    for gi in g.iter_mut() {
        *gi = 0.0;
    }
    for i in 0..n - 1 {
        let t2 = x[i + 1] - x[i] * x[i];
        g[i] += -400.0 * x[i] * t2 - 2.0 * (1.0 - x[i]);
        g[i + 1] += 200.0 * t2;
    }
}

impl Problem<f64> for GeneralizedRosenbrock {
    fn evaluate(&mut self, x: &Matrix<f64>) -> f64 {
        generalized_rosenbrock_value(x.as_slice())
    }

    fn gradient(&mut self, x: &Matrix<f64>, grad: &mut Matrix<f64>) {
        generalized_rosenbrock_gradient(x.as_slice(), grad.as_mut_slice());
    }

    fn is_optimization_over(&mut self, _: &Matrix<f64>, g: &Matrix<f64>, step: f64) -> bool {
        self.convergence.is_met(g, step)
    }

    fn initial_point(&mut self) -> Matrix<f64> {
        Matrix::from_fn(self.dim, 1, |i, _| if i % 2 == 0 { 1.2 } else { 1.0 })
    }
}

// ─── Wood ──────────────────────────────────────────────────────────────────

pub fn wood_value(x: &[f64]) -> f64 {
    let (x1, x2, x3, x4) = (x[0], x[1], x[2], x[3]);
    100.0 * (x2 - x1 * x1).powi(2)
        + (1.0 - x1).powi(2)
        + 90.0 * (x4 - x3 * x3).powi(2)
        + (1.0 - x3).powi(2)
        + 10.1 * ((x2 - 1.0).powi(2) + (x4 - 1.0).powi(2))
        + 19.8 * (x2 - 1.0) * (x4 - 1.0)
}

pub fn wood_gradient(x: &[f64], g: &mut [f64]) {
    let (x1, x2, x3, x4) = (x[0], x[1], x[2], x[3]);
    g[0] = -400.0 * x1 * (x2 - x1 * x1) - 2.0 * (1.0 - x1);
    g[1] = 200.0 * (x2 - x1 * x1) + 20.2 * (x2 - 1.0) + 19.8 * (x4 - 1.0);
    g[2] = -360.0 * x3 * (x4 - x3 * x3) - 2.0 * (1.0 - x3);
    g[3] = 180.0 * (x4 - x3 * x3) + 20.2 * (x4 - 1.0) + 19.8 * (x2 - 1.0);
}

/// Four-dimensional Wood function, minimum 0 at (1, 1, 1, 1).
pub struct Wood {
    pub convergence: ConvergenceParams<f64>,
}

impl Default for Wood {
    fn default() -> Self {
        Wood {
            convergence: ConvergenceParams::default(),
        }
    }
}

impl Problem<f64> for Wood {
    fn evaluate(&mut self, x: &Matrix<f64>) -> f64 {
        wood_value(x.as_slice())
    }

    fn gradient(&mut self, x: &Matrix<f64>, grad: &mut Matrix<f64>) {
        wood_gradient(x.as_slice(), grad.as_mut_slice());
    }

    fn is_optimization_over(&mut self, _: &Matrix<f64>, g: &Matrix<f64>, step: f64) -> bool {
        self.convergence.is_met(g, step)
    }

    fn initial_point(&mut self) -> Matrix<f64> {
        Matrix::column_vector(&[-3.0, -1.0, -3.0, -1.0])
    }
}

// ─── Rosenbrock-Wood ───────────────────────────────────────────────────────

/// 4 x 2 matrix problem: column 0 is a Wood function, column 1 a 4-D
/// generalized Rosenbrock.
pub struct RosenbrockWood {
    pub convergence: ConvergenceParams<f64>,
}

impl Default for RosenbrockWood {
    fn default() -> Self {
        RosenbrockWood {
            convergence: ConvergenceParams::default(),
        }
    }
}

impl Problem<f64> for RosenbrockWood {
    fn evaluate(&mut self, x: &Matrix<f64>) -> f64 {
        wood_value(x.col(0)) + generalized_rosenbrock_value(x.col(1))
    }

    fn gradient(&mut self, x: &Matrix<f64>, grad: &mut Matrix<f64>) {
        wood_gradient(x.col(0), grad.col_mut(0));
        generalized_rosenbrock_gradient(x.col(1), grad.col_mut(1));
    }

    fn is_optimization_over(&mut self, _: &Matrix<f64>, g: &Matrix<f64>, step: f64) -> bool {
        self.convergence.is_met(g, step)
    }

    fn initial_point(&mut self) -> Matrix<f64> {
        Matrix::from_column_slice(4, 2, &[-3.0, -1.0, -3.0, -1.0, 1.2, 1.0, 1.2, 1.0]).unwrap()
    }
}

// ─── Equality-constrained problems ─────────────────────────────────────────

/// min f(x) s.t. c(x) = 0 with a single scalar constraint.
pub struct ScalarConstrained {
    pub f: fn(&[f64]) -> f64,
    pub grad_f: fn(&[f64], &mut [f64]),
    pub c: fn(&[f64]) -> f64,
    pub grad_c: fn(&[f64], &mut [f64]),
    pub start: Vec<f64>,
    pub lambda: f64,
    pub sigma: f64,
    pub inner_tol: f64,
    pub feasibility_tol: f64,
    scratch: Vec<f64>,
}

impl ScalarConstrained {
    pub fn new(
        f: fn(&[f64]) -> f64,
        grad_f: fn(&[f64], &mut [f64]),
        c: fn(&[f64]) -> f64,
        grad_c: fn(&[f64], &mut [f64]),
        start: Vec<f64>,
    ) -> Self {
        let n = start.len();
        ScalarConstrained {
            f,
            grad_f,
            c,
            grad_c,
            start,
            lambda: 0.0,
            sigma: 1.0,
            inner_tol: 1e-8,
            feasibility_tol: 1e-16,
            scratch: vec![0.0; n],
        }
    }

    /// ‖∇f(x) − λ∇c(x)‖ at the current multiplier.
    pub fn stationarity(&mut self, x: &Matrix<f64>) -> f64 {
        let n = self.start.len();
        let mut gf = vec![0.0; n];
        (self.grad_f)(x.as_slice(), &mut gf);
        (self.grad_c)(x.as_slice(), &mut self.scratch);
        gf.iter()
            .zip(&self.scratch)
            .map(|(a, b)| (a - self.lambda * b).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

impl Problem<f64> for ScalarConstrained {
    fn evaluate(&mut self, x: &Matrix<f64>) -> f64 {
        (self.f)(x.as_slice())
    }

    fn gradient(&mut self, x: &Matrix<f64>, grad: &mut Matrix<f64>) {
        let c = (self.c)(x.as_slice());
        (self.grad_f)(x.as_slice(), grad.as_mut_slice());
        (self.grad_c)(x.as_slice(), &mut self.scratch);
        let coef = -self.lambda + self.sigma * c;
        for (g, dc) in grad.as_mut_slice().iter_mut().zip(&self.scratch) {
            *g += coef * dc;
        }
    }

    fn is_optimization_over(&mut self, x: &Matrix<f64>, _: &Matrix<f64>, _: f64) -> bool {
        self.feasibility_error(x) < self.feasibility_tol
    }

    fn is_intermediate_step_over(&mut self, _: &Matrix<f64>, g: &Matrix<f64>, _: f64) -> bool {
        g.norm() < self.inner_tol
    }

    fn initial_point(&mut self) -> Matrix<f64> {
        Matrix::column_vector(&self.start)
    }
}

impl ConstrainedProblem<f64> for ScalarConstrained {
    fn feasibility_error(&mut self, x: &Matrix<f64>) -> f64 {
        (self.c)(x.as_slice()).powi(2)
    }

    fn lagrangian(&mut self, x: &Matrix<f64>) -> f64 {
        let c = (self.c)(x.as_slice());
        (self.f)(x.as_slice()) - self.lambda * c + 0.5 * self.sigma * c * c
    }

    fn update_lagrange_mult(&mut self, x: &Matrix<f64>) {
        self.lambda -= self.sigma * (self.c)(x.as_slice());
    }

    fn set_sigma(&mut self, sigma: f64) {
        self.sigma = sigma;
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }
}

/// Central-difference gradient of `p.evaluate` at `x`.
pub fn finite_difference_gradient<P: Problem<f64>>(p: &mut P, x: &Matrix<f64>, h: f64) -> Matrix<f64> {
    let mut g = Matrix::zeros(x.rows(), x.cols());
    let mut xp = x.clone();
    for k in 0..x.len() {
        let orig = xp.as_slice()[k];
        xp.as_mut_slice()[k] = orig + h;
        let fp = p.evaluate(&xp);
        xp.as_mut_slice()[k] = orig - h;
        let fm = p.evaluate(&xp);
        xp.as_mut_slice()[k] = orig;
        g.as_mut_slice()[k] = (fp - fm) / (2.0 * h);
    }
    g
}
