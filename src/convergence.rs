use num_traits::Float;

use crate::error::{ensure, Result};
use crate::matrix::Matrix;

/// Termination thresholds shared by the problems in this workspace.
///
/// Problems embed one of these and forward their
/// [`is_optimization_over`](crate::Problem::is_optimization_over) to
/// [`is_met`](ConvergenceParams::is_met).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConvergenceParams<F> {
    /// Stop when `‖g‖ < grad_tol` (default: 1e-8).
    pub grad_tol: F,
    /// Stop when the last step is shorter than `step_tol` (default: 1e-14).
    pub step_tol: F,
}

impl Default for ConvergenceParams<f64> {
    fn default() -> Self {
        ConvergenceParams {
            grad_tol: 1e-8,
            step_tol: 1e-14,
        }
    }
}

impl Default for ConvergenceParams<f32> {
    fn default() -> Self {
        ConvergenceParams {
            grad_tol: 1e-5,
            step_tol: 1e-7,
        }
    }
}

impl<F: Float> ConvergenceParams<F> {
    pub fn new(grad_tol: F, step_tol: F) -> Self {
        ConvergenceParams { grad_tol, step_tol }
    }

    pub fn validate(&self) -> Result<()> {
        ensure(self.grad_tol > F::zero(), "grad_tol", "must be positive")?;
        ensure(self.step_tol >= F::zero(), "step_tol", "must be non-negative")
    }

    /// Gradient-norm or negligible-step test.
    pub fn is_met(&self, grad: &Matrix<F>, step: F) -> bool {
        grad.norm() < self.grad_tol || step < self.step_tol
    }
}
