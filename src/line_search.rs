use num_traits::Float;

use crate::error::{ensure, Result};
use crate::matrix::Matrix;
use crate::problem::Problem;

/// Parameters for the backtracking Armijo line search.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArmijoParams<F> {
    /// Sufficient decrease parameter σ (default: 1e-4).
    pub sigma: F,
    /// Backtracking factor ρ (default: 0.5).
    pub beta: F,
    /// Length of the first trial step along the normalized direction
    /// (default: 1.0).
    pub step_size: F,
    /// Number of shrinkings before declaring failure (default: 40).
    pub max_backtracks: usize,
}

impl Default for ArmijoParams<f64> {
    fn default() -> Self {
        ArmijoParams {
            sigma: 1e-4,
            beta: 0.5,
            step_size: 1.0,
            max_backtracks: 40,
        }
    }
}

impl Default for ArmijoParams<f32> {
    fn default() -> Self {
        ArmijoParams {
            sigma: 1e-4,
            beta: 0.5,
            step_size: 1.0,
            max_backtracks: 24,
        }
    }
}

impl<F: Float> ArmijoParams<F> {
    pub fn validate(&self) -> Result<()> {
        ensure(
            self.sigma > F::zero() && self.sigma < F::one(),
            "sigma",
            "must lie in (0, 1)",
        )?;
        ensure(
            self.beta > F::zero() && self.beta < F::one(),
            "beta",
            "must lie in (0, 1)",
        )?;
        ensure(self.step_size > F::zero(), "step_size", "must be positive")
    }
}

/// Result of a successful line search.
#[derive(Debug, Clone, Copy)]
pub struct LineSearchResult<F> {
    /// The accepted shrink factor β.
    pub beta: F,
    /// Length of the trial step before projection, `β · step_size`.
    pub step_length: F,
    /// Objective value at the accepted (projected) point.
    pub value: F,
    /// Number of objective evaluations used.
    pub evals: usize,
}

/// Backtracking search along the normalized direction `d / ‖d‖`.
///
/// Trial points are `P(x + β·step_size·d/‖d‖)` with `β = 1, ρ, ρ², …`. A
/// trial is accepted when `f(x) − f(trial) ≥ σ·β·step_size·‖g‖`, where
/// `grad_norm` is the norm of the
/// (projected) gradient at `x`. On success the accepted point is left in
/// `trial`.
///
/// Returns `None` if no trial is accepted within `max_backtracks` shrinkings
/// or `d` is zero or non-finite.
#[allow(clippy::too_many_arguments)]
pub fn backtracking_armijo<F: Float, P: Problem<F> + ?Sized>(
    problem: &mut P,
    x: &Matrix<F>,
    direction: &Matrix<F>,
    f_x: F,
    grad_norm: F,
    params: &ArmijoParams<F>,
    trial: &mut Matrix<F>,
) -> Option<LineSearchResult<F>> {
    let d_norm = direction.norm();
    if !(d_norm > F::zero()) || !d_norm.is_finite() {
        return None;
    }
    let mut beta = F::one();
    let mut evals = 0;

    for _ in 0..=params.max_backtracks {
        let t = beta * params.step_size;
        trial.copy_from(x);
        trial.axpy(t / d_norm, direction);
        problem.project(trial);

        let f_new = problem.evaluate(trial);
        evals += 1;

        // NaN compares false and falls through to shrinking
        if f_x - f_new >= params.sigma * t * grad_norm {
            return Some(LineSearchResult {
                beta,
                step_length: t,
                value: f_new,
                evals,
            });
        }

        beta = beta * params.beta;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// f(x) = 0.5 * (x0^2 + x1^2)
    struct Quadratic;

    impl Problem<f64> for Quadratic {
        fn evaluate(&mut self, x: &Matrix<f64>) -> f64 {
            0.5 * x.dot(x)
        }

        fn gradient(&mut self, x: &Matrix<f64>, grad: &mut Matrix<f64>) {
            grad.copy_from(x);
        }

        fn is_optimization_over(&mut self, _: &Matrix<f64>, g: &Matrix<f64>, _: f64) -> bool {
            g.norm() < 1e-10
        }

        fn initial_point(&mut self) -> Matrix<f64> {
            Matrix::column_vector(&[2.0, 3.0])
        }
    }

    fn steepest(x: &Matrix<f64>) -> Matrix<f64> {
        let mut d = x.clone();
        d.scale(-1.0);
        d
    }

    #[test]
    fn armijo_quadratic_descent() {
        let mut p = Quadratic;
        let x = p.initial_point();
        let f_x = p.evaluate(&x);
        let d = steepest(&x);
        let mut trial = Matrix::zeros(2, 1);

        let params = ArmijoParams::default();
        let ls = backtracking_armijo(&mut p, &x, &d, f_x, x.norm(), &params, &mut trial).unwrap();

        assert!(ls.value < f_x);
        assert!(f_x - ls.value >= params.sigma * ls.step_length * x.norm());
        assert_eq!(ls.value, p.evaluate(&trial));
    }

    #[test]
    fn step_is_capped_by_step_size() {
        let mut p = Quadratic;
        let x = p.initial_point();
        let f_x = p.evaluate(&x);
        let d = steepest(&x);
        let mut trial = Matrix::zeros(2, 1);

        let params = ArmijoParams {
            step_size: 0.25,
            ..ArmijoParams::default()
        };
        let ls = backtracking_armijo(&mut p, &x, &d, f_x, x.norm(), &params, &mut trial).unwrap();
        assert_eq!(ls.beta, 1.0);
        assert!((ls.step_length - 0.25).abs() < 1e-15);
    }

    #[test]
    fn short_direction_is_still_stepped_at_full_length() {
        // ‖d‖ = 0.5: the unit step lands on −x, no decrease, so it is halved
        let mut p = Quadratic;
        let x = Matrix::column_vector(&[0.3, -0.4]);
        let f_x = p.evaluate(&x);
        let d = steepest(&x);
        let mut trial = Matrix::zeros(2, 1);

        let ls = backtracking_armijo(
            &mut p,
            &x,
            &d,
            f_x,
            x.norm(),
            &ArmijoParams::default(),
            &mut trial,
        )
        .unwrap();
        assert_eq!(ls.beta, 0.5);
        assert_eq!(ls.step_length, 0.5);
        assert!(trial.norm() < 1e-15);
    }

    #[test]
    fn ascent_direction_exhausts() {
        let mut p = Quadratic;
        let x = p.initial_point();
        let f_x = p.evaluate(&x);
        let d = x.clone();
        let mut trial = Matrix::zeros(2, 1);

        let ls = backtracking_armijo(
            &mut p,
            &x,
            &d,
            f_x,
            x.norm(),
            &ArmijoParams::default(),
            &mut trial,
        );
        assert!(ls.is_none());
    }

    #[test]
    fn zero_direction_fails_immediately() {
        let mut p = Quadratic;
        let x = p.initial_point();
        let d = Matrix::zeros(2, 1);
        let mut trial = Matrix::zeros(2, 1);
        let ls = backtracking_armijo(
            &mut p,
            &x,
            &d,
            1.0,
            1.0,
            &ArmijoParams::default(),
            &mut trial,
        );
        assert!(ls.is_none());
    }

    #[test]
    fn validate_rejects_bad_factors() {
        assert!(ArmijoParams::<f64>::default().validate().is_ok());
        let bad = ArmijoParams {
            beta: 1.0,
            ..ArmijoParams::default()
        };
        assert!(bad.validate().is_err());
    }
}
