//! The capability surface the solvers consume.
//!
//! [`Problem`] is everything the L-BFGS loop needs. [`ConstrainedProblem`]
//! adds the hooks the augmented-Lagrangian driver uses between inner runs,
//! and [`RelaxedProblem`] the queries the branch-and-bound engine makes of a
//! convex relaxation. Methods take `&mut self` so implementors can own their
//! scratch buffers and reuse them across calls.

use num_traits::Float;

use crate::matrix::Matrix;

/// An objective over matrix-shaped variables.
pub trait Problem<F: Float> {
    /// Objective value at `x`. Must be deterministic in `x`.
    fn evaluate(&mut self, x: &Matrix<F>) -> F;

    /// Write `∇f(x)` into `grad`, which has the shape of `x`.
    fn gradient(&mut self, x: &Matrix<F>, grad: &mut Matrix<F>);

    /// Outer termination test for the current problem.
    ///
    /// `grad` is the projected gradient `x − P(x − ∇f(x))`, which is `∇f(x)`
    /// when [`project`](Problem::project) is the identity. `step` is the
    /// length of the last accepted step. The optimizer stops as soon as this
    /// returns `true`.
    fn is_optimization_over(&mut self, x: &Matrix<F>, grad: &Matrix<F>, step: F) -> bool;

    /// Inner termination test. When it holds but
    /// [`is_optimization_over`](Problem::is_optimization_over) does not, the
    /// optimizer discards its curvature history and restarts from the
    /// current point.
    fn is_intermediate_step_over(&mut self, x: &Matrix<F>, grad: &Matrix<F>, step: F) -> bool {
        self.is_optimization_over(x, grad, step)
    }

    /// `true` if `value` is pathological; the run then terminates as failed.
    fn is_diverging(&mut self, value: F) -> bool {
        !value.is_finite()
    }

    /// Clip `x` back into the admissible set. Must be idempotent.
    fn project(&mut self, x: &mut Matrix<F>) {
        let _ = x;
    }

    /// A valid starting point.
    fn initial_point(&mut self) -> Matrix<F>;
}

/// A problem `min f(x)` subject to `c(x) = 0`, solved through the augmented
/// Lagrangian `L(x; λ, σ) = f(x) − λᵀc(x) + (σ/2)‖c(x)‖²`.
///
/// For these problems [`Problem::evaluate`] is `f`, while
/// [`Problem::gradient`] is `∇ₓL` at the current multipliers and penalty.
/// [`Problem::is_optimization_over`] is the outer (feasibility) test and
/// [`Problem::is_intermediate_step_over`] the per-round stationarity test.
pub trait ConstrainedProblem<F: Float>: Problem<F> {
    /// Constraint violation at `x`. Zero means feasible.
    fn feasibility_error(&mut self, x: &Matrix<F>) -> F;

    /// `L(x; λ, σ)` at the current multipliers and penalty weight.
    fn lagrangian(&mut self, x: &Matrix<F>) -> F;

    /// `λ ← λ − σ·c(x)`.
    fn update_lagrange_mult(&mut self, x: &Matrix<F>);

    fn set_sigma(&mut self, sigma: F);

    fn sigma(&self) -> F;
}

/// A convex relaxation queried by branch and bound.
pub trait RelaxedProblem<F: Float>: ConstrainedProblem<F> {
    /// Minimum relaxed objective reached by the last optimization over this
    /// problem. `None` before the first run.
    fn soft_lower_bound(&self) -> Option<F>;

    /// `true` when the relaxed feasible set is empty over the current box.
    fn is_infeasible(&self) -> bool;

    /// The original (non-relaxed) objective at `x`.
    fn non_relaxed_objective(&mut self, x: &Matrix<F>) -> F;

    /// Record the relaxed value reached at the end of a run.
    fn record_lower_bound(&mut self, x: &Matrix<F>);
}
