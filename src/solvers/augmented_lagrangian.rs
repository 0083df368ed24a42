use num_traits::Float;

use crate::error::{ensure, Result};
use crate::matrix::Matrix;
use crate::problem::{ConstrainedProblem, Problem};
use crate::result::TerminationReason;
use crate::solvers::lbfgs::{Lbfgs, LbfgsConfig};

/// Penalty and multiplier schedule for the augmented-Lagrangian outer loop.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AugLagConfig<F> {
    /// Required feasibility reduction factor for a multiplier update (default: 0.25).
    pub eta: F,
    /// Penalty growth factor when the reduction is not reached (default: 1.1).
    pub gamma: F,
    /// Initial penalty weight σ₀ (default: 10).
    pub sigma0: F,
    /// Cap on outer rounds (default: 100).
    pub max_rounds: usize,
}

impl Default for AugLagConfig<f64> {
    fn default() -> Self {
        AugLagConfig {
            eta: 0.25,
            gamma: 1.1,
            sigma0: 10.0,
            max_rounds: 100,
        }
    }
}

impl Default for AugLagConfig<f32> {
    fn default() -> Self {
        AugLagConfig {
            eta: 0.25,
            gamma: 1.1,
            sigma0: 10.0,
            max_rounds: 100,
        }
    }
}

impl<F: Float> AugLagConfig<F> {
    pub fn validate(&self) -> Result<()> {
        ensure(
            self.eta > F::zero() && self.eta < F::one(),
            "eta",
            "must lie in (0, 1)",
        )?;
        ensure(self.gamma > F::one(), "gamma", "must exceed 1")?;
        ensure(self.sigma0 > F::zero(), "sigma0", "must be positive")?;
        ensure(self.max_rounds > 0, "max_rounds", "must be positive")
    }
}

/// Outcome of an augmented-Lagrangian run. The iterate is updated in place.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AugLagResult<F> {
    /// `f(x)` at the final iterate.
    pub value: F,
    /// Constraint violation at the final iterate.
    pub feasibility_error: F,
    /// Penalty weight at exit.
    pub sigma: F,
    /// Outer rounds performed.
    pub rounds: usize,
    /// L-BFGS iterations summed over all rounds.
    pub inner_iterations: usize,
    /// Inner rounds that ended without converging.
    pub failed_rounds: usize,
    /// `Converged` when the problem's outer test held, `MaxIterations` when
    /// the round cap was hit.
    pub termination: TerminationReason,
}

impl<F> AugLagResult<F> {
    pub fn converged(&self) -> bool {
        self.termination == TerminationReason::Converged
    }
}

/// Presents `L(·; λ, σ)` of a constrained problem as a plain [`Problem`].
///
/// The inner optimizer stops on the problem's per-round test
/// ([`is_intermediate_step_over`](Problem::is_intermediate_step_over)).
pub struct LagrangianView<'a, P: ?Sized> {
    inner: &'a mut P,
}

impl<'a, P: ?Sized> LagrangianView<'a, P> {
    pub fn new(inner: &'a mut P) -> Self {
        LagrangianView { inner }
    }
}

impl<'a, F: Float, P: ConstrainedProblem<F> + ?Sized> Problem<F> for LagrangianView<'a, P> {
    fn evaluate(&mut self, x: &Matrix<F>) -> F {
        self.inner.lagrangian(x)
    }

    fn gradient(&mut self, x: &Matrix<F>, grad: &mut Matrix<F>) {
        self.inner.gradient(x, grad);
    }

    fn is_optimization_over(&mut self, x: &Matrix<F>, grad: &Matrix<F>, step: F) -> bool {
        self.inner.is_intermediate_step_over(x, grad, step)
    }

    fn is_diverging(&mut self, value: F) -> bool {
        self.inner.is_diverging(value)
    }

    fn project(&mut self, x: &mut Matrix<F>) {
        self.inner.project(x);
    }

    fn initial_point(&mut self) -> Matrix<F> {
        self.inner.initial_point()
    }
}

/// Powell–Hestenes–Rockafellar outer loop around [`Lbfgs`].
///
/// After each inner run: if the feasibility error dropped below
/// `eta × previous`, the multipliers are updated and the error recorded as
/// the new `previous`; otherwise σ grows by `gamma` and everything else is
/// left alone. `previous` starts at +∞.
#[derive(Debug, Clone)]
pub struct AugmentedLagrangian<F> {
    config: AugLagConfig<F>,
    lbfgs: Lbfgs<F>,
    grad: Matrix<F>,
}

impl<F: Float> AugmentedLagrangian<F> {
    pub fn new(config: AugLagConfig<F>, lbfgs: LbfgsConfig<F>) -> Result<Self> {
        config.validate()?;
        Ok(AugmentedLagrangian {
            config,
            lbfgs: Lbfgs::new(lbfgs)?,
            grad: Matrix::zeros(0, 0),
        })
    }

    pub fn config(&self) -> &AugLagConfig<F> {
        &self.config
    }

    pub fn lbfgs(&self) -> &Lbfgs<F> {
        &self.lbfgs
    }

    pub fn optimize<P: ConstrainedProblem<F> + ?Sized>(
        &mut self,
        problem: &mut P,
        x: &mut Matrix<F>,
    ) -> AugLagResult<F> {
        if self.grad.shape() != x.shape() {
            self.grad = Matrix::zeros(x.rows(), x.cols());
        }

        let mut sigma = self.config.sigma0;
        problem.set_sigma(sigma);
        let mut previous = F::infinity();
        let mut inner_iterations = 0;
        let mut failed_rounds = 0;

        for round in 0..self.config.max_rounds {
            let inner = self
                .lbfgs
                .optimize(&mut LagrangianView::new(&mut *problem), 0, x);
            inner_iterations += inner.iterations;
            if !inner.converged() {
                failed_rounds += 1;
                log::warn!(
                    "augmented lagrangian: inner round {} ended with {} after {} iterations",
                    round,
                    inner.termination,
                    inner.iterations
                );
            }

            let feasibility = problem.feasibility_error(x);
            if feasibility < self.config.eta * previous {
                problem.update_lagrange_mult(x);
                previous = feasibility;
                log::debug!(
                    "augmented lagrangian: round {} feasibility {:.3e}, multipliers updated (sigma {:.3e})",
                    round,
                    feasibility.to_f64().unwrap_or(f64::NAN),
                    sigma.to_f64().unwrap_or(f64::NAN)
                );
            } else {
                sigma = sigma * self.config.gamma;
                problem.set_sigma(sigma);
                log::debug!(
                    "augmented lagrangian: round {} feasibility {:.3e}, sigma raised to {:.3e}",
                    round,
                    feasibility.to_f64().unwrap_or(f64::NAN),
                    sigma.to_f64().unwrap_or(f64::NAN)
                );
            }

            problem.gradient(x, &mut self.grad);
            if problem.is_optimization_over(x, &self.grad, F::infinity()) {
                return AugLagResult {
                    value: problem.evaluate(x),
                    feasibility_error: feasibility,
                    sigma,
                    rounds: round + 1,
                    inner_iterations,
                    failed_rounds,
                    termination: TerminationReason::Converged,
                };
            }
        }

        log::warn!(
            "augmented lagrangian: round cap {} reached",
            self.config.max_rounds
        );
        AugLagResult {
            value: problem.evaluate(x),
            feasibility_error: problem.feasibility_error(x),
            sigma,
            rounds: self.config.max_rounds,
            inner_iterations,
            failed_rounds,
            termination: TerminationReason::MaxIterations,
        }
    }
}
