use std::collections::VecDeque;

use num_traits::Float;

use crate::error::{ensure, Result};
use crate::line_search::{backtracking_armijo, ArmijoParams, LineSearchResult};
use crate::matrix::Matrix;
use crate::problem::Problem;
use crate::result::{OptimResult, TerminationReason};

/// Configuration for the L-BFGS solver.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LbfgsConfig<F> {
    /// Number of recent (s, y) pairs to store (default: 10).
    pub memory: usize,
    /// Iteration cap; the counter starts at the `start_iteration` passed to
    /// [`Lbfgs::optimize`] (default: 10_000).
    pub max_iterations: usize,
    /// Line search parameters.
    pub line_search: ArmijoParams<F>,
}

impl Default for LbfgsConfig<f64> {
    fn default() -> Self {
        LbfgsConfig {
            memory: 10,
            max_iterations: 10_000,
            line_search: ArmijoParams::default(),
        }
    }
}

impl Default for LbfgsConfig<f32> {
    fn default() -> Self {
        LbfgsConfig {
            memory: 10,
            max_iterations: 10_000,
            line_search: ArmijoParams::default(),
        }
    }
}

impl<F: Float> LbfgsConfig<F> {
    pub fn validate(&self) -> Result<()> {
        ensure(self.memory > 0, "memory", "must be positive")?;
        ensure(self.max_iterations > 0, "max_iterations", "must be positive")?;
        self.line_search.validate()
    }
}

/// One stored curvature pair. `rho = 1 / (yᵀs)` is finite and positive.
#[derive(Debug, Clone)]
pub struct CurvaturePair<F> {
    s: Matrix<F>,
    y: Matrix<F>,
    rho: F,
}

impl<F: Float> CurvaturePair<F> {
    pub fn s(&self) -> &Matrix<F> {
        &self.s
    }

    pub fn y(&self) -> &Matrix<F> {
        &self.y
    }

    pub fn rho(&self) -> F {
        self.rho
    }
}

/// Bounded FIFO of curvature pairs.
///
/// Evicted and cleared pairs keep their buffers for reuse, so a run
/// allocates at most `capacity` pairs.
#[derive(Debug, Clone)]
pub struct History<F> {
    pairs: VecDeque<CurvaturePair<F>>,
    spare: Vec<CurvaturePair<F>>,
    capacity: usize,
}

impl<F: Float> History<F> {
    pub fn new(capacity: usize) -> Self {
        History {
            pairs: VecDeque::with_capacity(capacity),
            spare: Vec::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &CurvaturePair<F>> {
        self.pairs.iter()
    }

    pub fn clear(&mut self) {
        self.spare.extend(self.pairs.drain(..));
    }

    /// Store `(s, y)` if `yᵀs` is strictly positive and finite.
    ///
    /// Returns `false` when the pair violates the curvature condition and was
    /// skipped.
    pub fn push(&mut self, s: &Matrix<F>, y: &Matrix<F>) -> bool {
        let sy = s.dot(y);
        let rho = F::one() / sy;
        if !(sy > F::zero()) || !sy.is_finite() || !rho.is_finite() {
            return false;
        }

        let recycled = if self.pairs.len() == self.capacity {
            self.pairs.pop_front()
        } else {
            self.spare.pop().filter(|p| p.s.shape() == s.shape())
        };
        let mut pair = recycled.unwrap_or_else(|| CurvaturePair {
            s: Matrix::zeros(s.rows(), s.cols()),
            y: Matrix::zeros(y.rows(), y.cols()),
            rho: F::zero(),
        });

        pair.s.copy_from(s);
        pair.y.copy_from(y);
        pair.rho = rho;
        self.pairs.push_back(pair);
        true
    }

    /// Two-loop recursion: `out = −H·g`, with `H₀ = γI` and
    /// `γ = sᵀy / yᵀy` from the newest pair (1 when empty).
    ///
    /// `alpha` is caller-owned scratch of length at least `len()`.
    pub fn apply_inverse_hessian(&self, g: &Matrix<F>, alpha: &mut [F], out: &mut Matrix<F>) {
        let k = self.pairs.len();
        debug_assert!(alpha.len() >= k);

        out.copy_from(g);

        for (i, pair) in self.pairs.iter().enumerate().rev() {
            alpha[i] = pair.rho * pair.s.dot(out);
            out.axpy(F::zero() - alpha[i], &pair.y);
        }

        if let Some(newest) = self.pairs.back() {
            let sy = newest.s.dot(&newest.y);
            let yy = newest.y.dot(&newest.y);
            if yy > F::zero() {
                out.scale(sy / yy);
            }
        }

        for (i, pair) in self.pairs.iter().enumerate() {
            let beta = pair.rho * pair.y.dot(out);
            out.axpy(alpha[i] - beta, &pair.s);
        }

        out.scale(F::zero() - F::one());
    }
}

/// Limited-memory BFGS minimizer.
///
/// The optimizer owns its curvature history and scratch buffers; each call to
/// [`optimize`](Lbfgs::optimize) starts with an empty history from the
/// supplied point.
#[derive(Debug, Clone)]
pub struct Lbfgs<F> {
    config: LbfgsConfig<F>,
    history: History<F>,
    alpha: Vec<F>,
    grad: Matrix<F>,
    new_grad: Matrix<F>,
    projected_grad: Matrix<F>,
    direction: Matrix<F>,
    trial: Matrix<F>,
    shifted: Matrix<F>,
}

impl<F: Float> Lbfgs<F> {
    pub fn new(config: LbfgsConfig<F>) -> Result<Self> {
        config.validate()?;
        Ok(Lbfgs {
            history: History::new(config.memory),
            alpha: vec![F::zero(); config.memory],
            grad: Matrix::zeros(0, 0),
            new_grad: Matrix::zeros(0, 0),
            projected_grad: Matrix::zeros(0, 0),
            direction: Matrix::zeros(0, 0),
            trial: Matrix::zeros(0, 0),
            shifted: Matrix::zeros(0, 0),
            config,
        })
    }

    pub fn config(&self) -> &LbfgsConfig<F> {
        &self.config
    }

    /// Curvature pairs retained by the last run.
    pub fn history(&self) -> &History<F> {
        &self.history
    }

    /// Minimize `problem` starting from `x`, leaving the final iterate in `x`.
    ///
    /// The iteration counter starts at `start_iteration` and the run stops at
    /// `config.max_iterations`. The result is
    /// [`converged`](OptimResult::converged) only when the problem's
    /// termination predicate held.
    pub fn optimize<P: Problem<F> + ?Sized>(
        &mut self,
        problem: &mut P,
        start_iteration: usize,
        x: &mut Matrix<F>,
    ) -> OptimResult<F> {
        self.prepare(x.shape());
        self.history.clear();

        problem.project(x);
        let mut value = problem.evaluate(x);
        let mut func_evals = 1usize;
        let mut iteration = start_iteration;

        if problem.is_diverging(value) {
            return self.finish(
                value,
                F::infinity(),
                iteration,
                func_evals,
                TerminationReason::Diverged,
            );
        }

        problem.gradient(x, &mut self.grad);
        let mut pg_norm = self.update_projected_gradient(problem, x);

        if problem.is_optimization_over(x, &self.projected_grad, F::infinity()) {
            return self.finish(
                value,
                pg_norm,
                iteration,
                func_evals,
                TerminationReason::Converged,
            );
        }

        while iteration < self.config.max_iterations {
            let ls = match self.search(problem, x, value, pg_norm, &mut func_evals) {
                Some(ls) => ls,
                None => {
                    return self.finish(
                        value,
                        pg_norm,
                        iteration,
                        func_evals,
                        TerminationReason::LineSearchFailed,
                    );
                }
            };
            iteration += 1;

            problem.gradient(&self.trial, &mut self.new_grad);

            // direction and shifted are free until the next search: reuse them for s and y
            self.direction.sub_overwrite(&self.trial, x);
            self.shifted.sub_overwrite(&self.new_grad, &self.grad);
            let step = self.direction.norm();
            self.history.push(&self.direction, &self.shifted);

            x.copy_from(&self.trial);
            std::mem::swap(&mut self.grad, &mut self.new_grad);
            value = ls.value;

            if problem.is_diverging(value) {
                return self.finish(
                    value,
                    pg_norm,
                    iteration,
                    func_evals,
                    TerminationReason::Diverged,
                );
            }

            pg_norm = self.update_projected_gradient(problem, x);

            if problem.is_optimization_over(x, &self.projected_grad, step) {
                return self.finish(
                    value,
                    pg_norm,
                    iteration,
                    func_evals,
                    TerminationReason::Converged,
                );
            }
            if problem.is_intermediate_step_over(x, &self.projected_grad, step) {
                log::trace!(
                    "lbfgs: intermediate step over at iteration {}, restarting history",
                    iteration
                );
                self.history.clear();
            }
        }

        log::trace!("lbfgs: iteration cap {} reached", self.config.max_iterations);
        self.finish(
            value,
            pg_norm,
            iteration,
            func_evals,
            TerminationReason::MaxIterations,
        )
    }

    /// Quasi-Newton direction plus line search, falling back to steepest
    /// descent once when the direction is not a descent direction or the
    /// search exhausts.
    fn search<P: Problem<F> + ?Sized>(
        &mut self,
        problem: &mut P,
        x: &Matrix<F>,
        value: F,
        pg_norm: F,
        func_evals: &mut usize,
    ) -> Option<LineSearchResult<F>> {
        self.history.apply_inverse_hessian(
            &self.projected_grad,
            &mut self.alpha,
            &mut self.direction,
        );
        if !(self.direction.dot(&self.projected_grad) < F::zero()) {
            self.steepest_descent();
        }

        loop {
            let ls = backtracking_armijo(
                problem,
                x,
                &self.direction,
                value,
                pg_norm,
                &self.config.line_search,
                &mut self.trial,
            );
            match ls {
                Some(ls) => {
                    *func_evals += ls.evals;
                    return Some(ls);
                }
                None if !self.history.is_empty() => {
                    *func_evals += self.config.line_search.max_backtracks + 1;
                    self.steepest_descent();
                }
                None => return None,
            }
        }
    }

    fn steepest_descent(&mut self) {
        self.history.clear();
        self.direction.copy_from(&self.projected_grad);
        self.direction.scale(F::zero() - F::one());
    }

    /// `projected_grad = x − P(x − g)`; returns its norm.
    fn update_projected_gradient<P: Problem<F> + ?Sized>(
        &mut self,
        problem: &mut P,
        x: &Matrix<F>,
    ) -> F {
        self.shifted.copy_from(x);
        self.shifted.axpy(F::zero() - F::one(), &self.grad);
        problem.project(&mut self.shifted);
        self.projected_grad.sub_overwrite(x, &self.shifted);
        self.projected_grad.norm()
    }

    fn prepare(&mut self, shape: (usize, usize)) {
        if self.grad.shape() == shape {
            return;
        }
        let (rows, cols) = shape;
        self.grad = Matrix::zeros(rows, cols);
        self.new_grad = Matrix::zeros(rows, cols);
        self.projected_grad = Matrix::zeros(rows, cols);
        self.direction = Matrix::zeros(rows, cols);
        self.trial = Matrix::zeros(rows, cols);
        self.shifted = Matrix::zeros(rows, cols);
        self.history = History::new(self.config.memory);
    }

    fn finish(
        &self,
        value: F,
        gradient_norm: F,
        iterations: usize,
        func_evals: usize,
        termination: TerminationReason,
    ) -> OptimResult<F> {
        OptimResult {
            value,
            gradient_norm,
            iterations,
            func_evals,
            termination,
        }
    }
}

/// Minimize `problem` from `x` with a fresh optimizer.
pub fn lbfgs<F: Float, P: Problem<F> + ?Sized>(
    problem: &mut P,
    x: &mut Matrix<F>,
    config: &LbfgsConfig<F>,
) -> Result<OptimResult<F>> {
    let mut solver = Lbfgs::new(config.clone())?;
    Ok(solver.optimize(problem, 0, x))
}
