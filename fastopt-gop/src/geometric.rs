use fastopt::{
    AugLagResult, AugmentedLagrangian, ConstrainedProblem, ConvergenceParams, Error, Lbfgs,
    Matrix, OptimResult, Problem, Result,
};

use crate::bounds::BoundBox;
use crate::factor::{add_nmf_gradient, nmf_objective, FactorLayout};
use crate::knn::NeighborPair;
use crate::observations::Observations;

/// Local search on the exact log-space NMF objective inside a box.
///
/// Without neighbor pairs any point it returns is feasible for the original
/// problem, so its value is an upper bound on the global minimum. With pairs
/// the distances `‖e^{x_p} − e^{x_q}‖² = d_pq` between columns of `H` are
/// exact equality constraints for the augmented Lagrangian, and only points
/// passing [`is_feasible`](GeometricNmf::is_feasible) bound the isometric
/// problem.
#[derive(Debug, Clone)]
pub struct GeometricNmf {
    obs: Observations,
    layout: FactorLayout,
    bounds: BoundBox,
    convergence: ConvergenceParams<f64>,
    pairs: Vec<NeighborPair>,
    multipliers: Vec<f64>,
    feasibility_tol: f64,
    sigma: f64,
}

impl GeometricNmf {
    pub fn new(
        obs: &Observations,
        rank: usize,
        bounds: &BoundBox,
        convergence: ConvergenceParams<f64>,
    ) -> Result<Self> {
        convergence.validate()?;
        let layout = FactorLayout::for_observations(obs, rank)?;
        bounds.lower().ensure_shape(layout.shape())?;
        Ok(GeometricNmf {
            obs: obs.clone(),
            layout,
            bounds: bounds.clone(),
            convergence,
            pairs: Vec::new(),
            multipliers: Vec::new(),
            feasibility_tol: f64::INFINITY,
            sigma: 0.0,
        })
    }

    /// Constrain the search to the given neighbor distances. A point is
    /// feasible once the summed squared residuals drop below `feasibility_tol`.
    pub fn with_pairs(mut self, pairs: Vec<NeighborPair>, feasibility_tol: f64) -> Result<Self> {
        fastopt::error::ensure(
            feasibility_tol > 0.0,
            "feasibility_tol",
            "must be positive",
        )?;
        for pair in &pairs {
            for index in [pair.p, pair.q] {
                if index >= self.layout.num_cols() {
                    return Err(Error::IndexOutOfRange {
                        what: "neighbor",
                        index,
                        bound: self.layout.num_cols(),
                    });
                }
            }
            fastopt::error::ensure(pair.p != pair.q, "pairs", "must join distinct columns")?;
        }
        self.multipliers = vec![0.0; pairs.len()];
        self.pairs = pairs;
        self.feasibility_tol = feasibility_tol;
        Ok(self)
    }

    pub fn pairs(&self) -> &[NeighborPair] {
        &self.pairs
    }

    pub fn multipliers(&self) -> &[f64] {
        &self.multipliers
    }

    /// Descend from `x` (typically a relaxation minimizer), leaving the result
    /// in `x`. `result.value` is the NMF objective at the returned point.
    /// Neighbor pairs are ignored; see [`solve_constrained`](Self::solve_constrained).
    pub fn solve(&mut self, solver: &mut Lbfgs<f64>, x: &mut Matrix<f64>) -> OptimResult<f64> {
        let pairs = std::mem::take(&mut self.pairs);
        let result = solver.optimize(self, 0, x);
        self.pairs = pairs;
        result
    }

    /// Augmented-Lagrangian descent from `x` under the neighbor constraints.
    pub fn solve_constrained(
        &mut self,
        solver: &mut AugmentedLagrangian<f64>,
        x: &mut Matrix<f64>,
    ) -> AugLagResult<f64> {
        self.multipliers.iter_mut().for_each(|m| *m = 0.0);
        solver.optimize(self, x)
    }

    /// `true` when `x` lies in the box and meets every neighbor distance.
    pub fn is_feasible(&self, x: &Matrix<f64>) -> bool {
        self.bounds.contains(x) && self.squared_violation(x) < self.feasibility_tol
    }

    /// `Σ_r (e^{x_rp} − e^{x_rq})² − d_pq` for pair `t`.
    fn residual(&self, x: &Matrix<f64>, t: usize) -> f64 {
        let pair = &self.pairs[t];
        let hp = x.col(self.layout.h_col(pair.p));
        let hq = x.col(self.layout.h_col(pair.q));
        let distance: f64 = hp
            .iter()
            .zip(hq.iter())
            .map(|(a, b)| (a.exp() - b.exp()).powi(2))
            .sum();
        distance - pair.distance_sq
    }

    fn squared_violation(&self, x: &Matrix<f64>) -> f64 {
        (0..self.pairs.len())
            .map(|t| self.residual(x, t).powi(2))
            .sum()
    }
}

impl Problem<f64> for GeometricNmf {
    fn evaluate(&mut self, x: &Matrix<f64>) -> f64 {
        nmf_objective(&self.obs, &self.layout, 0.0, x)
    }

    fn gradient(&mut self, x: &Matrix<f64>, grad: &mut Matrix<f64>) {
        grad.fill(0.0);
        add_nmf_gradient(&self.obs, &self.layout, 0.0, x, grad);

        for t in 0..self.pairs.len() {
            let phi = -self.multipliers[t] + self.sigma * self.residual(x, t);
            if phi == 0.0 {
                continue;
            }
            let cp = self.layout.h_col(self.pairs[t].p);
            let cq = self.layout.h_col(self.pairs[t].q);
            for r in 0..self.layout.rank() {
                let (ep, eq) = (x[(r, cp)].exp(), x[(r, cq)].exp());
                let diff = 2.0 * (ep - eq);
                grad[(r, cp)] += phi * diff * ep;
                grad[(r, cq)] -= phi * diff * eq;
            }
        }
    }

    fn is_optimization_over(&mut self, x: &Matrix<f64>, grad: &Matrix<f64>, step: f64) -> bool {
        if self.pairs.is_empty() {
            self.convergence.is_met(grad, step)
        } else {
            self.squared_violation(x) < self.feasibility_tol
        }
    }

    fn is_intermediate_step_over(
        &mut self,
        _: &Matrix<f64>,
        grad: &Matrix<f64>,
        step: f64,
    ) -> bool {
        self.convergence.is_met(grad, step)
    }

    fn project(&mut self, x: &mut Matrix<f64>) {
        self.bounds.clamp(x);
    }

    fn initial_point(&mut self) -> Matrix<f64> {
        self.bounds.midpoint()
    }
}

impl ConstrainedProblem<f64> for GeometricNmf {
    fn feasibility_error(&mut self, x: &Matrix<f64>) -> f64 {
        self.squared_violation(x)
    }

    fn lagrangian(&mut self, x: &Matrix<f64>) -> f64 {
        let mut value = nmf_objective(&self.obs, &self.layout, 0.0, x);
        for t in 0..self.pairs.len() {
            let c = self.residual(x, t);
            value += -self.multipliers[t] * c + 0.5 * self.sigma * c * c;
        }
        value
    }

    fn update_lagrange_mult(&mut self, x: &Matrix<f64>) {
        for t in 0..self.pairs.len() {
            self.multipliers[t] -= self.sigma * self.residual(x, t);
        }
    }

    fn set_sigma(&mut self, sigma: f64) {
        self.sigma = sigma;
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }
}
