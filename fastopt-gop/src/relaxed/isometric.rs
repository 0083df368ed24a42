use fastopt::{
    ConstrainedProblem, ConvergenceParams, Error, Matrix, Problem, RelaxedProblem, Result,
};

use super::{RelaxationConfig, SecantModel};
use crate::bounds::BoundBox;
use crate::knn::NeighborPair;
use crate::observations::Observations;
use crate::secant::ExpSecant;

#[derive(Debug, Clone, Copy)]
struct PairSecants {
    // chord of exp over x_rp + x_rq
    cross: ExpSecant,
    // chords of exp over 2 x_rp and 2 x_rq
    square_p: ExpSecant,
    square_q: ExpSecant,
}

/// Plain relaxation plus the neighbor-distance constraints
/// `‖h_p − h_q‖² = d_pq` between columns of `H = exp(x_H)`.
///
/// With `c₁ = Σ_r e^{2x_rp} + e^{2x_rq}` and `c₂ = Σ_r 2e^{x_rp + x_rq}` the
/// distance is `c₁ − c₂`. Replacing the subtracted convex sum with its secant
/// sum (`U₂` resp. `U₁`) gives two convex necessary conditions
///
/// ```text
/// g⁺ = c₁ − U₂ − d ≤ 0        g⁻ = c₂ − U₁ + d ≤ 0
/// ```
///
/// handled as `max(0, g) = 0` equalities by the augmented Lagrangian. The
/// multipliers start at zero and only decrease, so the Lagrangian stays
/// convex.
#[derive(Debug, Clone)]
pub struct IsometricRelaxedNmf {
    model: SecantModel,
    pairs: Vec<NeighborPair>,
    secants: Vec<PairSecants>,
    multipliers: Vec<f64>,
    convergence: ConvergenceParams<f64>,
    feasibility_tol: f64,
    sigma: f64,
    infeasible: bool,
    soft_lower_bound: Option<f64>,
}

impl IsometricRelaxedNmf {
    pub fn new(
        obs: &Observations,
        rank: usize,
        bounds: &BoundBox,
        pairs: Vec<NeighborPair>,
        config: &RelaxationConfig,
    ) -> Result<Self> {
        config.validate()?;
        let model = SecantModel::new(obs.clone(), rank, bounds.clone(), 0.0)?;
        let layout = *model.layout();
        for pair in &pairs {
            for index in [pair.p, pair.q] {
                if index >= layout.num_cols() {
                    return Err(Error::IndexOutOfRange {
                        what: "neighbor",
                        index,
                        bound: layout.num_cols(),
                    });
                }
            }
            fastopt::error::ensure(pair.p != pair.q, "pairs", "must join distinct columns")?;
        }

        let (lo, up) = (bounds.lower(), bounds.upper());
        let mut secants = Vec::with_capacity(pairs.len() * rank);
        for pair in &pairs {
            let (cp, cq) = (layout.h_col(pair.p), layout.h_col(pair.q));
            for r in 0..rank {
                secants.push(PairSecants {
                    cross: ExpSecant::new(lo[(r, cp)] + lo[(r, cq)], up[(r, cp)] + up[(r, cq)]),
                    square_p: ExpSecant::new(2.0 * lo[(r, cp)], 2.0 * up[(r, cp)]),
                    square_q: ExpSecant::new(2.0 * lo[(r, cq)], 2.0 * up[(r, cq)]),
                });
            }
        }

        let mut problem = IsometricRelaxedNmf {
            multipliers: vec![0.0; 2 * pairs.len()],
            model,
            pairs,
            secants,
            convergence: config.convergence.clone(),
            feasibility_tol: config.feasibility_tol,
            sigma: 0.0,
            infeasible: false,
            soft_lower_bound: None,
        };
        problem.infeasible = problem.model.is_box_empty() || !problem.distances_reachable();
        Ok(problem)
    }

    pub fn multipliers(&self) -> &[f64] {
        &self.multipliers
    }

    /// Interval propagation: the box admits `‖h_p − h_q‖²` only within
    /// `[gmin, gmax]`, obtained by squaring the coordinate-wise intervals of
    /// `h_rp − h_rq`.
    fn distances_reachable(&self) -> bool {
        let layout = self.model.layout();
        let (lo, up) = (self.model.bounds().lower(), self.model.bounds().upper());
        self.pairs.iter().all(|pair| {
            let (cp, cq) = (layout.h_col(pair.p), layout.h_col(pair.q));
            let (mut gmin, mut gmax) = (0.0, 0.0);
            for r in 0..layout.rank() {
                let low = lo[(r, cp)].exp() - up[(r, cq)].exp();
                let high = up[(r, cp)].exp() - lo[(r, cq)].exp();
                let (sq_lo, sq_hi) = if low >= 0.0 {
                    (low * low, high * high)
                } else if high <= 0.0 {
                    (high * high, low * low)
                } else {
                    (0.0, (low * low).max(high * high))
                };
                gmin += sq_lo;
                gmax += sq_hi;
            }
            gmin <= pair.distance_sq && pair.distance_sq <= gmax
        })
    }

    /// `(max(0, g⁺), max(0, g⁻))` for pair `t`.
    fn violations(&self, x: &Matrix<f64>, t: usize) -> (f64, f64) {
        let layout = self.model.layout();
        let pair = &self.pairs[t];
        let hp = x.col(layout.h_col(pair.p));
        let hq = x.col(layout.h_col(pair.q));
        let k = layout.rank();
        let (mut c1, mut c2, mut u1, mut u2) = (0.0, 0.0, 0.0, 0.0);
        for r in 0..k {
            let s = &self.secants[t * k + r];
            c1 += (2.0 * hp[r]).exp() + (2.0 * hq[r]).exp();
            c2 += 2.0 * (hp[r] + hq[r]).exp();
            u1 += s.square_p.eval(2.0 * hp[r]) + s.square_q.eval(2.0 * hq[r]);
            u2 += 2.0 * s.cross.eval(hp[r] + hq[r]);
        }
        (
            (c1 - u2 - pair.distance_sq).max(0.0),
            (c2 - u1 + pair.distance_sq).max(0.0),
        )
    }
}

impl Problem<f64> for IsometricRelaxedNmf {
    fn evaluate(&mut self, x: &Matrix<f64>) -> f64 {
        self.model.relaxed_objective(x)
    }

    fn gradient(&mut self, x: &Matrix<f64>, grad: &mut Matrix<f64>) {
        grad.fill(0.0);
        self.model.add_relaxed_gradient(x, grad);

        let layout = *self.model.layout();
        let k = layout.rank();
        for t in 0..self.pairs.len() {
            let (plus, minus) = self.violations(x, t);
            let phi_plus = if plus > 0.0 {
                -self.multipliers[2 * t] + self.sigma * plus
            } else {
                0.0
            };
            let phi_minus = if minus > 0.0 {
                -self.multipliers[2 * t + 1] + self.sigma * minus
            } else {
                0.0
            };
            if phi_plus == 0.0 && phi_minus == 0.0 {
                continue;
            }
            let (cp, cq) = (layout.h_col(self.pairs[t].p), layout.h_col(self.pairs[t].q));
            for r in 0..k {
                let s = &self.secants[t * k + r];
                let (xp, xq) = (x[(r, cp)], x[(r, cq)]);
                let cross = 2.0 * (xp + xq).exp();
                grad[(r, cp)] += phi_plus * (2.0 * (2.0 * xp).exp() - 2.0 * s.cross.a)
                    + phi_minus * (cross - 2.0 * s.square_p.a);
                grad[(r, cq)] += phi_plus * (2.0 * (2.0 * xq).exp() - 2.0 * s.cross.a)
                    + phi_minus * (cross - 2.0 * s.square_q.a);
            }
        }
    }

    fn is_optimization_over(&mut self, x: &Matrix<f64>, _: &Matrix<f64>, _: f64) -> bool {
        self.feasibility_error(x) < self.feasibility_tol
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
        self.model.bounds().clamp(x);
    }

    fn initial_point(&mut self) -> Matrix<f64> {
        self.model.bounds().midpoint()
    }
}

impl ConstrainedProblem<f64> for IsometricRelaxedNmf {
    fn feasibility_error(&mut self, x: &Matrix<f64>) -> f64 {
        (0..self.pairs.len())
            .map(|t| {
                let (plus, minus) = self.violations(x, t);
                plus * plus + minus * minus
            })
            .sum()
    }

    fn lagrangian(&mut self, x: &Matrix<f64>) -> f64 {
        let mut value = self.model.relaxed_objective(x);
        for t in 0..self.pairs.len() {
            let (plus, minus) = self.violations(x, t);
            value += -self.multipliers[2 * t] * plus + 0.5 * self.sigma * plus * plus;
            value += -self.multipliers[2 * t + 1] * minus + 0.5 * self.sigma * minus * minus;
        }
        value
    }

    fn update_lagrange_mult(&mut self, x: &Matrix<f64>) {
        for t in 0..self.pairs.len() {
            let (plus, minus) = self.violations(x, t);
            self.multipliers[2 * t] -= self.sigma * plus;
            self.multipliers[2 * t + 1] -= self.sigma * minus;
        }
    }

    fn set_sigma(&mut self, sigma: f64) {
        self.sigma = sigma;
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl RelaxedProblem<f64> for IsometricRelaxedNmf {
    fn soft_lower_bound(&self) -> Option<f64> {
        self.soft_lower_bound
    }

    fn is_infeasible(&self) -> bool {
        self.infeasible
    }

    fn non_relaxed_objective(&mut self, x: &Matrix<f64>) -> f64 {
        self.model.true_objective(x)
    }

    fn record_lower_bound(&mut self, x: &Matrix<f64>) {
        self.soft_lower_bound = Some(self.model.relaxed_objective(x));
    }
}
