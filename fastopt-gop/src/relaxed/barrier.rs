use fastopt::{ConstrainedProblem, ConvergenceParams, Matrix, Problem, RelaxedProblem, Result};

use super::{RelaxationConfig, SecantModel};
use crate::bounds::BoundBox;
use crate::observations::Observations;

// sides narrower than this are pinned to their lower bound instead of barred
const PINNED_WIDTH: f64 = 1e-12;

// barrier weight factor applied on every multiplier round
const MU_SHRINK: f64 = 0.1;

/// Secant relaxation with the box enforced by `−μ Σ [ln(x − lo) + ln(up − x)]`.
///
/// `μ = τ/σ`. The barrier runs its own schedule: every multiplier round of
/// the augmented-Lagrangian wrapper multiplies `τ` by 0.1, which is below
/// any admissible `eta`, so each outer round after the first tightens the
/// barrier tenfold. Penalty increases tighten it too.
///
/// The feasibility error is the duality gap `2μ · m` over the `m` barred
/// sides (two logarithms each).
#[derive(Debug, Clone)]
pub struct BarrierRelaxedNmf {
    model: SecantModel,
    convergence: ConvergenceParams<f64>,
    feasibility_tol: f64,
    sigma: f64,
    tau: f64,
    barred: usize,
    soft_lower_bound: Option<f64>,
}

impl BarrierRelaxedNmf {
    pub fn new(
        obs: &Observations,
        rank: usize,
        bounds: &BoundBox,
        config: &RelaxationConfig,
    ) -> Result<Self> {
        config.validate()?;
        let model = SecantModel::new(obs.clone(), rank, bounds.clone(), 0.0)?;
        let barred = bounds
            .lower()
            .iter()
            .zip(bounds.upper().iter())
            .filter(|(lo, up)| *up - *lo > PINNED_WIDTH)
            .count();
        Ok(BarrierRelaxedNmf {
            model,
            convergence: config.convergence.clone(),
            feasibility_tol: config.feasibility_tol,
            sigma: 1.0,
            tau: 1.0,
            barred,
            soft_lower_bound: None,
        })
    }

    fn mu(&self) -> f64 {
        self.tau / self.sigma
    }

    fn gap(&self) -> f64 {
        2.0 * self.mu() * self.barred as f64
    }

    fn barrier(&self, x: &Matrix<f64>) -> f64 {
        let (lo, up) = (self.model.bounds().lower(), self.model.bounds().upper());
        let mut sum = 0.0;
        for ((v, l), u) in x.iter().zip(lo.iter()).zip(up.iter()) {
            if u - l <= PINNED_WIDTH {
                continue;
            }
            if *v <= *l || *v >= *u {
                return f64::INFINITY;
            }
            sum -= (v - l).ln() + (u - v).ln();
        }
        self.mu() * sum
    }
}

impl Problem<f64> for BarrierRelaxedNmf {
    fn evaluate(&mut self, x: &Matrix<f64>) -> f64 {
        let b = self.barrier(x);
        if b.is_infinite() {
            return b;
        }
        self.model.relaxed_objective(x) + b
    }

    fn gradient(&mut self, x: &Matrix<f64>, grad: &mut Matrix<f64>) {
        grad.fill(0.0);
        self.model.add_relaxed_gradient(x, grad);
        let mu = self.mu();
        let (lo, up) = (self.model.bounds().lower(), self.model.bounds().upper());
        for (((g, v), l), u) in grad
            .as_mut_slice()
            .iter_mut()
            .zip(x.iter())
            .zip(lo.iter())
            .zip(up.iter())
        {
            if u - l <= PINNED_WIDTH {
                *g = 0.0;
            } else {
                *g += mu * (1.0 / (u - v) - 1.0 / (v - l));
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
        let (lo, up) = (self.model.bounds().lower(), self.model.bounds().upper());
        for ((v, l), u) in x.as_mut_slice().iter_mut().zip(lo.iter()).zip(up.iter()) {
            if u - l <= PINNED_WIDTH {
                *v = *l;
            }
        }
    }

    fn initial_point(&mut self) -> Matrix<f64> {
        self.model.bounds().midpoint()
    }
}

impl ConstrainedProblem<f64> for BarrierRelaxedNmf {
    fn feasibility_error(&mut self, _: &Matrix<f64>) -> f64 {
        self.gap()
    }

    fn lagrangian(&mut self, x: &Matrix<f64>) -> f64 {
        self.evaluate(x)
    }

    fn update_lagrange_mult(&mut self, _: &Matrix<f64>) {
        self.tau *= MU_SHRINK;
    }

    fn set_sigma(&mut self, sigma: f64) {
        self.sigma = sigma;
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl RelaxedProblem<f64> for BarrierRelaxedNmf {
    fn soft_lower_bound(&self) -> Option<f64> {
        self.soft_lower_bound
    }

    fn is_infeasible(&self) -> bool {
        self.model.is_box_empty()
    }

    fn non_relaxed_objective(&mut self, x: &Matrix<f64>) -> f64 {
        self.model.true_objective(x)
    }

    /// Relaxed value minus the barrier gap, clipped at zero.
    fn record_lower_bound(&mut self, x: &Matrix<f64>) {
        self.soft_lower_bound = Some((self.model.relaxed_objective(x) - self.gap()).max(0.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastopt::{AugLagConfig, AugmentedLagrangian, LbfgsConfig};

    fn problem() -> BarrierRelaxedNmf {
        let obs = Observations::new(vec![0, 0], vec![0, 1], vec![3.0, 0.5]).unwrap();
        let bounds = BoundBox::uniform(1, 3, -1.0, 1.0).unwrap();
        BarrierRelaxedNmf::new(&obs, 1, &bounds, &RelaxationConfig::default()).unwrap()
    }

    #[test]
    fn outside_the_interior_is_infinite() {
        let mut p = problem();
        let x = Matrix::from_column_slice(1, 3, &[1.0, 0.0, 0.0]).unwrap();
        assert!(p.evaluate(&x).is_infinite());
        let inside = Matrix::from_column_slice(1, 3, &[0.5, 0.0, 0.0]).unwrap();
        assert!(p.evaluate(&inside).is_finite());
    }

    #[test]
    fn gap_shrinks_with_sigma() {
        let mut p = problem();
        let x = p.initial_point();
        p.set_sigma(10.0);
        let loose = p.feasibility_error(&x);
        p.set_sigma(1000.0);
        let tight = p.feasibility_error(&x);
        assert!((loose - 0.6).abs() < 1e-12);
        assert!((tight - 0.006).abs() < 1e-12);
    }

    #[test]
    fn pinned_sides_are_fixed_by_projection() {
        let obs = Observations::new(vec![0], vec![0], vec![1.0]).unwrap();
        let lo = Matrix::from_column_slice(1, 2, &[0.2, -1.0]).unwrap();
        let up = Matrix::from_column_slice(1, 2, &[0.2, 1.0]).unwrap();
        let bounds = BoundBox::new(lo, up).unwrap();
        let mut p = BarrierRelaxedNmf::new(&obs, 1, &bounds, &RelaxationConfig::default()).unwrap();
        let mut x = Matrix::from_column_slice(1, 2, &[0.7, 0.3]).unwrap();
        p.project(&mut x);
        assert_eq!(x[(0, 0)], 0.2);
        assert_eq!(x[(0, 1)], 0.3);
        assert!((p.feasibility_error(&x) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn multiplier_rounds_tighten_the_barrier_tenfold() {
        let mut p = problem();
        let x = p.initial_point();
        p.set_sigma(10.0);
        let before = p.feasibility_error(&x);
        p.update_lagrange_mult(&x);
        p.update_lagrange_mult(&x);
        let after = p.feasibility_error(&x);
        assert!((after - 0.01 * before).abs() < 1e-15);
    }

    #[test]
    fn default_schedule_closes_the_gap() {
        let mut p = problem();
        let mut solver =
            AugmentedLagrangian::new(AugLagConfig::default(), LbfgsConfig::default()).unwrap();
        let mut x = p.initial_point();
        let result = solver.optimize(&mut p, &mut x);
        // gap 0.6 at sigma0 = 10, then a tenth per round
        assert!(result.converged());
        assert_eq!(result.rounds, 8);
        assert!(p.feasibility_error(&x) < 1e-8);

        p.record_lower_bound(&x);
        let bound = p.soft_lower_bound().unwrap();
        assert!(bound.is_finite() && bound >= 0.0);
        assert!(bound <= p.non_relaxed_objective(&x) + 1e-9);
    }
}
