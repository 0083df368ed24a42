use fastopt::{ConstrainedProblem, ConvergenceParams, Matrix, Problem, RelaxedProblem, Result};

use super::{RelaxationConfig, SecantModel};
use crate::bounds::BoundBox;
use crate::observations::Observations;

/// Secant relaxation with the box enforced by projection.
///
/// There are no constraints besides the box, so the augmented-Lagrangian
/// wrapper finishes after a single inner run.
#[derive(Debug, Clone)]
pub struct RelaxedNmf {
    model: SecantModel,
    convergence: ConvergenceParams<f64>,
    sigma: f64,
    soft_lower_bound: Option<f64>,
}

impl RelaxedNmf {
    pub fn new(
        obs: &Observations,
        rank: usize,
        bounds: &BoundBox,
        config: &RelaxationConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(RelaxedNmf {
            model: SecantModel::new(obs.clone(), rank, bounds.clone(), 0.0)?,
            convergence: config.convergence.clone(),
            sigma: 0.0,
            soft_lower_bound: None,
        })
    }
}

impl Problem<f64> for RelaxedNmf {
    fn evaluate(&mut self, x: &Matrix<f64>) -> f64 {
        self.model.relaxed_objective(x)
    }

    fn gradient(&mut self, x: &Matrix<f64>, grad: &mut Matrix<f64>) {
        grad.fill(0.0);
        self.model.add_relaxed_gradient(x, grad);
    }

    fn is_optimization_over(&mut self, _: &Matrix<f64>, _: &Matrix<f64>, _: f64) -> bool {
        true
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

impl ConstrainedProblem<f64> for RelaxedNmf {
    fn feasibility_error(&mut self, _: &Matrix<f64>) -> f64 {
        0.0
    }

    fn lagrangian(&mut self, x: &Matrix<f64>) -> f64 {
        self.model.relaxed_objective(x)
    }

    fn update_lagrange_mult(&mut self, _: &Matrix<f64>) {}

    fn set_sigma(&mut self, sigma: f64) {
        self.sigma = sigma;
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl RelaxedProblem<f64> for RelaxedNmf {
    fn soft_lower_bound(&self) -> Option<f64> {
        self.soft_lower_bound
    }

    fn is_infeasible(&self) -> bool {
        self.model.is_box_empty()
    }

    fn non_relaxed_objective(&mut self, x: &Matrix<f64>) -> f64 {
        self.model.true_objective(x)
    }

    fn record_lower_bound(&mut self, x: &Matrix<f64>) {
        self.soft_lower_bound = Some(self.model.relaxed_objective(x));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastopt::{AugLagConfig, AugmentedLagrangian, LbfgsConfig};

    fn fixture() -> (Observations, BoundBox) {
        let obs = Observations::new(
            vec![0, 1, 0, 1],
            vec![0, 0, 1, 1],
            vec![2.0, 4.0, 1.0, 2.0],
        )
        .unwrap();
        (obs, BoundBox::uniform(1, 4, -2.0, 2.0).unwrap())
    }

    #[test]
    fn lower_bound_is_undefined_before_solving() {
        let (obs, bounds) = fixture();
        let p = RelaxedNmf::new(&obs, 1, &bounds, &RelaxationConfig::default()).unwrap();
        assert_eq!(p.soft_lower_bound(), None);
        assert!(!p.is_infeasible());
    }

    #[test]
    fn solved_relaxation_bounds_the_true_minimum() {
        // the data is exactly rank one, so the true minimum over the box is 0
        let (obs, bounds) = fixture();
        let mut p = RelaxedNmf::new(&obs, 1, &bounds, &RelaxationConfig::default()).unwrap();
        let mut solver =
            AugmentedLagrangian::new(AugLagConfig::default(), LbfgsConfig::default()).unwrap();
        let mut x = p.initial_point();
        let result = solver.optimize(&mut p, &mut x);
        assert!(result.converged());
        assert_eq!(result.rounds, 1);
        assert!(bounds.contains(&x));

        p.record_lower_bound(&x);
        let bound = p.soft_lower_bound().unwrap();
        assert!(bound >= 0.0);
        assert!(bound < 1e-10, "bound {}", bound);
        assert!(p.non_relaxed_objective(&x) >= bound);
    }
}
