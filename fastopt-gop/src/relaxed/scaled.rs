use fastopt::{ConstrainedProblem, ConvergenceParams, Matrix, Problem, RelaxedProblem, Result};

use super::{RelaxationConfig, SecantModel};
use crate::bounds::BoundBox;
use crate::observations::Observations;

/// [`RelaxedNmf`](super::RelaxedNmf) on values divided by a scale factor `s`.
///
/// Internally the model fits `v / s` with every log-product shifted by
/// `−ln s`, which is the same factorization problem divided by `s²`. The
/// objective seen by the optimizer is the scaled one; the soft lower bound and
/// the non-relaxed objective are reported in original units.
#[derive(Debug, Clone)]
pub struct ScaledRelaxedNmf {
    model: SecantModel,
    convergence: ConvergenceParams<f64>,
    scale: f64,
    sigma: f64,
    soft_lower_bound: Option<f64>,
}

impl ScaledRelaxedNmf {
    pub fn new(
        obs: &Observations,
        rank: usize,
        bounds: &BoundBox,
        config: &RelaxationConfig,
    ) -> Result<Self> {
        config.validate()?;
        let scale = config.scale.unwrap_or_else(|| obs.rms());
        fastopt::error::ensure(scale > 0.0, "scale", "observed values are all zero")?;
        let model = SecantModel::new(obs.scaled(1.0 / scale), rank, bounds.clone(), -scale.ln())?;
        Ok(ScaledRelaxedNmf {
            model,
            convergence: config.convergence.clone(),
            scale,
            sigma: 0.0,
            soft_lower_bound: None,
        })
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl Problem<f64> for ScaledRelaxedNmf {
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

impl ConstrainedProblem<f64> for ScaledRelaxedNmf {
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

impl RelaxedProblem<f64> for ScaledRelaxedNmf {
    fn soft_lower_bound(&self) -> Option<f64> {
        self.soft_lower_bound
    }

    fn is_infeasible(&self) -> bool {
        self.model.is_box_empty()
    }

    fn non_relaxed_objective(&mut self, x: &Matrix<f64>) -> f64 {
        self.scale * self.scale * self.model.true_objective(x)
    }

    fn record_lower_bound(&mut self, x: &Matrix<f64>) {
        self.soft_lower_bound = Some(self.scale * self.scale * self.model.relaxed_objective(x));
    }
}
