//! Convex relaxations of the log-space NMF objective.
//!
//! Every `exp(u)` with `u = x[r, w_i] + x[r, h_j]` ranging over the box is
//! bounded from above by its secant. Writing `p = Σ_r exp(u_r)` and
//! `U = Σ_r secant_r(u_r)`, so that `p ≤ (WH)ᵢⱼ ≤ U` on the box, each
//! observation contributes
//!
//! ```text
//! max(0, p − v)² + max(0, v − U)²
//! ```
//!
//! which is convex and never exceeds the true residual `(p − v)²` inside the
//! box. Minimizing it therefore bounds the NMF objective from below, and the
//! bound tightens as the box shrinks.

mod barrier;
mod isometric;
mod plain;
mod scaled;

pub use barrier::BarrierRelaxedNmf;
pub use isometric::IsometricRelaxedNmf;
pub use plain::RelaxedNmf;
pub use scaled::ScaledRelaxedNmf;

use fastopt::{ConvergenceParams, Matrix, RelaxedProblem, Result};

use crate::bounds::BoundBox;
use crate::factor::{nmf_objective, FactorLayout};
use crate::knn::NeighborPair;
use crate::observations::Observations;
use crate::secant::ExpSecant;

/// Which member of the relaxation family the engine builds per box.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RelaxationKind {
    /// Box enforced by projection.
    Plain,
    /// Box enforced by a logarithmic barrier whose weight shrinks every outer
    /// round.
    Barrier,
    /// Values divided by a scale factor before relaxing.
    Scaled,
    /// Plain relaxation plus relaxed squared-distance constraints between
    /// neighboring columns of `H`.
    Isometric(Vec<NeighborPair>),
}

impl RelaxationKind {
    /// Neighbor constraints carried by the kind; empty unless isometric.
    pub fn pairs(&self) -> &[NeighborPair] {
        match self {
            RelaxationKind::Isometric(pairs) => pairs,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelaxationConfig {
    pub kind: RelaxationKind,
    /// Stationarity test of each inner run.
    pub convergence: ConvergenceParams<f64>,
    /// Outer test for the constrained variants (default: 1e-8).
    pub feasibility_tol: f64,
    /// Scale factor of [`RelaxationKind::Scaled`]; `None` uses the RMS of the
    /// observed values.
    pub scale: Option<f64>,
}

impl Default for RelaxationConfig {
    fn default() -> Self {
        RelaxationConfig {
            kind: RelaxationKind::Plain,
            convergence: ConvergenceParams::new(1e-8, 1e-14),
            feasibility_tol: 1e-8,
            scale: None,
        }
    }
}

impl RelaxationConfig {
    pub fn validate(&self) -> Result<()> {
        self.convergence.validate()?;
        fastopt::error::ensure(
            self.feasibility_tol > 0.0,
            "feasibility_tol",
            "must be positive",
        )?;
        fastopt::error::ensure(
            self.scale.map_or(true, |s| s > 0.0 && s.is_finite()),
            "scale",
            "must be positive and finite",
        )
    }

    /// Relaxation of the configured kind over `bounds`.
    pub fn build(
        &self,
        obs: &Observations,
        rank: usize,
        bounds: &BoundBox,
    ) -> Result<Box<dyn RelaxedProblem<f64>>> {
        Ok(match &self.kind {
            RelaxationKind::Plain => Box::new(RelaxedNmf::new(obs, rank, bounds, self)?),
            RelaxationKind::Barrier => Box::new(BarrierRelaxedNmf::new(obs, rank, bounds, self)?),
            RelaxationKind::Scaled => Box::new(ScaledRelaxedNmf::new(obs, rank, bounds, self)?),
            RelaxationKind::Isometric(pairs) => Box::new(IsometricRelaxedNmf::new(
                obs,
                rank,
                bounds,
                pairs.clone(),
                self,
            )?),
        })
    }
}

/// Secant relaxation shared by the variants. `offset` is added to every
/// log-product `u` (the scaled variant uses `−ln s`).
#[derive(Debug, Clone)]
pub(crate) struct SecantModel {
    obs: Observations,
    layout: FactorLayout,
    bounds: BoundBox,
    offset: f64,
    // secant of (observation t, component r) at t * rank + r
    secants: Vec<ExpSecant>,
}

impl SecantModel {
    pub(crate) fn new(
        obs: Observations,
        rank: usize,
        bounds: BoundBox,
        offset: f64,
    ) -> Result<Self> {
        let layout = FactorLayout::for_observations(&obs, rank)?;
        bounds.lower().ensure_shape(layout.shape())?;

        let (lo, up) = (bounds.lower(), bounds.upper());
        let mut secants = Vec::with_capacity(obs.len() * rank);
        for (i, j, _) in obs.iter() {
            let (wc, hc) = (layout.w_col(i), layout.h_col(j));
            for r in 0..rank {
                secants.push(ExpSecant::new(
                    lo[(r, wc)] + lo[(r, hc)] + offset,
                    up[(r, wc)] + up[(r, hc)] + offset,
                ));
            }
        }

        Ok(SecantModel {
            obs,
            layout,
            bounds,
            offset,
            secants,
        })
    }

    pub(crate) fn layout(&self) -> &FactorLayout {
        &self.layout
    }

    pub(crate) fn bounds(&self) -> &BoundBox {
        &self.bounds
    }

    pub(crate) fn is_box_empty(&self) -> bool {
        self.bounds
            .lower()
            .iter()
            .zip(self.bounds.upper().iter())
            .any(|(lo, up)| !(lo <= up))
    }

    /// Per-observation `(p − v, v − U)` at `x`.
    #[inline]
    fn residuals(&self, x: &Matrix<f64>, t: usize, i: usize, j: usize, v: f64) -> (f64, f64) {
        let k = self.layout.rank();
        let w = x.col(self.layout.w_col(i));
        let h = x.col(self.layout.h_col(j));
        let mut p = 0.0;
        let mut upper = 0.0;
        for r in 0..k {
            let u = w[r] + h[r] + self.offset;
            p += u.exp();
            upper += self.secants[t * k + r].eval(u);
        }
        (p - v, v - upper)
    }

    pub(crate) fn relaxed_objective(&self, x: &Matrix<f64>) -> f64 {
        self.obs
            .iter()
            .enumerate()
            .map(|(t, (i, j, v))| {
                let (over, under) = self.residuals(x, t, i, j, v);
                let over = over.max(0.0);
                let under = under.max(0.0);
                over * over + under * under
            })
            .sum()
    }

    pub(crate) fn add_relaxed_gradient(&self, x: &Matrix<f64>, grad: &mut Matrix<f64>) {
        let k = self.layout.rank();
        for (t, (i, j, v)) in self.obs.iter().enumerate() {
            let (over, under) = self.residuals(x, t, i, j, v);
            let over = over.max(0.0);
            let under = under.max(0.0);
            if over == 0.0 && under == 0.0 {
                continue;
            }
            let (wc, hc) = (self.layout.w_col(i), self.layout.h_col(j));
            for r in 0..k {
                let u = x[(r, wc)] + x[(r, hc)] + self.offset;
                let d = 2.0 * over * u.exp() - 2.0 * under * self.secants[t * k + r].a;
                grad[(r, wc)] += d;
                grad[(r, hc)] += d;
            }
        }
    }

    pub(crate) fn true_objective(&self, x: &Matrix<f64>) -> f64 {
        nmf_objective(&self.obs, &self.layout, self.offset, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank_one_fixture() -> (Observations, BoundBox) {
        let obs = Observations::new(
            vec![0, 1, 0, 1],
            vec![0, 0, 1, 1],
            vec![2.0, 4.0, 1.0, 2.0],
        )
        .unwrap();
        let bounds = BoundBox::uniform(1, 4, -1.0, 1.5).unwrap();
        (obs, bounds)
    }

    #[test]
    fn relaxation_never_exceeds_the_true_objective() {
        let (obs, bounds) = rank_one_fixture();
        let model = SecantModel::new(obs, 1, bounds.clone(), 0.0).unwrap();
        for k in 0..50 {
            let x = Matrix::from_fn(1, 4, |_, c| {
                let t = ((k * 7 + c * 13) % 50) as f64 / 49.0;
                -1.0 + 2.5 * t
            });
            assert!(bounds.contains(&x));
            assert!(model.relaxed_objective(&x) <= model.true_objective(&x) + 1e-12);
        }
    }

    #[test]
    fn relaxation_is_exact_on_a_degenerate_box() {
        let (obs, _) = rank_one_fixture();
        let x = Matrix::from_column_slice(1, 4, &[0.1, 0.7, 0.4, -0.3]).unwrap();
        let point = BoundBox::new(x.clone(), x.clone()).unwrap();
        let model = SecantModel::new(obs, 1, point, 0.0).unwrap();
        assert!((model.relaxed_objective(&x) - model.true_objective(&x)).abs() < 1e-9);
    }

    #[test]
    fn bounds_must_match_the_layout() {
        let (obs, _) = rank_one_fixture();
        let wrong = BoundBox::uniform(2, 4, 0.0, 1.0).unwrap();
        assert!(SecantModel::new(obs, 1, wrong, 0.0).is_err());
    }

    #[test]
    fn config_rejects_non_positive_scale() {
        let config = RelaxationConfig {
            scale: Some(0.0),
            ..RelaxationConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(RelaxationConfig::default().validate().is_ok());
    }
}
