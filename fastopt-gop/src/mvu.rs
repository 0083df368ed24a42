//! Non-convex maximum variance unfolding.
//!
//! Finds a low-dimensional embedding `X` (one column per point) maximizing
//! `Σ‖xᵢ‖²` subject to
//!
//! * `‖xᵢ − xⱼ‖² = dᵢⱼ` for every point `i` and each of its `k` nearest
//!   neighbors `j` in the input space, and
//! * `Σᵢ xᵢ = 0` (centering),
//!
//! by minimizing the augmented Lagrangian
//!
//! ```text
//! −Σ‖xᵢ‖² + Σᵢₖ [−λᵢₖ cᵢₖ + σ/2 cᵢₖ²] + Σᵣ [−μᵣ mᵣ + σ/2 mᵣ²]
//! ```
//!
//! with one multiplier per neighbor pair.

use fastopt::linalg::distance_sq;
use fastopt::{
    ArmijoParams, AugLagConfig, AugLagResult, AugmentedLagrangian, ConstrainedProblem, Error,
    LbfgsConfig, Matrix, Problem, Result,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::knn::{BruteForceKnn, NeighborIndex};

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MvuConfig {
    /// Embedding dimension. Must be set.
    pub new_dimension: usize,
    /// Neighbors per point (default: 5).
    pub knns: usize,
    pub eta: f64,
    pub gamma: f64,
    /// Initial penalty weight (default: 1000).
    pub sigma: f64,
    pub step_size: f64,
    /// Cap on both the outer rounds and the inner iterations.
    pub max_iterations: usize,
    /// Target for the distance violation `Σc² / ‖d‖` over the target
    /// distances `d`, also the inner step tolerance (default: 1e-5).
    pub tolerance: f64,
    pub armijo_sigma: f64,
    pub armijo_beta: f64,
    /// L-BFGS memory (default: 10).
    pub memory: usize,
    /// Seed for the random start; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for MvuConfig {
    fn default() -> Self {
        MvuConfig {
            new_dimension: 0,
            knns: 5,
            eta: 0.25,
            gamma: 1.1,
            sigma: 1000.0,
            step_size: 1.0,
            max_iterations: 10_000,
            tolerance: 1e-5,
            armijo_sigma: 0.1,
            armijo_beta: 0.5,
            memory: 10,
            seed: None,
        }
    }
}

impl MvuConfig {
    pub fn validate(&self) -> Result<()> {
        if self.new_dimension == 0 {
            return Err(Error::MissingDimension);
        }
        fastopt::error::ensure(self.knns > 0, "knns", "must be positive")?;
        fastopt::error::ensure(self.tolerance > 0.0, "tolerance", "must be positive")?;
        self.aug_lag().validate()?;
        self.lbfgs().validate()
    }

    fn aug_lag(&self) -> AugLagConfig<f64> {
        AugLagConfig {
            eta: self.eta,
            gamma: self.gamma,
            sigma0: self.sigma,
            max_rounds: self.max_iterations,
        }
    }

    fn lbfgs(&self) -> LbfgsConfig<f64> {
        LbfgsConfig {
            memory: self.memory,
            max_iterations: self.max_iterations,
            line_search: ArmijoParams {
                sigma: self.armijo_sigma,
                beta: self.armijo_beta,
                step_size: self.step_size,
                ..ArmijoParams::default()
            },
        }
    }
}

/// The MVU augmented Lagrangian as a constrained problem.
#[derive(Debug, Clone)]
struct MvuProblem {
    dim: usize,
    knns: usize,
    // neighbor k of point i at i * knns + k
    neighbors: Vec<usize>,
    distances: Vec<f64>,
    multipliers: Vec<f64>,
    centering_multipliers: Vec<f64>,
    sigma: f64,
    tolerance: f64,
    // Euclidean norm of the target distances
    distance_norm: f64,
    deviations: Vec<f64>,
    start: Matrix<f64>,
}

impl MvuProblem {
    fn num_points(&self) -> usize {
        self.start.cols()
    }

    fn constraint(&self, x: &Matrix<f64>, i: usize, k: usize) -> f64 {
        let t = i * self.knns + k;
        distance_sq(x.col(i), x.col(self.neighbors[t])) - self.distances[t]
    }

    fn update_deviations(&mut self, x: &Matrix<f64>) {
        self.deviations.iter_mut().for_each(|d| *d = 0.0);
        for i in 0..x.cols() {
            for (d, v) in self.deviations.iter_mut().zip(x.col(i)) {
                *d += v;
            }
        }
    }

    /// `(Σ c², Σ m²)`.
    fn violations(&mut self, x: &Matrix<f64>) -> (f64, f64) {
        let mut distance = 0.0;
        for i in 0..self.num_points() {
            for k in 0..self.knns {
                distance += self.constraint(x, i, k).powi(2);
            }
        }
        self.update_deviations(x);
        let centering = self.deviations.iter().map(|d| d * d).sum();
        (distance, centering)
    }
}

impl Problem<f64> for MvuProblem {
    fn evaluate(&mut self, x: &Matrix<f64>) -> f64 {
        -x.dot(x)
    }

    fn gradient(&mut self, x: &Matrix<f64>, grad: &mut Matrix<f64>) {
        grad.copy_from(x);
        grad.scale(-2.0);

        for i in 0..self.num_points() {
            for k in 0..self.knns {
                let t = i * self.knns + k;
                let j = self.neighbors[t];
                let phi = 2.0 * (-self.multipliers[t] + self.sigma * self.constraint(x, i, k));
                for r in 0..self.dim {
                    let diff = phi * (x[(r, i)] - x[(r, j)]);
                    grad[(r, i)] += diff;
                    grad[(r, j)] -= diff;
                }
            }
        }

        self.update_deviations(x);
        for i in 0..self.num_points() {
            for (r, m) in self.deviations.iter().enumerate() {
                grad[(r, i)] += -self.centering_multipliers[r] + self.sigma * m;
            }
        }
    }

    fn is_optimization_over(&mut self, x: &Matrix<f64>, _: &Matrix<f64>, _: f64) -> bool {
        let (distance, _) = self.violations(x);
        distance / self.distance_norm < self.tolerance
    }

    fn is_intermediate_step_over(
        &mut self,
        _: &Matrix<f64>,
        grad: &Matrix<f64>,
        step: f64,
    ) -> bool {
        step < self.tolerance || grad.norm() < self.tolerance
    }

    fn initial_point(&mut self) -> Matrix<f64> {
        self.start.clone()
    }
}

impl ConstrainedProblem<f64> for MvuProblem {
    fn feasibility_error(&mut self, x: &Matrix<f64>) -> f64 {
        let (distance, centering) = self.violations(x);
        distance + centering
    }

    fn lagrangian(&mut self, x: &Matrix<f64>) -> f64 {
        let mut value = -x.dot(x);
        for i in 0..self.num_points() {
            for k in 0..self.knns {
                let c = self.constraint(x, i, k);
                value += -self.multipliers[i * self.knns + k] * c + 0.5 * self.sigma * c * c;
            }
        }
        self.update_deviations(x);
        for (m, mu) in self.deviations.iter().zip(&self.centering_multipliers) {
            value += -mu * m + 0.5 * self.sigma * m * m;
        }
        value
    }

    fn update_lagrange_mult(&mut self, x: &Matrix<f64>) {
        for i in 0..self.num_points() {
            for k in 0..self.knns {
                let c = self.constraint(x, i, k);
                self.multipliers[i * self.knns + k] -= self.sigma * c;
            }
        }
        self.update_deviations(x);
        for (mu, m) in self.centering_multipliers.iter_mut().zip(&self.deviations) {
            *mu -= self.sigma * m;
        }
    }

    fn set_sigma(&mut self, sigma: f64) {
        self.sigma = sigma;
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }
}

/// Driver: neighbors, random start, and the augmented-Lagrangian solve.
pub struct NonConvexMvu {
    problem: MvuProblem,
    solver: AugmentedLagrangian<f64>,
    coordinates: Matrix<f64>,
}

impl NonConvexMvu {
    /// Embed the columns of `data` using an exhaustive neighbor search.
    pub fn new(data: &Matrix<f64>, config: MvuConfig) -> Result<Self> {
        config.validate()?;
        let index = BruteForceKnn::build(data, config.knns)?;
        Self::with_index(&index, config)
    }

    /// Embed `index.len()` points given their neighbor table. `index` must
    /// return exactly `config.knns` neighbors per point.
    pub fn with_index(index: &dyn NeighborIndex, config: MvuConfig) -> Result<Self> {
        config.validate()?;
        let n = index.len();
        if n == 0 {
            return Err(Error::EmptyInput("neighbor index"));
        }

        let mut neighbors = Vec::with_capacity(n * config.knns);
        let mut distances = Vec::with_capacity(n * config.knns);
        for i in 0..n {
            let list = index.neighbors(i);
            if list.len() != config.knns {
                return Err(Error::ShapeMismatch {
                    expected: (i, config.knns),
                    found: (i, list.len()),
                });
            }
            for nb in list {
                if nb.index >= n {
                    return Err(Error::IndexOutOfRange {
                        what: "neighbor",
                        index: nb.index,
                        bound: n,
                    });
                }
                neighbors.push(nb.index);
                distances.push(nb.distance_sq);
            }
        }
        let distance_norm = distances.iter().map(|d| d * d).sum::<f64>().sqrt();
        fastopt::error::ensure(
            distance_norm > 0.0,
            "data",
            "neighbor distances are all zero",
        )?;

        let mut rng = match config.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let dim = config.new_dimension;
        let coordinates = Matrix::from_fn(dim, n, |_, _| rng.gen_range(0.1..1.0));
        let multipliers = (0..n * config.knns)
            .map(|_| rng.gen_range(0.1..1.0))
            .collect();
        let centering_multipliers = (0..dim).map(|_| rng.gen_range(0.1..1.0)).collect();

        Ok(NonConvexMvu {
            problem: MvuProblem {
                dim,
                knns: config.knns,
                neighbors,
                distances,
                multipliers,
                centering_multipliers,
                sigma: config.sigma,
                tolerance: config.tolerance,
                distance_norm,
                deviations: vec![0.0; dim],
                start: coordinates.clone(),
            },
            solver: AugmentedLagrangian::new(config.aug_lag(), config.lbfgs())?,
            coordinates,
        })
    }

    /// Run the solver from the current coordinates, updating them in place.
    pub fn compute_local_optimum(&mut self) -> AugLagResult<f64> {
        let result = self
            .solver
            .optimize(&mut self.problem, &mut self.coordinates);
        let (distance, centering) = self.problem.violations(&self.coordinates);
        log::info!(
            "mvu: {} after {} rounds, variance {:.6e}, distance violation {:.3e}, centering {:.3e}",
            result.termination,
            result.rounds,
            -result.value,
            distance / self.problem.distance_norm,
            centering.sqrt()
        );
        result
    }

    /// Embedding, `new_dimension × n`, one column per input point.
    pub fn coordinates(&self) -> &Matrix<f64> {
        &self.coordinates
    }

    /// Squared neighbor distances the embedding must reproduce, point-major.
    pub fn target_distances(&self) -> &[f64] {
        &self.problem.distances
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> Matrix<f64> {
        Matrix::from_fn(2, n, |r, c| if r == 0 { c as f64 } else { 0.0 })
    }

    fn config() -> MvuConfig {
        MvuConfig {
            new_dimension: 1,
            knns: 2,
            seed: Some(7),
            ..MvuConfig::default()
        }
    }

    #[test]
    fn missing_dimension_is_rejected() {
        let err = NonConvexMvu::new(&line(4), MvuConfig::default()).err();
        assert_eq!(err, Some(Error::MissingDimension));
    }

    #[test]
    fn gradient_matches_central_differences() {
        let mut mvu = NonConvexMvu::new(&line(5), config()).unwrap();
        mvu.problem.set_sigma(3.0);
        let x = mvu.coordinates().clone();
        let mut grad = Matrix::zeros(x.rows(), x.cols());
        mvu.problem.gradient(&x, &mut grad);

        let h = 1e-6;
        for c in 0..x.cols() {
            let mut plus = x.clone();
            let mut minus = x.clone();
            plus[(0, c)] += h;
            minus[(0, c)] -= h;
            let fd = (mvu.problem.lagrangian(&plus) - mvu.problem.lagrangian(&minus)) / (2.0 * h);
            assert!(
                (fd - grad[(0, c)]).abs() < 1e-5 * (1.0 + fd.abs()),
                "column {}: {} vs {}",
                c,
                fd,
                grad[(0, c)]
            );
        }
    }

    #[test]
    fn multipliers_are_stable_at_a_feasible_point() {
        let mut mvu = NonConvexMvu::new(&line(4), config()).unwrap();
        let x = Matrix::from_fn(1, 4, |_, c| c as f64 - 1.5);
        let before = (
            mvu.problem.multipliers.clone(),
            mvu.problem.centering_multipliers.clone(),
        );
        assert!(mvu.problem.feasibility_error(&x) < 1e-24);
        mvu.problem.update_lagrange_mult(&x);
        assert_eq!(mvu.problem.multipliers, before.0);
        assert_eq!(mvu.problem.centering_multipliers, before.1);
    }

    #[test]
    fn unfolds_points_on_a_line() {
        let config = MvuConfig {
            max_iterations: 500,
            ..config()
        };
        let mut mvu = NonConvexMvu::new(&line(5), config).unwrap();
        mvu.compute_local_optimum();

        let x = mvu.coordinates.clone();
        let (distance, centering) = mvu.problem.violations(&x);
        assert!(distance / mvu.problem.distance_norm < 1e-3);
        assert!(centering.sqrt() < 1e-2);
    }
}
