//! Limited-memory quasi-Newton minimization and augmented-Lagrangian outer
//! loops over column-major dense matrices.
//!
//! Problems implement [`Problem`] (and [`ConstrainedProblem`] when they carry
//! equality constraints); [`Lbfgs`] minimizes them in place and
//! [`AugmentedLagrangian`] drives a sequence of L-BFGS runs while updating
//! multipliers and the penalty weight.

pub mod convergence;
pub mod error;
pub mod line_search;
pub mod linalg;
pub mod matrix;
pub mod problem;
pub mod result;
pub mod solvers;

#[cfg(feature = "nalgebra")]
pub mod nalgebra_support;

pub use convergence::ConvergenceParams;
pub use error::{Error, Result};
pub use line_search::ArmijoParams;
pub use matrix::Matrix;
pub use problem::{ConstrainedProblem, Problem, RelaxedProblem};
pub use result::{OptimResult, TerminationReason};
pub use solvers::augmented_lagrangian::{
    AugLagConfig, AugLagResult, AugmentedLagrangian, LagrangianView,
};
pub use solvers::lbfgs::{lbfgs, CurvaturePair, History, Lbfgs, LbfgsConfig};
