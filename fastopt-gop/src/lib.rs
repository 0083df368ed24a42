//! Global optimization of rank-`k` non-negative matrix factorization by
//! branch-and-bound over log-space boxes, plus non-convex maximum variance
//! unfolding.
//!
//! The factorization `V ≈ WH` is searched in log space, `W = e^U₁`,
//! `H = e^U₂`. Over a box of log-space bounds each exponential is bracketed
//! by its secant, which yields a convex relaxation whose minimum is a valid
//! lower bound on the box. [`GopNmfEngine`] explores boxes best-first,
//! pairing those bounds with local upper bounds from [`GeometricNmf`].
//!
//! ```no_run
//! use fastopt::Matrix;
//! use fastopt_gop::{BoundBox, GopConfig, GopNmfEngine, Observations, WidestSideSplitter};
//!
//! # fn main() -> fastopt::Result<()> {
//! let dense = Matrix::from_column_slice(2, 2, &[1.0, 0.5, 0.5, 1.0])?;
//! let obs = Observations::from_dense(&dense)?;
//! let config = GopConfig { new_dimension: 1, ..GopConfig::default() };
//! let mut engine = GopNmfEngine::new(obs, config, WidestSideSplitter::default())?;
//! let (rows, cols) = engine.layout().shape();
//! let bounds = BoundBox::from_original(rows, cols, 1e-3, 10.0)?;
//! if let Some(pack) = engine.compute_global_optimum(bounds)? {
//!     println!("objective {}", pack.non_relaxed_minimum);
//! }
//! # Ok(())
//! # }
//! ```

pub mod bounds;
pub mod engine;
pub mod factor;
pub mod geometric;
pub mod knn;
pub mod mvu;
pub mod observations;
pub mod relaxed;
pub mod secant;
pub mod splitter;

pub use bounds::BoundBox;
pub use engine::{BnbStats, GopConfig, GopNmfEngine, SolutionPack};
pub use factor::FactorLayout;
pub use geometric::GeometricNmf;
pub use knn::{neighbor_pairs, BruteForceKnn, Neighbor, NeighborIndex, NeighborPair};
pub use mvu::{MvuConfig, NonConvexMvu};
pub use observations::Observations;
pub use relaxed::{
    BarrierRelaxedNmf, IsometricRelaxedNmf, RelaxationConfig, RelaxationKind, RelaxedNmf,
    ScaledRelaxedNmf,
};
pub use secant::ExpSecant;
pub use splitter::{Splitter, WidestSideSplitter};
