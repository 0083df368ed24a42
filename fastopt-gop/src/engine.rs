use std::cmp::Ordering;
use std::collections::BinaryHeap;

use fastopt::{
    AugLagConfig, AugmentedLagrangian, ConvergenceParams, Error, Lbfgs, LbfgsConfig, Matrix,
    Result, TerminationReason,
};

use crate::bounds::BoundBox;
use crate::factor::FactorLayout;
use crate::geometric::GeometricNmf;
use crate::observations::Observations;
use crate::relaxed::RelaxationConfig;
use crate::splitter::Splitter;

/// Configuration for [`GopNmfEngine`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GopConfig {
    /// Inner dimension `k` of the factorization. Must be set.
    pub new_dimension: usize,
    /// Boxes whose lower bound is within this gap of the incumbent are pruned
    /// (default: 1e-4).
    pub desired_gap: f64,
    /// Cap on popped boxes (default: 10_000).
    pub max_iterations: usize,
    /// Inner optimizer for both the relaxations and the upper-bound search.
    pub lbfgs: LbfgsConfig<f64>,
    /// Outer loop around each relaxation.
    pub aug_lag: AugLagConfig<f64>,
    pub relaxation: RelaxationConfig,
    /// Stopping test of the upper-bound search.
    pub upper_convergence: ConvergenceParams<f64>,
}

impl Default for GopConfig {
    fn default() -> Self {
        GopConfig {
            new_dimension: 0,
            desired_gap: 1e-4,
            max_iterations: 10_000,
            lbfgs: LbfgsConfig::default(),
            aug_lag: AugLagConfig::default(),
            relaxation: RelaxationConfig::default(),
            upper_convergence: ConvergenceParams::new(1e-8, 1e-14),
        }
    }
}

impl GopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.new_dimension == 0 {
            return Err(Error::MissingDimension);
        }
        fastopt::error::ensure(self.desired_gap >= 0.0, "desired_gap", "must be non-negative")?;
        fastopt::error::ensure(self.max_iterations > 0, "max_iterations", "must be positive")?;
        self.lbfgs.validate()?;
        self.aug_lag.validate()?;
        self.relaxation.validate()?;
        self.upper_convergence.validate()
    }
}

/// A box together with its bounds and the relaxation minimizer found in it.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolutionPack {
    /// Soft lower bound over `bounds`.
    pub relaxed_minimum: f64,
    /// NMF objective at `solution`.
    pub non_relaxed_minimum: f64,
    /// Log-space factors; see [`FactorLayout`].
    pub solution: Matrix<f64>,
    pub bounds: BoundBox,
}

/// Pruning report of a branch-and-bound run.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BnbStats {
    /// Boxes discarded right after evaluation: infeasible, or lower bound
    /// already within the gap of the incumbent.
    pub soft_prunes: usize,
    /// Boxes discarded when popped from the queue.
    pub hard_prunes: usize,
    pub soft_pruned_volume: f64,
    pub hard_pruned_volume: f64,
    /// Volume of the initial box.
    pub total_volume: f64,
    /// Boxes popped from the queue.
    pub iterations: usize,
    /// Relaxations solved.
    pub evaluations: usize,
    /// Relaxations whose inner run failed; their parent key was kept.
    pub failed_lower_bounds: usize,
    /// Upper-bound searches that failed and were ignored.
    pub failed_upper_bounds: usize,
}

#[derive(Debug)]
struct QueueEntry {
    key: f64,
    seq: u64,
    pack: SolutionPack,
}

// BinaryHeap is a max-heap: the smallest key, then the oldest entry, ranks highest
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .total_cmp(&self.key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

/// Best-first branch and bound for the NMF objective in log space.
///
/// Every box is evaluated when it is created: its relaxation gives the key
/// (a soft lower bound, never below the parent's), and a local search seeded
/// at the relaxation minimizer may improve the incumbent. Boxes whose key is
/// within `desired_gap` of the incumbent are dropped; the rest wait in the
/// queue until popped and split.
pub struct GopNmfEngine<S> {
    obs: Observations,
    layout: FactorLayout,
    config: GopConfig,
    splitter: S,
    lower: AugmentedLagrangian<f64>,
    upper: Lbfgs<f64>,
    queue: BinaryHeap<QueueEntry>,
    incumbent: Option<SolutionPack>,
    stats: BnbStats,
    seq: u64,
}

impl<S: Splitter> GopNmfEngine<S> {
    pub fn new(obs: Observations, config: GopConfig, splitter: S) -> Result<Self> {
        config.validate()?;
        let layout = FactorLayout::for_observations(&obs, config.new_dimension)?;
        Ok(GopNmfEngine {
            lower: AugmentedLagrangian::new(config.aug_lag.clone(), config.lbfgs.clone())?,
            upper: Lbfgs::new(config.lbfgs.clone())?,
            obs,
            layout,
            config,
            splitter,
            queue: BinaryHeap::new(),
            incumbent: None,
            stats: BnbStats::default(),
            seq: 0,
        })
    }

    /// Engine over the strictly positive entries of a dense matrix.
    pub fn from_dense(data: &Matrix<f64>, config: GopConfig, splitter: S) -> Result<Self> {
        Self::new(Observations::from_dense(data)?, config, splitter)
    }

    pub fn layout(&self) -> &FactorLayout {
        &self.layout
    }

    pub fn config(&self) -> &GopConfig {
        &self.config
    }

    /// Best feasible solution found so far.
    pub fn incumbent(&self) -> Option<&SolutionPack> {
        self.incumbent.as_ref()
    }

    pub fn stats(&self) -> &BnbStats {
        &self.stats
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Smallest key in the queue.
    pub fn min_key(&self) -> Option<f64> {
        self.queue.peek().map(|e| e.key)
    }

    pub fn is_finished(&self) -> bool {
        self.queue.is_empty() || self.stats.iterations >= self.config.max_iterations
    }

    /// Run to completion from the log-space box `bounds`.
    pub fn compute_global_optimum(&mut self, bounds: BoundBox) -> Result<Option<&SolutionPack>> {
        self.initialize(bounds)?;
        while self.step()? {}
        self.report();
        Ok(self.incumbent.as_ref())
    }

    /// Discard any previous state and evaluate the root box.
    pub fn initialize(&mut self, bounds: BoundBox) -> Result<()> {
        bounds.lower().ensure_shape(self.layout.shape())?;
        self.queue.clear();
        self.incumbent = None;
        self.stats = BnbStats {
            total_volume: bounds.volume(),
            ..BnbStats::default()
        };
        self.seq = 0;
        // the objective is a sum of squares
        self.evaluate(bounds, 0.0)
    }

    /// Pop and process one box. Returns `false` once the queue is empty or
    /// the iteration cap is reached.
    pub fn step(&mut self) -> Result<bool> {
        if self.stats.iterations >= self.config.max_iterations {
            return Ok(false);
        }
        let entry = match self.queue.pop() {
            Some(entry) => entry,
            None => return Ok(false),
        };
        self.stats.iterations += 1;

        if entry.key >= self.threshold() {
            self.stats.hard_prunes += 1;
            self.stats.hard_pruned_volume += entry.pack.bounds.volume();
            return Ok(true);
        }

        let children = self
            .splitter
            .split(&entry.pack.bounds, &entry.pack.solution);
        if children.iter().all(|child| *child == entry.pack.bounds) {
            // no child is smaller, so re-evaluating would repeat the same key
            self.stats.hard_prunes += 1;
            self.stats.hard_pruned_volume += entry.pack.bounds.volume();
            log::debug!(
                "gop: box with key {:.6e} cannot be split further, pruned",
                entry.key
            );
            return Ok(true);
        }
        for child in children {
            self.evaluate(child, entry.key)?;
        }

        log::debug!(
            "gop: iteration {} key {:.6e} incumbent {:.6e} queue {}",
            self.stats.iterations,
            entry.key,
            self.incumbent_value(),
            self.queue.len()
        );
        Ok(true)
    }

    fn incumbent_value(&self) -> f64 {
        self.incumbent
            .as_ref()
            .map_or(f64::INFINITY, |u| u.non_relaxed_minimum)
    }

    fn threshold(&self) -> f64 {
        self.incumbent_value() - self.config.desired_gap
    }

    fn evaluate(&mut self, bounds: BoundBox, parent_key: f64) -> Result<()> {
        let rank = self.layout.rank();
        let mut relaxation = self.config.relaxation.build(&self.obs, rank, &bounds)?;
        if relaxation.is_infeasible() {
            self.stats.soft_prunes += 1;
            self.stats.soft_pruned_volume += bounds.volume();
            return Ok(());
        }

        self.stats.evaluations += 1;
        let mut x = relaxation.initial_point();
        let lower = self.lower.optimize(&mut *relaxation, &mut x);
        relaxation.record_lower_bound(&x);
        let key = match relaxation.soft_lower_bound() {
            Some(s) if lower.converged() && s.is_finite() => s.max(parent_key),
            _ => {
                self.stats.failed_lower_bounds += 1;
                log::warn!(
                    "gop: relaxation ended with {} after {} rounds, keeping parent key {:.6e}",
                    lower.termination,
                    lower.rounds,
                    parent_key
                );
                parent_key
            }
        };

        let pairs = self.config.relaxation.kind.pairs();
        let mut upper = GeometricNmf::new(
            &self.obs,
            rank,
            &bounds,
            self.config.upper_convergence.clone(),
        )?
        .with_pairs(pairs.to_vec(), self.config.relaxation.feasibility_tol)?;
        let mut x_hat = x.clone();
        let (termination, value) = if pairs.is_empty() {
            let found = upper.solve(&mut self.upper, &mut x_hat);
            (found.termination, found.value)
        } else {
            let found = upper.solve_constrained(&mut self.lower, &mut x_hat);
            (found.termination, found.value)
        };
        let usable = matches!(
            termination,
            TerminationReason::Converged | TerminationReason::MaxIterations
        ) && value.is_finite()
            && upper.is_feasible(&x_hat);
        if !usable {
            self.stats.failed_upper_bounds += 1;
            log::warn!(
                "gop: upper bound search ended with {} at {:.6e}, ignored",
                termination,
                value
            );
        } else if value < self.incumbent_value() {
            self.incumbent = Some(SolutionPack {
                relaxed_minimum: key,
                non_relaxed_minimum: value,
                solution: x_hat,
                bounds: bounds.clone(),
            });
        }

        if key >= self.threshold() {
            self.stats.soft_prunes += 1;
            self.stats.soft_pruned_volume += bounds.volume();
            return Ok(());
        }

        let non_relaxed_minimum = if usable { value } else { f64::INFINITY };
        self.queue.push(QueueEntry {
            key,
            seq: self.seq,
            pack: SolutionPack {
                relaxed_minimum: key,
                non_relaxed_minimum,
                solution: x,
                bounds,
            },
        });
        self.seq += 1;
        Ok(())
    }

    fn report(&self) {
        let s = &self.stats;
        log::info!(
            "gop: {} iterations, {} evaluations, incumbent {:.6e}, min key {:.6e}",
            s.iterations,
            s.evaluations,
            self.incumbent_value(),
            self.min_key().unwrap_or(f64::INFINITY)
        );
        log::info!(
            "gop: soft prunes {} (volume {:.3e}), hard prunes {} (volume {:.3e}), total volume {:.3e}",
            s.soft_prunes,
            s.soft_pruned_volume,
            s.hard_prunes,
            s.hard_pruned_volume,
            s.total_volume
        );
        if s.iterations >= self.config.max_iterations && !self.queue.is_empty() {
            log::warn!(
                "gop: iteration cap {} reached with {} open boxes",
                self.config.max_iterations,
                self.queue.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitter::WidestSideSplitter;

    fn pack(key: f64) -> SolutionPack {
        SolutionPack {
            relaxed_minimum: key,
            non_relaxed_minimum: key,
            solution: Matrix::zeros(1, 1),
            bounds: BoundBox::uniform(1, 1, 0.0, 1.0).unwrap(),
        }
    }

    #[test]
    fn queue_pops_smallest_key_first_and_ties_in_order() {
        let mut heap = BinaryHeap::new();
        for (seq, key) in [3.0, 1.0, 2.0, 1.0].into_iter().enumerate() {
            heap.push(QueueEntry {
                key,
                seq: seq as u64,
                pack: pack(key),
            });
        }
        let order: Vec<(f64, u64)> =
            std::iter::from_fn(|| heap.pop().map(|e| (e.key, e.seq))).collect();
        assert_eq!(order, vec![(1.0, 1), (1.0, 3), (2.0, 2), (3.0, 0)]);
    }

    #[test]
    fn missing_dimension_is_rejected() {
        let obs = Observations::new(vec![0], vec![0], vec![1.0]).unwrap();
        let result = GopNmfEngine::new(obs, GopConfig::default(), WidestSideSplitter::default());
        assert!(matches!(result, Err(Error::MissingDimension)));
    }

    #[test]
    fn box_shape_is_checked_on_initialize() {
        let obs = Observations::new(vec![0], vec![0], vec![1.0]).unwrap();
        let config = GopConfig {
            new_dimension: 1,
            ..GopConfig::default()
        };
        let mut engine = GopNmfEngine::new(obs, config, WidestSideSplitter::default()).unwrap();
        let wrong = BoundBox::uniform(2, 2, 0.0, 1.0).unwrap();
        assert!(engine.initialize(wrong).is_err());
    }

    #[test]
    fn exactly_factorizable_scalar_finishes_at_the_root() {
        let obs = Observations::new(vec![0], vec![0], vec![1.0]).unwrap();
        let config = GopConfig {
            new_dimension: 1,
            desired_gap: 1e-3,
            ..GopConfig::default()
        };
        let mut engine = GopNmfEngine::new(obs, config, WidestSideSplitter::default()).unwrap();
        let bounds = BoundBox::from_original(1, 2, 0.5, 2.0).unwrap();
        let best = engine.compute_global_optimum(bounds).unwrap().unwrap();
        assert!(best.non_relaxed_minimum < 1e-12);
        assert_eq!(engine.queue_len(), 0);
        assert_eq!(engine.stats().soft_prunes, 1);
        assert_eq!(engine.stats().iterations, 0);
    }
}
