use std::fmt;

/// Summary of an optimization run. The iterate itself is updated in place.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimResult<F> {
    /// Objective value at the final iterate.
    pub value: F,
    /// Norm of the projected gradient at the final iterate.
    pub gradient_norm: F,
    /// Iteration counter at exit (counted from the start iteration).
    pub iterations: usize,
    /// Total number of objective evaluations.
    pub func_evals: usize,
    /// Reason for termination.
    pub termination: TerminationReason,
}

impl<F> OptimResult<F> {
    /// `true` when the problem reported termination.
    pub fn converged(&self) -> bool {
        self.termination == TerminationReason::Converged
    }
}

/// Why the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TerminationReason {
    /// The problem's termination predicate held.
    Converged,
    /// Reached the iteration cap; the last iterate is kept.
    MaxIterations,
    /// Backtracking could not find sufficient decrease.
    LineSearchFailed,
    /// The problem flagged the objective value as pathological.
    Diverged,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Converged => write!(f, "converged"),
            TerminationReason::MaxIterations => write!(f, "maximum iterations reached"),
            TerminationReason::LineSearchFailed => write!(f, "line search failed"),
            TerminationReason::Diverged => write!(f, "objective diverged"),
        }
    }
}
