use fastopt::Matrix;

use crate::bounds::BoundBox;

/// Branching strategy of the branch-and-bound engine.
///
/// `split` must return finitely many boxes whose union is `parent` and whose
/// interiors are pairwise disjoint. `hint` is the relaxation minimizer found
/// in `parent` and may guide the cut.
pub trait Splitter {
    fn split(&mut self, parent: &BoundBox, hint: &Matrix<f64>) -> Vec<BoundBox>;
}

/// Bisects the widest side.
///
/// With `use_hint` the cut goes through the hint, clamped to the middle
/// `1 − 2·margin` of the side so neither child degenerates; otherwise through
/// the midpoint.
#[derive(Debug, Clone)]
pub struct WidestSideSplitter {
    pub use_hint: bool,
    pub margin: f64,
}

impl Default for WidestSideSplitter {
    fn default() -> Self {
        WidestSideSplitter {
            use_hint: false,
            margin: 0.1,
        }
    }
}

impl Splitter for WidestSideSplitter {
    fn split(&mut self, parent: &BoundBox, hint: &Matrix<f64>) -> Vec<BoundBox> {
        let (row, col, width) = parent.widest();
        if !(width > 0.0) {
            return vec![parent.clone()];
        }
        let lo = parent.lower()[(row, col)];
        let at = if self.use_hint && hint.shape() == parent.shape() {
            let margin = self.margin.clamp(0.0, 0.5) * width;
            hint[(row, col)].max(lo + margin).min(lo + width - margin)
        } else {
            lo + 0.5 * width
        };
        let (left, right) = parent.bisect(row, col, at);
        vec![left, right]
    }
}
