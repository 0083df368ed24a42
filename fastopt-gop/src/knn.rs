//! Nearest-neighbor lookups over the columns of a data matrix.

use fastopt::linalg::distance_sq;
use fastopt::{Error, Matrix, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance_sq: f64,
}

/// Read-only k-nearest-neighbor table, built once over the input points.
pub trait NeighborIndex {
    /// Number of indexed points.
    fn len(&self) -> usize;

    /// Neighbors of `point`, nearest first. The point itself is excluded.
    fn neighbors(&self, point: usize) -> &[Neighbor];

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exhaustive `O(n²)` search. Ties in distance go to the smaller index.
#[derive(Debug, Clone)]
pub struct BruteForceKnn {
    k: usize,
    table: Vec<Neighbor>,
}

impl BruteForceKnn {
    /// Index the columns of `data`.
    pub fn build(data: &Matrix<f64>, k: usize) -> Result<Self> {
        let n = data.cols();
        if n == 0 {
            return Err(Error::EmptyInput("data matrix"));
        }
        fastopt::error::ensure(k > 0 && k < n, "knns", "must lie in [1, point count)")?;

        let mut table = Vec::with_capacity(n * k);
        let mut candidates: Vec<Neighbor> = Vec::with_capacity(n - 1);
        for i in 0..n {
            candidates.clear();
            candidates.extend((0..n).filter(|&j| j != i).map(|j| Neighbor {
                index: j,
                distance_sq: distance_sq(data.col(i), data.col(j)),
            }));
            candidates.sort_by(|a, b| {
                a.distance_sq
                    .total_cmp(&b.distance_sq)
                    .then(a.index.cmp(&b.index))
            });
            table.extend_from_slice(&candidates[..k]);
        }
        Ok(BruteForceKnn { k, table })
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

impl NeighborIndex for BruteForceKnn {
    fn len(&self) -> usize {
        self.table.len() / self.k
    }

    fn neighbors(&self, point: usize) -> &[Neighbor] {
        &self.table[point * self.k..(point + 1) * self.k]
    }
}

/// Unordered neighbor pair `p < q` with its squared distance.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NeighborPair {
    pub p: usize,
    pub q: usize,
    pub distance_sq: f64,
}

/// Every neighbor relation of `index` as a pair, each unordered pair once.
pub fn neighbor_pairs(index: &dyn NeighborIndex) -> Vec<NeighborPair> {
    let mut pairs: Vec<NeighborPair> = (0..index.len())
        .flat_map(|i| {
            index.neighbors(i).iter().map(move |n| NeighborPair {
                p: i.min(n.index),
                q: i.max(n.index),
                distance_sq: n.distance_sq,
            })
        })
        .collect();
    pairs.sort_by(|a, b| (a.p, a.q).cmp(&(b.p, b.q)));
    pairs.dedup_by(|a, b| a.p == b.p && a.q == b.q);
    pairs
}
