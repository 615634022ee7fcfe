//! Exact nearest-neighbor distances under cosine distance.
//!
//! Populations handled by the engine are caller-bounded (a few thousand
//! vectors at most), so every query is a brute-force scan. Norms are
//! computed once per index.
//!
//! Three policies build on [`NeighborIndex`]:
//!
//! | Policy | Function |
//! |--------|----------|
//! | Coverage | [`coverage`] |
//! | Outlier detection (self-excluded k-NN mean) | [`mean_neighbor_distances`] |
//! | Distance to nearest reference | [`nearest_distances`] |

use std::cmp::Ordering;

/// A neighbor of a query: position in the index and cosine distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f64,
}

/// Brute-force cosine index over borrowed vectors.
pub struct NeighborIndex<'a> {
    points: Vec<&'a [f32]>,
    norms: Vec<f64>,
}

fn norm(v: &[f32]) -> f64 {
    v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt()
}

fn by_distance(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .partial_cmp(&b.distance)
        .unwrap_or(Ordering::Equal)
        .then(a.index.cmp(&b.index))
}

impl<'a> NeighborIndex<'a> {
    pub fn new(points: Vec<&'a [f32]>) -> Self {
        let norms = points.iter().map(|p| norm(p)).collect();
        Self { points, norms }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn distance_to(&self, i: usize, query: &[f32], query_norm: f64) -> f64 {
        let p = self.points[i];
        if p.len() != query.len() {
            return 1.0;
        }
        let denom = self.norms[i] * query_norm;
        if denom < f64::EPSILON {
            return 1.0;
        }
        let dot: f64 = p
            .iter()
            .zip(query.iter())
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum();
        1.0 - (dot / denom).clamp(-1.0, 1.0)
    }

    fn scan(&self, query: &[f32], skip: Option<usize>) -> Vec<Neighbor> {
        let qn = norm(query);
        (0..self.points.len())
            .filter(|&i| Some(i) != skip)
            .map(|i| Neighbor {
                index: i,
                distance: self.distance_to(i, query, qn),
            })
            .collect()
    }

    /// The single nearest indexed vector, or `None` for an empty index.
    pub fn nearest(&self, query: &[f32]) -> Option<Neighbor> {
        self.scan(query, None).into_iter().min_by(by_distance)
    }

    /// Up to `k` nearest indexed vectors, closest first. Ties break on
    /// index so results are deterministic.
    pub fn k_nearest(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        let mut all = self.scan(query, None);
        all.sort_by(by_distance);
        all.truncate(k);
        all
    }

    /// Up to `k` nearest neighbors of the indexed vector at `i`, excluding
    /// `i` itself (duplicates of it still count).
    pub fn k_nearest_excluding(&self, i: usize, k: usize) -> Vec<Neighbor> {
        let mut all = self.scan(self.points[i], Some(i));
        all.sort_by(by_distance);
        all.truncate(k);
        all
    }
}

/// Distance from each query to its nearest reference, `None` when there
/// are no references.
pub fn nearest_distances(references: &[&[f32]], queries: &[&[f32]]) -> Vec<Option<f64>> {
    let index = NeighborIndex::new(references.to_vec());
    queries
        .iter()
        .map(|q| index.nearest(q).map(|n| n.distance))
        .collect()
}

/// Result of the coverage policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coverage {
    pub covered: usize,
    pub total: usize,
    /// `covered / total`, `0.0` when there are no queries or no references.
    pub score: f64,
}

/// Count the queries whose nearest reference is strictly closer than
/// `threshold`.
pub fn coverage(references: &[&[f32]], queries: &[&[f32]], threshold: f64) -> Coverage {
    let covered = nearest_distances(references, queries)
        .into_iter()
        .filter(|d| matches!(d, Some(d) if *d < threshold))
        .count();
    let total = queries.len();
    let score = if total == 0 {
        0.0
    } else {
        covered as f64 / total as f64
    };
    Coverage {
        covered,
        total,
        score,
    }
}

/// For each point, the mean distance to its `k` nearest other points.
///
/// `k` is clamped to `points.len() - 1`. A single point (or `k == 0`)
/// yields a mean of `0.0`.
pub fn mean_neighbor_distances(points: &[&[f32]], k: usize) -> Vec<f64> {
    let index = NeighborIndex::new(points.to_vec());
    let k = k.min(points.len().saturating_sub(1));
    (0..points.len())
        .map(|i| {
            let neighbors = index.k_nearest_excluding(i, k);
            if neighbors.is_empty() {
                0.0
            } else {
                neighbors.iter().map(|n| n.distance).sum::<f64>() / neighbors.len() as f64
            }
        })
        .collect()
}
