//! Seeded k-means over embedding vectors.
//!
//! k-means++ initialisation followed by Lloyd iterations, restarted
//! `n_init` times with seeds `seed, seed + 1, …`; the run with the lowest
//! inertia wins. The whole procedure is deterministic for a given input
//! order and seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_N_INIT: usize = 10;
pub const DEFAULT_MAX_ITER: usize = 300;
pub const DEFAULT_TOL: f64 = 1e-4;

/// Result of a clustering run.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// Cluster label per input vector, in input order.
    pub labels: Vec<usize>,
    /// Number of clusters actually produced.
    pub n_clusters: usize,
    /// Sum of squared distances to the assigned centroid.
    pub inertia: f64,
}

impl Clustering {
    /// Input indices grouped by label. Every label in `0..n_clusters` gets
    /// an entry, possibly empty.
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut out = vec![Vec::new(); self.n_clusters];
        for (i, &label) in self.labels.iter().enumerate() {
            out[label].push(i);
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct KMeans {
    k: usize,
    seed: u64,
    n_init: usize,
    max_iter: usize,
    tol: f64,
}

impl KMeans {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            seed: DEFAULT_SEED,
            n_init: DEFAULT_N_INIT,
            max_iter: DEFAULT_MAX_ITER,
            tol: DEFAULT_TOL,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    /// Cluster `vectors` into `min(k, n)` groups.
    ///
    /// When `n <= k` every vector becomes its own cluster (label = index).
    /// `k == 0` on a non-empty input is treated as `k == 1`.
    pub fn fit(&self, vectors: &[&[f32]]) -> Clustering {
        let n = vectors.len();
        if n == 0 {
            return Clustering {
                labels: Vec::new(),
                n_clusters: 0,
                inertia: 0.0,
            };
        }
        let k = self.k.max(1);
        if n <= k {
            return Clustering {
                labels: (0..n).collect(),
                n_clusters: n,
                inertia: 0.0,
            };
        }

        let data: Vec<Vec<f64>> = vectors
            .iter()
            .map(|v| v.iter().map(|&x| x as f64).collect())
            .collect();
        let tol = self.tol * mean_variance(&data);

        let mut best: Option<Clustering> = None;
        for run in 0..self.n_init {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(run as u64));
            let candidate = lloyd(&data, k, self.max_iter, tol, &mut rng);
            let better = match &best {
                Some(b) => candidate.inertia < b.inertia,
                None => true,
            };
            if better {
                best = Some(candidate);
            }
        }
        best.unwrap_or(Clustering {
            labels: vec![0; n],
            n_clusters: 1,
            inertia: 0.0,
        })
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Mean per-dimension variance of the data set.
fn mean_variance(data: &[Vec<f64>]) -> f64 {
    let n = data.len() as f64;
    let dims = data[0].len();
    if dims == 0 {
        return 0.0;
    }
    let mut total = 0.0;
    for d in 0..dims {
        let mean = data.iter().map(|r| r[d]).sum::<f64>() / n;
        total += data.iter().map(|r| (r[d] - mean).powi(2)).sum::<f64>() / n;
    }
    total / dims as f64
}

fn plus_plus_init(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = data.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.gen_range(0..n)].clone());

    let mut closest: Vec<f64> = data
        .iter()
        .map(|p| squared_distance(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = closest.iter().sum();
        let next = if total <= 0.0 {
            // All remaining points coincide with a centroid.
            rng.gen_range(0..n)
        } else {
            let target = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            let mut chosen = n - 1;
            for (i, d) in closest.iter().enumerate() {
                acc += d;
                if acc >= target {
                    chosen = i;
                    break;
                }
            }
            chosen
        };
        let centroid = data[next].clone();
        for (c, p) in closest.iter_mut().zip(data.iter()) {
            *c = c.min(squared_distance(p, &centroid));
        }
        centroids.push(centroid);
    }
    centroids
}

fn assign(data: &[Vec<f64>], centroids: &[Vec<f64>], labels: &mut [usize]) -> f64 {
    let mut inertia = 0.0;
    for (i, p) in data.iter().enumerate() {
        let mut best = 0;
        let mut best_d = f64::INFINITY;
        for (c, centroid) in centroids.iter().enumerate() {
            let d = squared_distance(p, centroid);
            if d < best_d {
                best_d = d;
                best = c;
            }
        }
        labels[i] = best;
        inertia += best_d;
    }
    inertia
}

fn lloyd(
    data: &[Vec<f64>],
    k: usize,
    max_iter: usize,
    tol: f64,
    rng: &mut StdRng,
) -> Clustering {
    let mut centroids = plus_plus_init(data, k, rng);
    let mut labels = vec![0usize; data.len()];
    assign(data, &centroids, &mut labels);

    for _ in 0..max_iter {
        let updated = update_centroids(data, &centroids, &mut labels);
        let shift: f64 = centroids
            .iter()
            .zip(updated.iter())
            .map(|(a, b)| squared_distance(a, b))
            .sum();
        centroids = updated;
        assign(data, &centroids, &mut labels);
        if shift <= tol {
            break;
        }
    }

    let inertia = assign(data, &centroids, &mut labels);
    Clustering {
        labels,
        n_clusters: k,
        inertia,
    }
}

/// New centroids from the current assignment. An empty cluster is
/// re-seeded at the point farthest from its assigned centroid; each point
/// seeds at most one empty cluster per pass.
fn update_centroids(
    data: &[Vec<f64>],
    centroids: &[Vec<f64>],
    labels: &mut [usize],
) -> Vec<Vec<f64>> {
    let k = centroids.len();
    let dims = data[0].len();
    let mut sums = vec![vec![0.0f64; dims]; k];
    let mut counts = vec![0usize; k];
    for (p, &label) in data.iter().zip(labels.iter()) {
        counts[label] += 1;
        for (s, x) in sums[label].iter_mut().zip(p.iter()) {
            *s += x;
        }
    }

    let mut reseeded = vec![false; data.len()];
    let mut updated = Vec::with_capacity(k);
    for (c, (sum, count)) in sums.into_iter().zip(counts.iter()).enumerate() {
        if *count > 0 {
            updated.push(sum.into_iter().map(|s| s / *count as f64).collect());
            continue;
        }
        match farthest_point(data, centroids, labels, &reseeded) {
            Some(far) => {
                reseeded[far] = true;
                labels[far] = c;
                updated.push(data[far].clone());
            }
            None => updated.push(centroids[c].clone()),
        }
    }
    updated
}

fn farthest_point(
    data: &[Vec<f64>],
    centroids: &[Vec<f64>],
    labels: &[usize],
    taken: &[bool],
) -> Option<usize> {
    let mut far = None;
    let mut far_d = -1.0;
    for (i, p) in data.iter().enumerate() {
        if taken[i] {
            continue;
        }
        let d = squared_distance(p, &centroids[labels[i]]);
        if d > far_d {
            far_d = d;
            far = Some(i);
        }
    }
    far
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_slices(v: &[Vec<f32>]) -> Vec<&[f32]> {
        v.iter().map(|x| x.as_slice()).collect()
    }

    fn two_blobs() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![10.0, 10.0],
            vec![10.1, 10.0],
            vec![10.0, 10.1],
        ]
    }

    #[test]
    fn test_separates_obvious_groups() {
        let data = two_blobs();
        let result = KMeans::new(2).fit(&as_slices(&data));
        assert_eq!(result.n_clusters, 2);
        assert_eq!(result.labels[0], result.labels[1]);
        assert_eq!(result.labels[0], result.labels[2]);
        assert_eq!(result.labels[3], result.labels[4]);
        assert_eq!(result.labels[3], result.labels[5]);
        assert_ne!(result.labels[0], result.labels[3]);
    }

    #[test]
    fn test_counts_sum_to_population() {
        let data: Vec<Vec<f32>> = (0..40)
            .map(|i| vec![(i % 7) as f32, (i % 3) as f32, (i / 5) as f32])
            .collect();
        let result = KMeans::new(5).fit(&as_slices(&data));
        let members = result.members();
        assert_eq!(members.len(), 5);
        assert_eq!(members.iter().map(|m| m.len()).sum::<usize>(), 40);
        assert!(result.labels.iter().all(|&l| l < 5));
    }

    #[test]
    fn test_deterministic_for_same_seed() {
        let data: Vec<Vec<f32>> = (0..30)
            .map(|i| vec![(i as f32).sin(), (i as f32).cos(), (i % 4) as f32])
            .collect();
        let a = KMeans::new(4).fit(&as_slices(&data));
        let b = KMeans::new(4).fit(&as_slices(&data));
        assert_eq!(a, b);
    }

    #[test]
    fn test_fewer_points_than_clusters() {
        let data = vec![vec![1.0f32, 0.0], vec![0.0, 1.0]];
        let result = KMeans::new(5).fit(&as_slices(&data));
        assert_eq!(result.n_clusters, 2);
        assert_eq!(result.labels, vec![0, 1]);
    }

    #[test]
    fn test_empty_input() {
        let result = KMeans::new(3).fit(&[]);
        assert_eq!(result.n_clusters, 0);
        assert!(result.labels.is_empty());
    }

    #[test]
    fn test_identical_points_do_not_panic() {
        let data = vec![vec![1.0f32, 1.0]; 6];
        let result = KMeans::new(3).fit(&as_slices(&data));
        assert_eq!(result.labels.len(), 6);
        assert!(result.inertia.abs() < 1e-12);
    }

    #[test]
    fn test_other_seeds_still_partition() {
        let data = two_blobs();
        let reference = KMeans::new(2).fit(&as_slices(&data));
        for seed in [0, 7, 1234] {
            let result = KMeans::new(2).with_seed(seed).with_n_init(1).fit(&as_slices(&data));
            assert_eq!(result.n_clusters, 2);
            assert_eq!(result.labels.len(), data.len());
            let members = result.members();
            assert!(members.iter().all(|m| m.len() == 3));
            assert!((result.inertia - reference.inertia).abs() < 1e-6);
        }
    }

    #[test]
    fn test_n_init_zero_runs_once() {
        let data = two_blobs();
        let result = KMeans::new(2).with_n_init(0).fit(&as_slices(&data));
        assert_eq!(result.n_clusters, 2);
        assert_eq!(result.labels.len(), 6);
    }

    #[test]
    fn test_two_empty_clusters_reseed_distinct_points() {
        let data: Vec<Vec<f64>> = vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![5.0, 0.0],
            vec![9.0, 0.0],
        ];
        let centroids = vec![vec![0.0, 0.0], vec![100.0, 0.0], vec![200.0, 0.0]];
        let mut labels = vec![0usize; 4];

        let updated = update_centroids(&data, &centroids, &mut labels);

        assert_eq!(updated.len(), 3);
        assert_eq!(updated[1], vec![9.0, 0.0]);
        assert_eq!(updated[2], vec![5.0, 0.0]);
        assert_eq!(labels, vec![0, 0, 2, 1]);
    }
}
