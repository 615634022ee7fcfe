//! Principal-component projection of embeddings to 2D.
//!
//! # Algorithm
//!
//! 1. Center the vectors on their mean.
//! 2. Find the top principal direction by power iteration on the
//!    covariance operator `v ↦ Xcᵀ(Xc·v)`. The `D × D` covariance matrix is
//!    never materialized, so cost stays `O(N × D)` per iteration.
//! 3. Find the second direction the same way, deflating against the first
//!    on every step (Gram-Schmidt).
//! 4. Project each centered vector onto both directions.
//!
//! Each direction is flipped so its largest-magnitude loading is positive,
//! which makes coordinates reproducible for identical input.
//!
//! # Degenerate input
//!
//! - fewer than 2 vectors → empty output;
//! - zero total variance → every point at `(0, 0)`;
//! - only one direction with variance (rank-1 data, or `D == 1`) → `y = 0`.

const MAX_ITERATIONS: usize = 1000;
const CONVERGENCE: f64 = 1e-12;
/// Eigenvalues below `RELATIVE_RANK_EPS × total variance` count as zero.
const RELATIVE_RANK_EPS: f64 = 1e-10;

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn remove_component(v: &mut [f64], unit: &[f64]) {
    let p = dot(v, unit);
    for (x, u) in v.iter_mut().zip(unit.iter()) {
        *x -= p * u;
    }
}

fn normalize(v: &mut [f64]) -> f64 {
    let n = dot(v, v).sqrt();
    if n > 0.0 {
        for x in v.iter_mut() {
            *x /= n;
        }
    }
    n
}

/// Applies the (unscaled) covariance operator: `Xcᵀ(Xc·v)`.
fn covariance_apply(centered: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; v.len()];
    for row in centered {
        let t = dot(row, v);
        for (o, x) in out.iter_mut().zip(row.iter()) {
            *o += t * x;
        }
    }
    out
}

/// Dominant eigenvector of the covariance orthogonal to `deflate`, or
/// `None` when no variance remains in that subspace.
fn principal_direction(
    centered: &[Vec<f64>],
    deflate: Option<&[f64]>,
    min_eigenvalue: f64,
) -> Option<Vec<f64>> {
    // Start from the centered row with the largest residual norm.
    let mut v = centered
        .iter()
        .map(|row| {
            let mut r = row.clone();
            if let Some(u) = deflate {
                remove_component(&mut r, u);
            }
            r
        })
        .max_by(|a, b| {
            dot(a, a)
                .partial_cmp(&dot(b, b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
    if normalize(&mut v) <= 0.0 {
        return None;
    }

    for _ in 0..MAX_ITERATIONS {
        let mut w = covariance_apply(centered, &v);
        if let Some(u) = deflate {
            remove_component(&mut w, u);
        }
        let eigenvalue = normalize(&mut w);
        if eigenvalue <= min_eigenvalue {
            return None;
        }
        let agreement = dot(&w, &v).abs();
        v = w;
        if 1.0 - agreement < CONVERGENCE {
            break;
        }
    }

    let pivot = v
        .iter()
        .enumerate()
        .max_by(|a, b| {
            a.1.abs()
                .partial_cmp(&b.1.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)?;
    if v[pivot] < 0.0 {
        for x in v.iter_mut() {
            *x = -*x;
        }
    }
    Some(v)
}

/// Project vectors of equal dimensionality onto their top two principal
/// components. Output is in input order, one `[x, y]` per vector.
pub fn project_2d(vectors: &[&[f32]]) -> Vec<[f64; 2]> {
    let n = vectors.len();
    if n < 2 {
        return Vec::new();
    }
    let dims = vectors[0].len();

    let mut mean = vec![0.0f64; dims];
    for v in vectors {
        for (m, &x) in mean.iter_mut().zip(v.iter()) {
            *m += x as f64;
        }
    }
    for m in mean.iter_mut() {
        *m /= n as f64;
    }

    let centered: Vec<Vec<f64>> = vectors
        .iter()
        .map(|v| v.iter().zip(mean.iter()).map(|(&x, m)| x as f64 - m).collect())
        .collect();

    let total_variance: f64 = centered.iter().map(|r| dot(r, r)).sum();
    let min_eigenvalue = total_variance * RELATIVE_RANK_EPS;
    if total_variance <= f64::EPSILON {
        return vec![[0.0, 0.0]; n];
    }

    let first = match principal_direction(&centered, None, min_eigenvalue) {
        Some(pc) => pc,
        None => return vec![[0.0, 0.0]; n],
    };
    let second = principal_direction(&centered, Some(&first), min_eigenvalue);

    centered
        .iter()
        .map(|row| {
            let x = dot(row, &first);
            let y = second.as_ref().map(|pc| dot(row, pc)).unwrap_or(0.0);
            [x, y]
        })
        .collect()
}
