//! K-Means clustering (Lloyd's algorithm) with seeded k-means++ initialization.

use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Result of one k-means pass.
#[derive(Debug, Clone)]
pub struct KMeansFit {
    pub labels: Vec<usize>,
    pub centroids: Array2<f64>,
    /// Sum of squared distances from each row to its centroid.
    pub inertia: f64,
    pub n_iter: usize,
    /// False when `max_iter` ran out before assignments stabilized.
    pub converged: bool,
}

/// Lloyd's k-means. The same seed and input always produce the same fit.
#[derive(Debug, Clone)]
pub struct KMeans {
    n_clusters: usize,
    max_iter: usize,
    seed: u64,
}

impl KMeans {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iter: 300,
            seed: 42,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fit on `data` (one row per sample). Callers guarantee
    /// `1 <= n_clusters <= data.nrows()`.
    pub fn fit(&self, data: ArrayView2<'_, f64>) -> KMeansFit {
        debug_assert!(self.n_clusters >= 1 && self.n_clusters <= data.nrows());

        let mut centroids = self.init_centroids(data);
        let mut labels = assign_labels(data, &centroids);
        let mut n_iter = 0;
        let mut converged = false;

        while n_iter < self.max_iter {
            n_iter += 1;
            centroids = update_centroids(data, &labels, &centroids);
            let next = assign_labels(data, &centroids);
            if next == labels {
                converged = true;
                break;
            }
            labels = next;
        }

        let inertia = inertia(data, &centroids, &labels);
        KMeansFit {
            labels,
            centroids,
            inertia,
            n_iter,
            converged,
        }
    }

    /// k-means++: first centroid uniform, each next one sampled with
    /// probability proportional to squared distance from the nearest chosen.
    fn init_centroids(&self, data: ArrayView2<'_, f64>) -> Array2<f64> {
        let n_samples = data.nrows();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut chosen = Vec::with_capacity(self.n_clusters);
        chosen.push(rng.gen_range(0..n_samples));

        let mut min_dist: Vec<f64> = (0..n_samples)
            .map(|i| squared_distance(data.row(i), data.row(chosen[0])))
            .collect();

        while chosen.len() < self.n_clusters {
            let total: f64 = min_dist.iter().sum();
            let next = if total > 0.0 {
                let target = rng.gen::<f64>() * total;
                let mut cumulative = 0.0;
                let mut pick = None;
                for (i, &d) in min_dist.iter().enumerate() {
                    cumulative += d;
                    if d > 0.0 && cumulative >= target {
                        pick = Some(i);
                        break;
                    }
                }
                // rounding can leave the target just past the last positive weight
                pick.or_else(|| min_dist.iter().rposition(|&d| d > 0.0))
                    .unwrap_or(0)
            } else {
                // every row coincides with a chosen centroid; fall back to an unused row
                let unused: Vec<usize> = (0..n_samples).filter(|i| !chosen.contains(i)).collect();
                unused[rng.gen_range(0..unused.len())]
            };
            chosen.push(next);
            for (i, d) in min_dist.iter_mut().enumerate() {
                let candidate = squared_distance(data.row(i), data.row(next));
                if candidate < *d {
                    *d = candidate;
                }
            }
        }

        let mut centroids = Array2::<f64>::zeros((self.n_clusters, data.ncols()));
        for (k, &row) in chosen.iter().enumerate() {
            centroids.row_mut(k).assign(&data.row(row));
        }
        centroids
    }
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Nearest centroid per row; ties go to the lowest centroid index.
fn assign_labels(data: ArrayView2<'_, f64>, centroids: &Array2<f64>) -> Vec<usize> {
    data.rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (k, centroid) in centroids.rows().into_iter().enumerate() {
                let dist = squared_distance(row, centroid);
                if dist < best_dist {
                    best_dist = dist;
                    best = k;
                }
            }
            best
        })
        .collect()
}

/// Mean of the rows assigned to each centroid. An empty cluster keeps its
/// previous centroid.
fn update_centroids(data: ArrayView2<'_, f64>, labels: &[usize], previous: &Array2<f64>) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros(previous.raw_dim());
    let mut counts = vec![0usize; previous.nrows()];
    for (row, &label) in data.rows().into_iter().zip(labels) {
        counts[label] += 1;
        let mut sum = sums.row_mut(label);
        sum += &row;
    }
    for (k, &count) in counts.iter().enumerate() {
        if count == 0 {
            sums.row_mut(k).assign(&previous.row(k));
        } else {
            let mut sum = sums.row_mut(k);
            sum /= count as f64;
        }
    }
    sums
}

fn inertia(data: ArrayView2<'_, f64>, centroids: &Array2<f64>, labels: &[usize]) -> f64 {
    data.rows()
        .into_iter()
        .zip(labels)
        .map(|(row, &label)| squared_distance(row, centroids.row(label)))
        .sum()
}
