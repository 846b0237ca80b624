#![allow(dead_code)]

use faer::Mat;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rustc_hash::FxHashMap;

/// Create a synthetic dataset with three well-separated clusters
///
/// - Cluster 0: centred at origin
/// - Cluster 1: centred at (20, 0, 0, ...)
/// - Cluster 2: centred at (0, 20, 0, ...)
///
/// Uniform noise in `[-0.25, 0.25)` around each centre.
pub fn create_diagnostic_data(
    n_per_cluster: usize,
    n_dim: usize,
    seed: u64,
) -> (Mat<f64>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_total = n_per_cluster * 3;

    let mut data_vec = Vec::with_capacity(n_total * n_dim);
    let mut labels = Vec::with_capacity(n_total);

    let centres = [
        vec![0.0; n_dim],
        (0..n_dim)
            .map(|i| if i == 0 { 20.0 } else { 0.0 })
            .collect::<Vec<_>>(),
        (0..n_dim)
            .map(|i| if i == 1 { 20.0 } else { 0.0 })
            .collect::<Vec<_>>(),
    ];

    for (cluster_id, centre) in centres.iter().enumerate() {
        for _ in 0..n_per_cluster {
            for dim in 0..n_dim {
                let noise: f64 = rng.random::<f64>() * 0.5 - 0.25;
                data_vec.push(centre[dim] + noise);
            }
            labels.push(cluster_id);
        }
    }

    let data = Mat::from_fn(n_total, n_dim, |i, j| data_vec[i * n_dim + j]);
    (data, labels)
}

/// Ratio of the smallest centroid distance to the mean distance of points to
/// their own centroid (2D embeddings)
pub fn cluster_separation(embd: &Mat<f64>, labels: &[usize]) -> f64 {
    let mut cluster_centres: FxHashMap<usize, (f64, f64, usize)> = FxHashMap::default();
    for (i, &label) in labels.iter().enumerate() {
        let entry = cluster_centres.entry(label).or_insert((0.0, 0.0, 0));
        entry.0 += embd[(i, 0)];
        entry.1 += embd[(i, 1)];
        entry.2 += 1;
    }

    let centroids: FxHashMap<usize, (f64, f64)> = cluster_centres
        .iter()
        .map(|(&l, &(sx, sy, c))| (l, (sx / c as f64, sy / c as f64)))
        .collect();

    let centre_list: Vec<(f64, f64)> = centroids.values().copied().collect();
    let mut min_inter = f64::INFINITY;
    for a in 0..centre_list.len() {
        for b in (a + 1)..centre_list.len() {
            let d = ((centre_list[a].0 - centre_list[b].0).powi(2)
                + (centre_list[a].1 - centre_list[b].1).powi(2))
            .sqrt();
            min_inter = min_inter.min(d);
        }
    }

    let avg_intra = labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let (cx, cy) = centroids[label];
            ((embd[(i, 0)] - cx).powi(2) + (embd[(i, 1)] - cy).powi(2)).sqrt()
        })
        .sum::<f64>()
        / labels.len() as f64;

    min_inter / avg_intra
}
