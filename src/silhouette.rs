//! Clustering quality scoring
//!
//! The silhouette coefficient is informational: it is reported for human
//! review and the pipeline never gates on it. A degenerate population is
//! still a hard error rather than a misleading numeric value.

use ndarray::{Array1, Array2, ArrayView1};

/// Mean silhouette coefficient over the full labeled population.
///
/// For each point `i`: `s(i) = (b - a) / max(a, b)` where `a` is the mean
/// distance to the other members of its own cluster and `b` is the smallest
/// mean distance to any other cluster. Points in singleton clusters score 0.
/// The result lies in `[-1, 1]`.
///
/// # Errors
/// Fails when fewer than 2 points or fewer than 2 populated clusters are
/// present, or when `features` and `labels` disagree in length.
pub fn silhouette_score(features: &Array2<f64>, labels: &Array1<usize>) -> crate::Result<f64> {
    let n = features.nrows();
    if n != labels.len() {
        anyhow::bail!(
            "quality evaluation: {} feature rows but {} labels",
            n,
            labels.len()
        );
    }
    if n < 2 {
        anyhow::bail!("quality evaluation: needs at least 2 points, got {}", n);
    }

    let n_clusters = labels.iter().max().map(|&m| m + 1).unwrap_or(0);
    let mut sizes = vec![0usize; n_clusters];
    for &label in labels.iter() {
        sizes[label] += 1;
    }
    let populated = sizes.iter().filter(|&&size| size > 0).count();
    if populated < 2 {
        anyhow::bail!(
            "quality evaluation: needs at least 2 populated clusters, got {}",
            populated
        );
    }

    let mut total = 0.0;
    for i in 0..n {
        let own = labels[i];
        if sizes[own] == 1 {
            // a singleton has no within-cluster distance; scores 0
            continue;
        }
        let point = features.row(i);

        let mut distance_sums = vec![0.0f64; n_clusters];
        for j in 0..n {
            if i == j {
                continue;
            }
            distance_sums[labels[j]] += euclidean_distance(&point, &features.row(j));
        }

        let a = distance_sums[own] / (sizes[own] - 1) as f64;
        let b = (0..n_clusters)
            .filter(|&cluster| cluster != own && sizes[cluster] > 0)
            .map(|cluster| distance_sums[cluster] / sizes[cluster] as f64)
            .fold(f64::INFINITY, f64::min);

        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }

    Ok(total / n as f64)
}

/// Calculate Euclidean distance between two points
fn euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}
