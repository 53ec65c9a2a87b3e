//! Profile segmentation using K-Means clustering
//!
//! Organizations are clustered in the two-dimensional feature space
//! `(p90_amount, total_amount)`. The two features live on very different
//! scales, so both are z-score standardized before any distance is computed;
//! skipping this would let total volume dominate the metric entirely.

use crate::aggregate::OrganizationProfile;
use crate::config::{InitStrategy, PipelineConfig};
use anyhow::Context;
use linfa::prelude::*;
use linfa_clustering::{KMeans, KMeansInit};
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use std::collections::HashSet;

/// Z-score feature scaler fitted on the profile population.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    means: Array1<f64>,
    stds: Array1<f64>,
}

impl StandardScaler {
    /// Fit per-column mean and standard deviation.
    pub fn fit(features: &Array2<f64>) -> Self {
        let means = features
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(features.ncols()));
        let mut stds = features.std_axis(Axis(0), 0.0);
        // a constant column must not divide by zero
        stds.mapv_inplace(|s| if s > 0.0 { s } else { 1.0 });
        Self { means, stds }
    }

    /// Standardize a feature matrix.
    pub fn transform(&self, features: &Array2<f64>) -> Array2<f64> {
        (features - &self.means) / &self.stds
    }

    /// Map a point from standardized space back to raw feature units.
    pub fn inverse_point(&self, point: ArrayView1<f64>) -> Array1<f64> {
        point.to_owned() * &self.stds + &self.means
    }
}

/// Fitted segmentation over the profile population.
///
/// Cluster indices are remapped after fitting so that ascending index
/// follows ascending centroid volume; index 0 is always the lowest-volume
/// segment, which is what lets operator-assigned labels like
/// `small`/`medium`/`big` stay meaningful across inputs.
#[derive(Debug)]
pub struct SegmentationModel {
    pub n_clusters: usize,
    /// Cluster assignment per profile, parallel to the input order
    pub labels: Array1<usize>,
    /// Centroids in raw feature units `(p90_amount, total_amount)`, one row per cluster
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares of the selected run, in standardized space
    pub inertia: f64,
    /// Standardized feature matrix the model was fitted on
    pub features: Array2<f64>,
    pub scaler: StandardScaler,
}

impl SegmentationModel {
    /// Number of profiles assigned to each cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }
}

/// Build the feature matrix `(p90_amount, total_amount)`, one row per profile.
pub fn feature_matrix(profiles: &[OrganizationProfile]) -> crate::Result<Array2<f64>> {
    let mut data = Vec::with_capacity(profiles.len() * 2);
    for profile in profiles {
        data.extend_from_slice(&[profile.p90_amount, profile.total_amount]);
    }
    Array2::from_shape_vec((profiles.len(), 2), data)
        .context("segmentation: building the feature matrix")
}

/// Fit the segmentation model on organization profiles.
///
/// Runs `restart_count` independent K-Means fits over the standardized
/// features, keeping the lowest-inertia run; centroid seeding and restart
/// selection are driven by a fixed-seed RNG so the selected result is
/// reproducible. Requesting more clusters than there are distinct profiles
/// is a fatal configuration error.
pub fn fit_segments(
    profiles: &[OrganizationProfile],
    config: &PipelineConfig,
) -> crate::Result<SegmentationModel> {
    config.validate()?;

    let raw = feature_matrix(profiles)?;
    let distinct = distinct_rows(&raw);
    if distinct < config.n_clusters {
        anyhow::bail!(
            "segmentation: {} profiles ({} distinct) cannot support {} clusters",
            profiles.len(),
            distinct,
            config.n_clusters
        );
    }

    let scaler = StandardScaler::fit(&raw);
    let features = scaler.transform(&raw);

    let rng = Xoshiro256Plus::seed_from_u64(config.seed);
    let init: KMeansInit<f64> = match config.init {
        InitStrategy::KMeansPp => KMeansInit::KMeansPlusPlus,
        InitStrategy::Random => KMeansInit::Random,
    };

    let targets: Array1<usize> = Array1::zeros(profiles.len());
    let dataset = Dataset::new(features.clone(), targets);

    let model = KMeans::params_with(config.n_clusters, rng, L2Dist)
        .n_runs(config.restart_count)
        .max_n_iterations(config.max_iterations)
        .tolerance(config.tolerance)
        .init_method(init)
        .fit(&dataset)
        .context("segmentation: k-means fit failed")?;

    let raw_labels = model.predict(&dataset);
    let scaled_centroids = model.centroids().clone();
    let inertia = compute_inertia(&features, &raw_labels, &scaled_centroids);

    // remap cluster indices so index order follows centroid volume
    let order = volume_order(&scaled_centroids, &scaler);
    let mut remap = vec![0usize; config.n_clusters];
    for (new_idx, &old_idx) in order.iter().enumerate() {
        remap[old_idx] = new_idx;
    }
    let labels = raw_labels.mapv(|label| remap[label]);

    let mut centroids = Array2::zeros((config.n_clusters, 2));
    for (new_idx, &old_idx) in order.iter().enumerate() {
        centroids
            .row_mut(new_idx)
            .assign(&scaler.inverse_point(scaled_centroids.row(old_idx)));
    }

    Ok(SegmentationModel {
        n_clusters: config.n_clusters,
        labels,
        centroids,
        inertia,
        features,
        scaler,
    })
}

/// Split profiles into per-cluster sets, parallel to the model's labels.
///
/// The returned sets partition the input: every profile lands in exactly
/// one set and no profile is dropped.
pub fn partition_profiles(
    profiles: &[OrganizationProfile],
    model: &SegmentationModel,
) -> Vec<Vec<OrganizationProfile>> {
    let mut sets = vec![Vec::new(); model.n_clusters];
    for (profile, &label) in profiles.iter().zip(model.labels.iter()) {
        sets[label].push(profile.clone());
    }
    sets
}

/// Cluster indices sorted by ascending centroid volume in raw units.
fn volume_order(scaled_centroids: &Array2<f64>, scaler: &StandardScaler) -> Vec<usize> {
    let raw: Vec<Array1<f64>> = scaled_centroids
        .outer_iter()
        .map(|centroid| scaler.inverse_point(centroid))
        .collect();
    let mut order: Vec<usize> = (0..scaled_centroids.nrows()).collect();
    order.sort_by(|&a, &b| {
        raw[a][1]
            .total_cmp(&raw[b][1])
            .then(raw[a][0].total_cmp(&raw[b][0]))
    });
    order
}

/// Within-cluster sum of squares (inertia).
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    let mut inertia = 0.0;
    for (i, &cluster) in labels.iter().enumerate() {
        if cluster < centroids.nrows() {
            let point = features.row(i);
            let centroid = centroids.row(cluster);
            let distance_sq = point
                .iter()
                .zip(centroid.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>();
            inertia += distance_sq;
        }
    }
    inertia
}

fn distinct_rows(features: &Array2<f64>) -> usize {
    let mut seen = HashSet::new();
    for row in features.outer_iter() {
        seen.insert((row[0].to_bits(), row[1].to_bits()));
    }
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str, p90: f64, total: f64) -> OrganizationProfile {
        OrganizationProfile {
            organization_id: id.to_string(),
            organization_name: format!("Org {id}"),
            p90_amount: p90,
            total_amount: total,
        }
    }

    /// Three well-separated volume bands, five organizations each.
    fn banded_profiles() -> Vec<OrganizationProfile> {
        let mut profiles = Vec::new();
        for i in 0..5 {
            let jitter = i as f64 * 10.0;
            profiles.push(profile(&format!("S{i}"), 100.0 + jitter, 1_000.0 + jitter));
        }
        for i in 0..5 {
            let jitter = i as f64 * 100.0;
            profiles.push(profile(&format!("M{i}"), 5_000.0 + jitter, 50_000.0 + jitter));
        }
        for i in 0..5 {
            let jitter = i as f64 * 1_000.0;
            profiles.push(profile(&format!("B{i}"), 50_000.0 + jitter, 500_000.0 + jitter));
        }
        profiles
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            restart_count: 5,
            max_iterations: 100,
            seed: 42,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_scaler_standardizes_and_inverts() {
        let features = feature_matrix(&banded_profiles()).unwrap();
        let scaler = StandardScaler::fit(&features);
        let scaled = scaler.transform(&features);

        for column in scaled.columns() {
            let mean: f64 = column.iter().sum::<f64>() / column.len() as f64;
            assert!(mean.abs() < 1e-9, "standardized mean should be ~0, got {mean}");
        }

        let restored = scaler.inverse_point(scaled.row(0));
        assert!((restored[0] - features[[0, 0]]).abs() < 1e-9);
        assert!((restored[1] - features[[0, 1]]).abs() < 1e-9);
    }

    #[test]
    fn test_fit_orders_clusters_by_volume() {
        let profiles = banded_profiles();
        let model = fit_segments(&profiles, &test_config()).unwrap();

        assert_eq!(model.n_clusters, 3);
        assert_eq!(model.labels.len(), profiles.len());

        // centroid volume must ascend with the cluster index
        assert!(model.centroids[[0, 1]] < model.centroids[[1, 1]]);
        assert!(model.centroids[[1, 1]] < model.centroids[[2, 1]]);

        // the low band lands in cluster 0, the high band in cluster 2
        for i in 0..5 {
            assert_eq!(model.labels[i], 0, "low-volume org {i} misplaced");
            assert_eq!(model.labels[10 + i], 2, "high-volume org {i} misplaced");
        }
    }

    #[test]
    fn test_fit_is_deterministic_for_fixed_seed() {
        let profiles = banded_profiles();
        let first = fit_segments(&profiles, &test_config()).unwrap();
        let second = fit_segments(&profiles, &test_config()).unwrap();

        assert_eq!(first.labels, second.labels);
        assert_eq!(first.centroids, second.centroids);
        assert_eq!(first.inertia, second.inertia);
    }

    #[test]
    fn test_insufficient_distinct_profiles_is_fatal() {
        // four profiles but only two distinct feature points
        let profiles = vec![
            profile("A", 100.0, 300.0),
            profile("B", 100.0, 300.0),
            profile("C", 100.0, 300.0),
            profile("D", 9_000.0, 90_000.0),
        ];
        let err = fit_segments(&profiles, &test_config()).unwrap_err().to_string();
        assert!(err.contains("segmentation"), "{err}");
        assert!(err.contains("2 distinct"), "{err}");
    }

    #[test]
    fn test_partition_covers_every_profile_once() {
        let profiles = banded_profiles();
        let model = fit_segments(&profiles, &test_config()).unwrap();
        let sets = partition_profiles(&profiles, &model);

        assert_eq!(sets.len(), 3);
        let total: usize = sets.iter().map(Vec::len).sum();
        assert_eq!(total, profiles.len());

        let mut seen = HashSet::new();
        for set in &sets {
            for member in set {
                assert!(
                    seen.insert(member.organization_id.clone()),
                    "{} appears in more than one cluster",
                    member.organization_id
                );
            }
        }
        assert_eq!(seen.len(), profiles.len());
    }

    #[test]
    fn test_cluster_sizes_sum_to_population() {
        let profiles = banded_profiles();
        let model = fit_segments(&profiles, &test_config()).unwrap();
        let sizes = model.cluster_sizes();
        assert_eq!(sizes.len(), 3);
        assert_eq!(sizes.iter().sum::<usize>(), profiles.len());
    }
}
