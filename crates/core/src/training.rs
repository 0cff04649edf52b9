use crate::collaborative::{CollaborativeRecommender, InteractionMatrix, NmfOptions};
use crate::content::ContentRecommender;
use crate::domain::profile::{ProfileInput, UserProfile};
use crate::error::{AdvisorError, Result};
use crate::features::{EncodedVector, EncodingMode, FeatureEngineer};
use crate::profiler::{KMeansOptions, UserProfiler};
use crate::snapshot::{ModelSnapshot, SnapshotMeta};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingConfig {
    pub k_min: usize,
    pub k_max: usize,
    pub kmeans_restarts: usize,
    pub kmeans_max_iter: usize,
    pub latent_dim: usize,
    pub nmf_iterations: usize,
    pub cold_start_neighbours: usize,
    pub seed: u64,
    pub strict_encoding: bool,
    /// Top content products recorded per user as implicit ratings; 0 leaves the
    /// collaborative model out of the snapshot.
    pub interactions_per_user: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            k_min: 2,
            k_max: 10,
            kmeans_restarts: 10,
            kmeans_max_iter: 300,
            latent_dim: 10,
            nmf_iterations: 200,
            cold_start_neighbours: 5,
            seed: 42,
            strict_encoding: false,
            interactions_per_user: 5,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.k_min < 2 || self.k_min > self.k_max {
            return Err(AdvisorError::validation(format!(
                "cluster range must satisfy 2 <= k_min <= k_max (got {}..={})",
                self.k_min, self.k_max
            )));
        }
        if self.kmeans_restarts == 0 || self.kmeans_max_iter == 0 {
            return Err(AdvisorError::validation(
                "k-means restarts and iterations must be at least 1",
            ));
        }
        if self.latent_dim == 0 || self.cold_start_neighbours == 0 {
            return Err(AdvisorError::validation(
                "latent_dim and cold_start_neighbours must be at least 1",
            ));
        }
        Ok(())
    }

    fn kmeans(&self) -> KMeansOptions {
        KMeansOptions {
            n_init: self.kmeans_restarts,
            max_iter: self.kmeans_max_iter,
            seed: self.seed,
            ..KMeansOptions::default()
        }
    }

    fn nmf(&self) -> NmfOptions {
        NmfOptions {
            latent_dim: self.latent_dim,
            max_iter: self.nmf_iterations,
            seed: self.seed,
            neighbours: self.cold_start_neighbours,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub profiles_used: usize,
    pub skipped: Vec<SkippedRecord>,
    pub cluster_count: usize,
    pub silhouette: f64,
    pub silhouettes: Vec<(usize, f64)>,
    /// `None` when the snapshot was published without a collaborative model.
    pub reconstruction_error: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub snapshot: ModelSnapshot,
    pub report: TrainingReport,
}

pub fn train_snapshot(records: &[ProfileInput], config: &TrainingConfig) -> Result<TrainingOutcome> {
    config.validate()?;

    let mut profiles: Vec<UserProfile> = Vec::with_capacity(records.len());
    let mut skipped = Vec::new();
    for (index, record) in records.iter().enumerate() {
        match record.validate() {
            Ok(p) => profiles.push(p),
            Err(e) => {
                tracing::warn!(index, error = %e, "skipping invalid profile record");
                skipped.push(SkippedRecord {
                    index,
                    reason: e.to_string(),
                });
            }
        }
    }
    if profiles.is_empty() {
        return Err(AdvisorError::insufficient(
            "training",
            format!("no valid profiles among {} records", records.len()),
        ));
    }

    let mode = if config.strict_encoding {
        EncodingMode::Strict
    } else {
        EncodingMode::Lenient
    };
    let mut features = FeatureEngineer::new(mode);
    features.fit(&profiles)?;
    let vectors = profiles
        .iter()
        .map(|p| features.encode(p))
        .collect::<Result<Vec<EncodedVector>>>()?;

    let mut profiler = UserProfiler::new(config.kmeans());
    profiler.fit(&vectors, &profiles, config.k_min..=config.k_max)?;
    let cluster_model = profiler.model()?;
    let cluster_count = cluster_model.k;
    let silhouette = cluster_model.silhouette;
    let silhouettes = cluster_model
        .evaluations
        .iter()
        .map(|e| (e.k, e.silhouette))
        .collect();

    let matrix = InteractionMatrix::from_content_scores(
        &profiles,
        &vectors,
        &ContentRecommender::default(),
        config.interactions_per_user,
    )?;
    let mut cf = CollaborativeRecommender::new(config.nmf());
    let collaborative = match cf.fit(&matrix) {
        Ok(()) => Some(cf),
        Err(e @ AdvisorError::InsufficientData { .. }) => {
            tracing::warn!(error = %e, "collaborative model skipped; snapshot will be content-only");
            None
        }
        Err(e) => return Err(e),
    };
    let reconstruction_error = match &collaborative {
        Some(cf) => Some(cf.model()?.reconstruction_error),
        None => None,
    };

    let meta = SnapshotMeta {
        version: Uuid::new_v4(),
        trained_at: chrono::Utc::now(),
        profiles_used: profiles.len(),
        profiles_skipped: skipped.len(),
        cluster_count,
        silhouette,
        collaborative: collaborative.is_some(),
    };
    let snapshot =
        ModelSnapshot::from_components(meta, &features, &profiler, collaborative.as_ref())?;

    tracing::info!(
        version = %snapshot.meta.version,
        profiles_used = snapshot.meta.profiles_used,
        profiles_skipped = snapshot.meta.profiles_skipped,
        k = cluster_count,
        silhouette,
        collaborative = snapshot.meta.collaborative,
        "snapshot trained"
    );

    Ok(TrainingOutcome {
        report: TrainingReport {
            profiles_used: snapshot.meta.profiles_used,
            skipped,
            cluster_count,
            silhouette,
            silhouettes,
            reconstruction_error,
        },
        snapshot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::AdvisorConfig;
    use crate::domain::recommendation::CollaborativeStatus;
    use crate::fixtures;

    fn records(n: usize) -> Vec<ProfileInput> {
        fixtures::population(n).iter().map(fixtures::to_input).collect()
    }

    #[test]
    fn skips_invalid_records_and_reports_them() {
        let mut batch = records(30);
        batch[7].income = None;
        batch[12].risk_tolerance = Some("reckless".into());

        let outcome = train_snapshot(&batch, &TrainingConfig::default()).unwrap();
        let skipped: Vec<usize> = outcome.report.skipped.iter().map(|s| s.index).collect();
        assert_eq!(skipped, vec![7, 12]);
        assert_eq!(outcome.report.profiles_used, 28);
        assert_eq!(outcome.snapshot.meta.profiles_skipped, 2);
        assert!(outcome.snapshot.meta.collaborative);
        assert_eq!(outcome.report.cluster_count, 3);
        assert_eq!(outcome.report.silhouettes.len(), 9);
    }

    #[test]
    fn all_invalid_is_insufficient() {
        let batch = vec![ProfileInput::default(); 3];
        let err = train_snapshot(&batch, &TrainingConfig::default()).unwrap_err();
        assert_eq!(err.kind(), "insufficient_data");
    }

    #[test]
    fn too_few_profiles_for_clustering_aborts() {
        let err = train_snapshot(&records(2), &TrainingConfig::default()).unwrap_err();
        assert_eq!(err.kind(), "insufficient_data");
    }

    #[test]
    fn rejects_bad_cluster_range() {
        let config = TrainingConfig {
            k_min: 5,
            k_max: 3,
            ..TrainingConfig::default()
        };
        assert!(train_snapshot(&records(10), &config).unwrap_err().is_validation());
    }

    #[test]
    fn without_interactions_snapshot_is_content_only() {
        let config = TrainingConfig {
            interactions_per_user: 0,
            ..TrainingConfig::default()
        };
        let outcome = train_snapshot(&records(20), &config).unwrap();
        assert!(!outcome.snapshot.meta.collaborative);
        assert!(outcome.snapshot.collaborative.is_none());
        assert_eq!(outcome.report.reconstruction_error, None);

        let advisor = outcome
            .snapshot
            .into_advisor(AdvisorConfig::default())
            .unwrap();
        let result = advisor.advise(&fixtures::sample_input()).unwrap();
        assert_eq!(result.collaborative, CollaborativeStatus::NotConfigured);
    }

    #[test]
    fn anonymous_training_rows_are_not_addressable_by_id() {
        let mut batch = records(30);
        for record in &mut batch {
            record.user_id = None;
        }
        let advisor = train_snapshot(&batch, &TrainingConfig::default())
            .unwrap()
            .snapshot
            .into_advisor(AdvisorConfig::default())
            .unwrap();

        let mut input = fixtures::sample_input();
        input.user_id = Some("anon_00000".into());
        let result = advisor.advise(&input).unwrap();
        assert!(matches!(
            result.collaborative,
            CollaborativeStatus::Applied { cold_start: true, .. }
        ));
        assert!(result.user_preferences.is_none());
    }

    #[test]
    fn training_is_reproducible_apart_from_version() {
        let a = train_snapshot(&records(24), &TrainingConfig::default()).unwrap();
        let b = train_snapshot(&records(24), &TrainingConfig::default()).unwrap();
        assert_ne!(a.snapshot.meta.version, b.snapshot.meta.version);
        assert_eq!(a.snapshot.features, b.snapshot.features);
        assert_eq!(a.snapshot.profiler, b.snapshot.profiler);
        assert_eq!(a.snapshot.collaborative, b.snapshot.collaborative);
    }
}
