use crate::advisor::{Advisor, AdvisorConfig};
use crate::collaborative::CollaborativeRecommender;
use crate::error::{AdvisorError, Result};
use crate::features::FeatureEngineer;
use crate::profiler::UserProfiler;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

const COMPONENT: &str = "model_snapshot";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub version: Uuid,
    pub trained_at: DateTime<Utc>,
    pub profiles_used: usize,
    pub profiles_skipped: usize,
    pub cluster_count: usize,
    pub silhouette: f64,
    pub collaborative: bool,
}

/// Exported state of every trainable component plus version metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub meta: SnapshotMeta,
    pub features: serde_json::Value,
    pub profiler: serde_json::Value,
    pub collaborative: Option<serde_json::Value>,
}

impl ModelSnapshot {
    pub fn from_components(
        meta: SnapshotMeta,
        features: &FeatureEngineer,
        profiler: &UserProfiler,
        collaborative: Option<&CollaborativeRecommender>,
    ) -> Result<Self> {
        let collaborative = match collaborative {
            Some(cf) => Some(as_value(&cf.export_state()?)?),
            None => None,
        };
        Ok(Self {
            meta,
            features: as_value(&features.export_state()?)?,
            profiler: as_value(&profiler.export_state()?)?,
            collaborative,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| AdvisorError::state(COMPONENT, e))
    }

    pub fn from_bytes(blob: &[u8]) -> Result<Self> {
        serde_json::from_slice(blob).map_err(|e| AdvisorError::state(COMPONENT, e))
    }

    pub fn into_advisor(self, config: AdvisorConfig) -> Result<Advisor> {
        let mut features = FeatureEngineer::default();
        features.import_state(&as_bytes(&self.features)?)?;

        let mut profiler = UserProfiler::default();
        profiler.import_state(&as_bytes(&self.profiler)?)?;

        let collaborative = match &self.collaborative {
            Some(blob) => {
                let mut cf = CollaborativeRecommender::default();
                cf.import_state(&as_bytes(blob)?)?;
                Some(cf)
            }
            None => None,
        };

        let dimension = features.dimension();
        let centroid_dimension = profiler.model()?.dimension();
        if centroid_dimension != dimension {
            return Err(AdvisorError::state(
                COMPONENT,
                format!("profiler centroids have {centroid_dimension} columns, encoder emits {dimension}"),
            ));
        }
        if let Some(cf) = &collaborative {
            let cf_dimension = cf.model()?.feature_dimension();
            if cf_dimension != dimension {
                return Err(AdvisorError::state(
                    COMPONENT,
                    format!("collaborative user features have {cf_dimension} columns, encoder emits {dimension}"),
                ));
            }
        }

        Ok(Advisor::new(config, features, profiler, collaborative).with_version(self.meta.version))
    }
}

fn as_value(blob: &[u8]) -> Result<serde_json::Value> {
    serde_json::from_slice(blob).map_err(|e| AdvisorError::state(COMPONENT, e))
}

fn as_bytes(value: &serde_json::Value) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| AdvisorError::state(COMPONENT, e))
}

#[derive(Debug)]
pub struct ServingSnapshot {
    pub meta: SnapshotMeta,
    pub advisor: Advisor,
}

/// Holds the snapshot currently being served.
#[derive(Debug, Default)]
pub struct SnapshotRegistry {
    current: RwLock<Option<Arc<ServingSnapshot>>>,
}

impl SnapshotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<ServingSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swaps in a fully built snapshot and returns the one it replaced.
    pub fn publish(&self, snapshot: ServingSnapshot) -> Option<Arc<ServingSnapshot>> {
        let version = snapshot.meta.version;
        let next = Arc::new(snapshot);
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(next);
        tracing::info!(
            %version,
            previous = ?previous.as_ref().map(|p| p.meta.version),
            "snapshot published"
        );
        previous
    }
}
