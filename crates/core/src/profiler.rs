use crate::domain::profile::{RiskLevel, UserProfile};
use crate::error::{AdvisorError, Result};
use crate::features::{numeric_values, EncodedVector};
use crate::linalg::{euclidean, squared_euclidean, stack_rows};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

const COMPONENT: &str = "user_profiler";

pub const DEFAULT_K_CANDIDATES: RangeInclusive<usize> = 2..=10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KMeansOptions {
    pub n_init: usize,
    pub max_iter: usize,
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for KMeansOptions {
    fn default() -> Self {
        Self {
            n_init: 10,
            max_iter: 300,
            tolerance: 1e-6,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub mean_age: f64,
    pub mean_income: f64,
    pub mean_savings_rate: f64,
    pub mean_debt_to_income: f64,
    pub mean_emergency_fund_months: f64,
    pub mean_dependents: f64,
    /// Indexed by [`RiskLevel::tier`].
    pub risk_tolerance_counts: [usize; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KEvaluation {
    pub k: usize,
    pub silhouette: f64,
    pub inertia: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterModel {
    pub k: usize,
    /// `k × dim`
    pub centroids: Array2<f64>,
    pub populations: Vec<usize>,
    pub stats: Vec<ClusterStats>,
    pub silhouette: f64,
    pub evaluations: Vec<KEvaluation>,
}

impl ClusterModel {
    pub fn total_population(&self) -> usize {
        self.populations.iter().sum()
    }

    pub fn dimension(&self) -> usize {
        self.centroids.ncols()
    }

    fn validate(&self) -> Result<()> {
        let ok = self.k >= 1
            && self.centroids.nrows() == self.k
            && self.populations.len() == self.k
            && self.stats.len() == self.k
            && self.dimension() > 0
            && self.centroids.iter().all(|x| x.is_finite())
            && self.total_population() > 0;
        if ok {
            Ok(())
        } else {
            Err(AdvisorError::state(COMPONENT, "cluster model is internally inconsistent"))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClusterAssignment {
    pub cluster_id: usize,
    pub distance: f64,
    pub population_share: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileType {
    ConservativeHighEarner,
    AffluentSpender,
    PrudentSaver,
    ActiveConsumer,
    BudgetConscious,
}

impl ProfileType {
    pub fn label(self) -> &'static str {
        match self {
            Self::ConservativeHighEarner => "Conservative High Earner",
            Self::AffluentSpender => "Affluent Spender",
            Self::PrudentSaver => "Prudent Saver",
            Self::ActiveConsumer => "Active Consumer",
            Self::BudgetConscious => "Budget Conscious",
        }
    }
}

impl fmt::Display for ProfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeBand {
    Young,
    EarlyCareer,
    MidCareer,
    LateCareer,
    Senior,
}

impl AgeBand {
    pub fn of(age: f64) -> Self {
        match age {
            a if a < 25.0 => Self::Young,
            a if a < 35.0 => Self::EarlyCareer,
            a if a < 45.0 => Self::MidCareer,
            a if a < 55.0 => Self::LateCareer,
            _ => Self::Senior,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeBand {
    Low,
    Medium,
    High,
}

impl IncomeBand {
    pub fn of(income: f64) -> Self {
        if income < 40_000.0 {
            Self::Low
        } else if income < 75_000.0 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterDescriptor {
    pub cluster_id: usize,
    pub profile_type: ProfileType,
    pub age_band: AgeBand,
    pub income_band: IncomeBand,
    pub dominant_risk_tolerance: RiskLevel,
    pub characteristics: Vec<String>,
    pub population: usize,
    pub population_share: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProfilerState {
    options: KMeansOptions,
    model: ClusterModel,
}

#[derive(Debug, Clone, Default)]
pub struct UserProfiler {
    options: KMeansOptions,
    model: Option<Arc<ClusterModel>>,
}

impl UserProfiler {
    pub fn new(options: KMeansOptions) -> Self {
        Self {
            options,
            model: None,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Result<&ClusterModel> {
        self.model
            .as_deref()
            .ok_or(AdvisorError::NotInitialized { component: COMPONENT })
    }

    /// `profiles[i]` must be the raw profile behind `vectors[i]`.
    pub fn fit(
        &mut self,
        vectors: &[EncodedVector],
        profiles: &[UserProfile],
        k_candidates: RangeInclusive<usize>,
    ) -> Result<()> {
        if vectors.len() != profiles.len() {
            return Err(AdvisorError::validation(format!(
                "vectors and profiles must align ({} vs {})",
                vectors.len(),
                profiles.len()
            )));
        }
        let points = stack_rows(vectors)?;
        let n = points.nrows();
        // Silhouette is only defined for 2 <= k <= n - 1.
        let candidates: Vec<usize> = k_candidates
            .filter(|&k| k >= 2 && k < n)
            .collect();
        if candidates.is_empty() {
            return Err(AdvisorError::insufficient(
                COMPONENT,
                format!("{n} samples leave no valid cluster count to evaluate"),
            ));
        }

        let mut evaluations = Vec::with_capacity(candidates.len());
        let mut best: Option<(f64, KMeansRun)> = None;

        for k in candidates {
            let run = kmeans(&points, k, &self.options);
            let silhouette = silhouette(&points, &run.labels, k);
            tracing::debug!(k, silhouette, inertia = run.inertia, "evaluated cluster count");
            evaluations.push(KEvaluation {
                k,
                silhouette,
                inertia: run.inertia,
            });
            let better = match &best {
                None => true,
                Some((score, _)) => silhouette > *score,
            };
            if better {
                best = Some((silhouette, run));
            }
        }

        let Some((silhouette, run)) = best else {
            return Err(AdvisorError::insufficient(COMPONENT, "no clustering produced"));
        };

        let k = run.centroids.nrows();
        let mut populations = vec![0usize; k];
        for &label in &run.labels {
            populations[label] += 1;
        }
        let stats = (0..k)
            .map(|c| cluster_stats(profiles, &run.labels, c))
            .collect();

        let model = ClusterModel {
            k,
            centroids: run.centroids,
            populations,
            stats,
            silhouette,
            evaluations,
        };

        tracing::info!(
            k = model.k,
            silhouette = model.silhouette,
            samples = n,
            "user profiler fitted"
        );

        self.model = Some(Arc::new(model));
        Ok(())
    }

    pub fn assign(&self, vector: &EncodedVector) -> Result<ClusterAssignment> {
        let model = self.model()?;
        let dim = model.dimension();
        if vector.len() != dim {
            return Err(AdvisorError::validation(format!(
                "vector length {} does not match cluster space dimension {dim}",
                vector.len()
            )));
        }

        let (cluster_id, distance) = nearest(vector.view(), &model.centroids);
        let population_share =
            model.populations[cluster_id] as f64 / model.total_population() as f64;

        Ok(ClusterAssignment {
            cluster_id,
            distance,
            population_share,
        })
    }

    pub fn describe(&self, cluster_id: usize) -> Result<ClusterDescriptor> {
        let model = self.model()?;
        let stats = model.stats.get(cluster_id).ok_or_else(|| {
            AdvisorError::validation(format!(
                "cluster {cluster_id} does not exist (k = {})",
                model.k
            ))
        })?;

        let population = model.populations[cluster_id];
        Ok(ClusterDescriptor {
            cluster_id,
            profile_type: profile_type(stats),
            age_band: AgeBand::of(stats.mean_age),
            income_band: IncomeBand::of(stats.mean_income),
            dominant_risk_tolerance: dominant_risk(stats),
            characteristics: characteristics(stats),
            population,
            population_share: population as f64 / model.total_population() as f64,
        })
    }

    pub fn export_state(&self) -> Result<Vec<u8>> {
        let model = self.model()?;
        let state = ProfilerState {
            options: self.options,
            model: model.clone(),
        };
        serde_json::to_vec(&state).map_err(|e| AdvisorError::state(COMPONENT, e))
    }

    pub fn import_state(&mut self, blob: &[u8]) -> Result<()> {
        let state: ProfilerState =
            serde_json::from_slice(blob).map_err(|e| AdvisorError::state(COMPONENT, e))?;
        state.model.validate()?;
        self.options = state.options;
        self.model = Some(Arc::new(state.model));
        Ok(())
    }
}

struct KMeansRun {
    centroids: Array2<f64>,
    labels: Vec<usize>,
    inertia: f64,
}

fn kmeans(points: &Array2<f64>, k: usize, opts: &KMeansOptions) -> KMeansRun {
    // Seeded per k so a candidate's result does not depend on which others were evaluated.
    let mut rng = StdRng::seed_from_u64(opts.seed ^ (k as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    let mut best: Option<KMeansRun> = None;
    for _ in 0..opts.n_init.max(1) {
        let run = lloyd(points, init_plus_plus(points, k, &mut rng), opts);
        if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
            best = Some(run);
        }
    }
    best.unwrap_or_else(|| lloyd(points, init_plus_plus(points, k, &mut rng), opts))
}

fn init_plus_plus(points: &Array2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = points.nrows();
    let mut chosen = vec![rng.gen_range(0..n)];
    let mut d2: Vec<f64> = points
        .outer_iter()
        .map(|p| squared_euclidean(p, points.row(chosen[0])))
        .collect();

    while chosen.len() < k {
        let total: f64 = d2.iter().sum();
        let next = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            let mut pick = n - 1;
            for (i, &d) in d2.iter().enumerate() {
                acc += d;
                if acc >= target && d > 0.0 {
                    pick = i;
                    break;
                }
            }
            pick
        } else {
            // Every point coincides with a chosen centroid.
            (0..n).find(|i| !chosen.contains(i)).unwrap_or(0)
        };
        chosen.push(next);
        for (i, p) in points.outer_iter().enumerate() {
            d2[i] = d2[i].min(squared_euclidean(p, points.row(next)));
        }
    }

    points.select(Axis(0), &chosen)
}

fn lloyd(points: &Array2<f64>, mut centroids: Array2<f64>, opts: &KMeansOptions) -> KMeansRun {
    let k = centroids.nrows();
    let mut labels = vec![0usize; points.nrows()];

    for _ in 0..opts.max_iter {
        for (i, p) in points.outer_iter().enumerate() {
            labels[i] = nearest(p, &centroids).0;
        }

        let mut sums = Array2::<f64>::zeros(centroids.raw_dim());
        let mut counts = vec![0usize; k];
        for (p, &l) in points.outer_iter().zip(&labels) {
            counts[l] += 1;
            let mut row = sums.row_mut(l);
            row += &p;
        }

        let mut shift = 0.0;
        for c in 0..k {
            let updated: Array1<f64> = if counts[c] > 0 {
                &sums.row(c) / counts[c] as f64
            } else {
                // Re-seed an empty cluster on the point farthest from its centroid.
                let far = points
                    .outer_iter()
                    .enumerate()
                    .max_by(|(i, a), (j, b)| {
                        squared_euclidean(a.view(), centroids.row(labels[*i]))
                            .total_cmp(&squared_euclidean(b.view(), centroids.row(labels[*j])))
                            .then_with(|| j.cmp(i))
                    })
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                points.row(far).to_owned()
            };
            shift += squared_euclidean(centroids.row(c), updated.view());
            centroids.row_mut(c).assign(&updated);
        }

        if shift <= opts.tolerance {
            break;
        }
    }

    let mut inertia = 0.0;
    for (i, p) in points.outer_iter().enumerate() {
        let (label, dist) = nearest(p, &centroids);
        labels[i] = label;
        inertia += dist * dist;
    }

    KMeansRun {
        centroids,
        labels,
        inertia,
    }
}

fn nearest(point: ArrayView1<'_, f64>, centroids: &Array2<f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, centroid) in centroids.outer_iter().enumerate() {
        let d = euclidean(point, centroid);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

fn silhouette(points: &Array2<f64>, labels: &[usize], k: usize) -> f64 {
    let mut sizes = vec![0usize; k];
    for &l in labels {
        sizes[l] += 1;
    }
    if sizes.iter().filter(|&&s| s > 0).count() < 2 {
        return 0.0;
    }

    let mut total = 0.0;
    let mut sums = vec![0.0; k];
    for (i, p) in points.outer_iter().enumerate() {
        sums.iter_mut().for_each(|s| *s = 0.0);
        for (j, q) in points.outer_iter().enumerate() {
            if i != j {
                sums[labels[j]] += euclidean(p, q);
            }
        }

        let own = labels[i];
        if sizes[own] <= 1 {
            continue;
        }
        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }

    total / points.nrows() as f64
}

fn cluster_stats(profiles: &[UserProfile], labels: &[usize], cluster: usize) -> ClusterStats {
    let members: Vec<&UserProfile> = profiles
        .iter()
        .zip(labels)
        .filter(|(_, &l)| l == cluster)
        .map(|(p, _)| p)
        .collect();

    let mut means = [0.0; 6];
    let mut risk_tolerance_counts = [0usize; 3];
    for p in &members {
        for (m, v) in means.iter_mut().zip(numeric_values(p)) {
            *m += v;
        }
        risk_tolerance_counts[p.risk_tolerance.tier() as usize] += 1;
    }
    if !members.is_empty() {
        let n = members.len() as f64;
        means.iter_mut().for_each(|m| *m /= n);
    }

    ClusterStats {
        mean_age: means[0],
        mean_income: means[1],
        mean_savings_rate: means[2],
        mean_debt_to_income: means[3],
        mean_emergency_fund_months: means[4],
        mean_dependents: means[5],
        risk_tolerance_counts,
    }
}

fn profile_type(s: &ClusterStats) -> ProfileType {
    let high_income = s.mean_income >= 75_000.0;
    let high_savings = s.mean_savings_rate >= 0.2;
    let high_spending = s.mean_savings_rate < 0.1;

    if high_income && high_savings {
        ProfileType::ConservativeHighEarner
    } else if high_income && high_spending {
        ProfileType::AffluentSpender
    } else if high_savings {
        ProfileType::PrudentSaver
    } else if high_spending {
        ProfileType::ActiveConsumer
    } else {
        ProfileType::BudgetConscious
    }
}

fn dominant_risk(s: &ClusterStats) -> RiskLevel {
    let mut best = RiskLevel::Low;
    for level in RiskLevel::ALL {
        if s.risk_tolerance_counts[level.tier() as usize]
            > s.risk_tolerance_counts[best.tier() as usize]
        {
            best = level;
        }
    }
    best
}

fn characteristics(s: &ClusterStats) -> Vec<String> {
    let mut out = Vec::new();
    if s.mean_savings_rate >= 0.2 {
        out.push("Good savings rate".to_string());
    }
    if s.mean_debt_to_income > 0.4 {
        out.push("High debt load".to_string());
    }
    if s.mean_emergency_fund_months < 3.0 {
        out.push("Thin emergency cushion".to_string());
    } else if s.mean_emergency_fund_months >= 6.0 {
        out.push("Well-funded emergency reserve".to_string());
    }
    if s.mean_dependents >= 1.5 {
        out.push("Supports a family".to_string());
    }
    if out.is_empty() {
        out.push("Balanced financial behavior".to_string());
    }
    out
}
