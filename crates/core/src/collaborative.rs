use crate::content::ContentRecommender;
use crate::domain::profile::UserProfile;
use crate::error::{AdvisorError, Result};
use crate::features::EncodedVector;
use crate::linalg::{cosine, stack_rows};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

const COMPONENT: &str = "collaborative_recommender";
const EPS: f64 = 1e-10;

pub const MIN_RATING: f64 = 1.0;
pub const MAX_RATING: f64 = 5.0;
/// Ratings above this mark a product as preferred.
pub const PREFERRED_RATING: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NmfOptions {
    pub latent_dim: usize,
    pub max_iter: usize,
    pub seed: u64,
    /// Training users averaged for a cold-start projection.
    pub neighbours: usize,
}

impl Default for NmfOptions {
    fn default() -> Self {
        Self {
            latent_dim: 10,
            max_iter: 200,
            seed: 42,
            neighbours: 5,
        }
    }
}

/// Non-negative user×product affinities plus the feature vector of every row.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionMatrix {
    user_ids: Vec<Option<String>>,
    product_ids: Vec<String>,
    values: Array2<f64>,
    user_features: Array2<f64>,
}

impl InteractionMatrix {
    pub fn new(
        user_ids: Vec<Option<String>>,
        product_ids: Vec<String>,
        values: Array2<f64>,
        user_features: Array2<f64>,
    ) -> Result<Self> {
        if values.dim() != (user_ids.len(), product_ids.len()) {
            return Err(AdvisorError::validation(format!(
                "interaction matrix is {:?}, expected {} users x {} products",
                values.dim(),
                user_ids.len(),
                product_ids.len()
            )));
        }
        if user_features.nrows() != user_ids.len() {
            return Err(AdvisorError::validation(format!(
                "{} user ids but {} feature vectors",
                user_ids.len(),
                user_features.nrows()
            )));
        }
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(AdvisorError::validation(
                "interaction values must be finite and non-negative",
            ));
        }
        Ok(Self {
            user_ids,
            product_ids,
            values,
            user_features,
        })
    }

    /// Implicit ratings from each user's top `per_user` content scores.
    pub fn from_content_scores(
        profiles: &[UserProfile],
        vectors: &[EncodedVector],
        content: &ContentRecommender,
        per_user: usize,
    ) -> Result<Self> {
        if profiles.len() != vectors.len() {
            return Err(AdvisorError::validation(format!(
                "{} profiles but {} feature vectors",
                profiles.len(),
                vectors.len()
            )));
        }

        let catalog = content.catalog();
        let column: HashMap<&str, usize> =
            catalog.iter().enumerate().map(|(j, p)| (p.id, j)).collect();

        let mut values = Array2::zeros((profiles.len(), catalog.len()));
        for (i, profile) in profiles.iter().enumerate() {
            for scored in content.recommend(profile, per_user) {
                if let Some(&j) = column.get(scored.product.id) {
                    values[[i, j]] = (scored.score * MAX_RATING).clamp(MIN_RATING, MAX_RATING);
                }
            }
        }

        Self::new(
            profiles.iter().map(|p| p.user_id.clone()).collect(),
            catalog.iter().map(|p| p.id.to_string()).collect(),
            values,
            stack_rows(vectors)?,
        )
    }

    pub fn user_count(&self) -> usize {
        self.user_ids.len()
    }

    pub fn product_count(&self) -> usize {
        self.product_ids.len()
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }
}

/// Trained factors. Replaced as a whole on retraining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborativeModel {
    pub user_ids: Vec<Option<String>>,
    pub product_ids: Vec<String>,
    pub ratings: Array2<f64>,
    /// `W`, users × latent
    pub user_factors: Array2<f64>,
    /// `H`, products × latent
    pub product_factors: Array2<f64>,
    pub user_features: Array2<f64>,
    pub latent_dim: usize,
    pub reconstruction_error: f64,
}

impl CollaborativeModel {
    pub fn feature_dimension(&self) -> usize {
        self.user_features.ncols()
    }

    fn validate(&self) -> Result<()> {
        let (n, m, r) = (self.user_ids.len(), self.product_ids.len(), self.latent_dim);
        let shapes_ok = r > 0
            && self.ratings.dim() == (n, m)
            && self.user_factors.dim() == (n, r)
            && self.product_factors.dim() == (m, r)
            && self.user_features.nrows() == n;
        if !shapes_ok {
            return Err(AdvisorError::state(COMPONENT, "factor shapes are inconsistent"));
        }
        let finite_non_negative = self
            .ratings
            .iter()
            .chain(&self.user_factors)
            .chain(&self.product_factors)
            .all(|v| v.is_finite() && *v >= 0.0);
        if !finite_non_negative {
            return Err(AdvisorError::state(
                COMPONENT,
                "ratings and factors must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

pub enum CollaborativeQuery<'a> {
    /// A user present in the training matrix.
    User(&'a str),
    /// Any profile; matched by id when the id is known, otherwise projected.
    Profile {
        user_id: Option<&'a str>,
        vector: &'a EncodedVector,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum PredictionPath {
    Known,
    ColdStart { neighbours: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAffinity {
    pub product_id: String,
    pub affinity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborativePrediction {
    pub path: PredictionPath,
    pub items: Vec<ProductAffinity>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductPopularity {
    pub product_id: String,
    pub total_interactions: usize,
    pub average_rating: f64,
    pub popularity_share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarUser {
    pub user_id: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserPreferences {
    pub user_id: String,
    pub preferred_products: Vec<String>,
    pub similar_users: Vec<SimilarUser>,
    pub total_interactions: usize,
    pub average_rating: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct CollaborativeState {
    options: NmfOptions,
    model: CollaborativeModel,
}

#[derive(Debug, Clone, Default)]
pub struct CollaborativeRecommender {
    options: NmfOptions,
    model: Option<Arc<CollaborativeModel>>,
    user_index: Arc<HashMap<String, usize>>,
}

impl CollaborativeRecommender {
    pub fn new(options: NmfOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Result<&CollaborativeModel> {
        self.model
            .as_deref()
            .ok_or(AdvisorError::NotInitialized { component: COMPONENT })
    }

    pub fn fit(&mut self, matrix: &InteractionMatrix) -> Result<()> {
        let (n, m) = matrix.values.dim();
        if n < 2 || m < 2 {
            return Err(AdvisorError::insufficient(
                COMPONENT,
                format!("need at least 2 users and 2 products, got {n}x{m}"),
            ));
        }
        if matrix.values.iter().all(|v| *v == 0.0) {
            return Err(AdvisorError::insufficient(
                COMPONENT,
                "interaction matrix has no recorded interactions",
            ));
        }

        let r = self.options.latent_dim.clamp(1, n.min(m));
        let (user_factors, product_factors) =
            factorize(&matrix.values, r, self.options.max_iter, self.options.seed);
        let reconstruction_error = frobenius_error(&matrix.values, &user_factors, &product_factors);

        tracing::info!(
            users = n,
            products = m,
            latent_dim = r,
            reconstruction_error,
            "collaborative model fitted"
        );

        self.install(CollaborativeModel {
            user_ids: matrix.user_ids.clone(),
            product_ids: matrix.product_ids.clone(),
            ratings: matrix.values.clone(),
            user_factors,
            product_factors,
            user_features: matrix.user_features.clone(),
            latent_dim: r,
            reconstruction_error,
        });
        Ok(())
    }

    /// Top `top_n` products by predicted affinity, ties by product id.
    pub fn predict(&self, query: CollaborativeQuery<'_>, top_n: usize) -> Result<CollaborativePrediction> {
        let model = self.model()?;

        let known = match &query {
            CollaborativeQuery::User(id) => Some(*id),
            CollaborativeQuery::Profile { user_id, .. } => *user_id,
        }
        .and_then(|id| self.user_index.get(id).copied());

        let (path, factors) = match (known, query) {
            (Some(i), _) => (PredictionPath::Known, model.user_factors.row(i).to_owned()),
            (None, CollaborativeQuery::User(id)) => {
                return Err(AdvisorError::validation(format!(
                    "user {id:?} is not in the training set"
                )))
            }
            (None, CollaborativeQuery::Profile { vector, .. }) => {
                let (neighbours, factors) = self.project(model, vector)?;
                (PredictionPath::ColdStart { neighbours }, factors)
            }
        };

        let affinities = model.product_factors.dot(&factors);
        let mut items: Vec<ProductAffinity> = model
            .product_ids
            .iter()
            .zip(affinities.iter())
            .map(|(id, &affinity)| ProductAffinity {
                product_id: id.clone(),
                affinity,
            })
            .collect();
        sort_affinities(&mut items);
        items.truncate(top_n);

        Ok(CollaborativePrediction { path, items })
    }

    fn project(&self, model: &CollaborativeModel, vector: &EncodedVector) -> Result<(usize, Array1<f64>)> {
        let dim = model.feature_dimension();
        if vector.len() != dim {
            return Err(AdvisorError::validation(format!(
                "feature vector has {} entries, expected {dim}",
                vector.len()
            )));
        }

        let mut sims: Vec<(usize, f64)> = model
            .user_features
            .outer_iter()
            .enumerate()
            .map(|(i, f)| (i, cosine(vector.view(), f)))
            .collect();
        sort_similarities(&mut sims);
        sims.truncate(self.options.neighbours.max(1));

        let total: f64 = sims.iter().map(|(_, s)| s.max(0.0)).sum();
        let mut out = Array1::zeros(model.latent_dim);
        for &(i, s) in &sims {
            let w = if total > 0.0 {
                s.max(0.0) / total
            } else {
                1.0 / sims.len() as f64
            };
            out.scaled_add(w, &model.user_factors.row(i));
        }

        tracing::debug!(neighbours = sims.len(), weight_sum = total, "cold-start projection");
        Ok((sims.len(), out))
    }

    pub fn product_popularity(&self) -> Result<Vec<ProductPopularity>> {
        let model = self.model()?;
        let users = model.user_ids.len() as f64;
        Ok(model
            .product_ids
            .iter()
            .zip(model.ratings.axis_iter(Axis(1)))
            .map(|(id, column)| {
                let (count, average) = rated_summary(column.iter().copied());
                ProductPopularity {
                    product_id: id.clone(),
                    total_interactions: count,
                    average_rating: average,
                    popularity_share: count as f64 / users,
                }
            })
            .collect())
    }

    pub fn user_preferences(&self, user_id: &str) -> Result<UserPreferences> {
        let model = self.model()?;
        let i = self.user_index.get(user_id).copied().ok_or_else(|| {
            AdvisorError::validation(format!("user {user_id:?} is not in the training set"))
        })?;

        let row = model.ratings.row(i);
        let (total_interactions, average_rating) = rated_summary(row.iter().copied());
        let preferred_products = model
            .product_ids
            .iter()
            .zip(row.iter())
            .filter(|(_, &r)| r > PREFERRED_RATING)
            .map(|(id, _)| id.clone())
            .collect();

        let own = model.user_factors.row(i);
        let mut sims: Vec<(usize, f64)> = model
            .user_factors
            .outer_iter()
            .enumerate()
            .filter(|(j, _)| *j != i && model.user_ids[*j].is_some())
            .map(|(j, f)| (j, cosine(own, f)))
            .collect();
        sort_similarities(&mut sims);
        sims.truncate(self.options.neighbours);
        let similar_users = sims
            .into_iter()
            .filter_map(|(j, similarity)| {
                model.user_ids[j].clone().map(|user_id| SimilarUser {
                    user_id,
                    similarity,
                })
            })
            .collect();

        Ok(UserPreferences {
            user_id: user_id.to_string(),
            preferred_products,
            similar_users,
            total_interactions,
            average_rating,
        })
    }

    pub fn export_state(&self) -> Result<Vec<u8>> {
        let model = self.model()?;
        let state = CollaborativeState {
            options: self.options,
            model: model.clone(),
        };
        serde_json::to_vec(&state).map_err(|e| AdvisorError::state(COMPONENT, e))
    }

    pub fn import_state(&mut self, blob: &[u8]) -> Result<()> {
        let state: CollaborativeState =
            serde_json::from_slice(blob).map_err(|e| AdvisorError::state(COMPONENT, e))?;
        state.model.validate()?;
        self.options = state.options;
        self.install(state.model);
        Ok(())
    }

    fn install(&mut self, model: CollaborativeModel) {
        let mut index = HashMap::with_capacity(model.user_ids.len());
        for (i, id) in model.user_ids.iter().enumerate() {
            if let Some(id) = id {
                index.entry(id.clone()).or_insert(i);
            }
        }
        self.user_index = Arc::new(index);
        self.model = Some(Arc::new(model));
    }
}

fn sort_affinities(items: &mut [ProductAffinity]) {
    items.sort_by(|a, b| {
        b.affinity
            .partial_cmp(&a.affinity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
}

fn sort_similarities(sims: &mut [(usize, f64)]) {
    sims.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
}

fn rated_summary(ratings: impl Iterator<Item = f64>) -> (usize, f64) {
    let (count, sum) = ratings
        .filter(|r| *r > 0.0)
        .fold((0usize, 0.0), |(c, s), r| (c + 1, s + r));
    let mean = if count > 0 { sum / count as f64 } else { 0.0 };
    (count, mean)
}

/// Multiplicative-update NMF, `V ≈ W·Hᵀ`. Returns (W: n×r, H: m×r).
fn factorize(v: &Array2<f64>, r: usize, max_iter: usize, seed: u64) -> (Array2<f64>, Array2<f64>) {
    let (n, m) = v.dim();
    let scale = (v.mean().unwrap_or(0.0) / r as f64).sqrt();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut w = Array2::from_shape_fn((n, r), |_| scale * rng.gen::<f64>());
    let mut h = Array2::from_shape_fn((m, r), |_| scale * rng.gen::<f64>());

    for _ in 0..max_iter {
        // H ← H ⊙ (Vᵀ W) / (H WᵀW)
        let numer = v.t().dot(&w);
        let denom = h.dot(&w.t().dot(&w)) + EPS;
        h = h * numer / denom;

        // W ← W ⊙ (V H) / (W HᵀH)
        let numer = v.dot(&h);
        let denom = w.dot(&h.t().dot(&h)) + EPS;
        w = w * numer / denom;
    }

    (w, h)
}

fn frobenius_error(v: &Array2<f64>, w: &Array2<f64>, h: &Array2<f64>) -> f64 {
    let residual = v - &w.dot(&h.t());
    residual.mapv(|x| x * x).sum().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{EncodingMode, FeatureEngineer};
    use crate::fixtures;
    use ndarray::array;

    fn ids(names: &[&str]) -> Vec<Option<String>> {
        names.iter().map(|n| Some(n.to_string())).collect()
    }

    fn products(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    /// Users 0,1 engage with products a,b; users 2,3 with c,d.
    fn two_blocks() -> InteractionMatrix {
        InteractionMatrix::new(
            ids(&["u0", "u1", "u2", "u3"]),
            products(&["a", "b", "c", "d"]),
            array![
                [5.0, 4.0, 0.0, 0.0],
                [4.0, 5.0, 0.0, 0.0],
                [0.0, 0.0, 5.0, 4.0],
                [0.0, 0.0, 4.0, 5.0],
            ],
            array![[1.0, 0.0], [0.9, 0.1], [0.0, 1.0], [0.1, 0.9]],
        )
        .unwrap()
    }

    fn trained() -> CollaborativeRecommender {
        let mut cf = CollaborativeRecommender::new(NmfOptions {
            latent_dim: 2,
            ..NmfOptions::default()
        });
        cf.fit(&two_blocks()).unwrap();
        cf
    }

    fn top_ids(p: &CollaborativePrediction, n: usize) -> Vec<&str> {
        let mut ids: Vec<&str> = p.items.iter().take(n).map(|i| i.product_id.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    fn cold(cf: &CollaborativeRecommender, user_id: Option<&str>, v: &EncodedVector, n: usize) -> CollaborativePrediction {
        cf.predict(CollaborativeQuery::Profile { user_id, vector: v }, n)
            .unwrap()
    }

    #[test]
    fn predict_before_fit_is_not_initialized() {
        let cf = CollaborativeRecommender::default();
        let err = cf.predict(CollaborativeQuery::User("u0"), 3).unwrap_err();
        assert_eq!(err.kind(), "not_initialized");
        assert_eq!(cf.product_popularity().unwrap_err().kind(), "not_initialized");
    }

    #[test]
    fn tiny_matrices_are_insufficient() {
        let one_user = InteractionMatrix::new(
            ids(&["u0"]),
            products(&["a", "b"]),
            array![[1.0, 2.0]],
            array![[1.0, 0.0]],
        )
        .unwrap();
        let mut cf = CollaborativeRecommender::default();
        assert_eq!(cf.fit(&one_user).unwrap_err().kind(), "insufficient_data");

        let one_product = InteractionMatrix::new(
            ids(&["u0", "u1"]),
            products(&["a"]),
            array![[1.0], [2.0]],
            array![[1.0, 0.0], [0.0, 1.0]],
        )
        .unwrap();
        assert_eq!(cf.fit(&one_product).unwrap_err().kind(), "insufficient_data");
        assert!(!cf.is_trained());
    }

    #[test]
    fn rejects_negative_interactions() {
        let err = InteractionMatrix::new(
            ids(&["u0", "u1"]),
            products(&["a", "b"]),
            array![[1.0, -2.0], [0.0, 1.0]],
            array![[1.0, 0.0], [0.0, 1.0]],
        )
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let err = InteractionMatrix::new(
            ids(&["u0", "u1"]),
            products(&["a", "b", "c"]),
            array![[1.0, 2.0], [0.0, 1.0]],
            array![[1.0, 0.0], [0.0, 1.0]],
        )
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn factors_are_non_negative_and_fit_the_blocks() {
        let cf = trained();
        let model = cf.model().unwrap();
        assert!(model
            .user_factors
            .iter()
            .chain(&model.product_factors)
            .all(|v| *v >= 0.0));
        // ‖V‖ is about 12.8; a rank-2 fit of two blocks should be far below that.
        assert!(model.reconstruction_error < 3.0, "{}", model.reconstruction_error);
    }

    #[test]
    fn known_user_gets_their_block_first() {
        let cf = trained();
        let p = cf.predict(CollaborativeQuery::User("u0"), 4).unwrap();
        assert_eq!(p.path, PredictionPath::Known);
        assert_eq!(top_ids(&p, 2), vec!["a", "b"]);
        assert!(p.items.windows(2).all(|w| w[0].affinity >= w[1].affinity));
    }

    #[test]
    fn unknown_user_id_alone_is_rejected() {
        let cf = trained();
        let err = cf.predict(CollaborativeQuery::User("ghost"), 2).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn cold_start_follows_similar_users() {
        let cf = trained();
        let p = cold(&cf, None, &EncodedVector::new(vec![0.1, 1.0]), 2);
        assert_eq!(p.path, PredictionPath::ColdStart { neighbours: 4 });
        assert_eq!(top_ids(&p, 2), vec!["c", "d"]);
    }

    #[test]
    fn cold_start_with_no_similar_users_still_recommends() {
        let cf = trained();
        let p = cold(&cf, Some("brand_new"), &EncodedVector::new(vec![0.0, 0.0]), 3);
        assert_eq!(p.items.len(), 3);
        assert!(p.items.iter().all(|i| i.affinity > 0.0));
    }

    #[test]
    fn cold_start_checks_vector_width() {
        let cf = trained();
        let v = EncodedVector::new(vec![1.0, 0.0, 0.0]);
        let err = cf
            .predict(
                CollaborativeQuery::Profile {
                    user_id: None,
                    vector: &v,
                },
                2,
            )
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn from_content_scores_records_top_products_as_ratings() {
        let profiles = fixtures::population(12);
        let mut fe = FeatureEngineer::new(EncodingMode::Lenient);
        fe.fit(&profiles).unwrap();
        let vectors: Vec<_> = profiles.iter().map(|p| fe.encode(p).unwrap()).collect();

        let matrix =
            InteractionMatrix::from_content_scores(&profiles, &vectors, &ContentRecommender::default(), 5)
                .unwrap();
        assert_eq!(matrix.user_count(), 12);
        assert_eq!(matrix.product_count(), 9);
        for row in matrix.values().outer_iter() {
            let rated: Vec<f64> = row.iter().copied().filter(|v| *v > 0.0).collect();
            assert_eq!(rated.len(), 5);
            assert!(rated.iter().all(|v| (MIN_RATING..=MAX_RATING).contains(v)));
        }
    }

    #[test]
    fn rows_without_user_id_are_never_matched_by_id() {
        let mut profiles = fixtures::population(12);
        for p in &mut profiles {
            p.user_id = None;
        }
        let mut fe = FeatureEngineer::new(EncodingMode::Lenient);
        fe.fit(&profiles).unwrap();
        let vectors: Vec<_> = profiles.iter().map(|p| fe.encode(p).unwrap()).collect();
        let matrix =
            InteractionMatrix::from_content_scores(&profiles, &vectors, &ContentRecommender::default(), 5)
                .unwrap();
        let mut cf = CollaborativeRecommender::default();
        cf.fit(&matrix).unwrap();

        let p = cold(&cf, Some("anon_00000"), &vectors[0], 3);
        assert!(matches!(p.path, PredictionPath::ColdStart { .. }));
        assert!(cf.predict(CollaborativeQuery::User("anon_00000"), 3).unwrap_err().is_validation());
        assert!(cf.user_preferences("anon_00000").unwrap_err().is_validation());
    }

    #[test]
    fn popularity_counts_rated_cells_per_product() {
        let mut cf = CollaborativeRecommender::new(NmfOptions {
            latent_dim: 2,
            ..NmfOptions::default()
        });
        let matrix = InteractionMatrix::new(
            ids(&["u0", "u1", "u2", "u3"]),
            products(&["a", "b", "c"]),
            array![
                [5.0, 0.0, 2.0],
                [3.0, 0.0, 0.0],
                [4.0, 1.0, 0.0],
                [0.0, 0.0, 0.0],
            ],
            array![[1.0, 0.0], [0.9, 0.1], [0.0, 1.0], [0.1, 0.9]],
        )
        .unwrap();
        cf.fit(&matrix).unwrap();

        let stats = cf.product_popularity().unwrap();
        let a = &stats[0];
        assert_eq!((a.product_id.as_str(), a.total_interactions), ("a", 3));
        assert!((a.average_rating - 4.0).abs() < 1e-12);
        assert!((a.popularity_share - 0.75).abs() < 1e-12);
        assert_eq!(stats[1].total_interactions, 1);
        assert!((stats[2].average_rating - 2.0).abs() < 1e-12);
    }

    #[test]
    fn user_preferences_list_highly_rated_products_and_neighbours() {
        let cf = trained();
        let prefs = cf.user_preferences("u0").unwrap();
        assert_eq!(prefs.preferred_products, vec!["a", "b"]);
        assert_eq!(prefs.total_interactions, 2);
        assert!((prefs.average_rating - 4.5).abs() < 1e-12);
        assert_eq!(prefs.similar_users.len(), 3);
        assert_eq!(prefs.similar_users[0].user_id, "u1");
        assert!(prefs.similar_users.iter().all(|s| s.user_id != "u0"));
    }

    #[test]
    fn state_round_trip_reproduces_predictions() {
        let cf = trained();
        let blob = cf.export_state().unwrap();
        let mut restored = CollaborativeRecommender::default();
        restored.import_state(&blob).unwrap();

        assert_eq!(
            cf.predict(CollaborativeQuery::User("u2"), 4).unwrap(),
            restored.predict(CollaborativeQuery::User("u2"), 4).unwrap()
        );

        let v = EncodedVector::new(vec![0.4, 0.6]);
        assert_eq!(cold(&cf, None, &v, 4), cold(&restored, None, &v, 4));
        assert_eq!(cf.product_popularity().unwrap(), restored.product_popularity().unwrap());
    }

    #[test]
    fn import_rejects_negative_factors() {
        let cf = trained();
        let mut state: serde_json::Value = serde_json::from_slice(&cf.export_state().unwrap()).unwrap();
        state["model"]["user_factors"]["data"][0] = serde_json::json!(-1.0);
        let mut restored = CollaborativeRecommender::default();
        let err = restored
            .import_state(&serde_json::to_vec(&state).unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), "state");
    }
}
