use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use finadvice_core::advisor::AdvisorConfig;
use finadvice_core::collaborative::{ProductPopularity, UserPreferences};
use finadvice_core::content::{BudgetChoice, ContentRecommender, ScoredProduct};
use finadvice_core::domain::profile::ProfileInput;
use finadvice_core::domain::recommendation::RecommendationResult;
use finadvice_core::snapshot::{ModelSnapshot, ServingSnapshot, SnapshotRegistry};
use finadvice_core::AdvisorError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = finadvice_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let config = AdvisorConfig::from_env()?;
    let registry = Arc::new(SnapshotRegistry::new());

    match settings.require_snapshot_path() {
        Ok(path) => match load_snapshot(path, config) {
            Ok(serving) => {
                registry.publish(serving);
            }
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "snapshot load failed; starting API in degraded mode");
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "SNAPSHOT_PATH missing; starting API in degraded mode");
        }
    }

    let state = AppState {
        registry,
        snapshot_path: settings.snapshot_path.clone(),
        config,
    };

    let app = router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .route("/advice", post(advice))
        .route("/recommendations/content", post(content_recommendations))
        .route("/budgeting", post(budgeting))
        .route("/products/popularity", get(product_popularity))
        .route("/users/:user_id/preferences", get(user_preferences))
        .route("/admin/reload", post(reload))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    registry: Arc<SnapshotRegistry>,
    snapshot_path: Option<String>,
    config: AdvisorConfig,
}

#[derive(Debug)]
enum ApiError {
    Advisor(AdvisorError),
    NoSnapshot,
    Internal(anyhow::Error),
}

impl From<AdvisorError> for ApiError {
    fn from(e: AdvisorError) -> Self {
        Self::Advisor(e)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let unavailable = || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody {
                    error: "service_unavailable".to_string(),
                }),
            )
                .into_response()
        };

        match self {
            Self::Advisor(AdvisorError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody { error: msg })).into_response()
            }
            Self::Advisor(e) => {
                tracing::error!(kind = e.kind(), error = %e, "advisor call failed");
                sentry_anyhow::capture_anyhow(&anyhow::Error::new(e));
                unavailable()
            }
            Self::NoSnapshot => {
                tracing::warn!("request rejected; no snapshot loaded");
                unavailable()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "internal failure");
                sentry_anyhow::capture_anyhow(&e);
                unavailable()
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    version: Uuid,
    trained_at: DateTime<Utc>,
    profiles_used: usize,
    cluster_count: usize,
    silhouette: f64,
    collaborative: &'static str,
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let serving = state.registry.current().ok_or(ApiError::NoSnapshot)?;
    Ok(Json(status_of(&serving)))
}

fn status_of(serving: &ServingSnapshot) -> StatusResponse {
    StatusResponse {
        version: serving.meta.version,
        trained_at: serving.meta.trained_at,
        profiles_used: serving.meta.profiles_used,
        cluster_count: serving.meta.cluster_count,
        silhouette: serving.meta.silhouette,
        collaborative: serving.advisor.collaborative_state(),
    }
}

async fn advice(
    State(state): State<AppState>,
    Json(input): Json<ProfileInput>,
) -> Result<Json<RecommendationResult>, ApiError> {
    // Validation errors win over a missing snapshot so callers can fix input first.
    input.validate()?;
    let serving = state.registry.current().ok_or(ApiError::NoSnapshot)?;
    let result = serving.advisor.advise(&input)?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct ContentRequest {
    #[serde(flatten)]
    profile: ProfileInput,
    top_n: Option<usize>,
}

async fn content_recommendations(
    State(state): State<AppState>,
    Json(req): Json<ContentRequest>,
) -> Result<Json<Vec<ScoredProduct>>, ApiError> {
    let profile = req.profile.validate()?;
    let top_n = req.top_n.unwrap_or(state.config.top_n);
    Ok(Json(ContentRecommender::default().recommend(&profile, top_n)))
}

async fn budgeting(Json(input): Json<ProfileInput>) -> Result<Json<BudgetChoice>, ApiError> {
    let profile = input.validate()?;
    Ok(Json(
        ContentRecommender::default().choose_budget_strategy(&profile),
    ))
}

#[derive(Debug, Serialize)]
struct PopularityResponse {
    collaborative: &'static str,
    products: Vec<ProductPopularity>,
}

async fn product_popularity(
    State(state): State<AppState>,
) -> Result<Json<PopularityResponse>, ApiError> {
    let serving = state.registry.current().ok_or(ApiError::NoSnapshot)?;
    let products = match serving.advisor.collaborative() {
        Some(cf) if cf.is_trained() => cf.product_popularity()?,
        _ => Vec::new(),
    };
    Ok(Json(PopularityResponse {
        collaborative: serving.advisor.collaborative_state(),
        products,
    }))
}

async fn user_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserPreferences>, ApiError> {
    let serving = state.registry.current().ok_or(ApiError::NoSnapshot)?;
    let cf = serving.advisor.collaborative().ok_or(AdvisorError::NotInitialized {
        component: "collaborative_recommender",
    })?;
    Ok(Json(cf.user_preferences(&user_id)?))
}

async fn reload(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let path = state
        .snapshot_path
        .clone()
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("SNAPSHOT_PATH is not configured")))?;
    let config = state.config;

    let serving = tokio::task::spawn_blocking(move || load_snapshot(&path, config))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .map_err(ApiError::Internal)?;

    let response = status_of(&serving);
    state.registry.publish(serving);
    Ok(Json(response))
}

fn load_snapshot(path: &str, config: AdvisorConfig) -> anyhow::Result<ServingSnapshot> {
    use anyhow::Context;

    let blob = std::fs::read(path).with_context(|| format!("read snapshot {path} failed"))?;
    let snapshot = ModelSnapshot::from_bytes(&blob).context("decode snapshot failed")?;
    let meta = snapshot.meta.clone();
    let advisor = snapshot
        .into_advisor(config)
        .context("import snapshot components failed")?;

    tracing::info!(version = %meta.version, trained_at = %meta.trained_at, %path, "snapshot loaded");
    Ok(ServingSnapshot { meta, advisor })
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &finadvice_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use finadvice_core::training::{train_snapshot, TrainingConfig};
    use serde_json::json;

    fn record(i: usize) -> ProfileInput {
        let v = match i % 3 {
            0 => json!({
                "user_id": format!("u{i}"), "age": 24 + i % 4, "income": 30000 + 500 * (i % 5),
                "savings_rate": 0.05, "debt_to_income": 0.45, "emergency_fund_months": 1,
                "risk_tolerance": "high", "primary_goal": "debt_payoff",
                "time_horizon": "short_term", "liquidity_needs": "high",
            }),
            1 => json!({
                "user_id": format!("u{i}"), "age": 40 + i % 4, "income": 90000 + 1000 * (i % 5),
                "savings_rate": 0.18, "debt_to_income": 0.2, "emergency_fund_months": 5,
                "dependents": 2, "risk_tolerance": "medium", "investment_experience": "intermediate",
                "primary_goal": "retirement", "time_horizon": "long_term",
            }),
            _ => json!({
                "user_id": format!("u{i}"), "age": 63 + i % 4, "income": 60000 + 800 * (i % 5),
                "savings_rate": 0.25, "debt_to_income": 0.05, "emergency_fund_months": 9,
                "risk_tolerance": "low", "investment_experience": "advanced",
                "primary_goal": "emergency_fund", "liquidity_needs": "low",
            }),
        };
        serde_json::from_value(v).unwrap()
    }

    fn sample() -> ProfileInput {
        serde_json::from_value(json!({
            "age": 32, "income": 75000, "savings_rate": 0.15, "debt_to_income": 0.25,
            "emergency_fund_months": 4, "risk_tolerance": "medium", "primary_goal": "retirement",
        }))
        .unwrap()
    }

    fn empty_state() -> AppState {
        AppState {
            registry: Arc::new(SnapshotRegistry::new()),
            snapshot_path: None,
            config: AdvisorConfig::default(),
        }
    }

    fn loaded_state() -> AppState {
        let records: Vec<_> = (0..30).map(record).collect();
        let snapshot = train_snapshot(&records, &TrainingConfig::default())
            .unwrap()
            .snapshot;
        let state = empty_state();
        state.registry.publish(ServingSnapshot {
            meta: snapshot.meta.clone(),
            advisor: snapshot.into_advisor(state.config).unwrap(),
        });
        state
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        assert_eq!(healthz().await, "ok");
    }

    #[tokio::test]
    async fn status_without_snapshot_is_unavailable() {
        let err = status(State(empty_state())).await.unwrap_err();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(resp).await, json!({"error": "service_unavailable"}));
    }

    #[tokio::test]
    async fn validation_message_is_returned_verbatim() {
        let mut input = sample();
        input.income = None;
        let err = advice(State(loaded_state()), Json(input)).await.unwrap_err();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await, json!({"error": "income is required"}));
    }

    #[tokio::test]
    async fn advice_without_snapshot_is_unavailable() {
        let err = advice(State(empty_state()), Json(sample())).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn advice_with_snapshot_returns_ranked_items() {
        let state = loaded_state();
        let Json(result) = advice(State(state.clone()), Json(sample())).await.unwrap();
        assert_eq!(result.items.len(), state.config.top_n);
        assert!((0.0..=100.0).contains(&result.health.score));
        assert_eq!(
            result.model_version,
            state.registry.current().map(|s| s.meta.version)
        );

        let Json(st) = status(State(state)).await.unwrap();
        assert_eq!(st.collaborative, "ready");
        assert_eq!(st.profiles_used, 30);
    }

    #[tokio::test]
    async fn content_and_budgeting_work_without_snapshot() {
        let req = ContentRequest {
            profile: sample(),
            top_n: Some(3),
        };
        let Json(items) = content_recommendations(State(empty_state()), Json(req))
            .await
            .unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].product.id, "invest_001");

        let Json(choice) = budgeting(Json(sample())).await.unwrap();
        assert_eq!(choice.rule.name, "Pay Yourself First");
    }

    #[tokio::test]
    async fn popularity_lists_every_catalog_product() {
        let state = loaded_state();
        let Json(resp) = product_popularity(State(state)).await.unwrap();
        assert_eq!(resp.collaborative, "ready");
        assert_eq!(resp.products.len(), ContentRecommender::default().catalog().len());
        let rated: usize = resp.products.iter().map(|p| p.total_interactions).sum();
        assert!(rated > 0);

        let err = product_popularity(State(empty_state())).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn preferences_for_known_and_unknown_users() {
        let state = loaded_state();
        let Json(prefs) = user_preferences(State(state.clone()), Path("u4".to_string()))
            .await
            .unwrap();
        assert_eq!(prefs.user_id, "u4");
        assert!(prefs.total_interactions > 0);
        assert!(prefs.similar_users.iter().all(|s| s.user_id != "u4"));

        let err = user_preferences(State(state), Path("nobody".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reload_failure_keeps_current_snapshot() {
        let mut state = loaded_state();
        let before = state.registry.current().map(|s| s.meta.version);
        state.snapshot_path = Some("/nonexistent/snapshot.json".to_string());
        let err = reload(State(state.clone())).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.registry.current().map(|s| s.meta.version), before);
    }
}
