use crate::collaborative::{CollaborativeQuery, CollaborativeRecommender, PredictionPath};
use crate::content::{general_advice, ContentRecommender, ScoredProduct};
use crate::domain::profile::{ProfileInput, RiskLevel, UserProfile};
use crate::domain::recommendation::{
    BudgetRecommendation, CollaborativeStatus, Feasibility, GoalAnalysis, HealthArea,
    HealthAssessment, PriorityAction, RecommendationResult, RecommendedProduct, SubScores,
};
use crate::error::{AdvisorError, Result};
use crate::features::FeatureEngineer;
use crate::profiler::{ClusterDescriptor, ProfileType, UserProfiler};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

pub const TARGET_SAVINGS_RATE: f64 = 0.20;
pub const DEBT_RATIO_CEILING: f64 = 0.40;
pub const TARGET_EMERGENCY_MONTHS: f64 = 6.0;
pub const NEUTRAL_DIVERSIFICATION: f64 = 50.0;

const MAX_PRIORITY_ACTIONS: usize = 3;
const LOW_SAVINGS_RATE: f64 = 0.05;
const MIN_EMERGENCY_MONTHS: f64 = 3.0;
const MAINTENANCE_ACTION: &str = "Consider advanced investment strategies and tax optimization";

/// Weakness → action, evaluated for every area whose sub-score is below 100.
const PRIORITY_RULES: [(HealthArea, &str); 4] = [
    (
        HealthArea::SavingsRate,
        "Increase automatic savings toward a 20% savings rate",
    ),
    (HealthArea::Debt, "Create a debt reduction plan"),
    (
        HealthArea::EmergencyFund,
        "Build emergency fund to 6 months of expenses",
    ),
    (
        HealthArea::Diversification,
        "Diversify across the recommended product categories",
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FusionWeights {
    pub content: f64,
    pub collaborative: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            content: 0.6,
            collaborative: 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthWeights {
    pub savings_rate: f64,
    pub debt: f64,
    pub emergency_fund: f64,
    pub diversification: f64,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            savings_rate: 0.3,
            debt: 0.3,
            emergency_fund: 0.2,
            diversification: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AdvisorConfig {
    pub fusion: FusionWeights,
    pub health: HealthWeights,
    pub top_n: usize,
    pub candidate_depth: usize,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            fusion: FusionWeights::default(),
            health: HealthWeights::default(),
            top_n: 5,
            candidate_depth: 10,
        }
    }
}

impl AdvisorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut out = Self::default();
        let number = |key: &str| lookup(key).and_then(|s| s.trim().parse::<f64>().ok());
        let count = |key: &str| lookup(key).and_then(|s| s.trim().parse::<usize>().ok());

        if let Some(v) = number("ADVISOR_CONTENT_WEIGHT") {
            out.fusion.content = v;
        }
        if let Some(v) = number("ADVISOR_COLLABORATIVE_WEIGHT") {
            out.fusion.collaborative = v;
        }
        if let Some(v) = number("ADVISOR_HEALTH_SAVINGS_WEIGHT") {
            out.health.savings_rate = v;
        }
        if let Some(v) = number("ADVISOR_HEALTH_DEBT_WEIGHT") {
            out.health.debt = v;
        }
        if let Some(v) = number("ADVISOR_HEALTH_EMERGENCY_WEIGHT") {
            out.health.emergency_fund = v;
        }
        if let Some(v) = number("ADVISOR_HEALTH_DIVERSIFICATION_WEIGHT") {
            out.health.diversification = v;
        }
        if let Some(n) = count("ADVISOR_TOP_N") {
            out.top_n = n;
        }
        if let Some(n) = count("ADVISOR_CANDIDATE_DEPTH") {
            out.candidate_depth = n;
        }

        out.validate_and_normalize()
    }

    pub fn validate_and_normalize(mut self) -> Result<Self> {
        let [c, f] = normalized("fusion", [self.fusion.content, self.fusion.collaborative])?;
        self.fusion = FusionWeights {
            content: c,
            collaborative: f,
        };

        let h = &self.health;
        let [s, d, e, v] = normalized(
            "health",
            [h.savings_rate, h.debt, h.emergency_fund, h.diversification],
        )?;
        self.health = HealthWeights {
            savings_rate: s,
            debt: d,
            emergency_fund: e,
            diversification: v,
        };

        if self.top_n == 0 {
            return Err(AdvisorError::validation("top_n must be at least 1"));
        }
        Ok(self)
    }

    fn depth(&self) -> usize {
        self.candidate_depth.max(self.top_n)
    }
}

fn normalized<const N: usize>(group: &str, weights: [f64; N]) -> Result<[f64; N]> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(AdvisorError::validation(format!(
            "{group} weights must be finite and non-negative (got {weights:?})"
        )));
    }
    let sum: f64 = weights.iter().sum();
    if sum <= 0.0 {
        return Err(AdvisorError::validation(format!(
            "{group} weights must sum to a positive value"
        )));
    }
    Ok(weights.map(|w| w / sum))
}

/// A fully trained bundle of components.
#[derive(Debug, Clone)]
pub struct Advisor {
    config: AdvisorConfig,
    features: FeatureEngineer,
    profiler: UserProfiler,
    content: ContentRecommender,
    collaborative: Option<CollaborativeRecommender>,
    version: Option<Uuid>,
}

impl Advisor {
    pub fn new(
        config: AdvisorConfig,
        features: FeatureEngineer,
        profiler: UserProfiler,
        collaborative: Option<CollaborativeRecommender>,
    ) -> Self {
        Self {
            config,
            features,
            profiler,
            content: ContentRecommender::default(),
            collaborative,
            version: None,
        }
    }

    pub fn with_version(mut self, version: Uuid) -> Self {
        self.version = Some(version);
        self
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    pub fn features(&self) -> &FeatureEngineer {
        &self.features
    }

    pub fn profiler(&self) -> &UserProfiler {
        &self.profiler
    }

    pub fn content(&self) -> &ContentRecommender {
        &self.content
    }

    pub fn collaborative(&self) -> Option<&CollaborativeRecommender> {
        self.collaborative.as_ref()
    }

    pub fn version(&self) -> Option<Uuid> {
        self.version
    }

    pub fn collaborative_state(&self) -> &'static str {
        match &self.collaborative {
            None => "not_configured",
            Some(cf) if !cf.is_trained() => "not_trained",
            Some(_) => "ready",
        }
    }

    pub fn advise(&self, input: &ProfileInput) -> Result<RecommendationResult> {
        self.features.params()?;
        let profile = input.validate()?;
        let vector = self.features.encode(&profile)?;

        let assignment = self.profiler.assign(&vector)?;
        let cluster = self.profiler.describe(assignment.cluster_id)?;

        let depth = self.config.depth();
        let content_ranked = self.content.recommend(&profile, depth);
        let budget = self.content.choose_budget_strategy(&profile);

        let mut user_preferences = None;
        let (collaborative, collaborative_list) = match &self.collaborative {
            None => (CollaborativeStatus::NotConfigured, None),
            Some(cf) if !cf.is_trained() => (CollaborativeStatus::NotTrained, None),
            Some(cf) => {
                let prediction = cf.predict(
                    CollaborativeQuery::Profile {
                        user_id: profile.user_id.as_deref(),
                        vector: &vector,
                    },
                    depth,
                )?;
                let status = match prediction.path {
                    PredictionPath::Known => {
                        if let Some(id) = profile.user_id.as_deref() {
                            user_preferences = Some(cf.user_preferences(id)?);
                        }
                        CollaborativeStatus::Applied {
                            cold_start: false,
                            neighbours: 0,
                        }
                    }
                    PredictionPath::ColdStart { neighbours } => CollaborativeStatus::Applied {
                        cold_start: true,
                        neighbours,
                    },
                };
                let list: Vec<(String, f64)> = prediction
                    .items
                    .into_iter()
                    .map(|i| (i.product_id, i.affinity))
                    .collect();
                (status, Some(list))
            }
        };
        if !collaborative.is_applied() {
            tracing::debug!(state = ?collaborative, "collaborative scoring skipped; content only");
        }

        let items = self.blend(&content_ranked, collaborative_list.as_deref());
        let health = assess_health(&profile, &items, &self.config.health);
        let risk_level = classify_risk(health.score, profile.debt_to_income);
        let priority_actions = priority_actions(&health.sub_scores);

        let peer_insights = match collaborative {
            CollaborativeStatus::Applied {
                cold_start,
                neighbours,
            } => Some(peer_insights(&cluster, cold_start, neighbours)),
            _ => None,
        };

        tracing::debug!(
            cluster_id = cluster.cluster_id,
            health = health.score,
            risk = %risk_level,
            items = items.len(),
            "advice generated"
        );

        Ok(RecommendationResult {
            user_id: profile.user_id.clone(),
            model_version: self.version,
            generated_at: chrono::Utc::now(),
            items,
            budget_strategy: BudgetRecommendation {
                id: budget.rule.id.to_string(),
                name: budget.rule.name.to_string(),
                description: budget.rule.description.to_string(),
                match_score: budget.match_score,
            },
            risk_level,
            identified_risks: identified_risks(&profile),
            priority_actions,
            cluster_recommendations: cluster_recommendations(cluster.profile_type),
            goal_analysis: goal_analysis(&profile, health.score),
            health,
            cluster,
            collaborative,
            user_preferences,
            general_advice: general_advice(&profile),
            peer_insights,
        })
    }

    fn blend(
        &self,
        content_ranked: &[ScoredProduct],
        collaborative: Option<&[(String, f64)]>,
    ) -> Vec<RecommendedProduct> {
        let content_list: Vec<(String, f64)> = content_ranked
            .iter()
            .map(|s| (s.product.id.to_string(), s.score))
            .collect();

        let weights = match collaborative {
            Some(_) => self.config.fusion,
            None => FusionWeights {
                content: 1.0,
                collaborative: 0.0,
            },
        };

        let mut out = Vec::with_capacity(self.config.top_n);
        for fused in fuse(&content_list, collaborative.unwrap_or(&[]), weights) {
            if out.len() == self.config.top_n {
                break;
            }
            let Some(product) = self.content.product(&fused.product_id) else {
                tracing::warn!(product_id = %fused.product_id, "fused product missing from catalog");
                continue;
            };
            out.push(RecommendedProduct {
                rank: out.len() as u32 + 1,
                product_id: fused.product_id,
                name: product.name.to_string(),
                category: product.category,
                risk_level: product.risk_level,
                expected_return: product.expected_return,
                description: product.description.to_string(),
                fused_score: fused.score,
                content_score: fused.content,
                collaborative_score: fused.collaborative,
            });
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusedItem {
    pub product_id: String,
    pub score: f64,
    pub content: Option<f64>,
    pub collaborative: Option<f64>,
}

/// Weighted fusion of two max-normalised score lists; ties by product id.
pub fn fuse(
    content: &[(String, f64)],
    collaborative: &[(String, f64)],
    weights: FusionWeights,
) -> Vec<FusedItem> {
    let mut merged: BTreeMap<&str, (Option<f64>, Option<f64>)> = BTreeMap::new();
    for (id, s) in normalize_by_max(content) {
        merged.entry(id).or_default().0 = Some(s);
    }
    for (id, s) in normalize_by_max(collaborative) {
        merged.entry(id).or_default().1 = Some(s);
    }

    let mut out: Vec<FusedItem> = merged
        .into_iter()
        .map(|(id, (c, f))| FusedItem {
            product_id: id.to_string(),
            score: weights.content * c.unwrap_or(0.0) + weights.collaborative * f.unwrap_or(0.0),
            content: c,
            collaborative: f,
        })
        .collect();
    out.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    out
}

fn normalize_by_max(list: &[(String, f64)]) -> Vec<(&str, f64)> {
    let max = list.iter().map(|(_, s)| *s).fold(0.0_f64, f64::max);
    list.iter()
        .map(|(id, s)| {
            let n = if max > 0.0 { (s / max).max(0.0) } else { 0.0 };
            (id.as_str(), n)
        })
        .collect()
}

pub fn assess_health(
    profile: &UserProfile,
    recommended: &[RecommendedProduct],
    weights: &HealthWeights,
) -> HealthAssessment {
    let pct = |x: f64| (x * 100.0).clamp(0.0, 100.0);

    let sub_scores = SubScores {
        savings_rate: pct((profile.savings_rate / TARGET_SAVINGS_RATE).min(1.0)),
        debt: pct((1.0 - profile.debt_to_income / DEBT_RATIO_CEILING).max(0.0)),
        emergency_fund: pct((profile.emergency_fund_months / TARGET_EMERGENCY_MONTHS).min(1.0)),
        diversification: diversification(profile.holdings.as_deref(), recommended),
    };

    let score = weights.savings_rate * sub_scores.savings_rate
        + weights.debt * sub_scores.debt
        + weights.emergency_fund * sub_scores.emergency_fund
        + weights.diversification * sub_scores.diversification;

    HealthAssessment {
        score: score.clamp(0.0, 100.0),
        sub_scores,
    }
}

fn diversification(holdings: Option<&[String]>, recommended: &[RecommendedProduct]) -> f64 {
    let Some(holdings) = holdings else {
        return NEUTRAL_DIVERSIFICATION;
    };
    let categories: BTreeSet<&str> = recommended.iter().map(|p| p.category.as_str()).collect();
    if categories.is_empty() {
        return NEUTRAL_DIVERSIFICATION;
    }
    let held = categories
        .iter()
        .filter(|c| holdings.iter().any(|h| h == *c))
        .count();
    (held as f64 / categories.len() as f64 * 100.0).clamp(0.0, 100.0)
}

pub fn classify_risk(health: f64, debt_to_income: f64) -> RiskLevel {
    if health >= 75.0 && debt_to_income < 0.2 {
        RiskLevel::Low
    } else if health < 40.0 || debt_to_income > 0.5 {
        RiskLevel::High
    } else {
        RiskLevel::Medium
    }
}

/// Weakest areas first, at most three; the maintenance action when nothing is below 100.
pub fn priority_actions(sub_scores: &SubScores) -> Vec<PriorityAction> {
    let mut weak: Vec<(HealthArea, f64)> = sub_scores
        .areas()
        .into_iter()
        .filter(|(_, s)| *s < 100.0)
        .collect();
    weak.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    if weak.is_empty() {
        return vec![PriorityAction {
            area: None,
            sub_score: None,
            action: MAINTENANCE_ACTION.to_string(),
        }];
    }

    weak.into_iter()
        .take(MAX_PRIORITY_ACTIONS)
        .filter_map(|(area, score)| {
            PRIORITY_RULES
                .iter()
                .find(|(a, _)| *a == area)
                .map(|(_, action)| PriorityAction {
                    area: Some(area),
                    sub_score: Some(score),
                    action: action.to_string(),
                })
        })
        .collect()
}

pub fn identified_risks(profile: &UserProfile) -> Vec<String> {
    let mut out = Vec::new();
    if profile.debt_to_income > DEBT_RATIO_CEILING {
        out.push("High debt-to-income ratio".to_string());
    }
    if profile.savings_rate < LOW_SAVINGS_RATE {
        out.push("Low savings rate".to_string());
    }
    if profile.emergency_fund_months < MIN_EMERGENCY_MONTHS {
        out.push("Insufficient emergency fund".to_string());
    }
    out
}

pub fn cluster_recommendations(profile_type: ProfileType) -> Vec<String> {
    let lines: &[&str] = match profile_type {
        ProfileType::ConservativeHighEarner => &[
            "Consider adding some growth investments for better returns",
            "Explore tax-advantaged savings accounts",
            "Review insurance coverage for complete protection",
        ],
        ProfileType::AffluentSpender => &[
            "Implement automated savings to build wealth",
            "Use budgeting apps to track expenses",
            "Consider the 24-hour rule before major purchases",
        ],
        ProfileType::PrudentSaver => &[
            "Optimize investment allocation for growth",
            "Consider real estate or alternative investments",
            "Review and rebalance portfolio regularly",
        ],
        ProfileType::ActiveConsumer | ProfileType::BudgetConscious => &[],
    };
    lines.iter().map(|s| s.to_string()).collect()
}

pub fn goal_analysis(profile: &UserProfile, health_score: f64) -> GoalAnalysis {
    let approach: &[&str] = match profile.primary_goal.as_str() {
        "retirement" => &[
            "Maximize employer 401(k) match",
            "Consider tax-advantaged accounts",
            "Focus on long-term growth investments",
        ],
        "emergency_fund" => &[
            "Start with high-yield savings account",
            "Automate savings",
            "Target 3-6 months of expenses",
        ],
        "debt_payoff" => &[
            "Use debt avalanche or snowball method",
            "Consider debt consolidation",
            "Avoid new debt while paying off existing",
        ],
        _ => &[],
    };
    let feasibility = if health_score < 40.0 {
        Feasibility::Low
    } else if health_score < 70.0 {
        Feasibility::Medium
    } else {
        Feasibility::High
    };
    GoalAnalysis {
        goal: profile.primary_goal.clone(),
        time_horizon: profile.time_horizon.clone(),
        feasibility,
        recommended_approach: approach.iter().map(|s| s.to_string()).collect(),
    }
}

fn peer_insights(cluster: &ClusterDescriptor, cold_start: bool, neighbours: usize) -> Vec<String> {
    let lines: &[&str] = match cluster.profile_type {
        ProfileType::ConservativeHighEarner => &[
            "Users with similar profiles typically prefer low-risk investments",
            "Consider diversifying with some medium-risk options for better returns",
        ],
        ProfileType::AffluentSpender => &[
            "Users in your group often benefit from automated savings",
            "Consider the envelope budgeting method to control spending",
        ],
        ProfileType::PrudentSaver => &[
            "Your peer group typically achieves above-average savings rates",
            "Consider increasing investment allocation for wealth building",
        ],
        ProfileType::ActiveConsumer | ProfileType::BudgetConscious => &[],
    };
    let mut out: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
    if cold_start {
        out.push(format!(
            "Product affinities estimated from the {neighbours} most similar existing users"
        ));
    }
    out
}
