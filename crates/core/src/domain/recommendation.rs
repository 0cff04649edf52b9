use crate::collaborative::UserPreferences;
use crate::content::ProductCategory;
use crate::domain::profile::RiskLevel;
use crate::profiler::ClusterDescriptor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Everything `advise` returns for one profile. Built fresh per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationResult {
    pub user_id: Option<String>,
    pub model_version: Option<Uuid>,
    pub generated_at: DateTime<Utc>,
    pub items: Vec<RecommendedProduct>,
    pub budget_strategy: BudgetRecommendation,
    pub health: HealthAssessment,
    pub risk_level: RiskLevel,
    pub identified_risks: Vec<String>,
    pub priority_actions: Vec<PriorityAction>,
    pub cluster: ClusterDescriptor,
    pub cluster_recommendations: Vec<String>,
    pub collaborative: CollaborativeStatus,
    /// Present when the caller is a named training user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_preferences: Option<UserPreferences>,
    pub general_advice: Vec<String>,
    pub goal_analysis: GoalAnalysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_insights: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedProduct {
    pub rank: u32,
    pub product_id: String,
    pub name: String,
    pub category: ProductCategory,
    pub risk_level: RiskLevel,
    pub expected_return: f64,
    pub description: String,
    pub fused_score: f64,
    /// Max-normalised score from each list; `None` when the product was absent from it.
    pub content_score: Option<f64>,
    pub collaborative_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetRecommendation {
    pub id: String,
    pub name: String,
    pub description: String,
    pub match_score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthArea {
    SavingsRate,
    Debt,
    EmergencyFund,
    Diversification,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubScores {
    pub savings_rate: f64,
    pub debt: f64,
    pub emergency_fund: f64,
    pub diversification: f64,
}

impl SubScores {
    /// Fixed area order; used as the stable tiebreak when ranking weaknesses.
    pub fn areas(&self) -> [(HealthArea, f64); 4] {
        [
            (HealthArea::SavingsRate, self.savings_rate),
            (HealthArea::Debt, self.debt),
            (HealthArea::EmergencyFund, self.emergency_fund),
            (HealthArea::Diversification, self.diversification),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthAssessment {
    /// 0..=100
    pub score: f64,
    pub sub_scores: SubScores,
}

/// `area` and `sub_score` are absent for the maintenance action given when no area is weak.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriorityAction {
    pub area: Option<HealthArea>,
    pub sub_score: Option<f64>,
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CollaborativeStatus {
    /// No collaborative model is part of this snapshot.
    NotConfigured,
    /// A recommender is configured but was never fitted or imported.
    NotTrained,
    Applied { cold_start: bool, neighbours: usize },
}

impl CollaborativeStatus {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feasibility {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalAnalysis {
    pub goal: String,
    pub time_horizon: String,
    pub feasibility: Feasibility,
    pub recommended_approach: Vec<String>,
}
