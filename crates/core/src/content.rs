use crate::domain::profile::{InvestmentExperience, RiskLevel, UserProfile};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

// Sub-score weights; they sum to 1.
pub const RISK_WEIGHT: f64 = 0.30;
pub const AGE_WEIGHT: f64 = 0.15;
pub const INCOME_WEIGHT: f64 = 0.20;
pub const GOAL_WEIGHT: f64 = 0.20;
pub const LIQUIDITY_WEIGHT: f64 = 0.15;

/// Risk credit for a product one tier away from the user's tolerance.
pub const RISK_ONE_TIER_CREDIT: f64 = 0.5;
pub const GOAL_PARTIAL_CREDIT: f64 = 0.3;
pub const LIQUIDITY_PARTIAL_CREDIT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductCategory {
    Savings,
    Investment,
    Credit,
    Insurance,
}

impl ProductCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Savings => "savings",
            Self::Investment => "investment",
            Self::Credit => "credit",
            Self::Insurance => "insurance",
        }
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liquidity {
    Low,
    Medium,
    High,
}

impl Liquidity {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductCatalogEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub category: ProductCategory,
    pub risk_level: RiskLevel,
    pub min_age: f64,
    /// Exclusive; `None` is open-ended.
    pub max_age: Option<f64>,
    pub min_income: f64,
    pub min_investment: f64,
    /// Percent per year; negative for products that are a cost.
    pub expected_return: f64,
    pub liquidity: Liquidity,
    pub description: &'static str,
    pub features: &'static [&'static str],
    pub suitable_for: &'static [&'static str],
}

pub static CATALOG: [ProductCatalogEntry; 9] = [
    ProductCatalogEntry {
        id: "savings_001",
        name: "High-Yield Savings Account",
        category: ProductCategory::Savings,
        risk_level: RiskLevel::Low,
        min_age: 18.0,
        max_age: None,
        min_income: 0.0,
        min_investment: 100.0,
        expected_return: 2.5,
        liquidity: Liquidity::High,
        description: "Safe savings option with competitive interest rates",
        features: &["FDIC insured", "no monthly fees", "online access"],
        suitable_for: &["emergency fund", "short term goals", "conservative investors"],
    },
    ProductCatalogEntry {
        id: "savings_002",
        name: "Money Market Account",
        category: ProductCategory::Savings,
        risk_level: RiskLevel::Low,
        min_age: 18.0,
        max_age: None,
        min_income: 40_000.0,
        min_investment: 1_000.0,
        expected_return: 3.0,
        liquidity: Liquidity::Medium,
        description: "Higher yield savings with limited transactions",
        features: &["higher interest rates", "check writing", "FDIC insured"],
        suitable_for: &["emergency fund", "medium term savings"],
    },
    ProductCatalogEntry {
        id: "invest_001",
        name: "Index Fund Portfolio",
        category: ProductCategory::Investment,
        risk_level: RiskLevel::Medium,
        min_age: 25.0,
        max_age: Some(50.0),
        min_income: 40_000.0,
        min_investment: 1_000.0,
        expected_return: 7.0,
        liquidity: Liquidity::Medium,
        description: "Diversified portfolio tracking market indices",
        features: &["low fees", "automatic diversification", "long-term growth"],
        suitable_for: &["retirement planning", "long term wealth building"],
    },
    ProductCatalogEntry {
        id: "invest_002",
        name: "Conservative Bond Fund",
        category: ProductCategory::Investment,
        risk_level: RiskLevel::Low,
        min_age: 40.0,
        max_age: None,
        min_income: 0.0,
        min_investment: 500.0,
        expected_return: 4.5,
        liquidity: Liquidity::Medium,
        description: "Stable income through government and corporate bonds",
        features: &["stable income", "capital preservation", "moderate risk"],
        suitable_for: &["income generation", "capital preservation", "retirement"],
    },
    ProductCatalogEntry {
        id: "invest_003",
        name: "Growth Stock ETF",
        category: ProductCategory::Investment,
        risk_level: RiskLevel::High,
        min_age: 18.0,
        max_age: Some(35.0),
        min_income: 40_000.0,
        min_investment: 100.0,
        expected_return: 10.0,
        liquidity: Liquidity::High,
        description: "High-growth potential stocks for aggressive investors",
        features: &["high growth potential", "liquid", "higher volatility"],
        suitable_for: &["wealth building", "long term growth", "young investors"],
    },
    ProductCatalogEntry {
        id: "credit_001",
        name: "Cashback Credit Card",
        category: ProductCategory::Credit,
        risk_level: RiskLevel::Medium,
        min_age: 18.0,
        max_age: None,
        min_income: 40_000.0,
        min_investment: 0.0,
        expected_return: 2.0,
        liquidity: Liquidity::High,
        description: "Earn cashback on everyday purchases",
        features: &["cashback rewards", "fraud protection", "credit building"],
        suitable_for: &["daily expenses", "reward earning", "credit building"],
    },
    ProductCatalogEntry {
        id: "credit_002",
        name: "Low-Interest Personal Loan",
        category: ProductCategory::Credit,
        risk_level: RiskLevel::Medium,
        min_age: 18.0,
        max_age: None,
        min_income: 40_000.0,
        min_investment: 1_000.0,
        expected_return: -5.5,
        liquidity: Liquidity::High,
        description: "Consolidate debt or fund major purchases",
        features: &["fixed rates", "predictable payments", "debt consolidation"],
        suitable_for: &["debt consolidation", "major purchases", "home improvement"],
    },
    ProductCatalogEntry {
        id: "insurance_001",
        name: "Term Life Insurance",
        category: ProductCategory::Insurance,
        risk_level: RiskLevel::Low,
        min_age: 25.0,
        max_age: Some(50.0),
        min_income: 0.0,
        min_investment: 200.0,
        expected_return: 0.0,
        liquidity: Liquidity::Low,
        description: "Affordable life insurance protection",
        features: &["affordable premiums", "death benefit", "term coverage"],
        suitable_for: &["family protection", "mortgage protection", "income replacement"],
    },
    ProductCatalogEntry {
        id: "insurance_002",
        name: "Disability Insurance",
        category: ProductCategory::Insurance,
        risk_level: RiskLevel::Low,
        min_age: 25.0,
        max_age: Some(50.0),
        min_income: 40_000.0,
        min_investment: 300.0,
        expected_return: 0.0,
        liquidity: Liquidity::Low,
        description: "Income protection in case of disability",
        features: &[
            "income replacement",
            "own occupation coverage",
            "cost of living adjustments",
        ],
        suitable_for: &["income protection", "career protection", "financial security"],
    },
];

const GOAL_CATEGORIES: &[(&str, ProductCategory)] = &[
    ("retirement", ProductCategory::Investment),
    ("investment", ProductCategory::Investment),
    ("wealth_building", ProductCategory::Investment),
    ("emergency_fund", ProductCategory::Savings),
    ("general_savings", ProductCategory::Savings),
    ("short_term_savings", ProductCategory::Savings),
    ("major_purchase", ProductCategory::Savings),
    ("debt_payoff", ProductCategory::Credit),
    ("debt_consolidation", ProductCategory::Credit),
    ("family_protection", ProductCategory::Insurance),
    ("income_protection", ProductCategory::Insurance),
];

pub fn preferred_category(goal: &str) -> Option<ProductCategory> {
    GOAL_CATEGORIES
        .iter()
        .find(|(g, _)| *g == goal)
        .map(|(_, c)| *c)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub risk: f64,
    pub age: f64,
    pub income: f64,
    pub goal: f64,
    pub liquidity: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        let sum = self.risk * RISK_WEIGHT
            + self.age * AGE_WEIGHT
            + self.income * INCOME_WEIGHT
            + self.goal * GOAL_WEIGHT
            + self.liquidity * LIQUIDITY_WEIGHT;
        sum.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredProduct {
    pub product: &'static ProductCatalogEntry,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeTarget {
    Any,
    LowToMedium,
    MediumToHigh,
}

impl IncomeTarget {
    pub fn contains(self, income: f64) -> bool {
        match self {
            Self::Any => true,
            Self::LowToMedium => income < 75_000.0,
            Self::MediumToHigh => income >= 40_000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyFocus {
    Balanced,
    Control,
    SpendingControl,
    Savings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityTier {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStrategyRule {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub suitable_for: &'static [&'static str],
    pub income_target: IncomeTarget,
    pub focus: StrategyFocus,
    pub complexity: ComplexityTier,
}

pub static BUDGET_RULES: [BudgetStrategyRule; 4] = [
    BudgetStrategyRule {
        id: "budget_001",
        name: "50/30/20 Rule",
        description: "Allocate 50% needs, 30% wants, 20% savings",
        suitable_for: &["beginners", "stable income", "simple approach"],
        income_target: IncomeTarget::MediumToHigh,
        focus: StrategyFocus::Balanced,
        complexity: ComplexityTier::Low,
    },
    BudgetStrategyRule {
        id: "budget_002",
        name: "Zero-Based Budgeting",
        description: "Every dollar has a purpose, income minus expenses equals zero",
        suitable_for: &["detailed planners", "variable income", "debt payoff"],
        income_target: IncomeTarget::Any,
        focus: StrategyFocus::Control,
        complexity: ComplexityTier::High,
    },
    BudgetStrategyRule {
        id: "budget_003",
        name: "Envelope Method",
        description: "Cash-based budgeting for specific spending categories",
        suitable_for: &["overspenders", "cash users", "visual learners"],
        income_target: IncomeTarget::LowToMedium,
        focus: StrategyFocus::SpendingControl,
        complexity: ComplexityTier::Medium,
    },
    BudgetStrategyRule {
        id: "budget_004",
        name: "Pay Yourself First",
        description: "Prioritize savings before any other expenses",
        suitable_for: &["goal-oriented", "disciplined savers", "automation lovers"],
        income_target: IncomeTarget::MediumToHigh,
        focus: StrategyFocus::Savings,
        complexity: ComplexityTier::Low,
    },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetChoice {
    pub rule: &'static BudgetStrategyRule,
    pub match_score: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ContentRecommender {
    catalog: &'static [ProductCatalogEntry],
    budget_rules: &'static [BudgetStrategyRule],
}

impl Default for ContentRecommender {
    fn default() -> Self {
        Self {
            catalog: &CATALOG,
            budget_rules: &BUDGET_RULES,
        }
    }
}

impl ContentRecommender {
    pub fn catalog(&self) -> &'static [ProductCatalogEntry] {
        self.catalog
    }

    pub fn product(&self, id: &str) -> Option<&'static ProductCatalogEntry> {
        self.catalog.iter().find(|p| p.id == id)
    }

    pub fn score(&self, profile: &UserProfile, product: &ProductCatalogEntry) -> f64 {
        breakdown(profile, product).total()
    }

    pub fn recommend(&self, profile: &UserProfile, top_n: usize) -> Vec<ScoredProduct> {
        let mut ranked = rank_products(profile, self.catalog);
        ranked.truncate(top_n);
        ranked
    }

    pub fn choose_budget_strategy(&self, profile: &UserProfile) -> BudgetChoice {
        let mut best: Option<BudgetChoice> = None;
        for rule in self.budget_rules {
            let match_score = budget_match(profile, rule);
            if best.as_ref().map_or(true, |b| match_score > b.match_score) {
                best = Some(BudgetChoice { rule, match_score });
            }
        }
        best.unwrap_or(BudgetChoice {
            rule: &BUDGET_RULES[0],
            match_score: 0,
        })
    }
}

pub fn breakdown(profile: &UserProfile, product: &ProductCatalogEntry) -> ScoreBreakdown {
    let risk = match profile.risk_tolerance.tier_distance(product.risk_level) {
        0 => 1.0,
        1 => RISK_ONE_TIER_CREDIT,
        _ => 0.0,
    };

    let within_age =
        profile.age >= product.min_age && product.max_age.map_or(true, |max| profile.age < max);
    let age = if within_age { 1.0 } else { 0.0 };

    let income = if product.min_income <= 0.0 || profile.income >= product.min_income {
        1.0
    } else {
        (profile.income / product.min_income).min(1.0)
    };

    let goal = if preferred_category(&profile.primary_goal) == Some(product.category) {
        1.0
    } else {
        GOAL_PARTIAL_CREDIT
    };

    let liquidity = if Liquidity::parse(&profile.liquidity_needs) == Some(product.liquidity) {
        1.0
    } else {
        LIQUIDITY_PARTIAL_CREDIT
    };

    ScoreBreakdown {
        risk,
        age,
        income,
        goal,
        liquidity,
    }
}

pub(crate) fn rank_products(
    profile: &UserProfile,
    entries: &'static [ProductCatalogEntry],
) -> Vec<ScoredProduct> {
    let mut scored: Vec<ScoredProduct> = entries
        .iter()
        .map(|product| {
            let breakdown = breakdown(profile, product);
            ScoredProduct {
                product,
                score: breakdown.total(),
                breakdown,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.product
                    .expected_return
                    .partial_cmp(&a.product.expected_return)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.product.id.cmp(b.product.id))
    });
    scored
}

fn budget_match(profile: &UserProfile, rule: &BudgetStrategyRule) -> u32 {
    let mut score = 0;

    if rule.income_target.contains(profile.income) {
        score += 1;
    }

    let goal = profile.primary_goal.as_str();
    score += match (goal, rule.focus) {
        ("debt_payoff" | "emergency_fund", StrategyFocus::Control) => 2,
        ("retirement" | "investment", StrategyFocus::Savings) => 2,
        (_, StrategyFocus::Balanced) => 1,
        _ => 0,
    };

    let experience_fits = match profile.investment_experience {
        InvestmentExperience::Beginner => rule.complexity == ComplexityTier::Low,
        InvestmentExperience::Intermediate => rule.complexity <= ComplexityTier::Medium,
        InvestmentExperience::Advanced => true,
    };
    if experience_fits {
        score += 1;
    }

    score
}

pub fn general_advice(profile: &UserProfile) -> Vec<String> {
    let mut out = Vec::new();

    if profile.age < 30.0 {
        out.push("Start investing early to take advantage of compound interest".to_string());
        out.push("Focus on building an emergency fund of 3-6 months expenses".to_string());
    } else if profile.age < 50.0 {
        out.push(
            "Maximize retirement contributions and consider tax-advantaged accounts".to_string(),
        );
        out.push("Review and update your insurance coverage".to_string());
    } else {
        out.push("Consider more conservative investments as you approach retirement".to_string());
        out.push("Plan for healthcare costs in retirement".to_string());
    }

    if profile.savings_rate < 0.1 {
        out.push("Try to increase your savings rate to at least 10% of income".to_string());
    } else if profile.savings_rate > 0.2 {
        out.push("Excellent savings rate! Consider optimizing your investment allocation".to_string());
    }

    if profile.debt_to_income > 0.4 {
        out.push("Focus on debt reduction using debt avalanche or snowball method".to_string());
    }

    out
}
