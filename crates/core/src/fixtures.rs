use crate::domain::profile::{InvestmentExperience, ProfileInput, RiskLevel, UserProfile};

/// Three well separated archetypes, cycled, with small index-driven jitter.
pub fn population(n: usize) -> Vec<UserProfile> {
    (0..n).map(archetype).collect()
}

pub fn archetype(i: usize) -> UserProfile {
    let jitter = ((i * 7) % 5) as f64 / 10.0;
    match i % 3 {
        0 => UserProfile {
            user_id: Some(format!("u{i:04}")),
            age: 24.0 + jitter * 4.0,
            income: 32_000.0 + jitter * 4_000.0,
            savings_rate: 0.04 + jitter * 0.02,
            debt_to_income: 0.45 + jitter * 0.05,
            emergency_fund_months: 1.0 + jitter,
            dependents: 0,
            risk_tolerance: RiskLevel::High,
            investment_experience: InvestmentExperience::Beginner,
            primary_goal: "debt_payoff".into(),
            time_horizon: "short_term".into(),
            liquidity_needs: "high".into(),
            holdings: None,
        },
        1 => UserProfile {
            user_id: Some(format!("u{i:04}")),
            age: 38.0 + jitter * 4.0,
            income: 95_000.0 + jitter * 10_000.0,
            savings_rate: 0.18 + jitter * 0.04,
            debt_to_income: 0.2 + jitter * 0.05,
            emergency_fund_months: 5.0 + jitter,
            dependents: 2,
            risk_tolerance: RiskLevel::Medium,
            investment_experience: InvestmentExperience::Intermediate,
            primary_goal: "retirement".into(),
            time_horizon: "long_term".into(),
            liquidity_needs: "medium".into(),
            holdings: None,
        },
        _ => UserProfile {
            user_id: Some(format!("u{i:04}")),
            age: 62.0 + jitter * 4.0,
            income: 60_000.0 + jitter * 5_000.0,
            savings_rate: 0.25 + jitter * 0.04,
            debt_to_income: 0.05 + jitter * 0.02,
            emergency_fund_months: 9.0 + jitter,
            dependents: 0,
            risk_tolerance: RiskLevel::Low,
            investment_experience: InvestmentExperience::Advanced,
            primary_goal: "emergency_fund".into(),
            time_horizon: "medium_term".into(),
            liquidity_needs: "low".into(),
            holdings: None,
        },
    }
}

/// The reference profile used across scenario tests.
pub fn sample_input() -> ProfileInput {
    serde_json::from_value(serde_json::json!({
        "age": 32,
        "income": 75000,
        "dependents": 1,
        "savings_rate": 0.15,
        "debt_to_income": 0.25,
        "emergency_fund_months": 4,
        "risk_tolerance": "medium",
        "investment_experience": "beginner",
        "primary_goal": "retirement",
        "time_horizon": "long_term",
        "liquidity_needs": "medium",
    }))
    .expect("fixture profile deserializes")
}

pub fn sample_profile() -> UserProfile {
    sample_input().validate().expect("fixture profile is valid")
}

pub fn to_input(p: &UserProfile) -> ProfileInput {
    ProfileInput {
        user_id: p.user_id.clone(),
        age: Some(p.age),
        income: Some(p.income),
        savings_rate: Some(p.savings_rate),
        debt_to_income: Some(p.debt_to_income),
        emergency_fund_months: Some(p.emergency_fund_months),
        dependents: Some(f64::from(p.dependents)),
        risk_tolerance: Some(p.risk_tolerance.as_str().to_string()),
        investment_experience: Some(p.investment_experience.as_str().to_string()),
        primary_goal: Some(p.primary_goal.clone()),
        time_horizon: Some(p.time_horizon.clone()),
        liquidity_needs: Some(p.liquidity_needs.clone()),
        holdings: p.holdings.clone(),
    }
}
