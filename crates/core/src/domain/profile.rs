use crate::error::{AdvisorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_AGE: f64 = 18.0;
pub const MAX_AGE: f64 = 120.0;

const DEFAULT_EXPERIENCE: InvestmentExperience = InvestmentExperience::Beginner;
const DEFAULT_TIME_HORIZON: &str = "medium_term";
const DEFAULT_LIQUIDITY_NEEDS: &str = "medium";

/// Wire form of a profile as received from the API or an ingestion batch.
/// Every field is optional here; `validate` decides what is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileInput {
    pub user_id: Option<String>,
    pub age: Option<f64>,
    pub income: Option<f64>,
    pub savings_rate: Option<f64>,
    pub debt_to_income: Option<f64>,
    pub emergency_fund_months: Option<f64>,
    pub dependents: Option<f64>,
    pub risk_tolerance: Option<String>,
    pub investment_experience: Option<String>,
    pub primary_goal: Option<String>,
    pub time_horizon: Option<String>,
    pub liquidity_needs: Option<String>,
    /// Product categories the user already holds, if known.
    pub holdings: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Option<String>,
    pub age: f64,
    pub income: f64,
    pub savings_rate: f64,
    pub debt_to_income: f64,
    pub emergency_fund_months: f64,
    pub dependents: u32,
    pub risk_tolerance: RiskLevel,
    pub investment_experience: InvestmentExperience,
    pub primary_goal: String,
    pub time_horizon: String,
    pub liquidity_needs: String,
    pub holdings: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn tier(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }

    pub fn tier_distance(self, other: Self) -> u8 {
        self.tier().abs_diff(other.tier())
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestmentExperience {
    Beginner,
    Intermediate,
    Advanced,
}

impl InvestmentExperience {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "beginner" => Some(Self::Beginner),
            "intermediate" => Some(Self::Intermediate),
            "advanced" => Some(Self::Advanced),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl ProfileInput {
    /// Checks presence and ranges of every field and normalises categorical text.
    /// Nothing downstream ever sees an unvalidated profile.
    pub fn validate(&self) -> Result<UserProfile> {
        let age = require_number("age", self.age)?;
        ensure(
            (MIN_AGE..=MAX_AGE).contains(&age),
            format!("age must be between {MIN_AGE} and {MAX_AGE} (got {age})"),
        )?;

        let income = require_number("income", self.income)?;
        ensure(income >= 0.0, format!("income must be >= 0 (got {income})"))?;

        let savings_rate = require_number("savings_rate", self.savings_rate)?;
        ensure(
            (0.0..=1.0).contains(&savings_rate),
            format!("savings_rate must be between 0 and 1 (got {savings_rate})"),
        )?;

        let debt_to_income = require_number("debt_to_income", self.debt_to_income)?;
        ensure(
            (0.0..=1.0).contains(&debt_to_income),
            format!("debt_to_income must be between 0 and 1 (got {debt_to_income})"),
        )?;

        let emergency_fund_months =
            require_number("emergency_fund_months", self.emergency_fund_months)?;
        ensure(
            emergency_fund_months >= 0.0,
            format!("emergency_fund_months must be >= 0 (got {emergency_fund_months})"),
        )?;

        let dependents = match self.dependents {
            None => 0,
            Some(d) => {
                ensure(
                    d.is_finite() && d >= 0.0 && d.fract() == 0.0 && d <= f64::from(u32::MAX),
                    format!("dependents must be a whole number >= 0 (got {d})"),
                )?;
                d as u32
            }
        };

        let risk_raw = require_text("risk_tolerance", self.risk_tolerance.as_deref())?;
        let risk_tolerance = RiskLevel::parse(&risk_raw).ok_or_else(|| {
            AdvisorError::validation(format!(
                "risk_tolerance must be one of low, medium, high (got {risk_raw:?})"
            ))
        })?;

        let investment_experience = match optional_text(self.investment_experience.as_deref()) {
            None => DEFAULT_EXPERIENCE,
            Some(raw) => InvestmentExperience::parse(&raw).ok_or_else(|| {
                AdvisorError::validation(format!(
                    "investment_experience must be one of beginner, intermediate, advanced (got {raw:?})"
                ))
            })?,
        };

        let primary_goal = require_text("primary_goal", self.primary_goal.as_deref())?;
        let time_horizon = optional_text(self.time_horizon.as_deref())
            .unwrap_or_else(|| DEFAULT_TIME_HORIZON.to_string());
        let liquidity_needs = optional_text(self.liquidity_needs.as_deref())
            .unwrap_or_else(|| DEFAULT_LIQUIDITY_NEEDS.to_string());

        let user_id = self
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let holdings = self.holdings.as_ref().map(|h| {
            h.iter()
                .filter_map(|c| optional_text(Some(c)))
                .collect::<Vec<_>>()
        });

        Ok(UserProfile {
            user_id,
            age,
            income,
            savings_rate,
            debt_to_income,
            emergency_fund_months,
            dependents,
            risk_tolerance,
            investment_experience,
            primary_goal,
            time_horizon,
            liquidity_needs,
            holdings,
        })
    }
}

fn ensure(cond: bool, msg: String) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(AdvisorError::Validation(msg))
    }
}

fn require_number(field: &str, value: Option<f64>) -> Result<f64> {
    let v = value.ok_or_else(|| AdvisorError::validation(format!("{field} is required")))?;
    ensure(v.is_finite(), format!("{field} must be a finite number"))?;
    Ok(v)
}

fn require_text(field: &str, value: Option<&str>) -> Result<String> {
    optional_text(value).ok_or_else(|| AdvisorError::validation(format!("{field} is required")))
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> serde_json::Value {
        json!({
            "age": 32,
            "income": 75000,
            "savings_rate": 0.15,
            "debt_to_income": 0.25,
            "emergency_fund_months": 4,
            "risk_tolerance": "medium",
            "primary_goal": "retirement",
        })
    }

    fn parse(v: serde_json::Value) -> ProfileInput {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn accepts_minimal_profile_and_fills_defaults() {
        let p = parse(sample()).validate().unwrap();
        assert_eq!(p.age, 32.0);
        assert_eq!(p.dependents, 0);
        assert_eq!(p.risk_tolerance, RiskLevel::Medium);
        assert_eq!(p.investment_experience, InvestmentExperience::Beginner);
        assert_eq!(p.time_horizon, "medium_term");
        assert_eq!(p.liquidity_needs, "medium");
        assert!(p.holdings.is_none());
    }

    #[test]
    fn missing_income_is_a_validation_error() {
        let mut v = sample();
        v.as_object_mut().unwrap().remove("income");
        let err = parse(v).validate().unwrap_err();
        assert_eq!(err, AdvisorError::validation("income is required"));
    }

    #[test]
    fn rejects_out_of_range_ratios() {
        let mut v = sample();
        v["savings_rate"] = json!(1.5);
        assert!(parse(v).validate().unwrap_err().is_validation());

        let mut v = sample();
        v["debt_to_income"] = json!(-0.1);
        assert!(parse(v).validate().unwrap_err().is_validation());

        let mut v = sample();
        v["emergency_fund_months"] = json!(-1);
        assert!(parse(v).validate().unwrap_err().is_validation());
    }

    #[test]
    fn rejects_unknown_risk_tolerance_but_normalises_case() {
        let mut v = sample();
        v["risk_tolerance"] = json!("  HIGH ");
        assert_eq!(parse(v).validate().unwrap().risk_tolerance, RiskLevel::High);

        let mut v = sample();
        v["risk_tolerance"] = json!("yolo");
        assert!(parse(v).validate().unwrap_err().is_validation());
    }

    #[test]
    fn rejects_fractional_dependents() {
        let mut v = sample();
        v["dependents"] = json!(1.5);
        assert!(parse(v).validate().unwrap_err().is_validation());
    }

    #[test]
    fn blank_primary_goal_counts_as_missing() {
        let mut v = sample();
        v["primary_goal"] = json!("   ");
        let err = parse(v).validate().unwrap_err();
        assert_eq!(err.to_string(), "primary_goal is required");
    }

    #[test]
    fn risk_tier_distance() {
        assert_eq!(RiskLevel::Low.tier_distance(RiskLevel::High), 2);
        assert_eq!(RiskLevel::High.tier_distance(RiskLevel::Medium), 1);
        assert_eq!(RiskLevel::Medium.tier_distance(RiskLevel::Medium), 0);
    }
}
