use crate::domain::profile::{ProfileInput, UserProfile};
use crate::error::{AdvisorError, Result};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

const COMPONENT: &str = "feature_engineer";

pub const NUMERIC_FIELDS: [&str; 6] = [
    "age",
    "income",
    "savings_rate",
    "debt_to_income",
    "emergency_fund_months",
    "dependents",
];

pub const CATEGORICAL_FIELDS: [&str; 5] = [
    "risk_tolerance",
    "investment_experience",
    "primary_goal",
    "time_horizon",
    "liquidity_needs",
];

pub const UNKNOWN_CODE: u32 = 0;

pub const VECTOR_LEN: usize = NUMERIC_FIELDS.len() + CATEGORICAL_FIELDS.len();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedVector(Vec<f64>);

impl EncodedVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn view(&self) -> ArrayView1<'_, f64> {
        ArrayView1::from(self.0.as_slice())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingMode {
    /// Unseen categories map to [`UNKNOWN_CODE`].
    #[default]
    Lenient,
    /// Unseen categories fail the call with [`AdvisorError::Encoding`].
    Strict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericScaler {
    pub field: String,
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMap {
    pub field: String,
    pub codes: BTreeMap<String, u32>,
}

impl CategoryMap {
    fn fit<'a>(field: &str, values: impl Iterator<Item = &'a str>) -> Self {
        let mut codes = BTreeMap::new();
        for v in values {
            codes.entry(v.to_string()).or_insert(0);
        }
        for (i, code) in codes.values_mut().enumerate() {
            *code = i as u32 + 1;
        }
        Self {
            field: field.to_string(),
            codes,
        }
    }

    pub fn code(&self, value: &str) -> Option<u32> {
        self.codes.get(value).copied()
    }
}

/// Fitted encoding parameters. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureParams {
    pub numeric: Vec<NumericScaler>,
    pub categorical: Vec<CategoryMap>,
    pub fitted_on: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct FeatureState {
    mode: EncodingMode,
    params: FeatureParams,
}

#[derive(Debug, Clone, Default)]
pub struct FeatureEngineer {
    mode: EncodingMode,
    params: Option<Arc<FeatureParams>>,
}

impl FeatureEngineer {
    pub fn new(mode: EncodingMode) -> Self {
        Self { mode, params: None }
    }

    pub fn mode(&self) -> EncodingMode {
        self.mode
    }

    pub fn is_trained(&self) -> bool {
        self.params.is_some()
    }

    pub fn params(&self) -> Result<&FeatureParams> {
        self.params
            .as_deref()
            .ok_or(AdvisorError::NotInitialized { component: COMPONENT })
    }

    pub fn dimension(&self) -> usize {
        VECTOR_LEN
    }

    pub fn fit(&mut self, profiles: &[UserProfile]) -> Result<()> {
        if profiles.is_empty() {
            return Err(AdvisorError::insufficient(
                COMPONENT,
                "at least one profile is required",
            ));
        }

        let n = profiles.len() as f64;
        let rows: Vec<[f64; 6]> = profiles.iter().map(numeric_values).collect();

        let numeric = NUMERIC_FIELDS
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let mean = rows.iter().map(|r| r[i]).sum::<f64>() / n;
                let var = rows.iter().map(|r| (r[i] - mean).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                NumericScaler {
                    field: field.to_string(),
                    mean,
                    std: if std > 0.0 && std.is_finite() { std } else { 1.0 },
                }
            })
            .collect();

        let categorical = CATEGORICAL_FIELDS
            .iter()
            .enumerate()
            .map(|(i, field)| CategoryMap::fit(field, profiles.iter().map(|p| categorical_values(p)[i])))
            .collect();

        let params = FeatureParams {
            numeric,
            categorical,
            fitted_on: profiles.len(),
        };

        tracing::info!(
            fitted_on = params.fitted_on,
            dimension = VECTOR_LEN,
            "feature engineer fitted"
        );

        self.params = Some(Arc::new(params));
        Ok(())
    }

    /// Validates the raw input, then encodes it.
    pub fn transform(&self, input: &ProfileInput) -> Result<EncodedVector> {
        self.params()?;
        let profile = input.validate()?;
        self.encode(&profile)
    }

    pub fn encode(&self, profile: &UserProfile) -> Result<EncodedVector> {
        let params = self.params()?;
        let mut out = Vec::with_capacity(VECTOR_LEN);

        for (value, scaler) in numeric_values(profile).iter().zip(&params.numeric) {
            out.push((value - scaler.mean) / scaler.std);
        }

        for ((value, map), field) in categorical_values(profile)
            .iter()
            .zip(&params.categorical)
            .zip(CATEGORICAL_FIELDS)
        {
            let code = match (map.code(value), self.mode) {
                (Some(code), _) => code,
                (None, EncodingMode::Lenient) => UNKNOWN_CODE,
                (None, EncodingMode::Strict) => {
                    return Err(AdvisorError::Encoding {
                        field,
                        value: value.to_string(),
                    })
                }
            };
            out.push(f64::from(code));
        }

        Ok(EncodedVector(out))
    }

    pub fn export_state(&self) -> Result<Vec<u8>> {
        let params = self.params()?;
        let state = FeatureState {
            mode: self.mode,
            params: params.clone(),
        };
        serde_json::to_vec(&state).map_err(|e| AdvisorError::state(COMPONENT, e))
    }

    pub fn import_state(&mut self, blob: &[u8]) -> Result<()> {
        let state: FeatureState =
            serde_json::from_slice(blob).map_err(|e| AdvisorError::state(COMPONENT, e))?;
        validate_params(&state.params)?;
        self.mode = state.mode;
        self.params = Some(Arc::new(state.params));
        Ok(())
    }
}

fn validate_params(params: &FeatureParams) -> Result<()> {
    let numeric_ok = params.numeric.len() == NUMERIC_FIELDS.len()
        && params
            .numeric
            .iter()
            .zip(NUMERIC_FIELDS)
            .all(|(s, f)| s.field == f && s.mean.is_finite() && s.std.is_finite() && s.std > 0.0);
    if !numeric_ok {
        return Err(AdvisorError::state(COMPONENT, "numeric scalers do not match the field layout"));
    }

    let categorical_ok = params.categorical.len() == CATEGORICAL_FIELDS.len()
        && params
            .categorical
            .iter()
            .zip(CATEGORICAL_FIELDS)
            .all(|(m, f)| m.field == f && m.codes.values().all(|&c| c != UNKNOWN_CODE));
    if !categorical_ok {
        return Err(AdvisorError::state(COMPONENT, "category maps do not match the field layout"));
    }
    Ok(())
}

pub(crate) fn numeric_values(p: &UserProfile) -> [f64; 6] {
    [
        p.age,
        p.income,
        p.savings_rate,
        p.debt_to_income,
        p.emergency_fund_months,
        f64::from(p.dependents),
    ]
}

fn categorical_values(p: &UserProfile) -> [&str; 5] {
    [
        p.risk_tolerance.as_str(),
        p.investment_experience.as_str(),
        &p.primary_goal,
        &p.time_horizon,
        &p.liquidity_needs,
    ]
}
