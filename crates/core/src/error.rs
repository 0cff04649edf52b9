use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdvisorError {
    /// Malformed or out-of-range input. The message is safe to show to the caller.
    #[error("{0}")]
    Validation(String),

    #[error("{component} is not trained; fit or import a state first")]
    NotInitialized { component: &'static str },

    #[error("insufficient data for {component}: {detail}")]
    InsufficientData {
        component: &'static str,
        detail: String,
    },

    #[error("unknown category {value:?} for field {field} (strict encoding)")]
    Encoding { field: &'static str, value: String },

    #[error("invalid {component} state: {detail}")]
    State {
        component: &'static str,
        detail: String,
    },
}

pub type Result<T> = std::result::Result<T, AdvisorError>;

impl AdvisorError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn insufficient(component: &'static str, detail: impl Into<String>) -> Self {
        Self::InsufficientData {
            component,
            detail: detail.into(),
        }
    }

    pub fn state(component: &'static str, detail: impl std::fmt::Display) -> Self {
        Self::State {
            component,
            detail: detail.to_string(),
        }
    }

    /// Stable tag used in logs and error reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotInitialized { .. } => "not_initialized",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::Encoding { .. } => "encoding",
            Self::State { .. } => "state",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_is_verbatim() {
        let err = AdvisorError::validation("income is required");
        assert_eq!(err.to_string(), "income is required");
        assert!(err.is_validation());
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn kinds_are_distinct() {
        let kinds = [
            AdvisorError::validation("x").kind(),
            AdvisorError::NotInitialized { component: "a" }.kind(),
            AdvisorError::insufficient("a", "b").kind(),
            AdvisorError::Encoding {
                field: "primary_goal",
                value: "x".into(),
            }
            .kind(),
            AdvisorError::state("a", "b").kind(),
        ];
        let unique: std::collections::BTreeSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }
}
