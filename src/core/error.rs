use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("{field} {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },
    #[error("invalid solver config: {0}")]
    InvalidSolverConfig(String),
}

impl PlanError {
    pub(crate) fn input(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }

    pub(crate) fn solver(message: impl Into<String>) -> Self {
        Self::InvalidSolverConfig(message.into())
    }
}
