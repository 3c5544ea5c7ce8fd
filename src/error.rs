use thiserror::Error;

/// All the ways fitting a mixture model can fail
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MixtureModelError {
    #[error("Invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },
    #[error("Invalid parameter `{name}` = {value}, must be finite and greater than zero")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("Expected an affiliation matrix of shape {expected:?}, found {found:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error(
        "Sample {index} has a weighted density sum under the mixture that is negligible or not finite"
    )]
    DegenerateDistribution { index: usize },
    #[error("The maximization step failed: {0}")]
    Maximization(String),
}

impl MixtureModelError {
    pub(crate) fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}
