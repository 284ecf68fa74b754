use crate::errors::ConcurrencyConflict;
use crate::errors::RoundNotFound;
use crate::errors::ValidationError;

/// Why a round status transition was not applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum TransitionError {
    #[error(transparent)]
    NotFound(#[from] RoundNotFound),

    /// The transition is not allowed from the stored status.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
}
