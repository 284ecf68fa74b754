use crate::errors::ConcurrencyConflict;
use crate::errors::RoundNotFound;
use crate::errors::ValidationError;
use crate::RoundId;

/// Why a draw result was not recorded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum RecordDrawError {
    /// A result for this round already exists. At most one is ever stored.
    #[error("round {round_id} is already drawn")]
    AlreadyDrawn { round_id: RoundId },

    #[error(transparent)]
    NotFound(#[from] RoundNotFound),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
}
