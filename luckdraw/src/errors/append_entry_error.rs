use crate::errors::ConcurrencyConflict;
use crate::errors::RoundNotFound;
use crate::errors::ValidationError;

/// Why an entry was not appended.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum AppendEntryError {
    #[error(transparent)]
    NotFound(#[from] RoundNotFound),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
}
