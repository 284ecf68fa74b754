use crate::errors::RandomSourceError;
use crate::errors::RoundNotFound;
use crate::errors::StorageError;
use crate::RoundId;

/// A failure that ends one draw attempt.
///
/// None of these undo a committed step: a round that reached `CLOSED` or `DRAWN` stays there
/// and is resumed once it is considered stalled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DrawError {
    #[error(transparent)]
    NotFound(#[from] RoundNotFound),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    RandomSource(#[from] RandomSourceError),

    /// The stored state of a round contradicts itself, e.g. a `DRAWN` round without a result.
    #[error("round {round_id} is inconsistent: {reason}")]
    Inconsistent { round_id: RoundId, reason: String },
}
