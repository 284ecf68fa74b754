use crate::RoundId;

/// The stored version of a round no longer matches the version the caller read.
///
/// The caller has to re-read the round and retry, or give up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[derive(serde::Deserialize, serde::Serialize)]
#[error("version conflict on round {round_id}: expected {expected}, actual {actual}")]
pub struct ConcurrencyConflict {
    pub round_id: RoundId,
    pub expected: u64,
    pub actual: u64,
}
