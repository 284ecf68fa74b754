use crate::HolderId;
use crate::RoundId;
use crate::TimestampMs;

/// Another live lease exists on the round. Not exceptional: the attempt is abandoned for now.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[derive(serde::Deserialize, serde::Serialize)]
#[error("lease on round {round_id} is held by {holder} until {expires_at}")]
pub struct LeaseUnavailable {
    pub round_id: RoundId,
    pub holder: HolderId,
    pub expires_at: TimestampMs,
}
