use crate::HolderId;
use crate::RoundId;

/// The lease to renew is expired or was taken over by another holder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[derive(serde::Deserialize, serde::Serialize)]
#[error("lease on round {round_id} held by {holder} with token {token} is expired or lost")]
pub struct LeaseExpired {
    pub round_id: RoundId,
    pub holder: HolderId,
    pub token: u64,
}
