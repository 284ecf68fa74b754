use crate::RoundId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[derive(serde::Deserialize, serde::Serialize)]
#[error("round not found: {round_id}")]
pub struct RoundNotFound {
    pub round_id: RoundId,
}

impl RoundNotFound {
    pub fn new(round_id: RoundId) -> Self {
        Self { round_id }
    }
}
