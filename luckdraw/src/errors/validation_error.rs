use crate::round::Cadence;
use crate::round::RoundStatus;
use crate::ParticipantId;
use crate::RoundId;
use crate::TimestampMs;

/// A request that can never succeed against the current round state. It is not retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum ValidationError {
    #[error("round {round_id} is {status}, not OPEN")]
    NotOpen { round_id: RoundId, status: RoundStatus },

    #[error("round {round_id} closed at {close_at}, now is {now}")]
    Closed {
        round_id: RoundId,
        close_at: TimestampMs,
        now: TimestampMs,
    },

    #[error("round {round_id} reached its capacity {capacity}")]
    CapacityReached { round_id: RoundId, capacity: u32 },

    #[error("participant {participant_id} already has an entry in round {round_id}")]
    AlreadyEntered {
        round_id: RoundId,
        participant_id: ParticipantId,
    },

    #[error("round {round_id} can not move from {from} to {to}")]
    IllegalTransition {
        round_id: RoundId,
        from: RoundStatus,
        to: RoundStatus,
    },

    #[error("close_at {close_at} is not after now {now}")]
    CloseInPast { close_at: TimestampMs, now: TimestampMs },

    #[error("capacity must be > 0")]
    ZeroCapacity,

    #[error("no {cadence} boundary after {after}")]
    NoBoundary { cadence: Cadence, after: TimestampMs },
}
