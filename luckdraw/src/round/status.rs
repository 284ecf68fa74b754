use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// The lifecycle status of a round.
///
/// A round only moves forward:
///
/// ```text
/// OPEN ──> CLOSED ──> DRAWN ──> SETTLED
///   │        │
///   └────────┴──> CANCELLED
/// ```
#[derive(Debug, Clone, Copy)]
#[derive(PartialEq, Eq, Hash)]
#[derive(PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    /// Accepting entries until the close time.
    Open,

    /// Entries are frozen, a draw is in progress or has to be resumed.
    Closed,

    /// A draw result is persisted, settlement is pending.
    Drawn,

    /// Terminal: the draw is complete.
    Settled,

    /// Terminal: the round ended without a draw.
    Cancelled,
}

impl RoundStatus {
    pub const ALL: [RoundStatus; 5] = [
        RoundStatus::Open,
        RoundStatus::Closed,
        RoundStatus::Drawn,
        RoundStatus::Settled,
        RoundStatus::Cancelled,
    ];

    /// The transition table.
    pub const fn can_transition_to(self, to: RoundStatus) -> bool {
        use RoundStatus::*;

        matches!(
            (self, to),
            (Open, Closed) | (Closed, Drawn) | (Drawn, Settled) | (Open, Cancelled) | (Closed, Cancelled)
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, RoundStatus::Settled | RoundStatus::Cancelled)
    }

    /// A round in this status has stopped accepting entries but has not finished yet.
    pub const fn is_in_flight(self) -> bool {
        matches!(self, RoundStatus::Closed | RoundStatus::Drawn)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            RoundStatus::Open => "OPEN",
            RoundStatus::Closed => "CLOSED",
            RoundStatus::Drawn => "DRAWN",
            RoundStatus::Settled => "SETTLED",
            RoundStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
