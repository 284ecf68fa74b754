use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::errors::ValidationError;
use crate::round::Cadence;
use crate::round::RoundStatus;
use crate::ParticipantId;
use crate::RoundId;
use crate::TimestampMs;

/// What the registration API provides to create a round.
#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct RoundSpec {
    /// When the round stops accepting entries and becomes due for drawing.
    pub close_at: TimestampMs,

    /// The maximum number of entries. `None` is unbounded.
    pub capacity: Option<u32>,

    /// Recurrence of this round.
    pub cadence: Option<Cadence>,

    /// The round this one succeeds.
    pub predecessor: Option<RoundId>,
}

impl RoundSpec {
    pub fn new(close_at: TimestampMs) -> Self {
        Self {
            close_at,
            capacity: None,
            cadence: None,
            predecessor: None,
        }
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = Some(cadence);
        self
    }

    pub fn validate(&self, now: TimestampMs) -> Result<(), ValidationError> {
        if self.close_at <= now {
            return Err(ValidationError::CloseInPast {
                close_at: self.close_at,
                now,
            });
        }

        if self.capacity == Some(0) {
            return Err(ValidationError::ZeroCapacity);
        }

        Ok(())
    }
}

/// A time-boxed lottery round.
#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub status: RoundStatus,
    pub close_at: TimestampMs,
    pub capacity: Option<u32>,
    pub cadence: Option<Cadence>,
    pub predecessor: Option<RoundId>,

    /// Number of entries appended so far. It is also the sequence number of the next entry.
    pub entry_count: u32,

    /// Bumped by every persisted mutation, including entry appends.
    pub version: u64,

    pub created_at: TimestampMs,
    pub updated_at: TimestampMs,
}

impl Round {
    /// Build the first version of a round from its spec.
    pub fn new(id: RoundId, spec: &RoundSpec, now: TimestampMs) -> Self {
        Self {
            id,
            status: RoundStatus::Open,
            close_at: spec.close_at,
            capacity: spec.capacity,
            cadence: spec.cadence,
            predecessor: spec.predecessor,
            entry_count: 0,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// The round is open and its close time has elapsed.
    pub fn is_due(&self, now: TimestampMs) -> bool {
        self.status == RoundStatus::Open && self.close_at <= now
    }

    pub fn is_full(&self) -> bool {
        match self.capacity {
            Some(cap) => self.entry_count >= cap,
            None => false,
        }
    }

    /// Check that one more entry can be appended at `now`.
    pub fn check_accepts_entry(&self, now: TimestampMs) -> Result<(), ValidationError> {
        if self.status != RoundStatus::Open {
            return Err(ValidationError::NotOpen {
                round_id: self.id,
                status: self.status,
            });
        }

        if self.close_at <= now {
            return Err(ValidationError::Closed {
                round_id: self.id,
                close_at: self.close_at,
                now,
            });
        }

        if let Some(capacity) = self.capacity {
            if self.entry_count >= capacity {
                return Err(ValidationError::CapacityReached {
                    round_id: self.id,
                    capacity,
                });
            }
        }

        Ok(())
    }

    pub fn check_transition(&self, to: RoundStatus) -> Result<(), ValidationError> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(ValidationError::IllegalTransition {
                round_id: self.id,
                from: self.status,
                to,
            })
        }
    }

    /// The spec of the round that follows this one, if it recurs.
    pub fn successor_spec(&self) -> Option<RoundSpec> {
        let cadence = self.cadence?;
        let close_at = cadence.next_close_at(self.close_at)?;

        Some(RoundSpec {
            close_at,
            capacity: self.capacity,
            cadence: Some(cadence),
            predecessor: Some(self.id),
        })
    }

    /// Return the next version of this round with `status` applied.
    pub fn with_status(&self, status: RoundStatus, now: TimestampMs) -> Self {
        Self {
            status,
            version: self.version + 1,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Return the next version of this round with one more entry.
    pub fn with_entry_appended(&self, now: TimestampMs) -> Self {
        Self {
            entry_count: self.entry_count + 1,
            version: self.version + 1,
            updated_at: now,
            ..self.clone()
        }
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Round{{id:{}, status:{}, close_at:{}, entries:{}, v:{}}}",
            self.id, self.status, self.close_at, self.entry_count, self.version
        )
    }
}

/// One participant's registered chance within a round.
#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
#[derive(derive_more::Display)]
#[display("Entry{{id:{}, round:{}, participant:{}, seq:{}}}", id, round_id, participant_id, sequence)]
pub struct Entry {
    pub id: crate::EntryId,
    pub round_id: RoundId,
    pub participant_id: ParticipantId,

    /// Dense within the round, starting at 0.
    pub sequence: u32,

    pub created_at: TimestampMs,
}
