//! Decisions of the conditional writes, shared by every store implementation.
//!
//! Each function takes the stored state read inside the store's critical section and returns
//! the state to write, or the rejection.

use crate::errors::AppendEntryError;
use crate::errors::ConcurrencyConflict;
use crate::errors::RecordDrawError;
use crate::errors::RoundNotFound;
use crate::errors::TransitionError;
use crate::errors::ValidationError;
use crate::round::DrawResult;
use crate::round::Entry;
use crate::round::Round;
use crate::round::RoundStatus;
use crate::EntryId;
use crate::RoundId;
use crate::TimestampMs;

pub fn check_version(round: &Round, expected_version: u64) -> Result<(), ConcurrencyConflict> {
    if round.version != expected_version {
        return Err(ConcurrencyConflict {
            round_id: round.id,
            expected: expected_version,
            actual: round.version,
        });
    }
    Ok(())
}

/// Build the entry to append and the updated round.
///
/// `already_entered` tells whether the participant owns an entry in this round. The new entry
/// takes `entry_id` and the next dense sequence number.
pub fn append_entry(
    round_id: RoundId,
    stored: Option<&Round>,
    expected_version: u64,
    participant_id: &str,
    already_entered: bool,
    entry_id: EntryId,
    now: TimestampMs,
) -> Result<(Round, Entry), AppendEntryError> {
    let round = stored.ok_or_else(|| RoundNotFound::new(round_id))?;

    check_version(round, expected_version)?;
    round.check_accepts_entry(now)?;

    if already_entered {
        return Err(ValidationError::AlreadyEntered {
            round_id,
            participant_id: participant_id.to_string(),
        }
        .into());
    }

    let entry = Entry {
        id: entry_id,
        round_id,
        participant_id: participant_id.to_string(),
        sequence: round.entry_count,
        created_at: now,
    };

    Ok((round.with_entry_appended(now), entry))
}

/// Build the round after moving it to `to`.
pub fn transition(
    round_id: RoundId,
    stored: Option<&Round>,
    expected_version: u64,
    to: RoundStatus,
    now: TimestampMs,
) -> Result<Round, TransitionError> {
    let round = stored.ok_or_else(|| RoundNotFound::new(round_id))?;

    check_version(round, expected_version)?;
    round.check_transition(to)?;

    Ok(round.with_status(to, now))
}

/// Build the `DRAWN` round for `result`.
///
/// An existing result always wins: the round is reported as already drawn regardless of its
/// version.
pub fn record_draw(
    stored: Option<&Round>,
    result_exists: bool,
    expected_version: u64,
    result: &DrawResult,
    now: TimestampMs,
) -> Result<Round, RecordDrawError> {
    let round_id = result.round_id;
    let round = stored.ok_or_else(|| RoundNotFound::new(round_id))?;

    if result_exists {
        return Err(RecordDrawError::AlreadyDrawn { round_id });
    }

    check_version(round, expected_version)?;
    round.check_transition(RoundStatus::Drawn)?;

    Ok(round.with_status(RoundStatus::Drawn, now))
}
