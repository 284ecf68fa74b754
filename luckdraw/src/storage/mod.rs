//! The durable store shared by all replicas.
//!
//! Every conditional write of a [`PersistenceStore`] is atomic: the check and the mutation are
//! applied as one step, or not at all. The decision logic shared by all implementations lives in
//! [`rules`]; a store only has to provide the atomicity.

mod timeout;

pub mod rules;

use std::fmt::Debug;

pub(crate) use timeout::timed;

use crate::errors::AppendEntryError;
use crate::errors::LeaseExpired;
use crate::errors::LeaseUnavailable;
use crate::errors::RecordDrawError;
use crate::errors::StorageError;
use crate::errors::StoreError;
use crate::errors::TransitionError;
use crate::lease::Lease;
use crate::round::DrawResult;
use crate::round::Entry;
use crate::round::Round;
use crate::round::RoundSpec;
use crate::round::RoundStatus;
use crate::RoundId;
use crate::TimestampMs;

/// The result of a status transition.
#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
pub struct StatusUpdate {
    /// The round after the transition.
    pub round: Round,

    /// The round created in the same write because a recurring round became terminal.
    pub successor: Option<Round>,
}

/// Durable, transactional storage for rounds, entries, draw results and leases.
///
/// Time is always supplied by the caller, so that all replicas compare against the same kind of
/// clock and tests can control it.
#[async_trait::async_trait]
pub trait PersistenceStore: Send + Sync + Debug + 'static {
    /// Assign a new id and insert an `OPEN` round built from `spec`.
    ///
    /// The spec is expected to be validated by the caller.
    async fn insert_round(&self, spec: &RoundSpec, now: TimestampMs) -> Result<Round, StorageError>;

    async fn get_round(&self, round_id: RoundId) -> Result<Option<Round>, StorageError>;

    /// Rounds that are `OPEN` with `close_at <= now`, ordered by `close_at` then id.
    async fn find_due_for_draw(&self, now: TimestampMs) -> Result<Vec<Round>, StorageError>;

    /// Rounds that are `CLOSED` or `DRAWN` and were last updated at or before `updated_before`,
    /// ordered by id.
    async fn find_stalled(&self, updated_before: TimestampMs) -> Result<Vec<Round>, StorageError>;

    /// Rounds that are `OPEN` with `close_at > now`, ordered by `close_at` then id.
    async fn find_upcoming(&self, now: TimestampMs) -> Result<Vec<Round>, StorageError>;

    /// Append an entry for `participant_id` if the round is still at `expected_version` and
    /// accepts it. See [`rules::append_entry`].
    ///
    /// Returns the round with its version bumped, and the new entry.
    async fn append_entry(
        &self,
        round_id: RoundId,
        expected_version: u64,
        participant_id: &str,
        now: TimestampMs,
    ) -> Result<(Round, Entry), StoreError<AppendEntryError>>;

    /// All entries of a round ordered by sequence.
    async fn list_entries(&self, round_id: RoundId) -> Result<Vec<Entry>, StorageError>;

    /// Move a round at `expected_version` to status `to`. See [`rules::transition`].
    ///
    /// If `to` is terminal and the round recurs, the successor round is inserted in the same
    /// write.
    async fn update_status(
        &self,
        round_id: RoundId,
        expected_version: u64,
        to: RoundStatus,
        now: TimestampMs,
    ) -> Result<StatusUpdate, StoreError<TransitionError>>;

    /// Insert `result` and move its round from `CLOSED` to `DRAWN` in one write.
    /// See [`rules::record_draw`].
    async fn record_draw(
        &self,
        expected_version: u64,
        result: &DrawResult,
        now: TimestampMs,
    ) -> Result<Round, StoreError<RecordDrawError>>;

    async fn get_draw_result(&self, round_id: RoundId) -> Result<Option<DrawResult>, StorageError>;

    /// Insert-if-absent-or-expired. See [`Lease::grant`].
    async fn try_acquire_lease(
        &self,
        round_id: RoundId,
        holder: &str,
        ttl_ms: u64,
        now: TimestampMs,
    ) -> Result<Lease, StoreError<LeaseUnavailable>>;

    /// See [`Lease::extend`].
    async fn renew_lease(&self, lease: &Lease, ttl_ms: u64, now: TimestampMs) -> Result<Lease, StoreError<LeaseExpired>>;

    /// Expire the lease if the stored record is still the same grant.
    ///
    /// Returns whether the record was released.
    async fn release_lease(&self, lease: &Lease) -> Result<bool, StorageError>;

    async fn get_lease(&self, round_id: RoundId) -> Result<Option<Lease>, StorageError>;
}
