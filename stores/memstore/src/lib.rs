//! An in-memory [`PersistenceStore`] for tests and single process deployments.

#![allow(clippy::uninlined_format_args)]


use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use luckdraw::errors::AppendEntryError;
use luckdraw::errors::ErrorSubject;
use luckdraw::errors::ErrorVerb;
use luckdraw::errors::LeaseExpired;
use luckdraw::errors::LeaseUnavailable;
use luckdraw::errors::RecordDrawError;
use luckdraw::errors::StorageError;
use luckdraw::errors::StoreError;
use luckdraw::errors::TransitionError;
use luckdraw::storage::rules;
use luckdraw::storage::StatusUpdate;
use luckdraw::AnyError;
use luckdraw::DrawResult;
use luckdraw::Entry;
use luckdraw::Lease;
use luckdraw::PersistenceStore;
use luckdraw::Round;
use luckdraw::RoundId;
use luckdraw::RoundSpec;
use luckdraw::RoundStatus;
use luckdraw::TimestampMs;
use tokio::sync::RwLock;
use tokio::time::Duration;

/// The store operations a fault can be injected into.
#[derive(Debug, Clone, Copy)]
#[derive(PartialEq, Eq)]
#[derive(PartialOrd, Ord)]
pub enum StoreOperation {
    InsertRound,
    GetRound,
    FindDueForDraw,
    FindStalled,
    FindUpcoming,
    AppendEntry,
    ListEntries,
    UpdateStatus,
    RecordDraw,
    GetDrawResult,
    AcquireLease,
    RenewLease,
    ReleaseLease,
    GetLease,
}

#[derive(Debug, Clone, Copy)]
#[derive(PartialEq, Eq)]
pub enum Fault {
    /// Sleep before running the operation.
    Delay(Duration),

    /// Fail the operation with a storage error, without touching any table.
    Fail,
}

/// Faults to inject into store operations, for testing purposes.
///
/// Cloned configs share their state, so a test can keep one and change faults of a running
/// store.
#[derive(Clone, Debug, Default)]
pub struct FaultConfig {
    inner: Arc<Mutex<BTreeMap<StoreOperation, Fault>>>,
}

impl FaultConfig {
    fn faults(&self) -> MutexGuard<'_, BTreeMap<StoreOperation, Fault>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_fault(&self, op: StoreOperation, fault: Fault) {
        self.faults().insert(op, fault);
    }

    pub fn get_fault(&self, op: StoreOperation) -> Option<Fault> {
        self.faults().get(&op).copied()
    }

    pub fn clear_fault(&self, op: StoreOperation) {
        self.faults().remove(&op);
    }

    pub fn clear_all(&self) {
        self.faults().clear();
    }
}

#[derive(Debug, Default)]
struct Tables {
    last_round_id: RoundId,
    last_entry_id: u64,

    rounds: BTreeMap<RoundId, Round>,

    /// Keyed by round id and sequence.
    entries: BTreeMap<(RoundId, u32), Entry>,

    /// Participants that own an entry, per round.
    participants: BTreeSet<(RoundId, String)>,

    draw_results: BTreeMap<RoundId, DrawResult>,

    leases: BTreeMap<RoundId, Lease>,
}

impl Tables {
    fn insert_round(&mut self, spec: &RoundSpec, now: TimestampMs) -> Round {
        self.last_round_id += 1;
        let round = Round::new(self.last_round_id, spec, now);
        self.rounds.insert(round.id, round.clone());
        round
    }

    fn rounds_where(&self, f: impl Fn(&Round) -> bool) -> Vec<Round> {
        self.rounds.values().filter(|r| f(r)).cloned().collect()
    }
}

/// An in-memory store.
///
/// All tables are guarded by one lock. A conditional write holds the write lock from its check
/// to its mutation.
#[derive(Debug, Default)]
pub struct MemStore {
    tables: RwLock<Tables>,
    faults: FaultConfig,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose operations are subject to `faults`.
    pub fn with_faults(faults: FaultConfig) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            faults,
        }
    }

    pub fn faults(&self) -> &FaultConfig {
        &self.faults
    }

    /// Return a shared store.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// All draw results, for assertions.
    pub async fn draw_results(&self) -> Vec<DrawResult> {
        self.tables.read().await.draw_results.values().cloned().collect()
    }

    /// All rounds, for assertions.
    pub async fn rounds(&self) -> Vec<Round> {
        self.tables.read().await.rounds.values().cloned().collect()
    }

    async fn inject(&self, op: StoreOperation, subject: ErrorSubject, verb: ErrorVerb) -> Result<(), StorageError> {
        match self.faults.get_fault(op) {
            None => Ok(()),
            Some(Fault::Delay(d)) => {
                tracing::debug!("delay {:?} by {:?}", op, d);
                tokio::time::sleep(d).await;
                Ok(())
            }
            Some(Fault::Fail) => {
                tracing::debug!("fail {:?}", op);
                let source = AnyError::error(format!("injected failure of {:?}", op));
                Err(luckdraw::errors::StorageIOError::new(subject, verb, source).into())
            }
        }
    }
}

#[async_trait::async_trait]
impl PersistenceStore for MemStore {
    #[tracing::instrument(level = "trace", skip(self))]
    async fn insert_round(&self, spec: &RoundSpec, now: TimestampMs) -> Result<Round, StorageError> {
        self.inject(StoreOperation::InsertRound, ErrorSubject::Rounds, ErrorVerb::Write).await?;

        let mut t = self.tables.write().await;
        Ok(t.insert_round(spec, now))
    }

    async fn get_round(&self, round_id: RoundId) -> Result<Option<Round>, StorageError> {
        self.inject(StoreOperation::GetRound, ErrorSubject::Round(round_id), ErrorVerb::Read).await?;

        let t = self.tables.read().await;
        Ok(t.rounds.get(&round_id).cloned())
    }

    async fn find_due_for_draw(&self, now: TimestampMs) -> Result<Vec<Round>, StorageError> {
        self.inject(StoreOperation::FindDueForDraw, ErrorSubject::Rounds, ErrorVerb::Read).await?;

        let t = self.tables.read().await;
        let mut due = t.rounds_where(|r| r.is_due(now));
        due.sort_by_key(|r| (r.close_at, r.id));
        Ok(due)
    }

    async fn find_stalled(&self, updated_before: TimestampMs) -> Result<Vec<Round>, StorageError> {
        self.inject(StoreOperation::FindStalled, ErrorSubject::Rounds, ErrorVerb::Read).await?;

        let t = self.tables.read().await;
        Ok(t.rounds_where(|r| r.status.is_in_flight() && r.updated_at <= updated_before))
    }

    async fn find_upcoming(&self, now: TimestampMs) -> Result<Vec<Round>, StorageError> {
        self.inject(StoreOperation::FindUpcoming, ErrorSubject::Rounds, ErrorVerb::Read).await?;

        let t = self.tables.read().await;
        let mut upcoming = t.rounds_where(|r| r.status == RoundStatus::Open && r.close_at > now);
        upcoming.sort_by_key(|r| (r.close_at, r.id));
        Ok(upcoming)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn append_entry(
        &self,
        round_id: RoundId,
        expected_version: u64,
        participant_id: &str,
        now: TimestampMs,
    ) -> Result<(Round, Entry), StoreError<AppendEntryError>> {
        self.inject(StoreOperation::AppendEntry, ErrorSubject::Entries(round_id), ErrorVerb::Write).await?;

        let mut t = self.tables.write().await;

        let already_entered = t.participants.contains(&(round_id, participant_id.to_string()));
        let entry_id = t.last_entry_id + 1;

        let (round, entry) = rules::append_entry(
            round_id,
            t.rounds.get(&round_id),
            expected_version,
            participant_id,
            already_entered,
            entry_id,
            now,
        )
        .map_err(StoreError::Rejected)?;

        t.last_entry_id = entry_id;
        t.participants.insert((round_id, entry.participant_id.clone()));
        t.entries.insert((round_id, entry.sequence), entry.clone());
        t.rounds.insert(round_id, round.clone());

        Ok((round, entry))
    }

    async fn list_entries(&self, round_id: RoundId) -> Result<Vec<Entry>, StorageError> {
        self.inject(StoreOperation::ListEntries, ErrorSubject::Entries(round_id), ErrorVerb::Read).await?;

        let t = self.tables.read().await;
        let entries = t.entries.range((round_id, 0)..=(round_id, u32::MAX)).map(|(_, e)| e.clone()).collect();
        Ok(entries)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn update_status(
        &self,
        round_id: RoundId,
        expected_version: u64,
        to: RoundStatus,
        now: TimestampMs,
    ) -> Result<StatusUpdate, StoreError<TransitionError>> {
        self.inject(StoreOperation::UpdateStatus, ErrorSubject::Round(round_id), ErrorVerb::Write).await?;

        let mut t = self.tables.write().await;

        let round = rules::transition(round_id, t.rounds.get(&round_id), expected_version, to, now)
            .map_err(StoreError::Rejected)?;

        t.rounds.insert(round_id, round.clone());

        let successor = match round.successor_spec() {
            Some(spec) if to.is_terminal() => Some(t.insert_round(&spec, now)),
            _ => None,
        };

        Ok(StatusUpdate { round, successor })
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn record_draw(
        &self,
        expected_version: u64,
        result: &DrawResult,
        now: TimestampMs,
    ) -> Result<Round, StoreError<RecordDrawError>> {
        let round_id = result.round_id;
        self.inject(StoreOperation::RecordDraw, ErrorSubject::DrawResult(round_id), ErrorVerb::Write).await?;

        let mut t = self.tables.write().await;

        let exists = t.draw_results.contains_key(&round_id);
        let round = rules::record_draw(t.rounds.get(&round_id), exists, expected_version, result, now)
            .map_err(StoreError::Rejected)?;

        t.draw_results.insert(round_id, result.clone());
        t.rounds.insert(round_id, round.clone());

        Ok(round)
    }

    async fn get_draw_result(&self, round_id: RoundId) -> Result<Option<DrawResult>, StorageError> {
        self.inject(StoreOperation::GetDrawResult, ErrorSubject::DrawResult(round_id), ErrorVerb::Read).await?;

        let t = self.tables.read().await;
        Ok(t.draw_results.get(&round_id).cloned())
    }

    async fn try_acquire_lease(
        &self,
        round_id: RoundId,
        holder: &str,
        ttl_ms: u64,
        now: TimestampMs,
    ) -> Result<Lease, StoreError<LeaseUnavailable>> {
        self.inject(StoreOperation::AcquireLease, ErrorSubject::Lease(round_id), ErrorVerb::Write).await?;

        let mut t = self.tables.write().await;

        let lease = Lease::grant(round_id, t.leases.get(&round_id), holder, ttl_ms, now).map_err(StoreError::Rejected)?;
        t.leases.insert(round_id, lease.clone());

        Ok(lease)
    }

    async fn renew_lease(&self, lease: &Lease, ttl_ms: u64, now: TimestampMs) -> Result<Lease, StoreError<LeaseExpired>> {
        let round_id = lease.round_id;
        self.inject(StoreOperation::RenewLease, ErrorSubject::Lease(round_id), ErrorVerb::Write).await?;

        let mut t = self.tables.write().await;

        let renewed = Lease::extend(t.leases.get(&round_id), lease, ttl_ms, now).map_err(StoreError::Rejected)?;
        t.leases.insert(round_id, renewed.clone());

        Ok(renewed)
    }

    async fn release_lease(&self, lease: &Lease) -> Result<bool, StorageError> {
        let round_id = lease.round_id;
        self.inject(StoreOperation::ReleaseLease, ErrorSubject::Lease(round_id), ErrorVerb::Delete).await?;

        let mut t = self.tables.write().await;

        match t.leases.get(&round_id) {
            Some(stored) if stored.is_same_grant(lease) => {
                let released = stored.released();
                t.leases.insert(round_id, released);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_lease(&self, round_id: RoundId) -> Result<Option<Lease>, StorageError> {
        self.inject(StoreOperation::GetLease, ErrorSubject::Lease(round_id), ErrorVerb::Read).await?;

        let t = self.tables.read().await;
        Ok(t.leases.get(&round_id).cloned())
    }
}
