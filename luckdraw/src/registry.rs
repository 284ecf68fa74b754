use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::RoundCache;
use crate::errors::AppendEntryError;
use crate::errors::ErrorSubject;
use crate::errors::ErrorVerb;
use crate::errors::RecordDrawError;
use crate::errors::RoundNotFound;
use crate::errors::StorageError;
use crate::errors::StoreError;
use crate::errors::TransitionError;
use crate::errors::ValidationError;
use crate::prize::Overview;
use crate::prize::PrizePolicy;
use crate::round::DrawResult;
use crate::round::Entry;
use crate::round::Round;
use crate::round::RoundSpec;
use crate::round::RoundStatus;
use crate::storage::timed;
use crate::storage::PersistenceStore;
use crate::storage::StatusUpdate;
use crate::time::Clock;
use crate::Config;
use crate::RoundId;
use crate::TimestampMs;

/// The single access point to round state, for the API surface and for the draw components.
///
/// Reads go through a per-process [`RoundCache`]. Writes go to the store first, are version
/// checked there, and only a round returned by a successful write is put into the cache.
pub struct RoundRegistry<S>
where S: PersistenceStore
{
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    cache: RoundCache,
    store_timeout: Duration,
    conflict_retries: u32,
}

impl<S> fmt::Debug for RoundRegistry<S>
where S: PersistenceStore
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoundRegistry")
            .field("store", &self.store)
            .field("cached", &self.cache.len())
            .field("store_timeout", &self.store_timeout)
            .field("conflict_retries", &self.conflict_retries)
            .finish()
    }
}

impl<S> RoundRegistry<S>
where S: PersistenceStore
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            store,
            clock,
            cache: RoundCache::new(config.cache_ttl, config.cache_capacity),
            store_timeout: config.store_timeout(),
            conflict_retries: config.conflict_retries,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> TimestampMs {
        self.clock.now_ms()
    }

    /// Read a round, possibly from the cache.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get(&self, round_id: RoundId) -> Result<Round, StoreError<RoundNotFound>> {
        if let Some(round) = self.cache.get(round_id, self.now()) {
            tracing::debug!("cache hit: {}", round);
            return Ok(round);
        }
        self.load(round_id).await
    }

    /// Read a round from the store and refresh the cache.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn load(&self, round_id: RoundId) -> Result<Round, StoreError<RoundNotFound>> {
        let round = timed(
            self.store_timeout,
            ErrorSubject::Round(round_id),
            ErrorVerb::Read,
            self.store.get_round(round_id),
        )
        .await?;

        let round = round.ok_or_else(|| StoreError::Rejected(RoundNotFound::new(round_id)))?;
        self.cache.put(round.clone(), self.now());
        Ok(round)
    }

    /// Create a new `OPEN` round.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn create_round(&self, spec: RoundSpec) -> Result<Round, StoreError<ValidationError>> {
        let now = self.now();
        spec.validate(now).map_err(StoreError::Rejected)?;

        let round = timed(
            self.store_timeout,
            ErrorSubject::Rounds,
            ErrorVerb::Write,
            self.store.insert_round(&spec, now),
        )
        .await?;

        tracing::info!("created: {}", round);
        self.cache.put(round.clone(), now);
        Ok(round)
    }

    /// Append an entry for `participant_id`.
    ///
    /// On a version conflict the round is re-read and the append retried, up to
    /// `conflict_retries` times, before the conflict is returned.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn append_entry(
        &self,
        round_id: RoundId,
        participant_id: &str,
    ) -> Result<Entry, StoreError<AppendEntryError>> {
        let mut attempt = 0;

        loop {
            let round = self.load(round_id).await.map_err(|e| e.map_rejection(AppendEntryError::from))?;

            let now = self.now();
            round.check_accepts_entry(now).map_err(|e| StoreError::Rejected(e.into()))?;

            let res = timed(
                self.store_timeout,
                ErrorSubject::Entries(round_id),
                ErrorVerb::Write,
                self.store.append_entry(round_id, round.version, participant_id, now),
            )
            .await;

            match res {
                Ok((round, entry)) => {
                    tracing::debug!("appended: {}", entry);
                    self.cache.put(round, now);
                    return Ok(entry);
                }
                Err(StoreError::Rejected(AppendEntryError::Conflict(c))) if attempt < self.conflict_retries => {
                    attempt += 1;
                    tracing::debug!("retry append after conflict, attempt {}: {}", attempt, c);
                    self.cache.invalidate(round_id);
                }
                Err(e) => {
                    if matches!(e, StoreError::Rejected(AppendEntryError::Conflict(_))) {
                        self.cache.invalidate(round_id);
                    }
                    return Err(e);
                }
            }
        }
    }

    pub async fn entries(&self, round_id: RoundId) -> Result<Vec<Entry>, StorageError> {
        timed(
            self.store_timeout,
            ErrorSubject::Entries(round_id),
            ErrorVerb::Read,
            self.store.list_entries(round_id),
        )
        .await
    }

    /// `OPEN` rounds whose close time is at or before `now`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn find_due_for_draw(&self, now: TimestampMs) -> Result<Vec<Round>, StorageError> {
        timed(
            self.store_timeout,
            ErrorSubject::Rounds,
            ErrorVerb::Read,
            self.store.find_due_for_draw(now),
        )
        .await
    }

    /// `CLOSED` or `DRAWN` rounds not updated within `threshold` before `now`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn find_stalled(&self, now: TimestampMs, threshold: Duration) -> Result<Vec<Round>, StorageError> {
        let updated_before = now.saturating_sub(threshold.as_millis() as u64);
        timed(
            self.store_timeout,
            ErrorSubject::Rounds,
            ErrorVerb::Read,
            self.store.find_stalled(updated_before),
        )
        .await
    }

    /// `OPEN` rounds still accepting entries, soonest to close first.
    pub async fn upcoming(&self, now: TimestampMs) -> Result<Vec<Round>, StorageError> {
        timed(
            self.store_timeout,
            ErrorSubject::Rounds,
            ErrorVerb::Read,
            self.store.find_upcoming(now),
        )
        .await
    }

    /// The upcoming rounds with their current prizes.
    pub async fn overview(&self, policy: &PrizePolicy) -> Result<Overview, StorageError> {
        let rounds = self.upcoming(self.now()).await?;
        Ok(Overview::new(rounds, policy))
    }

    /// Move a round at `expected_version` to `to`.
    ///
    /// A recurring round that becomes terminal gets its successor in the same write.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn transition_status(
        &self,
        round_id: RoundId,
        expected_version: u64,
        to: RoundStatus,
    ) -> Result<StatusUpdate, StoreError<TransitionError>> {
        let now = self.now();

        let res = timed(
            self.store_timeout,
            ErrorSubject::Round(round_id),
            ErrorVerb::Write,
            self.store.update_status(round_id, expected_version, to, now),
        )
        .await;

        match res {
            Ok(update) => {
                tracing::info!("transitioned to {}: {}", to, update.round);
                self.cache.put(update.round.clone(), now);

                if let Some(successor) = &update.successor {
                    tracing::info!("successor created: {}", successor);
                    self.cache.put(successor.clone(), now);
                }
                Ok(update)
            }
            Err(e) => {
                if matches!(e, StoreError::Rejected(TransitionError::Conflict(_))) {
                    self.cache.invalidate(round_id);
                }
                Err(e)
            }
        }
    }

    /// Store `result` and move its round from `CLOSED` to `DRAWN` in one write.
    #[tracing::instrument(level = "debug", skip(self, result), fields(result = %result))]
    pub async fn record_draw(
        &self,
        expected_version: u64,
        result: &DrawResult,
    ) -> Result<Round, StoreError<RecordDrawError>> {
        let now = self.now();
        let round_id = result.round_id;

        let res = timed(
            self.store_timeout,
            ErrorSubject::DrawResult(round_id),
            ErrorVerb::Write,
            self.store.record_draw(expected_version, result, now),
        )
        .await;

        match res {
            Ok(round) => {
                tracing::info!("draw recorded: {}", round);
                self.cache.put(round.clone(), now);
                Ok(round)
            }
            Err(e) => {
                // Any rejection other than a missing round means the cached round is stale.
                if matches!(e, StoreError::Rejected(ref r) if !matches!(r, RecordDrawError::NotFound(_))) {
                    self.cache.invalidate(round_id);
                }
                Err(e)
            }
        }
    }

    pub async fn get_draw_result(&self, round_id: RoundId) -> Result<Option<DrawResult>, StorageError> {
        timed(
            self.store_timeout,
            ErrorSubject::DrawResult(round_id),
            ErrorVerb::Read,
            self.store.get_draw_result(round_id),
        )
        .await
    }
}
