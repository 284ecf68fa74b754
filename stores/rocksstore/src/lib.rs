//! A rocksdb backed [`PersistenceStore`].
//!
//! Every conditional write takes the store's write lock, reads the rows it depends on, decides with
//! [`luckdraw::storage::rules`] and commits all of its mutations in one [`WriteBatch`].


use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use byteorder::BigEndian;
use byteorder::ByteOrder;
use luckdraw::errors::AppendEntryError;
use luckdraw::errors::ErrorSubject;
use luckdraw::errors::ErrorVerb;
use luckdraw::errors::LeaseExpired;
use luckdraw::errors::LeaseUnavailable;
use luckdraw::errors::RecordDrawError;
use luckdraw::errors::StorageError;
use luckdraw::errors::StorageIOError;
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
use rocksdb::ColumnFamily;
use rocksdb::ColumnFamilyDescriptor;
use rocksdb::Direction;
use rocksdb::IteratorMode;
use rocksdb::Options;
use rocksdb::WriteBatch;
use rocksdb::DB;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

const CF_META: &str = "meta";
const CF_ROUNDS: &str = "rounds";
const CF_ENTRIES: &str = "entries";
const CF_PARTICIPANTS: &str = "participants";
const CF_DRAW_RESULTS: &str = "draw_results";
const CF_LEASES: &str = "leases";

const COLUMN_FAMILIES: [&str; 6] = [CF_META, CF_ROUNDS, CF_ENTRIES, CF_PARTICIPANTS, CF_DRAW_RESULTS, CF_LEASES];

/// converts an id to a byte vector for storing in the database.
/// Note that we're using big endian encoding to ensure correct sorting of keys
fn id_to_bin(id: u64) -> Vec<u8> {
    let mut buf = vec![0; 8];
    BigEndian::write_u64(&mut buf, id);
    buf
}

fn bin_to_id(buf: &[u8]) -> u64 {
    BigEndian::read_u64(&buf[0..8])
}

/// Entries are keyed by round id then sequence, so a round's entries are contiguous and ordered.
fn entry_key(round_id: RoundId, sequence: u32) -> Vec<u8> {
    let mut buf = id_to_bin(round_id);
    buf.extend_from_slice(&[0; 4]);
    BigEndian::write_u32(&mut buf[8..12], sequence);
    buf
}

fn participant_key(round_id: RoundId, participant_id: &str) -> Vec<u8> {
    let mut buf = id_to_bin(round_id);
    buf.extend_from_slice(participant_id.as_bytes());
    buf
}

/// Id counters stored in the `meta` column family.
mod meta {
    use luckdraw::errors::ErrorSubject;

    /// Defines metadata key and value
    pub(crate) trait StoreMeta {
        /// The key used to store in rocksdb
        const KEY: &'static str;

        /// The subject embedded into a returned storage error.
        fn subject() -> ErrorSubject;
    }

    pub(crate) struct LastRoundId {}
    pub(crate) struct LastEntryId {}

    impl StoreMeta for LastRoundId {
        const KEY: &'static str = "last_round_id";

        fn subject() -> ErrorSubject {
            ErrorSubject::Rounds
        }
    }

    impl StoreMeta for LastEntryId {
        const KEY: &'static str = "last_entry_id";

        fn subject() -> ErrorSubject {
            ErrorSubject::Store
        }
    }
}

#[derive(Debug)]
pub struct RocksStore {
    db: Arc<DB>,

    /// Serializes conditional writes.
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a store at `db_path`.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<RocksStore, StorageError> {
        let mut db_opts = Options::default();
        db_opts.create_missing_column_families(true);
        db_opts.create_if_missing(true);

        let cfs = COLUMN_FAMILIES.iter().map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));

        let db = DB::open_cf_descriptors(&db_opts, db_path, cfs)
            .map_err(|e| StorageError::write(ErrorSubject::Store, AnyError::new(&e)))?;

        tracing::info!("rocksdb store opened at {}", db.path().display());

        Ok(RocksStore {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily, StorageError> {
        self.db.cf_handle(name).ok_or_else(|| {
            StorageError::read(
                ErrorSubject::Store,
                AnyError::error(format!("column family not found: {}", name)),
            )
        })
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        cf: &'static str,
        key: &[u8],
        subject: ErrorSubject,
    ) -> Result<Option<T>, StorageError> {
        let v = self
            .db
            .get_cf(self.cf(cf)?, key)
            .map_err(|e| StorageIOError::new(subject.clone(), ErrorVerb::Read, AnyError::new(&e)))?;

        let t = match v {
            None => None,
            Some(bytes) => Some(
                serde_json::from_slice(&bytes)
                    .map_err(|e| StorageIOError::new(subject, ErrorVerb::Read, AnyError::new(&e)))?,
            ),
        };
        Ok(t)
    }

    fn contains_key(&self, cf: &'static str, key: &[u8], subject: ErrorSubject) -> Result<bool, StorageError> {
        let v = self
            .db
            .get_pinned_cf(self.cf(cf)?, key)
            .map_err(|e| StorageIOError::new(subject, ErrorVerb::Read, AnyError::new(&e)))?;
        Ok(v.is_some())
    }

    fn put_json<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf: &'static str,
        key: &[u8],
        value: &T,
        subject: ErrorSubject,
    ) -> Result<(), StorageError> {
        let json_value =
            serde_json::to_vec(value).map_err(|e| StorageIOError::new(subject, ErrorVerb::Write, AnyError::new(&e)))?;
        batch.put_cf(self.cf(cf)?, key, json_value);
        Ok(())
    }

    /// Commit `batch` and flush the write ahead log.
    fn commit(&self, batch: WriteBatch, subject: ErrorSubject) -> Result<(), StorageError> {
        self.db.write(batch).map_err(|e| StorageIOError::new(subject.clone(), ErrorVerb::Write, AnyError::new(&e)))?;
        self.db.flush_wal(true).map_err(|e| StorageIOError::new(subject, ErrorVerb::Write, AnyError::new(&e)))?;
        Ok(())
    }

    fn get_meta<M: meta::StoreMeta>(&self) -> Result<u64, StorageError> {
        let v: Option<u64> = self.get_json(CF_META, M::KEY.as_bytes(), M::subject())?;
        Ok(v.unwrap_or_default())
    }

    fn put_meta<M: meta::StoreMeta>(&self, batch: &mut WriteBatch, value: u64) -> Result<(), StorageError> {
        self.put_json(batch, CF_META, M::KEY.as_bytes(), &value, M::subject())
    }

    fn round(&self, round_id: RoundId) -> Result<Option<Round>, StorageError> {
        self.get_json(CF_ROUNDS, &id_to_bin(round_id), ErrorSubject::Round(round_id))
    }

    fn lease(&self, round_id: RoundId) -> Result<Option<Lease>, StorageError> {
        self.get_json(CF_LEASES, &id_to_bin(round_id), ErrorSubject::Lease(round_id))
    }

    /// Scan all rounds in id order and keep those matching `f`.
    fn rounds_where(&self, f: impl Fn(&Round) -> bool) -> Result<Vec<Round>, StorageError> {
        let mut res = Vec::new();

        let it = self.db.iterator_cf(self.cf(CF_ROUNDS)?, IteratorMode::Start);
        for item_res in it {
            let (_id, val) = item_res.map_err(|e| StorageError::read(ErrorSubject::Rounds, AnyError::new(&e)))?;
            let round: Round =
                serde_json::from_slice(&val).map_err(|e| StorageError::read(ErrorSubject::Rounds, AnyError::new(&e)))?;

            if f(&round) {
                res.push(round);
            }
        }
        Ok(res)
    }

    /// Add a new round to `batch`, assigning the next id.
    fn put_new_round(
        &self,
        batch: &mut WriteBatch,
        last_round_id: &mut RoundId,
        spec: &RoundSpec,
        now: TimestampMs,
    ) -> Result<Round, StorageError> {
        *last_round_id += 1;
        let round = Round::new(*last_round_id, spec, now);

        self.put_meta::<meta::LastRoundId>(batch, *last_round_id)?;
        self.put_json(batch, CF_ROUNDS, &id_to_bin(round.id), &round, ErrorSubject::Round(round.id))?;
        Ok(round)
    }
}

#[async_trait::async_trait]
impl PersistenceStore for RocksStore {
    #[tracing::instrument(level = "trace", skip(self))]
    async fn insert_round(&self, spec: &RoundSpec, now: TimestampMs) -> Result<Round, StorageError> {
        let _guard = self.write_lock.lock().await;

        let mut last_round_id = self.get_meta::<meta::LastRoundId>()?;
        let mut batch = WriteBatch::default();
        let round = self.put_new_round(&mut batch, &mut last_round_id, spec, now)?;
        self.commit(batch, ErrorSubject::Round(round.id))?;

        Ok(round)
    }

    async fn get_round(&self, round_id: RoundId) -> Result<Option<Round>, StorageError> {
        self.round(round_id)
    }

    async fn find_due_for_draw(&self, now: TimestampMs) -> Result<Vec<Round>, StorageError> {
        let mut due = self.rounds_where(|r| r.is_due(now))?;
        due.sort_by_key(|r| (r.close_at, r.id));
        Ok(due)
    }

    async fn find_stalled(&self, updated_before: TimestampMs) -> Result<Vec<Round>, StorageError> {
        self.rounds_where(|r| r.status.is_in_flight() && r.updated_at <= updated_before)
    }

    async fn find_upcoming(&self, now: TimestampMs) -> Result<Vec<Round>, StorageError> {
        let mut upcoming = self.rounds_where(|r| r.status == RoundStatus::Open && r.close_at > now)?;
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
        let _guard = self.write_lock.lock().await;

        let subject = ErrorSubject::Entries(round_id);

        let stored = self.round(round_id)?;
        let pkey = participant_key(round_id, participant_id);
        let already_entered = self.contains_key(CF_PARTICIPANTS, &pkey, subject.clone())?;
        let entry_id = self.get_meta::<meta::LastEntryId>()? + 1;

        let (round, entry) = rules::append_entry(
            round_id,
            stored.as_ref(),
            expected_version,
            participant_id,
            already_entered,
            entry_id,
            now,
        )
        .map_err(StoreError::Rejected)?;

        let mut batch = WriteBatch::default();
        self.put_meta::<meta::LastEntryId>(&mut batch, entry_id)?;
        batch.put_cf(self.cf(CF_PARTICIPANTS)?, &pkey, b"");
        self.put_json(&mut batch, CF_ENTRIES, &entry_key(round_id, entry.sequence), &entry, subject.clone())?;
        self.put_json(&mut batch, CF_ROUNDS, &id_to_bin(round_id), &round, subject.clone())?;
        self.commit(batch, subject)?;

        Ok((round, entry))
    }

    async fn list_entries(&self, round_id: RoundId) -> Result<Vec<Entry>, StorageError> {
        let start = entry_key(round_id, 0);
        let mut res = Vec::new();

        let it = self.db.iterator_cf(self.cf(CF_ENTRIES)?, IteratorMode::From(&start, Direction::Forward));
        for item_res in it {
            let (key, val) =
                item_res.map_err(|e| StorageError::read(ErrorSubject::Entries(round_id), AnyError::new(&e)))?;

            if bin_to_id(&key) != round_id {
                break;
            }

            let entry: Entry = serde_json::from_slice(&val)
                .map_err(|e| StorageError::read(ErrorSubject::Entries(round_id), AnyError::new(&e)))?;
            res.push(entry);
        }
        Ok(res)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn update_status(
        &self,
        round_id: RoundId,
        expected_version: u64,
        to: RoundStatus,
        now: TimestampMs,
    ) -> Result<StatusUpdate, StoreError<TransitionError>> {
        let _guard = self.write_lock.lock().await;

        let subject = ErrorSubject::Round(round_id);

        let stored = self.round(round_id)?;
        let round =
            rules::transition(round_id, stored.as_ref(), expected_version, to, now).map_err(StoreError::Rejected)?;

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_ROUNDS, &id_to_bin(round_id), &round, subject.clone())?;

        let successor = match round.successor_spec() {
            Some(spec) if to.is_terminal() => {
                let mut last_round_id = self.get_meta::<meta::LastRoundId>()?;
                Some(self.put_new_round(&mut batch, &mut last_round_id, &spec, now)?)
            }
            _ => None,
        };

        self.commit(batch, subject)?;

        Ok(StatusUpdate { round, successor })
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn record_draw(
        &self,
        expected_version: u64,
        result: &DrawResult,
        now: TimestampMs,
    ) -> Result<Round, StoreError<RecordDrawError>> {
        let _guard = self.write_lock.lock().await;

        let round_id = result.round_id;
        let subject = ErrorSubject::DrawResult(round_id);
        let key = id_to_bin(round_id);

        let stored = self.round(round_id)?;
        let exists = self.contains_key(CF_DRAW_RESULTS, &key, subject.clone())?;

        let round = rules::record_draw(stored.as_ref(), exists, expected_version, result, now)
            .map_err(StoreError::Rejected)?;

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_DRAW_RESULTS, &key, result, subject.clone())?;
        self.put_json(&mut batch, CF_ROUNDS, &key, &round, subject.clone())?;
        self.commit(batch, subject)?;

        Ok(round)
    }

    async fn get_draw_result(&self, round_id: RoundId) -> Result<Option<DrawResult>, StorageError> {
        self.get_json(CF_DRAW_RESULTS, &id_to_bin(round_id), ErrorSubject::DrawResult(round_id))
    }

    async fn try_acquire_lease(
        &self,
        round_id: RoundId,
        holder: &str,
        ttl_ms: u64,
        now: TimestampMs,
    ) -> Result<Lease, StoreError<LeaseUnavailable>> {
        let _guard = self.write_lock.lock().await;

        let existing = self.lease(round_id)?;
        let lease = Lease::grant(round_id, existing.as_ref(), holder, ttl_ms, now).map_err(StoreError::Rejected)?;

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_LEASES, &id_to_bin(round_id), &lease, ErrorSubject::Lease(round_id))?;
        self.commit(batch, ErrorSubject::Lease(round_id))?;

        Ok(lease)
    }

    async fn renew_lease(&self, lease: &Lease, ttl_ms: u64, now: TimestampMs) -> Result<Lease, StoreError<LeaseExpired>> {
        let _guard = self.write_lock.lock().await;

        let round_id = lease.round_id;
        let existing = self.lease(round_id)?;
        let renewed = Lease::extend(existing.as_ref(), lease, ttl_ms, now).map_err(StoreError::Rejected)?;

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_LEASES, &id_to_bin(round_id), &renewed, ErrorSubject::Lease(round_id))?;
        self.commit(batch, ErrorSubject::Lease(round_id))?;

        Ok(renewed)
    }

    async fn release_lease(&self, lease: &Lease) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;

        let round_id = lease.round_id;
        let stored = match self.lease(round_id)? {
            Some(stored) if stored.is_same_grant(lease) => stored,
            _ => return Ok(false),
        };

        let mut batch = WriteBatch::default();
        self.put_json(
            &mut batch,
            CF_LEASES,
            &id_to_bin(round_id),
            &stored.released(),
            ErrorSubject::Lease(round_id),
        )?;
        self.commit(batch, ErrorSubject::Lease(round_id))?;

        Ok(true)
    }

    async fn get_lease(&self, round_id: RoundId) -> Result<Option<Lease>, StorageError> {
        self.lease(round_id)
    }
}
