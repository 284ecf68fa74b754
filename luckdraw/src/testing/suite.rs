use std::collections::BTreeSet;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::ensure;

use crate::errors::AppendEntryError;
use crate::errors::ConcurrencyConflict;
use crate::errors::RecordDrawError;
use crate::errors::RoundNotFound;
use crate::errors::StoreError;
use crate::errors::TransitionError;
use crate::errors::ValidationError;
use crate::round::Cadence;
use crate::round::DrawResult;
use crate::round::Entry;
use crate::round::Round;
use crate::round::RoundSpec;
use crate::round::RoundStatus;
use crate::round::Seed;
use crate::storage::PersistenceStore;
use crate::testing::StoreBuilder;
use crate::RoundId;
use crate::TimestampMs;

/// The time at which every suite test creates its rounds.
const T0: TimestampMs = 1_000_000;

/// Test suite to ensure a [`PersistenceStore`] implementation behaves as the draw components
/// expect, including its atomic conditional writes under concurrency.
pub struct Suite<S, B, G = ()>
where
    S: PersistenceStore,
    B: StoreBuilder<S, G>,
    G: Send + Sync,
{
    _p: PhantomData<(S, B, G)>,
}

impl<S, B, G> Suite<S, B, G>
where
    S: PersistenceStore,
    B: StoreBuilder<S, G>,
    G: Send + Sync,
{
    pub async fn test_all(builder: B) -> anyhow::Result<()> {
        run_test(&builder, Self::insert_and_get_round).await?;
        run_test(&builder, Self::find_due_for_draw).await?;
        run_test(&builder, Self::find_upcoming).await?;
        run_test(&builder, Self::find_stalled).await?;
        run_test(&builder, Self::append_entry).await?;
        run_test(&builder, Self::append_entry_rejections).await?;
        run_test(&builder, Self::append_entry_capacity).await?;
        run_test(&builder, Self::update_status).await?;
        run_test(&builder, Self::update_status_creates_successor).await?;
        run_test(&builder, Self::record_draw).await?;
        run_test(&builder, Self::record_draw_rejections).await?;
        run_test(&builder, Self::lease_acquire_and_expire).await?;
        run_test(&builder, Self::lease_renew_and_release).await?;
        run_test(&builder, Self::concurrent_append_entry).await?;
        run_test(&builder, Self::concurrent_lease_acquire).await?;
        run_test(&builder, Self::concurrent_record_draw).await?;
        Ok(())
    }

    pub async fn insert_and_get_round(store: S) -> anyhow::Result<()> {
        let spec = RoundSpec::new(T0 + 1000).with_capacity(10);

        let r1 = store.insert_round(&spec, T0).await?;
        let r2 = store.insert_round(&spec, T0 + 1).await?;

        ensure!(r1.id < r2.id, "ids are assigned in increasing order: {} {}", r1.id, r2.id);
        ensure!(r1 == Round::new(r1.id, &spec, T0), "unexpected round {}", r1);

        assert_eq!(Some(r1.clone()), store.get_round(r1.id).await?);
        assert_eq!(Some(r2.clone()), store.get_round(r2.id).await?);
        assert_eq!(None, store.get_round(r2.id + 100).await?);

        Ok(())
    }

    pub async fn find_due_for_draw(store: S) -> anyhow::Result<()> {
        let late = store.insert_round(&RoundSpec::new(T0 + 300), T0).await?;
        let early = store.insert_round(&RoundSpec::new(T0 + 100), T0).await?;
        let mid = store.insert_round(&RoundSpec::new(T0 + 200), T0).await?;
        let closed = store.insert_round(&RoundSpec::new(T0 + 50), T0).await?;

        store.update_status(closed.id, closed.version, RoundStatus::Closed, T0 + 60).await?;

        let ids = |rounds: Vec<Round>| rounds.iter().map(|r| r.id).collect::<Vec<_>>();

        assert_eq!(Vec::<u64>::new(), ids(store.find_due_for_draw(T0 + 99).await?));
        assert_eq!(vec![early.id], ids(store.find_due_for_draw(T0 + 100).await?));
        assert_eq!(vec![early.id, mid.id], ids(store.find_due_for_draw(T0 + 250).await?));
        assert_eq!(
            vec![early.id, mid.id, late.id],
            ids(store.find_due_for_draw(T0 + 1000).await?)
        );

        Ok(())
    }

    pub async fn find_upcoming(store: S) -> anyhow::Result<()> {
        let b = store.insert_round(&RoundSpec::new(T0 + 200), T0).await?;
        let a = store.insert_round(&RoundSpec::new(T0 + 100), T0).await?;
        let cancelled = store.insert_round(&RoundSpec::new(T0 + 150), T0).await?;

        store.update_status(cancelled.id, cancelled.version, RoundStatus::Cancelled, T0).await?;

        let ids = |rounds: Vec<Round>| rounds.iter().map(|r| r.id).collect::<Vec<_>>();

        assert_eq!(vec![a.id, b.id], ids(store.find_upcoming(T0).await?));
        assert_eq!(vec![b.id], ids(store.find_upcoming(T0 + 100).await?));
        assert_eq!(Vec::<u64>::new(), ids(store.find_upcoming(T0 + 200).await?));

        Ok(())
    }

    pub async fn find_stalled(store: S) -> anyhow::Result<()> {
        let _open = store.insert_round(&RoundSpec::new(T0 + 100), T0).await?;
        let closed = store.insert_round(&RoundSpec::new(T0 + 100), T0).await?;
        let drawn = store.insert_round(&RoundSpec::new(T0 + 100), T0).await?;
        let settled = store.insert_round(&RoundSpec::new(T0 + 100), T0).await?;

        store.update_status(closed.id, closed.version, RoundStatus::Closed, T0 + 200).await?;

        let d = store.update_status(drawn.id, drawn.version, RoundStatus::Closed, T0 + 100).await?.round;
        store.record_draw(d.version, &result_of(drawn.id, 0), T0 + 300).await?;

        let s = store.update_status(settled.id, settled.version, RoundStatus::Closed, T0 + 100).await?.round;
        let s = store.record_draw(s.version, &result_of(settled.id, 0), T0 + 100).await?;
        store.update_status(s.id, s.version, RoundStatus::Settled, T0 + 100).await?;

        let ids = |rounds: Vec<Round>| rounds.iter().map(|r| r.id).collect::<Vec<_>>();

        assert_eq!(Vec::<u64>::new(), ids(store.find_stalled(T0 + 199).await?));
        assert_eq!(vec![closed.id], ids(store.find_stalled(T0 + 200).await?));
        assert_eq!(vec![closed.id, drawn.id], ids(store.find_stalled(T0 + 300).await?));

        Ok(())
    }

    pub async fn append_entry(store: S) -> anyhow::Result<()> {
        let r = store.insert_round(&RoundSpec::new(T0 + 1000), T0).await?;

        let (r1, e0) = store.append_entry(r.id, r.version, "alice", T0 + 1).await?;
        let (r2, e1) = store.append_entry(r.id, r1.version, "bob", T0 + 2).await?;

        assert_eq!(0, e0.sequence);
        assert_eq!(1, e1.sequence);
        ensure!(e0.id != e1.id, "entry ids are unique");
        assert_eq!("alice", e0.participant_id);
        assert_eq!(r.id, e1.round_id);
        assert_eq!(T0 + 2, e1.created_at);

        assert_eq!(r.version + 2, r2.version);
        assert_eq!(2, r2.entry_count);
        assert_eq!(T0 + 2, r2.updated_at);
        assert_eq!(Some(r2), store.get_round(r.id).await?);

        assert_eq!(vec![e0, e1], store.list_entries(r.id).await?);
        assert_eq!(Vec::<Entry>::new(), store.list_entries(r.id + 100).await?);

        Ok(())
    }

    pub async fn append_entry_rejections(store: S) -> anyhow::Result<()> {
        let r = store.insert_round(&RoundSpec::new(T0 + 1000), T0).await?;
        let (r1, _) = store.append_entry(r.id, r.version, "alice", T0 + 1).await?;

        // Stale version
        let res = store.append_entry(r.id, r.version, "bob", T0 + 2).await;
        assert_eq!(
            Err(StoreError::Rejected(AppendEntryError::Conflict(ConcurrencyConflict {
                round_id: r.id,
                expected: r.version,
                actual: r1.version,
            }))),
            res
        );

        // Duplicate participant
        let res = store.append_entry(r.id, r1.version, "alice", T0 + 2).await;
        assert_eq!(
            Err(StoreError::Rejected(AppendEntryError::Invalid(ValidationError::AlreadyEntered {
                round_id: r.id,
                participant_id: "alice".to_string(),
            }))),
            res
        );

        // Past close time
        let res = store.append_entry(r.id, r1.version, "bob", T0 + 1000).await;
        assert_eq!(
            Err(StoreError::Rejected(AppendEntryError::Invalid(ValidationError::Closed {
                round_id: r.id,
                close_at: T0 + 1000,
                now: T0 + 1000,
            }))),
            res
        );

        // Unknown round
        let res = store.append_entry(r.id + 100, 1, "bob", T0 + 2).await;
        assert_eq!(
            Err(StoreError::Rejected(AppendEntryError::NotFound(RoundNotFound::new(r.id + 100)))),
            res
        );

        // Not open
        let closed = store.update_status(r.id, r1.version, RoundStatus::Closed, T0 + 3).await?.round;
        let res = store.append_entry(r.id, closed.version, "bob", T0 + 4).await;
        assert_eq!(
            Err(StoreError::Rejected(AppendEntryError::Invalid(ValidationError::NotOpen {
                round_id: r.id,
                status: RoundStatus::Closed,
            }))),
            res
        );

        // No rejected append left a trace.
        assert_eq!(1, store.list_entries(r.id).await?.len());
        assert_eq!(1, store.get_round(r.id).await?.map(|r| r.entry_count).unwrap_or_default());

        Ok(())
    }

    pub async fn append_entry_capacity(store: S) -> anyhow::Result<()> {
        let r = store.insert_round(&RoundSpec::new(T0 + 1000).with_capacity(2), T0).await?;

        let (r, _) = store.append_entry(r.id, r.version, "a", T0).await?;
        let (r, _) = store.append_entry(r.id, r.version, "b", T0).await?;

        let res = store.append_entry(r.id, r.version, "c", T0).await;
        assert_eq!(
            Err(StoreError::Rejected(AppendEntryError::Invalid(ValidationError::CapacityReached {
                round_id: r.id,
                capacity: 2,
            }))),
            res
        );
        assert_eq!(2, store.list_entries(r.id).await?.len());

        Ok(())
    }

    pub async fn update_status(store: S) -> anyhow::Result<()> {
        let r = store.insert_round(&RoundSpec::new(T0 + 100), T0).await?;

        let update = store.update_status(r.id, r.version, RoundStatus::Closed, T0 + 100).await?;
        assert_eq!(RoundStatus::Closed, update.round.status);
        assert_eq!(r.version + 1, update.round.version);
        assert_eq!(T0 + 100, update.round.updated_at);
        assert_eq!(None, update.successor);
        assert_eq!(Some(update.round.clone()), store.get_round(r.id).await?);

        // Stale version
        let res = store.update_status(r.id, r.version, RoundStatus::Cancelled, T0 + 101).await;
        assert_eq!(
            Err(StoreError::Rejected(TransitionError::Conflict(ConcurrencyConflict {
                round_id: r.id,
                expected: r.version,
                actual: update.round.version,
            }))),
            res
        );

        // Backward
        let res = store.update_status(r.id, update.round.version, RoundStatus::Open, T0 + 101).await;
        assert_eq!(
            Err(StoreError::Rejected(TransitionError::Invalid(ValidationError::IllegalTransition {
                round_id: r.id,
                from: RoundStatus::Closed,
                to: RoundStatus::Open,
            }))),
            res
        );

        // Unknown round
        let res = store.update_status(r.id + 100, 1, RoundStatus::Closed, T0).await;
        assert_eq!(
            Err(StoreError::Rejected(TransitionError::NotFound(RoundNotFound::new(r.id + 100)))),
            res
        );

        assert_eq!(Some(update.round), store.get_round(r.id).await?);

        Ok(())
    }

    pub async fn update_status_creates_successor(store: S) -> anyhow::Result<()> {
        let spec = RoundSpec::new(T0 + 100).with_capacity(5).with_cadence(Cadence::Daily);
        let r = store.insert_round(&spec, T0).await?;

        let closed = store.update_status(r.id, r.version, RoundStatus::Closed, T0 + 100).await?;
        assert_eq!(None, closed.successor, "only a terminal status creates a successor");

        let cancelled = store.update_status(r.id, closed.round.version, RoundStatus::Cancelled, T0 + 200).await?;

        let successor = cancelled.successor.ok_or_else(|| anyhow::anyhow!("successor is created"))?;
        assert_eq!(RoundStatus::Open, successor.status);
        assert_eq!(Some(r.id), successor.predecessor);
        assert_eq!(Some(Cadence::Daily), successor.cadence);
        assert_eq!(Some(5), successor.capacity);
        assert_eq!(86_400_000, successor.close_at);
        assert_eq!(T0 + 200, successor.created_at);

        assert_eq!(Some(successor.clone()), store.get_round(successor.id).await?);
        assert_eq!(
            vec![successor.id],
            store.find_upcoming(T0 + 200).await?.iter().map(|r| r.id).collect::<Vec<_>>()
        );

        Ok(())
    }

    pub async fn record_draw(store: S) -> anyhow::Result<()> {
        let r = store.insert_round(&RoundSpec::new(T0 + 100), T0).await?;
        let closed = store.update_status(r.id, r.version, RoundStatus::Closed, T0 + 100).await?.round;

        assert_eq!(None, store.get_draw_result(r.id).await?);

        let result = result_of(r.id, 3);
        let drawn = store.record_draw(closed.version, &result, T0 + 110).await?;

        assert_eq!(RoundStatus::Drawn, drawn.status);
        assert_eq!(closed.version + 1, drawn.version);
        assert_eq!(T0 + 110, drawn.updated_at);
        assert_eq!(Some(drawn), store.get_round(r.id).await?);
        assert_eq!(Some(result), store.get_draw_result(r.id).await?);

        Ok(())
    }

    pub async fn record_draw_rejections(store: S) -> anyhow::Result<()> {
        let r = store.insert_round(&RoundSpec::new(T0 + 100), T0).await?;

        // Not closed yet
        let res = store.record_draw(r.version, &result_of(r.id, 0), T0 + 100).await;
        assert_eq!(
            Err(StoreError::Rejected(RecordDrawError::Invalid(ValidationError::IllegalTransition {
                round_id: r.id,
                from: RoundStatus::Open,
                to: RoundStatus::Drawn,
            }))),
            res
        );

        let closed = store.update_status(r.id, r.version, RoundStatus::Closed, T0 + 100).await?.round;

        // Stale version
        let res = store.record_draw(r.version, &result_of(r.id, 0), T0 + 100).await;
        assert!(
            matches!(res, Err(StoreError::Rejected(RecordDrawError::Conflict(_)))),
            "{:?}",
            res
        );

        let first = result_of(r.id, 1);
        store.record_draw(closed.version, &first, T0 + 100).await?;

        // A second result is refused, whatever version it is based on.
        let res = store.record_draw(closed.version, &result_of(r.id, 2), T0 + 100).await;
        assert_eq!(Err(StoreError::Rejected(RecordDrawError::AlreadyDrawn { round_id: r.id })), res);

        assert_eq!(Some(first), store.get_draw_result(r.id).await?);

        // Unknown round
        let res = store.record_draw(1, &result_of(r.id + 100, 0), T0).await;
        assert_eq!(
            Err(StoreError::Rejected(RecordDrawError::NotFound(RoundNotFound::new(r.id + 100)))),
            res
        );
        assert_eq!(None, store.get_draw_result(r.id + 100).await?);

        Ok(())
    }

    pub async fn lease_acquire_and_expire(store: S) -> anyhow::Result<()> {
        assert_eq!(None, store.get_lease(1).await?);

        let l1 = store.try_acquire_lease(1, "a", 100, T0).await?;
        assert_eq!("a", l1.holder);
        assert_eq!(1, l1.token);
        assert_eq!(T0 + 100, l1.expires_at);
        assert_eq!(Some(l1.clone()), store.get_lease(1).await?);

        // Live: refused for everyone.
        let res = store.try_acquire_lease(1, "b", 100, T0 + 99).await;
        let e = res.err().and_then(|e| e.into_rejection()).ok_or_else(|| anyhow::anyhow!("must be refused"))?;
        assert_eq!("a", e.holder);
        assert_eq!(T0 + 100, e.expires_at);

        ensure!(store.try_acquire_lease(1, "a", 100, T0 + 99).await.is_err(), "the holder can not re-acquire");

        // Leases of other rounds are independent.
        store.try_acquire_lease(2, "b", 100, T0 + 99).await?;

        // Expired: taken over with a greater token.
        let l2 = store.try_acquire_lease(1, "b", 100, T0 + 100).await?;
        assert_eq!("b", l2.holder);
        assert_eq!(2, l2.token);
        assert_eq!(Some(l2), store.get_lease(1).await?);

        Ok(())
    }

    pub async fn lease_renew_and_release(store: S) -> anyhow::Result<()> {
        let l1 = store.try_acquire_lease(1, "a", 100, T0).await?;

        let renewed = store.renew_lease(&l1, 100, T0 + 50).await?;
        assert_eq!(T0 + 150, renewed.expires_at);
        assert_eq!(l1.token, renewed.token);

        // Refused once expired.
        let res = store.renew_lease(&l1, 100, T0 + 150).await;
        ensure!(res.is_err(), "an expired lease can not be renewed");

        let l2 = store.try_acquire_lease(1, "b", 100, T0 + 150).await?;

        // The stale holder can neither renew nor release the successor's lease.
        ensure!(store.renew_lease(&l1, 100, T0 + 160).await.is_err(), "stale renew");
        assert!(!store.release_lease(&l1).await?);
        assert_eq!(Some(l2.clone()), store.get_lease(1).await?);

        assert!(store.release_lease(&l2).await?);
        let stored = store.get_lease(1).await?.ok_or_else(|| anyhow::anyhow!("released lease keeps its token"))?;
        ensure!(!stored.is_live(T0 + 160), "released lease is not live");

        // Released: acquirable at once, and the token keeps growing.
        let l3 = store.try_acquire_lease(1, "c", 100, T0 + 160).await?;
        assert_eq!(3, l3.token);

        ensure!(store.renew_lease(&l2, 100, T0 + 161).await.is_err(), "released lease can not be renewed");

        Ok(())
    }

    pub async fn concurrent_append_entry(store: S) -> anyhow::Result<()> {
        let store = Arc::new(store);
        let r = store.insert_round(&RoundSpec::new(T0 + 1000), T0).await?;

        let n = 16u32;
        let mut handles = vec![];

        for i in 0..n {
            handles.push(tokio::spawn(append_until_accepted(store.clone(), r.id, format!("p-{}", i))));
        }

        for h in handles {
            h.await??;
        }

        let entries = store.list_entries(r.id).await?;
        let sequences = entries.iter().map(|e| e.sequence).collect::<Vec<_>>();
        assert_eq!((0..n).collect::<Vec<_>>(), sequences, "sequences are dense and unique");

        let participants = entries.iter().map(|e| e.participant_id.clone()).collect::<BTreeSet<_>>();
        assert_eq!(n as usize, participants.len());

        let round = store.get_round(r.id).await?.ok_or_else(|| anyhow::anyhow!("round is gone"))?;
        assert_eq!(n, round.entry_count);
        assert_eq!(r.version + n as u64, round.version);

        Ok(())
    }

    pub async fn concurrent_lease_acquire(store: S) -> anyhow::Result<()> {
        let store = Arc::new(store);

        let mut handles = vec![];
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.try_acquire_lease(7, &format!("h-{}", i), 10_000, T0).await
            }));
        }

        let mut granted = 0;
        for h in handles {
            match h.await? {
                Ok(_) => granted += 1,
                Err(StoreError::Rejected(_)) => {}
                Err(StoreError::Storage(e)) => return Err(e.into()),
            }
        }
        assert_eq!(1, granted, "exactly one holder acquires the lease");

        Ok(())
    }

    pub async fn concurrent_record_draw(store: S) -> anyhow::Result<()> {
        let store = Arc::new(store);

        let r = store.insert_round(&RoundSpec::new(T0 + 100), T0).await?;
        let closed = store.update_status(r.id, r.version, RoundStatus::Closed, T0 + 100).await?.round;

        let round_id = r.id;
        let version = closed.version;

        let mut handles = vec![];
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.record_draw(version, &result_of(round_id, i), T0 + 200).await
            }));
        }

        let mut recorded = 0;
        for h in handles {
            match h.await? {
                Ok(_) => recorded += 1,
                Err(StoreError::Rejected(RecordDrawError::AlreadyDrawn { .. })) => {}
                Err(StoreError::Rejected(RecordDrawError::Conflict(_))) => {}
                Err(e) => return Err(e.into()),
            }
        }
        assert_eq!(1, recorded, "exactly one draw result is recorded");
        ensure!(store.get_draw_result(r.id).await?.is_some(), "the result is stored");

        Ok(())
    }
}

/// Append an entry, re-reading the round after every version conflict.
async fn append_until_accepted<S>(store: Arc<S>, round_id: RoundId, participant: String) -> anyhow::Result<Entry>
where S: PersistenceStore {
    loop {
        let round = store.get_round(round_id).await?.ok_or_else(|| anyhow::anyhow!("round is gone"))?;

        match store.append_entry(round_id, round.version, &participant, T0 + 1).await {
            Ok((_, entry)) => return Ok(entry),
            Err(StoreError::Rejected(AppendEntryError::Conflict(_))) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

fn result_of(round_id: RoundId, winning_sequence: u32) -> DrawResult {
    DrawResult {
        round_id,
        winning_sequence,
        seed: Seed([winning_sequence as u8; 32]),
        algo_version: crate::selection::ALGORITHM_VERSION.to_string(),
        executed_at: T0,
    }
}

async fn run_test<S, G, B, TestFn, Fu>(builder: &B, test_fn: TestFn) -> anyhow::Result<()>
where
    S: PersistenceStore,
    G: Send + Sync,
    B: StoreBuilder<S, G>,
    Fu: Future<Output = anyhow::Result<()>>,
    TestFn: Fn(S) -> Fu,
{
    let (_g, store) = builder.build().await?;
    test_fn(store).await
}
