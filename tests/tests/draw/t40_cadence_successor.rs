use std::time::Duration;

use anyhow::Result;
use luckdraw::Cadence;
use luckdraw::DrawOutcome;
use luckdraw::RoundSpec;
use luckdraw::RoundStatus;
use pretty_assertions::assert_eq;

use crate::fixtures::init_default_ut_tracing;
use crate::fixtures::DrawCluster;
use crate::fixtures::T0;

const DAY: u64 = 86_400_000;

/// A settled recurring round is succeeded by one round closing at the next boundary.
#[async_entry::test(worker_threads = 8, init = "init_default_ut_tracing()", tracing_span = "debug")]
async fn settled_round_is_succeeded() -> Result<()> {
    let cluster = DrawCluster::new();
    let r1 = cluster.replica("r1");

    let spec = RoundSpec::new(T0 + DAY).with_capacity(100).with_cadence(Cadence::Daily);
    let round = r1.open_round_with(spec, &["alice", "bob"]).await?;

    cluster.advance(Duration::from_millis(DAY));

    let outcome = r1.executor.execute(round.id).await?;
    assert!(matches!(outcome, DrawOutcome::Settled(_)), "{}", outcome);

    let upcoming = r1.registry.upcoming(cluster.now()).await?;
    assert_eq!(1, upcoming.len());

    let successor = &upcoming[0];
    assert_eq!(RoundStatus::Open, successor.status);
    assert_eq!(T0 + 2 * DAY, successor.close_at, "midnight after the predecessor's close day");
    assert_eq!(Some(round.id), successor.predecessor);
    assert_eq!(Some(Cadence::Daily), successor.cadence);
    assert_eq!(Some(100), successor.capacity);
    assert_eq!(0, successor.entry_count);

    tracing::info!("--- the successor is drawn in turn");
    {
        r1.registry.append_entry(successor.id, "carol").await?;
        cluster.advance(Duration::from_millis(DAY));

        let outcome = r1.executor.execute(successor.id).await?;
        assert!(matches!(outcome, DrawOutcome::Settled(_)), "{}", outcome);

        let next = r1.registry.upcoming(cluster.now()).await?;
        assert_eq!(1, next.len());
        assert_eq!(Some(successor.id), next[0].predecessor);
        assert_eq!(T0 + 3 * DAY, next[0].close_at);
    }

    Ok(())
}

/// A cancelled recurring round is succeeded too.
#[async_entry::test(worker_threads = 8, init = "init_default_ut_tracing()", tracing_span = "debug")]
async fn cancelled_round_is_succeeded() -> Result<()> {
    let cluster = DrawCluster::new();
    let r1 = cluster.replica("r1");

    // T0 is a Monday: the weekly round closes on the next Monday.
    let spec = RoundSpec::new(T0 + 7 * DAY).with_cadence(Cadence::Weekly);
    let round = r1.open_round_with(spec, &[]).await?;

    cluster.advance(Duration::from_millis(7 * DAY));

    let successor_id = match r1.executor.execute(round.id).await? {
        DrawOutcome::Cancelled {
            round_id,
            successor: Some(successor),
        } => {
            assert_eq!(round.id, round_id);
            successor
        }
        other => anyhow::bail!("expect cancelled with a successor, got: {}", other),
    };

    let successor = r1.registry.load(successor_id).await?;
    assert_eq!(T0 + 14 * DAY, successor.close_at);
    assert_eq!(Some(round.id), successor.predecessor);
    assert_eq!(Some(Cadence::Weekly), successor.cadence);

    tracing::info!("--- exactly one successor exists");
    {
        let rounds = cluster.store.rounds().await;
        let successors: Vec<_> = rounds.iter().filter(|r| r.predecessor == Some(round.id)).collect();
        assert_eq!(1, successors.len());
    }

    Ok(())
}
