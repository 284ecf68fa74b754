use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use luckdraw::DrawOutcome;
use luckdraw::RoundStatus;
use luckdraw::SkipReason;
use pretty_assertions::assert_eq;

use crate::fixtures::init_default_ut_tracing;
use crate::fixtures::DrawCluster;

/// Several replicas attempt the same due round at once: exactly one of them draws it.
#[async_entry::test(worker_threads = 8, init = "init_default_ut_tracing()", tracing_span = "debug")]
async fn concurrent_executors_draw_once() -> Result<()> {
    let mut cluster = DrawCluster::new();
    let replicas: Vec<_> = (0..5).map(|i| cluster.replica(&format!("r{}", i))).collect();

    let round = replicas[0].open_round(Duration::from_secs(1), &["alice", "bob", "carol", "dave"]).await?;
    let round_id = round.id;
    cluster.advance(Duration::from_secs(1));

    let handles = replicas
        .iter()
        .map(|r| {
            let executor = r.executor.clone();
            tokio::spawn(async move { executor.execute(round_id).await })
        })
        .collect::<Vec<_>>();

    let mut settled = 0;
    for res in join_all(handles).await {
        let outcome = res??;
        tracing::info!("outcome: {}", outcome);

        match outcome {
            DrawOutcome::Settled(_) => settled += 1,
            DrawOutcome::Skipped(SkipReason::LeaseUnavailable(_)) => {}
            DrawOutcome::Skipped(SkipReason::AlreadyAdvanced(_)) => {}
            other => anyhow::bail!("unexpected outcome: {}", other),
        }
    }

    assert_eq!(1, settled);
    assert_eq!(1, cluster.store.draw_results().await.len());
    assert_eq!(1, cluster.drain_events().len());
    assert_eq!(RoundStatus::Settled, replicas[0].registry.load(round.id).await?.status);

    Ok(())
}

/// Replicas polling concurrently dispatch overlapping attempts for many rounds; every round is
/// drawn and announced exactly once.
#[async_entry::test(worker_threads = 8, init = "init_default_ut_tracing()", tracing_span = "debug")]
async fn concurrent_polls_draw_every_round_once() -> Result<()> {
    let n_rounds = 10;

    let mut cluster = DrawCluster::new();
    let replicas: Vec<_> = (0..4).map(|i| cluster.replica(&format!("r{}", i))).collect();

    let mut round_ids = BTreeSet::new();
    for i in 0..n_rounds {
        let close_in = Duration::from_secs(1 + i);
        let round = replicas[0].open_round(close_in, &["alice", "bob"]).await?;
        round_ids.insert(round.id);
    }

    cluster.advance(Duration::from_secs(n_rounds + 1));

    let schedulers: Vec<_> = replicas.iter().map(|r| r.scheduler()).collect();
    let attempts = join_all(schedulers.iter().map(|s| s.poll_once())).await;

    for attempt in attempts.into_iter().flatten() {
        let outcome = attempt.await??;
        tracing::info!("outcome: {}", outcome);
    }

    let drawn: BTreeSet<_> = cluster.store.draw_results().await.into_iter().map(|r| r.round_id).collect();
    assert_eq!(round_ids, drawn);

    let events = cluster.drain_events();
    assert_eq!(n_rounds as usize, events.len());
    let announced: BTreeSet<_> = events.iter().map(|e| e.round_id).collect();
    assert_eq!(round_ids, announced);

    for round in cluster.store.rounds().await {
        assert_eq!(RoundStatus::Settled, round.status, "{}", round);
    }

    Ok(())
}
