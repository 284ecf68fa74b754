use std::time::Duration;

use anyhow::Result;
use luckdraw::DrawOutcome;
use luckdraw::RoundStatus;
use pretty_assertions::assert_eq;

use crate::fixtures::init_default_ut_tracing;
use crate::fixtures::DrawCluster;

/// A replica that closed a round and crashed leaves it `CLOSED`; another replica resumes it once
/// it is stalled for longer than the threshold.
#[async_entry::test(worker_threads = 8, init = "init_default_ut_tracing()", tracing_span = "debug")]
async fn resume_closed_round() -> Result<()> {
    let mut cluster = DrawCluster::new();
    let r1 = cluster.replica("r1");
    let r2 = cluster.replica("r2");

    let round = r1.open_round(Duration::from_secs(1), &["alice", "bob", "carol"]).await?;
    cluster.advance(Duration::from_secs(1));

    tracing::info!("--- r1 takes the lease, closes the round and crashes");
    {
        let ttl = r1.executor.leases().ttl();
        r1.executor.leases().acquire(round.id, "r1", ttl).await?;
        r1.registry.transition_status(round.id, round.version, RoundStatus::Closed).await?;
    }

    let s2 = r2.scheduler();

    tracing::info!("--- a fresh CLOSED round is neither due nor stalled");
    {
        let attempts = s2.poll_once().await;
        assert!(attempts.is_empty());

        let outcome = r2.executor.resume(round.id).await?;
        assert!(matches!(outcome, DrawOutcome::Skipped(_)), "{}", outcome);
    }

    tracing::info!("--- past the threshold the round is resumed");
    {
        cluster.advance(r2.config.stuck_round_threshold());

        let attempts = s2.poll_once().await;
        assert_eq!(1, attempts.len());

        let mut outcomes = vec![];
        for attempt in attempts {
            outcomes.push(attempt.await??);
        }

        let event = match &outcomes[0] {
            DrawOutcome::Settled(event) => event.clone(),
            other => anyhow::bail!("expect settled, got: {}", other),
        };
        assert_eq!(round.id, event.round_id);
        assert_eq!(vec![event], cluster.drain_events());
    }

    assert_eq!(RoundStatus::Settled, r2.registry.load(round.id).await?.status);
    assert_eq!(1, cluster.store.draw_results().await.len());

    Ok(())
}
