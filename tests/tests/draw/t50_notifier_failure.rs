use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use luckdraw::DrawOutcome;
use luckdraw::RoundStatus;
use luckdraw::SkipReason;
use pretty_assertions::assert_eq;

use crate::fixtures::init_default_ut_tracing;
use crate::fixtures::test_config;
use crate::fixtures::DrawCluster;
use crate::fixtures::FailingNotifier;

/// A notification failure does not undo or repeat a committed draw.
#[async_entry::test(worker_threads = 8, init = "init_default_ut_tracing()", tracing_span = "debug")]
async fn notifier_failure_keeps_draw() -> Result<()> {
    let cluster = DrawCluster::new();

    let notifier = Arc::new(FailingNotifier::default());
    let r1 = cluster.replica_with(test_config("r1"), notifier.clone());

    let round = r1.open_round(Duration::from_secs(1), &["alice", "bob"]).await?;
    cluster.advance(Duration::from_secs(1));

    let outcome = r1.executor.execute(round.id).await?;
    assert!(matches!(outcome, DrawOutcome::Settled(_)), "{}", outcome);

    assert_eq!(1, *notifier.attempts.lock().unwrap());
    assert_eq!(RoundStatus::Settled, r1.registry.load(round.id).await?.status);
    assert!(r1.registry.get_draw_result(round.id).await?.is_some());

    tracing::info!("--- the settled round is not drawn again");
    {
        let _ = r1.executor.execute(round.id).await?;
        assert_eq!(1, *notifier.attempts.lock().unwrap());
        assert_eq!(1, cluster.store.draw_results().await.len());
    }

    tracing::info!("--- a settled round is never resumed, so the event is not published again");
    {
        cluster.advance(r1.config.stuck_round_threshold());

        let attempts = r1.scheduler().poll_once().await;
        assert!(attempts.is_empty());

        let outcome = r1.executor.resume(round.id).await?;
        assert_eq!(DrawOutcome::Skipped(SkipReason::AlreadyAdvanced(RoundStatus::Settled)), outcome);
        assert_eq!(1, *notifier.attempts.lock().unwrap());
    }

    Ok(())
}
