use std::time::Duration;

use anyhow::Result;
use luckdraw::errors::DrawError;
use luckdraw::errors::StorageError;
use luckdraw::DrawOutcome;
use luckdraw::RoundStatus;
use luckdraw_memstore::Fault;
use luckdraw_memstore::StoreOperation;
use pretty_assertions::assert_eq;

use crate::fixtures::init_default_ut_tracing;
use crate::fixtures::wait_for_status;
use crate::fixtures::DrawCluster;

/// Failing discovery queries are logged and retried on later ticks; the loop keeps running.
#[async_entry::test(worker_threads = 8, init = "init_default_ut_tracing()", tracing_span = "debug")]
async fn scheduler_survives_store_failure() -> Result<()> {
    let cluster = DrawCluster::new();
    let r1 = cluster.replica("r1");

    cluster.faults().set_fault(StoreOperation::FindDueForDraw, Fault::Fail);
    cluster.faults().set_fault(StoreOperation::FindStalled, Fault::Fail);

    let handle = r1.scheduler().spawn(true);

    let round = r1.open_round(Duration::from_secs(1), &["alice", "bob"]).await?;
    cluster.advance(Duration::from_secs(1));

    tracing::info!("--- nothing is drawn while the store fails");
    {
        let attempts = r1.scheduler().poll_once().await;
        assert!(attempts.is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(RoundStatus::Open, r1.registry.load(round.id).await?.status);
    }

    tracing::info!("--- the round is drawn once the store recovers");
    {
        cluster.faults().clear_all();
        wait_for_status(&r1.registry, round.id, RoundStatus::Settled, Duration::from_secs(5)).await?;
    }

    handle.shutdown().await;

    Ok(())
}

/// A draw interrupted by a store failure leaves the round `CLOSED`, and it is resumed later.
#[async_entry::test(worker_threads = 8, init = "init_default_ut_tracing()", tracing_span = "debug")]
async fn store_failure_mid_draw() -> Result<()> {
    let mut cluster = DrawCluster::new();
    let r1 = cluster.replica("r1");

    let round = r1.open_round(Duration::from_secs(1), &["alice", "bob"]).await?;
    cluster.advance(Duration::from_secs(1));

    cluster.faults().set_fault(StoreOperation::RecordDraw, Fault::Fail);

    let res = r1.executor.execute(round.id).await;
    assert!(matches!(res, Err(DrawError::Storage(StorageError::IO { .. }))), "{:?}", res);

    assert_eq!(RoundStatus::Closed, r1.registry.load(round.id).await?.status);
    assert!(cluster.store.draw_results().await.is_empty());
    assert!(cluster.drain_events().is_empty());

    cluster.faults().clear_all();
    cluster.advance(r1.config.stuck_round_threshold());

    let outcome = r1.executor.resume(round.id).await?;
    assert!(matches!(outcome, DrawOutcome::Settled(_)), "{}", outcome);
    assert_eq!(1, cluster.drain_events().len());

    Ok(())
}
