use std::time::Duration;

use anyhow::Result;
use luckdraw::DrawOutcome;
use luckdraw::RoundStatus;
use luckdraw::SkipReason;
use pretty_assertions::assert_eq;

use crate::fixtures::init_default_ut_tracing;
use crate::fixtures::DrawCluster;

/// A live lease keeps other replicas out; an expired one does not.
#[async_entry::test(worker_threads = 8, init = "init_default_ut_tracing()", tracing_span = "debug")]
async fn lease_exclusion_and_expiry() -> Result<()> {
    let cluster = DrawCluster::new();
    let r1 = cluster.replica("r1");
    let r2 = cluster.replica("r2");

    let round = r1.open_round(Duration::from_secs(1), &["alice"]).await?;
    cluster.advance(Duration::from_secs(1));

    tracing::info!("--- r1 holds the lease and stops responding");
    let ttl = r1.executor.leases().ttl();
    let held = r1.executor.leases().acquire(round.id, "r1", ttl).await?;
    assert_eq!(1, held.token);

    tracing::info!("--- r2 is kept out while the lease is live");
    {
        let outcome = r2.executor.execute(round.id).await?;
        match outcome {
            DrawOutcome::Skipped(SkipReason::LeaseUnavailable(e)) => {
                assert_eq!("r1", e.holder);
                assert_eq!(held.expires_at, e.expires_at);
            }
            other => anyhow::bail!("expect lease unavailable, got: {}", other),
        }
        assert_eq!(RoundStatus::Open, r2.registry.load(round.id).await?.status);

        // The holder itself can not acquire twice either.
        let res = r1.executor.leases().acquire(round.id, "r1", ttl).await;
        assert!(res.is_err());
    }

    tracing::info!("--- after expiry r2 takes over");
    {
        cluster.advance(ttl);

        let outcome = r2.executor.execute(round.id).await?;
        assert!(matches!(outcome, DrawOutcome::Settled(_)), "{}", outcome);

        let lease = r2.executor.leases().current(round.id).await?.expect("lease record is kept");
        assert_eq!("r2", lease.holder);
        assert_eq!(2, lease.token, "fencing token grows");
        assert!(!lease.is_live(cluster.now()), "released");
    }

    tracing::info!("--- the stale holder's release does not touch the new record");
    {
        r1.executor.leases().release(&held).await?;
        let lease = r2.executor.leases().current(round.id).await?.expect("lease record is kept");
        assert_eq!("r2", lease.holder);
    }

    Ok(())
}
