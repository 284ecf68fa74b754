use std::time::Duration;

use anyhow::Result;
use pretty_assertions::assert_eq;
use tokio::time::Instant;

use crate::fixtures::init_default_ut_tracing;
use crate::fixtures::DrawCluster;
use crate::fixtures::T0;

/// A held lease is renewed in the background, and reported lost once it expires.
#[async_entry::test(worker_threads = 8, init = "init_default_ut_tracing()", tracing_span = "debug")]
async fn lease_keep_alive() -> Result<()> {
    let round_id = 1;

    let cluster = DrawCluster::new();
    let r1 = cluster.replica("r1");
    let r2 = cluster.replica("r2");

    let ttl = r1.executor.leases().ttl();
    let ttl_ms = ttl.as_millis() as u64;

    let guard = r1.executor.leases().hold(round_id).await?;
    assert_eq!(r1.config.replica_id, guard.lease().holder, "the replica id is the holder id");
    assert_eq!(T0 + ttl_ms, guard.lease().expires_at);
    assert!(!guard.is_lost());

    tracing::info!("--- the keep-alive extends the lease from the current time");
    {
        cluster.advance(Duration::from_millis(500));

        let deadline = Instant::now() + Duration::from_secs(3);
        while guard.lease().expires_at != T0 + 500 + ttl_ms {
            if Instant::now() >= deadline {
                anyhow::bail!("lease is not renewed: {}", guard.lease());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!guard.is_lost());

        let res = r2.executor.leases().acquire(round_id, "r2", ttl).await;
        assert!(res.is_err(), "a renewed lease is still exclusive");
    }

    tracing::info!("--- once expired the guard is lost and another holder takes over");
    {
        cluster.advance(ttl * 2);
        assert!(guard.is_lost());

        let taken = r2.executor.leases().acquire(round_id, "r2", ttl).await?;
        assert_eq!(2, taken.token);

        guard.release().await?;

        let current = r2.executor.leases().current(round_id).await?;
        assert_eq!(Some(taken), current, "the lost holder's release does not touch the new grant");
    }

    Ok(())
}
