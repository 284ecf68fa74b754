use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use luckdraw::errors::DrawError;
use luckdraw::errors::RandomSourceError;
use luckdraw::selection::SeedSource;
use luckdraw::DrawOutcome;
use luckdraw::RoundStatus;
use luckdraw::Seed;
use pretty_assertions::assert_eq;

use crate::fixtures::init_default_ut_tracing;
use crate::fixtures::test_config;
use crate::fixtures::DrawCluster;

/// A random source that can not produce any seed.
struct ExhaustedSeedSource;

impl SeedSource for ExhaustedSeedSource {
    fn next_seed(&self) -> Result<Seed, RandomSourceError> {
        Err(RandomSourceError::new(&std::io::Error::other("entropy source unavailable")))
    }
}

/// Without randomness the round stays `CLOSED` with no result, and is drawn once resumed by a
/// replica with a working source.
#[async_entry::test(worker_threads = 8, init = "init_default_ut_tracing()", tracing_span = "debug")]
async fn random_source_failure() -> Result<()> {
    let mut cluster = DrawCluster::new();

    let seeds: Arc<dyn SeedSource> = Arc::new(ExhaustedSeedSource);
    let r1 = cluster.replica_with_seeds(test_config("r1"), Arc::new(cluster.notifier.clone()), seeds);
    let r2 = cluster.replica("r2");

    let round = r1.open_round(Duration::from_secs(1), &["alice", "bob"]).await?;
    cluster.advance(Duration::from_secs(1));

    tracing::info!("--- the draw stops after closing the round");
    {
        let res = r1.executor.execute(round.id).await;
        assert!(matches!(res, Err(DrawError::RandomSource(_))), "{:?}", res);

        assert_eq!(RoundStatus::Closed, r1.registry.load(round.id).await?.status);
        assert_eq!(None, r1.registry.get_draw_result(round.id).await?);
        assert!(cluster.drain_events().is_empty());
    }

    tracing::info!("--- the attempt released its lease");
    {
        let lease = r2.executor.leases().current(round.id).await?;
        let lease = lease.ok_or_else(|| anyhow::anyhow!("lease record is kept"))?;
        assert!(!lease.is_live(cluster.now()), "{}", lease);
    }

    tracing::info!("--- the stalled round is resumed and settled");
    {
        cluster.advance(r2.config.stuck_round_threshold());

        let outcome = r2.executor.resume(round.id).await?;
        let event = match outcome {
            DrawOutcome::Settled(event) => event,
            other => anyhow::bail!("expect settled, got: {}", other),
        };
        assert_eq!(round.id, event.round_id);
        assert_eq!(2, event.entry_count);
        assert_eq!(vec![event], cluster.drain_events());
    }

    assert_eq!(RoundStatus::Settled, r2.registry.load(round.id).await?.status);
    assert_eq!(1, cluster.store.draw_results().await.len());

    Ok(())
}
