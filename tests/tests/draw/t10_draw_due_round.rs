use std::time::Duration;

use anyhow::Result;
use luckdraw::selection::replay;
use luckdraw::DrawOutcome;
use luckdraw::RoundSpec;
use luckdraw::RoundStatus;
use luckdraw::SkipReason;
use maplit::btreeset;
use pretty_assertions::assert_eq;

use crate::fixtures::init_default_ut_tracing;
use crate::fixtures::DrawCluster;
use crate::fixtures::T0;

/// A due round with entries is closed, drawn, settled and announced exactly once.
#[async_entry::test(worker_threads = 8, init = "init_default_ut_tracing()", tracing_span = "debug")]
async fn draw_due_round() -> Result<()> {
    let mut cluster = DrawCluster::new();
    let r1 = cluster.replica("r1");

    let round = r1.open_round(Duration::from_secs(60), &["alice", "bob", "carol"]).await?;
    assert_eq!(3, round.entry_count);

    tracing::info!("--- a round is not drawn before its close time");
    {
        let outcome = r1.executor.execute(round.id).await?;
        assert_eq!(DrawOutcome::Skipped(SkipReason::NotDue), outcome);
        assert_eq!(RoundStatus::Open, r1.registry.load(round.id).await?.status);
    }

    cluster.advance(Duration::from_secs(60));

    tracing::info!("--- draw the due round");
    let event = match r1.executor.execute(round.id).await? {
        DrawOutcome::Settled(event) => event,
        other => anyhow::bail!("expect settled, got: {}", other),
    };

    assert!(btreeset! {"alice", "bob", "carol"}.contains(event.winner.as_str()));
    assert_eq!(round.id, event.round_id);
    assert_eq!(round.id, event.draw_result_id);
    assert_eq!(3, event.entry_count);
    assert_eq!(270, event.prize, "3 tickets at 100, 10% commission");
    assert_eq!(T0 + 60_000, event.executed_at);

    let settled = r1.registry.load(round.id).await?;
    assert_eq!(RoundStatus::Settled, settled.status);

    tracing::info!("--- the persisted result can be replayed from the frozen entries");
    {
        let result = r1.registry.get_draw_result(round.id).await?.expect("result is recorded");
        assert_eq!(event.winning_sequence, result.winning_sequence);
        assert_eq!(event.seed, result.seed);
        assert_eq!(event.algo_version, result.algo_version);

        let entries = r1.registry.entries(round.id).await?;
        let sequences: Vec<u32> = entries.iter().map(|e| e.sequence).collect();
        assert_eq!(vec![0, 1, 2], sequences);

        let replayed = replay(&sequences, &result.seed, &result.algo_version)?;
        assert_eq!(result.winning_sequence, replayed);

        let winner = &entries[replayed as usize];
        assert_eq!(winner.participant_id, event.winner);
        assert_eq!(winner.id, event.winning_entry_id);
    }

    assert_eq!(vec![event], cluster.drain_events());

    tracing::info!("--- another attempt on the settled round changes nothing");
    {
        let outcome = r1.executor.execute(round.id).await?;
        assert_eq!(
            DrawOutcome::Skipped(SkipReason::AlreadyAdvanced(RoundStatus::Settled)),
            outcome
        );
        assert!(cluster.drain_events().is_empty());
        assert_eq!(1, cluster.store.draw_results().await.len());
    }

    Ok(())
}

/// A round filled to its capacity is drawn once it closes.
#[async_entry::test(worker_threads = 8, init = "init_default_ut_tracing()", tracing_span = "debug")]
async fn draw_full_round() -> Result<()> {
    let cluster = DrawCluster::new();
    let r1 = cluster.replica("r1");

    let participants: Vec<String> = (0..10).map(|i| format!("p{}", i)).collect();
    let participants: Vec<&str> = participants.iter().map(|p| p.as_str()).collect();

    let spec = RoundSpec::new(cluster.now() + 1_000).with_capacity(10);
    let round = r1.open_round_with(spec, &participants).await?;
    assert!(round.is_full());

    cluster.advance(Duration::from_secs(1));

    let outcome = r1.executor.execute(round.id).await?;
    assert!(matches!(outcome, DrawOutcome::Settled(_)), "{}", outcome);

    assert_eq!(1, cluster.store.draw_results().await.len());
    assert_eq!(RoundStatus::Settled, r1.registry.load(round.id).await?.status);

    Ok(())
}
