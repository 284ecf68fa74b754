use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use luckdraw::prize::RoundPrize;
use luckdraw::round::utc_date;
use luckdraw::Announcement;
use luckdraw::Announcer;
use luckdraw::Cadence;
use luckdraw::DrawOutcome;
use luckdraw::RoundSpec;
use pretty_assertions::assert_eq;
use tokio::time::Instant;

use crate::fixtures::init_default_ut_tracing;
use crate::fixtures::test_config;
use crate::fixtures::DrawCluster;
use crate::fixtures::RecordingNotifier;
use crate::fixtures::T0;

const DAY: u64 = 86_400_000;

/// Recurring rounds are opened when their period starts and no round of the cadence is
/// upcoming, and every opened round is announced.
#[async_entry::test(worker_threads = 8, init = "init_default_ut_tracing()", tracing_span = "debug")]
async fn open_recurring_rounds() -> Result<()> {
    let cluster = DrawCluster::new();
    let notifier = Arc::new(RecordingNotifier::default());
    let r1 = cluster.replica_with(test_config("r1"), notifier.clone());
    let policy = r1.config.prize_policy();

    let announcer = Announcer::new(r1.registry.clone(), notifier.clone(), &r1.config, [
        Cadence::Daily,
        Cadence::Weekly,
        Cadence::Monthly,
    ]);

    let mut opened = vec![];

    tracing::info!("--- an ordinary day opens only the daily round");
    {
        let tuesday = utc_date(T0 + DAY).ok_or_else(|| anyhow::anyhow!("date"))?;
        let rounds = announcer.open_due_rounds(tuesday).await;

        assert_eq!(vec![Some(Cadence::Daily)], rounds.iter().map(|r| r.cadence).collect::<Vec<_>>());
        assert_eq!(T0 + DAY, rounds[0].close_at);
        opened.extend(rounds);
    }

    tracing::info!("--- the first of a month on a Monday opens the weekly and monthly rounds");
    {
        let monday = utc_date(T0).ok_or_else(|| anyhow::anyhow!("date"))?;
        let rounds = announcer.open_due_rounds(monday).await;

        assert_eq!(
            vec![Some(Cadence::Weekly), Some(Cadence::Monthly)],
            rounds.iter().map(|r| r.cadence).collect::<Vec<_>>()
        );
        assert_eq!(T0 + 7 * DAY, rounds[0].close_at);
        assert_eq!(T0 + 31 * DAY, rounds[1].close_at);
        opened.extend(rounds);
    }

    tracing::info!("--- cadences with an upcoming round are left alone");
    {
        assert!(announcer.open_configured().await.is_empty());
        assert_eq!(3, r1.registry.upcoming(cluster.now()).await?.len());
    }

    let want = opened.into_iter().map(|r| Announcement::RoundOpened(RoundPrize::new(r, &policy))).collect::<Vec<_>>();
    assert_eq!(want, notifier.announcements());

    Ok(())
}

/// The overview lists the upcoming rounds with the prize pool they share.
#[async_entry::test(worker_threads = 8, init = "init_default_ut_tracing()", tracing_span = "debug")]
async fn publish_overview() -> Result<()> {
    let cluster = DrawCluster::new();
    let notifier = Arc::new(RecordingNotifier::default());
    let r1 = cluster.replica_with(test_config("r1"), notifier.clone());

    let announcer = Announcer::new(r1.registry.clone(), notifier.clone(), &r1.config, [Cadence::Daily]);

    let daily = announcer.ensure_open(Cadence::Daily).await?.ok_or_else(|| anyhow::anyhow!("daily round"))?;
    for p in ["alice", "bob", "carol"] {
        r1.registry.append_entry(daily.id, p).await?;
    }
    let one_off = r1.open_round(Duration::from_secs(3600), &["dave"]).await?;

    let overview = announcer.publish_overview().await?;

    // Ticket price 100, 10% commission.
    assert_eq!(
        vec![(one_off.id, 90), (daily.id, 270)],
        overview.rounds.iter().map(|r| (r.round.id, r.prize)).collect::<Vec<_>>()
    );
    assert_eq!(360, overview.total_prize);

    assert_eq!(Some(Announcement::Overview(overview)), notifier.announcements().last().cloned());

    Ok(())
}

/// The round opened by a draw of a recurring round is announced.
#[async_entry::test(worker_threads = 8, init = "init_default_ut_tracing()", tracing_span = "debug")]
async fn successor_is_announced() -> Result<()> {
    let cluster = DrawCluster::new();
    let notifier = Arc::new(RecordingNotifier::default());
    let r1 = cluster.replica_with(test_config("r1"), notifier.clone());

    let spec = RoundSpec::new(T0 + DAY).with_cadence(Cadence::Daily);
    let round = r1.open_round_with(spec, &["alice", "bob"]).await?;
    cluster.advance(Duration::from_millis(DAY));

    let outcome = r1.executor.execute(round.id).await?;
    assert!(matches!(outcome, DrawOutcome::Settled(_)), "{}", outcome);
    assert_eq!(1, notifier.events().len());

    let announcements = notifier.announcements();
    assert_eq!(1, announcements.len());

    match &announcements[0] {
        Announcement::RoundOpened(opened) => {
            assert_eq!(Some(round.id), opened.round.predecessor);
            assert_eq!(T0 + 2 * DAY, opened.round.close_at);
            assert_eq!(0, opened.prize);
        }
        other => anyhow::bail!("expect a round opened, got: {}", other),
    }

    Ok(())
}

/// The background loop opens the rounds due today and announces the overview on every tick.
#[async_entry::test(worker_threads = 8, init = "init_default_ut_tracing()", tracing_span = "debug")]
async fn announce_loop() -> Result<()> {
    let cluster = DrawCluster::new();
    let notifier = Arc::new(RecordingNotifier::default());

    let mut config = test_config("r1");
    config.announce_interval = 20;
    let r1 = cluster.replica_with(config, notifier.clone());

    let handle = Announcer::new(r1.registry.clone(), notifier.clone(), &r1.config, [Cadence::Daily]).spawn();

    let deadline = Instant::now() + Duration::from_secs(3);
    let overview = loop {
        let found = notifier.announcements().into_iter().find_map(|a| match a {
            Announcement::Overview(o) => Some(o),
            _ => None,
        });
        if let Some(o) = found {
            break o;
        }

        if Instant::now() >= deadline {
            anyhow::bail!("no overview announced: {:?}", notifier.announcements());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    handle.shutdown().await;

    assert_eq!(1, overview.rounds.len());
    assert_eq!(Some(Cadence::Daily), overview.rounds[0].round.cadence);
    assert!(
        matches!(&notifier.announcements()[0], Announcement::RoundOpened(r) if r.round.cadence == Some(Cadence::Daily)),
        "the round is opened before the first overview"
    );

    Ok(())
}
