//! Fixtures for testing draw replicas.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Once;
use std::time::Duration;

use lazy_static::lazy_static;
use luckdraw::errors::NotificationError;
use luckdraw::notifier::ChannelNotifier;
use luckdraw::selection::OsSeedSource;
use luckdraw::selection::SeedSource;
use luckdraw::Announcement;
use luckdraw::Clock;
use luckdraw::Config;
use luckdraw::DrawCompletedEvent;
use luckdraw::DrawExecutor;
use luckdraw::DrawScheduler;
use luckdraw::ManualClock;
use luckdraw::ResultNotifier;
use luckdraw::Round;
use luckdraw::RoundId;
use luckdraw::RoundRegistry;
use luckdraw::RoundSpec;
use luckdraw::RoundStatus;
use luckdraw::TimestampMs;
use luckdraw_memstore::FaultConfig;
use luckdraw_memstore::MemStore;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tracing_appender::non_blocking::WorkerGuard;

use crate::fixtures::logging::init_file_logging;


/// 2024-01-01T00:00:00Z, a Monday.
pub const T0: TimestampMs = 1_704_067_200_000;

pub fn init_default_ut_tracing() {
    static START: Once = Once::new();

    START.call_once(|| {
        let mut g = GLOBAL_UT_LOG_GUARD.as_ref().lock().unwrap();
        *g = Some(init_global_tracing("ut", "_log", "DEBUG"));
    });
}

lazy_static! {
    static ref GLOBAL_UT_LOG_GUARD: Arc<Mutex<Option<WorkerGuard>>> = Arc::new(Mutex::new(None));
}

pub fn init_global_tracing(app_name: &str, dir: &str, level: &str) -> WorkerGuard {
    set_panic_hook();

    let (g, sub) = init_file_logging(app_name, dir, level);
    tracing::subscriber::set_global_default(sub).expect("error setting global tracing subscriber");

    tracing::info!("initialized global tracing: in {}/{} at {}", dir, app_name, level);
    g
}

pub fn set_panic_hook() {
    std::panic::set_hook(Box::new(|panic| {
        eprintln!("{}", panic);

        if let Some(location) = panic.location() {
            tracing::error!(
                message = %panic,
                panic.file = location.file(),
                panic.line = location.line(),
                panic.column = location.column(),
            );
        } else {
            tracing::error!(message = %panic);
        }
    }));
}

/// The config every test replica runs with, before per test tweaks.
///
/// Ticks are short real time intervals; round and lease times follow the cluster's manual clock.
pub fn test_config(replica_id: &str) -> Config {
    Config {
        replica_id: replica_id.to_string(),
        poll_interval: 20,
        lease_ttl: 1_000,
        stuck_round_threshold: 3_000,
        store_timeout: 200,
        cache_ttl: 60_000,
        conflict_retries: 1,
        ..Default::default()
    }
    .validate()
    .expect("invalid test config")
}

/// A notifier whose transport is always down.
#[derive(Debug, Default)]
pub struct FailingNotifier {
    pub attempts: Mutex<u32>,
}

#[luckdraw::async_trait::async_trait]
impl ResultNotifier for FailingNotifier {
    async fn publish(&self, _event: DrawCompletedEvent) -> Result<(), NotificationError> {
        *self.attempts.lock().unwrap() += 1;
        Err(NotificationError::from_string("transport is down"))
    }
}

/// A notifier that keeps everything it is given.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<DrawCompletedEvent>>,
    pub announcements: Mutex<Vec<Announcement>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<DrawCompletedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn announcements(&self) -> Vec<Announcement> {
        self.announcements.lock().unwrap().clone()
    }
}

#[luckdraw::async_trait::async_trait]
impl ResultNotifier for RecordingNotifier {
    async fn publish(&self, event: DrawCompletedEvent) -> Result<(), NotificationError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn announce(&self, announcement: Announcement) -> Result<(), NotificationError> {
        self.announcements.lock().unwrap().push(announcement);
        Ok(())
    }
}

/// One draw replica: its own registry with its own cache, executor and lease holder id.
pub struct Replica<N = ChannelNotifier>
where N: ResultNotifier
{
    pub config: Config,
    pub registry: Arc<RoundRegistry<MemStore>>,
    pub executor: Arc<DrawExecutor<MemStore, N>>,
}

impl<N> Replica<N>
where N: ResultNotifier
{
    pub fn scheduler(&self) -> DrawScheduler<MemStore, N> {
        DrawScheduler::new(self.executor.clone(), &self.config)
    }

    /// Create a round closing `close_in` from now and enter every participant once.
    pub async fn open_round(&self, close_in: Duration, participants: &[&str]) -> anyhow::Result<Round> {
        self.open_round_with(RoundSpec::new(self.registry.now() + close_in.as_millis() as u64), participants)
            .await
    }

    pub async fn open_round_with(&self, spec: RoundSpec, participants: &[&str]) -> anyhow::Result<Round> {
        let round = self.registry.create_round(spec).await?;
        for p in participants {
            self.registry.append_entry(round.id, p).await?;
        }
        Ok(self.registry.load(round.id).await?)
    }
}

/// Replicas sharing one store and one manually driven clock.
pub struct DrawCluster {
    pub store: Arc<MemStore>,
    pub clock: Arc<ManualClock>,
    pub notifier: ChannelNotifier,
    pub events: UnboundedReceiver<DrawCompletedEvent>,
}

impl DrawCluster {
    pub fn new() -> Self {
        Self::with_faults(FaultConfig::default())
    }

    pub fn with_faults(faults: FaultConfig) -> Self {
        let (notifier, events) = ChannelNotifier::new();
        Self {
            store: Arc::new(MemStore::with_faults(faults)),
            clock: Arc::new(ManualClock::new(T0)),
            notifier,
            events,
        }
    }

    pub fn faults(&self) -> &FaultConfig {
        self.store.faults()
    }

    pub fn now(&self) -> TimestampMs {
        self.clock.now_ms()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// A replica publishing to the cluster's event channel.
    pub fn replica(&self, replica_id: &str) -> Replica {
        self.replica_with(test_config(replica_id), Arc::new(self.notifier.clone()))
    }

    pub fn replica_with<N>(&self, config: Config, notifier: Arc<N>) -> Replica<N>
    where N: ResultNotifier {
        let seeds: Arc<dyn SeedSource> = Arc::new(OsSeedSource);
        self.replica_with_seeds(config, notifier, seeds)
    }

    pub fn replica_with_seeds<N>(&self, config: Config, notifier: Arc<N>, seeds: Arc<dyn SeedSource>) -> Replica<N>
    where N: ResultNotifier {
        let clock: Arc<dyn Clock> = self.clock.clone();
        let registry = Arc::new(RoundRegistry::new(self.store.clone(), clock, &config));
        let executor = Arc::new(DrawExecutor::new(registry.clone(), notifier, seeds, &config));

        Replica {
            config,
            registry,
            executor,
        }
    }

    /// Events published so far.
    pub fn drain_events(&mut self) -> Vec<DrawCompletedEvent> {
        let mut events = vec![];
        while let Ok(e) = self.events.try_recv() {
            events.push(e);
        }
        events
    }
}

/// Re-read the round every 10ms until it reaches `status`, or fail after `timeout`.
pub async fn wait_for_status(
    registry: &RoundRegistry<MemStore>,
    round_id: RoundId,
    status: RoundStatus,
    timeout: Duration,
) -> anyhow::Result<Round> {
    let deadline = Instant::now() + timeout;
    loop {
        let round = registry.load(round_id).await?;
        if round.status == status {
            return Ok(round);
        }

        if Instant::now() >= deadline {
            anyhow::bail!("timeout after {:?} waiting for round {} to be {}: {}", timeout, round_id, status, round);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
