//! Periodic discovery and dispatch of draw attempts.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tracing::Instrument;
use tracing::Level;
use tracing::Span;

use crate::errors::DrawError;
use crate::executor::DrawExecutor;
use crate::executor::DrawOutcome;
use crate::notifier::ResultNotifier;
use crate::storage::PersistenceStore;
use crate::Config;
use crate::RoundId;

/// The join handle of one dispatched draw attempt.
pub type Attempt = JoinHandle<Result<DrawOutcome, DrawError>>;

/// Finds due and stalled rounds every `poll_interval` and dispatches one task per round.
///
/// It keeps no memory of earlier ticks: every tick derives the work from the store, and a
/// round dispatched twice is a harmless no-op the second time.
pub struct DrawScheduler<S, N>
where
    S: PersistenceStore,
    N: ResultNotifier,
{
    executor: Arc<DrawExecutor<S, N>>,
    poll_interval: Duration,
    stuck_round_threshold: Duration,
}

/// Controls a running [`DrawScheduler`] loop.
pub struct SchedulerHandle {
    enabled: Arc<AtomicBool>,
    join_handle: JoinHandle<()>,
}

impl<S, N> DrawScheduler<S, N>
where
    S: PersistenceStore,
    N: ResultNotifier,
{
    pub fn new(executor: Arc<DrawExecutor<S, N>>, config: &Config) -> Self {
        Self {
            executor,
            poll_interval: config.poll_interval(),
            stuck_round_threshold: config.stuck_round_threshold(),
        }
    }

    pub fn executor(&self) -> &Arc<DrawExecutor<S, N>> {
        &self.executor
    }

    /// Start the poll loop in a background task.
    pub fn spawn(self, enabled: bool) -> SchedulerHandle {
        let enabled = Arc::new(AtomicBool::from(enabled));

        let span = tracing::span!(parent: &Span::current(), Level::DEBUG, "draw-scheduler");
        let join_handle = tokio::spawn(self.poll_loop(enabled.clone()).instrument(span));

        SchedulerHandle { enabled, join_handle }
    }

    async fn poll_loop(self, enabled: Arc<AtomicBool>) {
        let mut i: u64 = 0;
        loop {
            let at = Instant::now() + self.poll_interval;
            sleep_until(at).await;

            if !enabled.load(Ordering::Relaxed) {
                continue;
            }

            i += 1;
            let attempts = self.poll_once().await;
            tracing::debug!("tick {}: dispatched {} attempts", i, attempts.len());
        }
    }

    /// Run one tick: dispatch an attempt for every due round and a resumption for every
    /// stalled one.
    ///
    /// It does not wait for the attempts. A failed query is logged and left to the next tick.
    pub async fn poll_once(&self) -> Vec<Attempt> {
        let registry = self.executor.registry();
        let now = registry.now();

        let mut attempts = vec![];

        match registry.find_due_for_draw(now).await {
            Ok(rounds) => {
                for round in rounds {
                    attempts.push(self.dispatch(round.id, false));
                }
            }
            Err(e) => {
                tracing::error!("failed to find due rounds, retry next tick: {}", e);
            }
        }

        match registry.find_stalled(now, self.stuck_round_threshold).await {
            Ok(rounds) => {
                for round in rounds {
                    tracing::info!("found stalled round: {}", round);
                    attempts.push(self.dispatch(round.id, true));
                }
            }
            Err(e) => {
                tracing::error!("failed to find stalled rounds, retry next tick: {}", e);
            }
        }

        attempts
    }

    fn dispatch(&self, round_id: RoundId, resume: bool) -> Attempt {
        let executor = self.executor.clone();

        let span = tracing::span!(Level::DEBUG, "draw-attempt", round_id = round_id, resume = resume);
        tokio::spawn(
            async move {
                if resume {
                    executor.resume(round_id).await
                } else {
                    executor.execute(round_id).await
                }
            }
            .instrument(span),
        )
    }
}

impl SchedulerHandle {
    /// Pause or resume polling. A paused loop keeps running but dispatches nothing.
    pub fn enable(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Stop the loop. Attempts already dispatched run to completion.
    pub async fn shutdown(self) {
        self.join_handle.abort();
        let _ = self.join_handle.await;
    }
}
