use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ConcurrencyConflict;
use crate::errors::DrawError;
use crate::errors::LeaseUnavailable;
use crate::errors::RecordDrawError;
use crate::errors::RoundNotFound;
use crate::errors::SelectionError;
use crate::errors::StoreError;
use crate::errors::TransitionError;
use crate::errors::ValidationError;
use crate::lease::ExclusivityLease;
use crate::lease::LeaseGuard;
use crate::notifier::Announcement;
use crate::notifier::DrawCompletedEvent;
use crate::notifier::ResultNotifier;
use crate::prize::PrizePolicy;
use crate::prize::RoundPrize;
use crate::registry::RoundRegistry;
use crate::round::DrawResult;
use crate::round::Entry;
use crate::round::Round;
use crate::round::RoundStatus;
use crate::selection::select_winner;
use crate::selection::SeedSource;
use crate::storage::PersistenceStore;
use crate::storage::StatusUpdate;
use crate::Config;
use crate::RoundId;

/// Why a draw attempt stopped without changing anything it did not own.
#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
pub enum SkipReason {
    /// Another holder owns the round's lease.
    LeaseUnavailable(LeaseUnavailable),

    /// The round is not due for drawing, or not stalled long enough to be resumed.
    NotDue,

    /// Another attempt moved the round past the step this one expected.
    AlreadyAdvanced(RoundStatus),

    /// Another attempt changed the round first.
    LostRace(ConcurrencyConflict),

    /// The lease expired or was taken over before the next irreversible step.
    LeaseLost,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::LeaseUnavailable(e) => write!(f, "lease unavailable: {}", e),
            SkipReason::NotDue => write!(f, "not due"),
            SkipReason::AlreadyAdvanced(status) => write!(f, "already advanced to {}", status),
            SkipReason::LostRace(c) => write!(f, "lost race: {}", c),
            SkipReason::LeaseLost => write!(f, "lease lost"),
        }
    }
}

/// How a draw attempt ended.
#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
pub enum DrawOutcome {
    /// The round is settled and the event was handed to the notifier.
    Settled(DrawCompletedEvent),

    /// The round had no entries and was cancelled.
    Cancelled {
        round_id: RoundId,
        successor: Option<RoundId>,
    },

    /// A result for the round had been recorded by another attempt.
    AlreadyDrawn { round_id: RoundId },

    Skipped(SkipReason),
}

impl fmt::Display for DrawOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawOutcome::Settled(e) => write!(f, "settled: {}", e),
            DrawOutcome::Cancelled { round_id, successor } => {
                write!(f, "cancelled: round {}, successor {:?}", round_id, successor)
            }
            DrawOutcome::AlreadyDrawn { round_id } => write!(f, "already drawn: round {}", round_id),
            DrawOutcome::Skipped(r) => write!(f, "skipped: {}", r),
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[derive(PartialEq, Eq)]
enum Mode {
    /// Draw an `OPEN` round whose close time passed.
    Execute,

    /// Continue a `CLOSED` or `DRAWN` round whose attempt stalled.
    Resume,
}

/// Runs the draw of one round under its lease.
///
/// The steps are: close the round, read the frozen entries, select the winner, record the
/// result together with the `DRAWN` status, settle the round and publish the event. Every step
/// is a version checked write, so an attempt that lost its lease or raced another attempt stops
/// at its next write.
pub struct DrawExecutor<S, N>
where
    S: PersistenceStore,
    N: ResultNotifier,
{
    registry: Arc<RoundRegistry<S>>,
    leases: ExclusivityLease<S>,
    notifier: Arc<N>,
    seeds: Arc<dyn SeedSource>,
    prize: PrizePolicy,
    stuck_round_threshold: Duration,
}

impl<S, N> DrawExecutor<S, N>
where
    S: PersistenceStore,
    N: ResultNotifier,
{
    pub fn new(
        registry: Arc<RoundRegistry<S>>,
        notifier: Arc<N>,
        seeds: Arc<dyn SeedSource>,
        config: &Config,
    ) -> Self {
        let leases = ExclusivityLease::new(registry.store().clone(), registry.clock().clone(), config);

        Self {
            registry,
            leases,
            notifier,
            seeds,
            prize: config.prize_policy(),
            stuck_round_threshold: config.stuck_round_threshold(),
        }
    }

    pub fn registry(&self) -> &Arc<RoundRegistry<S>> {
        &self.registry
    }

    pub fn leases(&self) -> &ExclusivityLease<S> {
        &self.leases
    }

    /// Draw a round believed to be due.
    ///
    /// A round that is no longer `OPEN` is left alone.
    #[tracing::instrument(level = "debug", skip(self), fields(holder = %self.leases.holder()))]
    pub async fn execute(&self, round_id: RoundId) -> Result<DrawOutcome, DrawError> {
        self.attempt(round_id, Mode::Execute).await
    }

    /// Continue a round left `CLOSED` or `DRAWN` by an attempt that did not finish.
    #[tracing::instrument(level = "debug", skip(self), fields(holder = %self.leases.holder()))]
    pub async fn resume(&self, round_id: RoundId) -> Result<DrawOutcome, DrawError> {
        self.attempt(round_id, Mode::Resume).await
    }

    async fn attempt(&self, round_id: RoundId, mode: Mode) -> Result<DrawOutcome, DrawError> {
        let guard = match self.leases.hold(round_id).await {
            Ok(g) => g,
            Err(StoreError::Rejected(e)) => {
                tracing::debug!("skip round {}: {}", round_id, e);
                return Ok(DrawOutcome::Skipped(SkipReason::LeaseUnavailable(e)));
            }
            Err(StoreError::Storage(e)) => return Err(e.into()),
        };

        let res = self.run_locked(&guard, round_id, mode).await;

        if let Err(e) = guard.release().await {
            tracing::warn!("failed to release lease of round {}, it will expire: {}", round_id, e);
        }

        match &res {
            Ok(outcome @ DrawOutcome::Skipped(_)) => tracing::debug!("round {} {:?}: {}", round_id, mode, outcome),
            Ok(outcome) => tracing::info!("round {} {:?}: {}", round_id, mode, outcome),
            Err(e) => tracing::warn!("round {} {:?} failed: {}", round_id, mode, e),
        }
        res
    }

    async fn run_locked(&self, guard: &LeaseGuard<S>, round_id: RoundId, mode: Mode) -> Result<DrawOutcome, DrawError> {
        let round = self.registry.load(round_id).await.map_err(not_found)?;
        let now = self.registry.now();

        match (mode, round.status) {
            (Mode::Execute, RoundStatus::Open) => {
                if !round.is_due(now) {
                    return Ok(DrawOutcome::Skipped(SkipReason::NotDue));
                }

                let closed = match self.transition(&round, RoundStatus::Closed).await? {
                    ControlFlow::Continue(update) => update.round,
                    ControlFlow::Break(outcome) => return Ok(outcome),
                };
                self.draw(guard, closed).await
            }
            (Mode::Resume, RoundStatus::Closed) | (Mode::Resume, RoundStatus::Drawn) => {
                let stalled_before = now.saturating_sub(self.stuck_round_threshold.as_millis() as u64);
                if round.updated_at > stalled_before {
                    return Ok(DrawOutcome::Skipped(SkipReason::NotDue));
                }

                tracing::info!("resuming stalled round: {}", round);

                if round.status == RoundStatus::Closed {
                    self.draw(guard, round).await
                } else {
                    self.settle_recorded(guard, round).await
                }
            }
            (_, status) => Ok(DrawOutcome::Skipped(SkipReason::AlreadyAdvanced(status))),
        }
    }

    /// Draw a `CLOSED` round.
    async fn draw(&self, guard: &LeaseGuard<S>, closed: Round) -> Result<DrawOutcome, DrawError> {
        if guard.is_lost() {
            return Ok(DrawOutcome::Skipped(SkipReason::LeaseLost));
        }

        let entries = self.registry.entries(closed.id).await?;

        if entries.is_empty() {
            tracing::warn!("round {} closed without entries, cancelling", closed.id);

            let update = match self.transition(&closed, RoundStatus::Cancelled).await? {
                ControlFlow::Continue(update) => update,
                ControlFlow::Break(outcome) => return Ok(outcome),
            };
            self.announce_successor(&update).await;

            return Ok(DrawOutcome::Cancelled {
                round_id: update.round.id,
                successor: update.successor.map(|r| r.id),
            });
        }

        let sequences: Vec<u32> = entries.iter().map(|e| e.sequence).collect();

        let selection = select_winner(&sequences, self.seeds.as_ref()).map_err(|e| match e {
            SelectionError::RandomSource(e) => DrawError::RandomSource(e),
            other => inconsistent(closed.id, other),
        })?;

        let result = DrawResult {
            round_id: closed.id,
            winning_sequence: selection.winning_sequence,
            seed: selection.seed,
            algo_version: selection.algo_version.to_string(),
            executed_at: self.registry.now(),
        };

        if guard.is_lost() {
            return Ok(DrawOutcome::Skipped(SkipReason::LeaseLost));
        }

        let drawn = match self.registry.record_draw(closed.version, &result).await {
            Ok(round) => round,
            Err(StoreError::Rejected(e)) => {
                return match e {
                    RecordDrawError::AlreadyDrawn { round_id } => Ok(DrawOutcome::AlreadyDrawn { round_id }),
                    RecordDrawError::Conflict(c) => Ok(DrawOutcome::Skipped(SkipReason::LostRace(c))),
                    RecordDrawError::Invalid(ValidationError::IllegalTransition { from, .. }) => {
                        Ok(DrawOutcome::Skipped(SkipReason::AlreadyAdvanced(from)))
                    }
                    RecordDrawError::Invalid(e) => Err(inconsistent(closed.id, e)),
                    RecordDrawError::NotFound(e) => Err(e.into()),
                };
            }
            Err(StoreError::Storage(e)) => return Err(e.into()),
        };

        self.settle(guard, drawn, result, entries).await
    }

    /// Settle a `DRAWN` round whose result was recorded by an earlier attempt.
    async fn settle_recorded(&self, guard: &LeaseGuard<S>, drawn: Round) -> Result<DrawOutcome, DrawError> {
        let result = self.registry.get_draw_result(drawn.id).await?;
        let result = result.ok_or_else(|| inconsistent(drawn.id, "DRAWN without a draw result"))?;

        let entries = self.registry.entries(drawn.id).await?;
        self.settle(guard, drawn, result, entries).await
    }

    async fn settle(
        &self,
        guard: &LeaseGuard<S>,
        drawn: Round,
        result: DrawResult,
        entries: Vec<Entry>,
    ) -> Result<DrawOutcome, DrawError> {
        let winner = entries.iter().find(|e| e.sequence == result.winning_sequence).ok_or_else(|| {
            inconsistent(
                drawn.id,
                format!("winning sequence {} is not an entry", result.winning_sequence),
            )
        })?;

        if guard.is_lost() {
            return Ok(DrawOutcome::Skipped(SkipReason::LeaseLost));
        }

        let update = match self.transition(&drawn, RoundStatus::Settled).await? {
            ControlFlow::Continue(update) => update,
            ControlFlow::Break(outcome) => return Ok(outcome),
        };

        let entry_count = entries.len() as u32;
        let event = DrawCompletedEvent {
            round_id: drawn.id,
            winning_entry_id: winner.id,
            winning_sequence: winner.sequence,
            winner: winner.participant_id.clone(),
            draw_result_id: result.round_id,
            seed: result.seed,
            algo_version: result.algo_version,
            entry_count,
            prize: self.prize.prize(entry_count),
            executed_at: result.executed_at,
        };

        if let Err(e) = self.notifier.publish(event.clone()).await {
            tracing::error!("round {} is settled but the notification failed: {}", drawn.id, e);
        }

        self.announce_successor(&update).await;

        Ok(DrawOutcome::Settled(event))
    }

    /// Announce the round opened by a terminal transition, if any.
    async fn announce_successor(&self, update: &StatusUpdate) {
        let Some(successor) = &update.successor else {
            return;
        };

        let opened = Announcement::RoundOpened(RoundPrize::new(successor.clone(), &self.prize));
        if let Err(e) = self.notifier.announce(opened).await {
            tracing::warn!("failed to announce successor {} of round {}: {}", successor.id, update.round.id, e);
        }
    }

    /// Apply a status transition; a rejected one ends the attempt with the returned outcome.
    async fn transition(
        &self,
        round: &Round,
        to: RoundStatus,
    ) -> Result<ControlFlow<DrawOutcome, StatusUpdate>, DrawError> {
        match self.registry.transition_status(round.id, round.version, to).await {
            Ok(update) => Ok(ControlFlow::Continue(update)),
            Err(StoreError::Rejected(e)) => match e {
                TransitionError::Conflict(c) => Ok(ControlFlow::Break(DrawOutcome::Skipped(SkipReason::LostRace(c)))),
                TransitionError::Invalid(ValidationError::IllegalTransition { from, .. }) => {
                    Ok(ControlFlow::Break(DrawOutcome::Skipped(SkipReason::AlreadyAdvanced(from))))
                }
                TransitionError::Invalid(e) => Err(inconsistent(round.id, e)),
                TransitionError::NotFound(e) => Err(e.into()),
            },
            Err(StoreError::Storage(e)) => Err(e.into()),
        }
    }
}

fn not_found(e: StoreError<RoundNotFound>) -> DrawError {
    match e {
        StoreError::Rejected(e) => e.into(),
        StoreError::Storage(e) => e.into(),
    }
}

fn inconsistent(round_id: RoundId, reason: impl ToString) -> DrawError {
    DrawError::Inconsistent {
        round_id,
        reason: reason.to_string(),
    }
}
