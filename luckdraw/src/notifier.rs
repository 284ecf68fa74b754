//! Delivery of completed draws to downstream consumers.
//!
//! The executor publishes once, right after the round is settled, and never again: a failed
//! publish is only logged and a settled round is not resumed. Retrying is up to the notifier, so
//! consumers of a retrying notifier deduplicate on [`DrawCompletedEvent::draw_result_id`].
//!
//! Besides results, a notifier receives [`Announcement`]s: newly opened rounds and the periodic
//! prize pool overview.

use std::fmt;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::errors::NotificationError;
use crate::prize::Overview;
use crate::prize::RoundPrize;
use crate::round::Seed;
use crate::EntryId;
use crate::ParticipantId;
use crate::RoundId;
use crate::TimestampMs;

/// Emitted once a round is settled.
#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct DrawCompletedEvent {
    pub round_id: RoundId,
    pub winning_entry_id: EntryId,
    pub winning_sequence: u32,
    pub winner: ParticipantId,

    /// The draw result is keyed by round, so this equals `round_id`.
    pub draw_result_id: RoundId,

    pub seed: Seed,
    pub algo_version: String,
    pub entry_count: u32,
    pub prize: u64,
    pub executed_at: TimestampMs,
}

impl fmt::Display for DrawCompletedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DrawCompleted{{round:{}, winner:{}, entry:{}, seq:{}, entries:{}, prize:{}}}",
            self.round_id, self.winner, self.winning_entry_id, self.winning_sequence, self.entry_count, self.prize
        )
    }
}

/// A message about rounds that is not the result of a draw.
#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub enum Announcement {
    /// A round started accepting entries.
    RoundOpened(RoundPrize),

    /// The upcoming rounds and the prize pool they share.
    Overview(Overview),
}

impl fmt::Display for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Announcement::RoundOpened(r) => write!(f, "RoundOpened{{{}, prize:{}}}", r.round, r.prize),
            Announcement::Overview(o) => write!(f, "Overview{{rounds:{}, total:{}}}", o.rounds.len(), o.total_prize),
        }
    }
}

#[async_trait::async_trait]
pub trait ResultNotifier: Send + Sync + 'static {
    async fn publish(&self, event: DrawCompletedEvent) -> Result<(), NotificationError>;

    /// Deliver an announcement.
    ///
    /// Notifiers that only forward draw results keep this default, which drops it.
    async fn announce(&self, announcement: Announcement) -> Result<(), NotificationError> {
        tracing::debug!("announcement dropped: {}", announcement);
        Ok(())
    }
}

/// Announces results through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl LogNotifier {
    /// The public announcement of a draw.
    pub fn announcement(event: &DrawCompletedEvent) -> String {
        format!(
            "Round #{} is drawn: {} entries, prize {}. Winning ticket #{} belongs to {}. Seed {} ({}).",
            event.round_id,
            event.entry_count,
            event.prize,
            event.winning_sequence,
            event.winner,
            event.seed,
            event.algo_version
        )
    }

    /// The private message to the winner.
    pub fn winner_message(event: &DrawCompletedEvent) -> String {
        format!(
            "Congratulations {}, your ticket #{} won round #{}. Prize: {}.",
            event.winner, event.winning_sequence, event.round_id, event.prize
        )
    }

    pub fn round_opened_message(opened: &RoundPrize) -> String {
        let round = &opened.round;
        let kind = match round.cadence {
            Some(c) => c.to_string(),
            None => "one-off".to_string(),
        };

        format!(
            "Round #{} ({}) is open. The winner is drawn at {}. Prize so far: {}.",
            round.id,
            kind,
            format_time(round.close_at),
            opened.prize
        )
    }

    pub fn overview_message(overview: &Overview) -> String {
        format!(
            "{} upcoming rounds share a prize pool of {}.",
            overview.rounds.len(),
            overview.total_prize
        )
    }
}

fn format_time(ts: TimestampMs) -> String {
    let at = i64::try_from(ts).ok().and_then(DateTime::<Utc>::from_timestamp_millis);
    match at {
        Some(at) => at.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => format!("{}ms", ts),
    }
}

#[async_trait::async_trait]
impl ResultNotifier for LogNotifier {
    async fn publish(&self, event: DrawCompletedEvent) -> Result<(), NotificationError> {
        tracing::info!(round_id = event.round_id, "{}", Self::announcement(&event));
        tracing::info!(round_id = event.round_id, winner = display(&event.winner), "{}", Self::winner_message(&event));
        Ok(())
    }

    async fn announce(&self, announcement: Announcement) -> Result<(), NotificationError> {
        match announcement {
            Announcement::RoundOpened(opened) => {
                tracing::info!(round_id = opened.round.id, "{}", Self::round_opened_message(&opened));
            }
            Announcement::Overview(overview) => {
                tracing::info!("{}", Self::overview_message(&overview));
                for r in &overview.rounds {
                    tracing::info!(round_id = r.round.id, "{}", Self::round_opened_message(r));
                }
            }
        }
        Ok(())
    }
}

/// Forwards draw events to a channel. Announcements are dropped.
///
/// Publishing fails once the receiving end is dropped.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<DrawCompletedEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DrawCompletedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl ResultNotifier for ChannelNotifier {
    async fn publish(&self, event: DrawCompletedEvent) -> Result<(), NotificationError> {
        self.tx.send(event).map_err(|e| NotificationError::new(&e))
    }
}
