//! Exactly-once lottery draws across replicas that share one durable store.
//!
//! A [`DrawScheduler`] on every replica polls the shared [`PersistenceStore`] for rounds whose
//! close time has passed and hands each one to a [`DrawExecutor`]. The executor serializes work
//! on a round with an [`ExclusivityLease`], then closes the round, selects a winner with
//! [`selection::select_winner`], records the [`DrawResult`] and settles the round.
//!
//! An [`Announcer`] keeps recurring rounds open and announces the prize pool of the upcoming
//! rounds through the same [`ResultNotifier`].

mod announcer;
mod cache;
mod config;
mod executor;
mod registry;
mod scheduler;

pub mod errors;
pub mod lease;
pub mod notifier;
pub mod prize;
pub mod round;
pub mod selection;
pub mod storage;
pub mod testing;
pub mod time;

pub use anyerror;
pub use anyerror::AnyError;
pub use async_trait;

pub use crate::announcer::Announcer;
pub use crate::announcer::AnnouncerHandle;
pub use crate::cache::RoundCache;
pub use crate::config::Config;
pub use crate::config::ConfigError;
pub use crate::executor::DrawExecutor;
pub use crate::executor::DrawOutcome;
pub use crate::executor::SkipReason;
pub use crate::lease::ExclusivityLease;
pub use crate::lease::Lease;
pub use crate::lease::LeaseGuard;
pub use crate::notifier::Announcement;
pub use crate::notifier::DrawCompletedEvent;
pub use crate::notifier::ResultNotifier;
pub use crate::registry::RoundRegistry;
pub use crate::round::Cadence;
pub use crate::round::DrawResult;
pub use crate::round::Entry;
pub use crate::round::Round;
pub use crate::round::RoundSpec;
pub use crate::round::RoundStatus;
pub use crate::round::Seed;
pub use crate::scheduler::DrawScheduler;
pub use crate::scheduler::SchedulerHandle;
pub use crate::storage::PersistenceStore;
pub use crate::time::Clock;
pub use crate::time::ManualClock;
pub use crate::time::SystemClock;

/// Store assigned identifier of a round.
pub type RoundId = u64;

/// Store assigned identifier of an entry.
pub type EntryId = u64;

pub type ParticipantId = String;

/// Identifies the owner of a lease.
pub type HolderId = String;

/// Milliseconds since the Unix epoch.
pub type TimestampMs = u64;
