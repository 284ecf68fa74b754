//! Scheduled announcements: opening recurring rounds and the prize pool overview.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::task::JoinHandle;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tracing::Instrument;
use tracing::Level;
use tracing::Span;

use crate::errors::StorageError;
use crate::errors::StoreError;
use crate::errors::ValidationError;
use crate::notifier::Announcement;
use crate::notifier::ResultNotifier;
use crate::prize::Overview;
use crate::prize::PrizePolicy;
use crate::prize::RoundPrize;
use crate::registry::RoundRegistry;
use crate::round::utc_date;
use crate::round::Cadence;
use crate::round::Round;
use crate::round::RoundSpec;
use crate::storage::PersistenceStore;
use crate::Config;

/// Keeps a round open for each configured cadence and periodically announces the overview of
/// upcoming rounds.
///
/// A recurring round is normally opened by the terminal transition of its predecessor. The
/// announcer opens the first round of a cadence, and a new one whenever a period starts without
/// any upcoming round of that cadence.
///
/// Opening is a read followed by a create, not one atomic write: two replicas announcing the same
/// cadence may both open a round. Run the cadences on one replica.
pub struct Announcer<S, N>
where
    S: PersistenceStore,
    N: ResultNotifier,
{
    registry: Arc<RoundRegistry<S>>,
    notifier: Arc<N>,
    prize: PrizePolicy,
    cadences: BTreeSet<Cadence>,
    interval: Duration,
}

/// Controls a running [`Announcer`] loop.
pub struct AnnouncerHandle {
    join_handle: JoinHandle<()>,
}

impl<S, N> Announcer<S, N>
where
    S: PersistenceStore,
    N: ResultNotifier,
{
    pub fn new(
        registry: Arc<RoundRegistry<S>>,
        notifier: Arc<N>,
        config: &Config,
        cadences: impl IntoIterator<Item = Cadence>,
    ) -> Self {
        Self {
            registry,
            notifier,
            prize: config.prize_policy(),
            cadences: cadences.into_iter().collect(),
            interval: config.announce_interval(),
        }
    }

    pub fn cadences(&self) -> &BTreeSet<Cadence> {
        &self.cadences
    }

    /// Open and announce a round of `cadence` closing at its next boundary, unless one is
    /// already upcoming.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn ensure_open(&self, cadence: Cadence) -> Result<Option<Round>, StoreError<ValidationError>> {
        let now = self.registry.now();

        let upcoming = self.registry.upcoming(now).await?;
        if let Some(r) = upcoming.iter().find(|r| r.cadence == Some(cadence)) {
            tracing::debug!("a {} round is already upcoming: {}", cadence, r);
            return Ok(None);
        }

        let close_at = cadence
            .next_close_at(now)
            .ok_or(StoreError::Rejected(ValidationError::NoBoundary { cadence, after: now }))?;

        let round = self.registry.create_round(RoundSpec::new(close_at).with_cadence(cadence)).await?;

        let opened = Announcement::RoundOpened(RoundPrize::new(round.clone(), &self.prize));
        self.announce(opened).await;

        Ok(Some(round))
    }

    /// Make sure every configured cadence has an upcoming round. Returns the rounds opened.
    pub async fn open_configured(&self) -> Vec<Round> {
        self.open(self.cadences.iter().copied()).await
    }

    /// Open the configured cadences whose period starts on `date`. Returns the rounds opened.
    pub async fn open_due_rounds(&self, date: NaiveDate) -> Vec<Round> {
        let due = Cadence::due_on(date);
        self.open(self.cadences.intersection(&due).copied()).await
    }

    async fn open(&self, cadences: impl Iterator<Item = Cadence>) -> Vec<Round> {
        let mut opened = vec![];

        for cadence in cadences {
            match self.ensure_open(cadence).await {
                Ok(Some(round)) => opened.push(round),
                Ok(None) => {}
                Err(e) => tracing::error!("failed to open a {} round, retry next tick: {}", cadence, e),
            }
        }

        opened
    }

    /// Announce the upcoming rounds and the prize pool they share.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn publish_overview(&self) -> Result<Overview, StorageError> {
        let overview = self.registry.overview(&self.prize).await?;
        self.announce(Announcement::Overview(overview.clone())).await;
        Ok(overview)
    }

    /// Run one tick: open the rounds whose period starts today, then announce the overview.
    pub async fn announce_once(&self) -> Vec<Round> {
        let now = self.registry.now();

        let opened = match utc_date(now) {
            Some(today) => self.open_due_rounds(today).await,
            None => {
                tracing::warn!("now {} has no calendar date, no round is opened", now);
                vec![]
            }
        };

        if let Err(e) = self.publish_overview().await {
            tracing::error!("failed to build the overview, retry next tick: {}", e);
        }

        opened
    }

    /// Start announcing every `announce_interval` in a background task.
    pub fn spawn(self) -> AnnouncerHandle {
        let span = tracing::span!(parent: &Span::current(), Level::DEBUG, "announcer");
        let join_handle = tokio::spawn(self.announce_loop().instrument(span));

        AnnouncerHandle { join_handle }
    }

    async fn announce_loop(self) {
        loop {
            let at = Instant::now() + self.interval;
            sleep_until(at).await;

            let opened = self.announce_once().await;
            tracing::debug!("opened {} rounds", opened.len());
        }
    }

    async fn announce(&self, announcement: Announcement) {
        if let Err(e) = self.notifier.announce(announcement).await {
            tracing::warn!("failed to announce: {}", e);
        }
    }
}

impl AnnouncerHandle {
    pub async fn shutdown(self) {
        self.join_handle.abort();
        let _ = self.join_handle.await;
    }
}
