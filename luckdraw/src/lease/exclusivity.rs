use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ErrorSubject;
use crate::errors::ErrorVerb;
use crate::errors::LeaseExpired;
use crate::errors::LeaseUnavailable;
use crate::errors::StorageError;
use crate::errors::StoreError;
use crate::lease::Lease;
use crate::lease::LeaseGuard;
use crate::storage::timed;
use crate::storage::PersistenceStore;
use crate::time::Clock;
use crate::Config;
use crate::RoundId;

/// A TTL lease per round, built only on the store's conditional write.
///
/// Holding the lease of a round grants the exclusive right to run its draw. A holder that stops
/// renewing loses the lease at expiry, and another replica may then take over.
pub struct ExclusivityLease<S>
where S: PersistenceStore
{
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    holder: String,
    ttl: Duration,
    renew_interval: Duration,
    store_timeout: Duration,
}

impl<S> Clone for ExclusivityLease<S>
where S: PersistenceStore
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            holder: self.holder.clone(),
            ttl: self.ttl,
            renew_interval: self.renew_interval,
            store_timeout: self.store_timeout,
        }
    }
}

impl<S> fmt::Debug for ExclusivityLease<S>
where S: PersistenceStore
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusivityLease")
            .field("holder", &self.holder)
            .field("ttl", &self.ttl)
            .field("renew_interval", &self.renew_interval)
            .finish()
    }
}

impl<S> ExclusivityLease<S>
where S: PersistenceStore
{
    /// Leases are taken on behalf of `config.replica_id` with `config.lease_ttl`.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            store,
            clock,
            holder: config.replica_id.clone(),
            ttl: config.lease_ttl(),
            renew_interval: config.lease_renew_interval(),
            store_timeout: config.store_timeout(),
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Acquire the lease of `round_id` for `holder`, valid for `ttl`.
    ///
    /// Fails with [`LeaseUnavailable`] while any live lease exists on the round.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn acquire(
        &self,
        round_id: RoundId,
        holder: &str,
        ttl: Duration,
    ) -> Result<Lease, StoreError<LeaseUnavailable>> {
        let now = self.clock.now_ms();
        let ttl_ms = ttl.as_millis() as u64;

        let lease = timed(
            self.store_timeout,
            ErrorSubject::Lease(round_id),
            ErrorVerb::Write,
            self.store.try_acquire_lease(round_id, holder, ttl_ms, now),
        )
        .await?;

        tracing::debug!("acquired: {}", lease);
        Ok(lease)
    }

    /// Extend `lease` by the configured TTL from now.
    ///
    /// Fails with [`LeaseExpired`] if it expired or was taken over.
    #[tracing::instrument(level = "debug", skip(self, lease), fields(lease = %lease))]
    pub async fn renew(&self, lease: &Lease) -> Result<Lease, StoreError<LeaseExpired>> {
        let now = self.clock.now_ms();
        let ttl_ms = self.ttl.as_millis() as u64;

        timed(
            self.store_timeout,
            ErrorSubject::Lease(lease.round_id),
            ErrorVerb::Write,
            self.store.renew_lease(lease, ttl_ms, now),
        )
        .await
    }

    /// Give up `lease`. A lease that was already taken over is left untouched.
    #[tracing::instrument(level = "debug", skip(self, lease), fields(lease = %lease))]
    pub async fn release(&self, lease: &Lease) -> Result<(), StorageError> {
        let released = timed(
            self.store_timeout,
            ErrorSubject::Lease(lease.round_id),
            ErrorVerb::Delete,
            self.store.release_lease(lease),
        )
        .await?;

        if !released {
            tracing::info!("lease was already lost when releasing: {}", lease);
        }
        Ok(())
    }

    /// The stored lease record of `round_id`, live or not.
    pub async fn current(&self, round_id: RoundId) -> Result<Option<Lease>, StorageError> {
        timed(
            self.store_timeout,
            ErrorSubject::Lease(round_id),
            ErrorVerb::Read,
            self.store.get_lease(round_id),
        )
        .await
    }

    /// Acquire the lease of `round_id` for this replica and keep it alive in the background
    /// until the returned guard is released or dropped.
    pub async fn hold(&self, round_id: RoundId) -> Result<LeaseGuard<S>, StoreError<LeaseUnavailable>> {
        let lease = self.acquire(round_id, &self.holder, self.ttl).await?;
        Ok(LeaseGuard::spawn(self.clone(), lease, self.renew_interval))
    }
}
