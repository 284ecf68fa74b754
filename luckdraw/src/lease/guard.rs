use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tracing::Instrument;
use tracing::Level;
use tracing::Span;

use crate::errors::StorageError;
use crate::errors::StoreError;
use crate::lease::ExclusivityLease;
use crate::lease::Lease;
use crate::storage::PersistenceStore;

/// An acquired lease kept alive by a background task.
///
/// The task renews the lease every `renew_interval`. If a renewal is refused, or the lease
/// expires while the store is unreachable, the guard is marked lost and the task stops. Whoever
/// holds the guard must check [`LeaseGuard::is_lost`] before every irreversible step.
pub struct LeaseGuard<S>
where S: PersistenceStore
{
    leases: ExclusivityLease<S>,
    current: Arc<Mutex<Lease>>,
    lost: Arc<AtomicBool>,
    keep_alive: JoinHandle<()>,
}

impl<S> LeaseGuard<S>
where S: PersistenceStore
{
    pub(crate) fn spawn(leases: ExclusivityLease<S>, lease: Lease, renew_interval: Duration) -> Self {
        let current = Arc::new(Mutex::new(lease));
        let lost = Arc::new(AtomicBool::new(false));

        let span = tracing::span!(parent: &Span::current(), Level::DEBUG, "lease-keep-alive");
        let keep_alive = tokio::spawn(
            keep_alive(leases.clone(), current.clone(), lost.clone(), renew_interval).instrument(span),
        );

        Self {
            leases,
            current,
            lost,
            keep_alive,
        }
    }

    /// The latest renewed grant.
    pub fn lease(&self) -> Lease {
        lock(&self.current).clone()
    }

    /// The lease was refused a renewal, or has expired by the local clock.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire) || !self.lease().is_live(self.leases.now_ms())
    }

    /// Stop renewing and release the lease.
    pub async fn release(self) -> Result<(), StorageError> {
        self.keep_alive.abort();
        let lease = self.lease();
        self.leases.release(&lease).await
    }
}

impl<S> Drop for LeaseGuard<S>
where S: PersistenceStore
{
    fn drop(&mut self) {
        self.keep_alive.abort();
    }
}

fn lock(current: &Mutex<Lease>) -> std::sync::MutexGuard<'_, Lease> {
    current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn keep_alive<S>(leases: ExclusivityLease<S>, current: Arc<Mutex<Lease>>, lost: Arc<AtomicBool>, interval: Duration)
where S: PersistenceStore {
    loop {
        sleep_until(Instant::now() + interval).await;

        let lease = lock(&current).clone();

        match leases.renew(&lease).await {
            Ok(renewed) => {
                tracing::debug!("renewed: {}", renewed);
                *lock(&current) = renewed;
            }
            Err(StoreError::Rejected(e)) => {
                tracing::warn!("lease lost: {}", e);
                lost.store(true, Ordering::Release);
                return;
            }
            Err(StoreError::Storage(e)) => {
                tracing::warn!("failed to renew {}: {}", lease, e);
                if !lease.is_live(leases.now_ms()) {
                    tracing::warn!("lease expired while the store is unreachable: {}", lease);
                    lost.store(true, Ordering::Release);
                    return;
                }
            }
        }
    }
}
