use std::future::Future;

use async_trait::async_trait;

use crate::errors::StorageError;
use crate::storage::PersistenceStore;

/// Builds a fresh, empty store for every test of the [`Suite`](crate::testing::Suite).
///
/// `G` is a guard that owns resources the store depends on, e.g. a temporary directory. It is
/// dropped after the test.
#[async_trait]
pub trait StoreBuilder<S, G = ()>: Send + Sync
where
    S: PersistenceStore,
    G: Send + Sync,
{
    async fn build(&self) -> Result<(G, S), StorageError>;
}

/// Use a closure as a [`StoreBuilder`]: `Suite::test_all(|| async { MyStore::new() })`.
#[async_trait]
impl<S, Fu, F> StoreBuilder<S, ()> for F
where
    S: PersistenceStore,
    Fu: Future<Output = S> + Send,
    F: Fn() -> Fu + Sync + Send,
{
    async fn build(&self) -> Result<((), S), StorageError> {
        Ok(((), (self)().await))
    }
}
