use std::future::Future;
use std::time::Duration;

use crate::errors::ErrorSubject;
use crate::errors::ErrorVerb;
use crate::errors::StorageError;

/// Run a store call, failing with [`StorageError::Timeout`] if it does not finish in `timeout`.
pub(crate) async fn timed<T, E, F>(timeout: Duration, subject: ErrorSubject, verb: ErrorVerb, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<StorageError>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_elapsed) => {
            tracing::warn!("store call timed out after {:?}: {:?} {:?}", timeout, verb, subject);
            Err(StorageError::timeout(subject, verb, timeout).into())
        }
    }
}
