use std::fmt::Debug;

use crate::errors::StorageError;

/// Error returned by store and registry operations.
///
/// It wraps either an API specific rejection `E`, such as a version conflict or a validation
/// failure, or a [`StorageError`] meaning the operation did not complete.
///
/// ```ignore
/// match registry.append_entry(round_id, "alice").await {
///     Ok(entry) => { /* appended */ }
///     Err(StoreError::Rejected(e)) => { /* not appended, report `e` */ }
///     Err(StoreError::Storage(e)) => { /* store unavailable, try later */ }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum StoreError<E> {
    #[error(transparent)]
    Rejected(E),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl<E> StoreError<E>
where E: Debug
{
    pub fn into_rejection(self) -> Option<E> {
        match self {
            StoreError::Rejected(e) => Some(e),
            StoreError::Storage(_) => None,
        }
    }

    /// Convert the rejection with `f`, keeping storage errors as they are.
    pub fn map_rejection<F, E2>(self, f: F) -> StoreError<E2>
    where F: FnOnce(E) -> E2 {
        match self {
            StoreError::Rejected(e) => StoreError::Rejected(f(e)),
            StoreError::Storage(e) => StoreError::Storage(e),
        }
    }
}
