//! Error types, one per file.
//!
//! Store operations return [`StoreError<E>`]: either the API specific rejection `E`, which is an
//! expected outcome the caller handles, or a [`StorageError`], which aborts the current operation.

mod append_entry_error;
mod concurrency_conflict;
mod draw_error;
mod lease_expired;
mod lease_unavailable;
mod notification_error;
mod random_source_error;
mod record_draw_error;
mod round_not_found;
mod selection_error;
mod storage_error;
mod store_error;
mod transition_error;
mod validation_error;

pub use append_entry_error::AppendEntryError;
pub use concurrency_conflict::ConcurrencyConflict;
pub use draw_error::DrawError;
pub use lease_expired::LeaseExpired;
pub use lease_unavailable::LeaseUnavailable;
pub use notification_error::NotificationError;
pub use random_source_error::RandomSourceError;
pub use record_draw_error::RecordDrawError;
pub use round_not_found::RoundNotFound;
pub use selection_error::SelectionError;
pub use storage_error::ErrorSubject;
pub use storage_error::ErrorVerb;
pub use storage_error::StorageError;
pub use storage_error::StorageIOError;
pub use store_error::StoreError;
pub use transition_error::TransitionError;
pub use validation_error::ValidationError;
