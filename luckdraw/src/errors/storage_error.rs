use std::fmt;
use std::time::Duration;

use anyerror::AnyError;
use serde::Deserialize;
use serde::Serialize;

use crate::RoundId;

/// What the store was operating on when an error occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSubject {
    /// A general store error.
    Store,

    /// A single round.
    Round(RoundId),

    /// A scan over rounds.
    Rounds,

    /// The entries of a round.
    Entries(RoundId),

    DrawResult(RoundId),

    Lease(RoundId),
}

/// What the store was doing when an error occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorVerb {
    Read,
    Write,
    Delete,
}

/// A failure reported by the storage backend.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageIOError {
    pub subject: ErrorSubject,
    pub verb: ErrorVerb,
    pub source: AnyError,
}

impl StorageIOError {
    pub fn new(subject: ErrorSubject, verb: ErrorVerb, source: AnyError) -> Self {
        Self { subject, verb, source }
    }
}

impl fmt::Display for StorageIOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "when {:?} {:?}: {}", self.verb, self.subject, self.source)
    }
}

/// The store is unavailable or did not answer in time.
///
/// The operation is aborted and retried on a later tick.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageError {
    #[error(transparent)]
    IO {
        #[from]
        source: StorageIOError,
    },

    #[error("timeout after {timeout:?} when {verb:?} {subject:?}")]
    Timeout {
        subject: ErrorSubject,
        verb: ErrorVerb,
        timeout: Duration,
    },
}

impl StorageError {
    pub fn read(subject: ErrorSubject, source: AnyError) -> Self {
        StorageIOError::new(subject, ErrorVerb::Read, source).into()
    }

    pub fn write(subject: ErrorSubject, source: AnyError) -> Self {
        StorageIOError::new(subject, ErrorVerb::Write, source).into()
    }

    pub fn timeout(subject: ErrorSubject, verb: ErrorVerb, timeout: Duration) -> Self {
        StorageError::Timeout { subject, verb, timeout }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StorageError::Timeout { .. })
    }
}
