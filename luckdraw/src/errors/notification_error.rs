use anyerror::AnyError;

/// A draw-completed event could not be delivered.
///
/// The draw stays committed; the failure is only logged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[derive(serde::Deserialize, serde::Serialize)]
#[error("failed to publish draw result: {source}")]
pub struct NotificationError {
    pub source: AnyError,
}

impl NotificationError {
    pub fn new(e: &(impl std::error::Error + 'static)) -> Self {
        Self {
            source: AnyError::new(e),
        }
    }

    pub fn from_string(msg: impl ToString) -> Self {
        Self {
            source: AnyError::error(msg),
        }
    }
}
