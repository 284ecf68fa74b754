use anyerror::AnyError;

/// The operating system random source could not produce a seed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[derive(serde::Deserialize, serde::Serialize)]
#[error("random source unavailable: {source}")]
pub struct RandomSourceError {
    pub source: AnyError,
}

impl RandomSourceError {
    pub fn new(e: &(impl std::error::Error + 'static)) -> Self {
        Self {
            source: AnyError::new(e),
        }
    }
}
