use crate::errors::RandomSourceError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum SelectionError {
    #[error("can not select a winner from an empty entry set")]
    NoEntries,

    #[error("unknown selection algorithm: {algo_version}")]
    UnknownAlgorithm { algo_version: String },

    #[error(transparent)]
    RandomSource(#[from] RandomSourceError),
}
