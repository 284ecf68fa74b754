use anyerror::AnyError;

/// Error variants related to configuration.
#[derive(Debug, thiserror::Error)]
#[derive(PartialEq, Eq)]
pub enum ConfigError {
    #[error("ParseError: {source} while parsing ({args:?})")]
    ParseError { source: AnyError, args: Vec<String> },

    #[error("{name} must be > 0")]
    ZeroDuration { name: &'static str },

    #[error("stuck_round_threshold({stuck_round_threshold}) must be >= lease_ttl({lease_ttl})")]
    StuckThresholdLTLeaseTTL { stuck_round_threshold: u64, lease_ttl: u64 },

    #[error("commission_percent must be in 1..=99, got {commission_percent}")]
    InvalidCommission { commission_percent: u8 },

    #[error("replica_id must not be empty")]
    EmptyReplicaId,
}
