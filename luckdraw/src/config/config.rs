//! Replica runtime configuration.

use std::time::Duration;

use anyerror::AnyError;
use clap::Parser;
use serde::Deserialize;
use serde::Serialize;

use crate::config::error::ConfigError;
use crate::prize::PrizePolicy;

/// The runtime configuration of a draw replica.
///
/// Every replica of a deployment should run with the same `lease_ttl` and
/// `stuck_round_threshold`, otherwise one replica may consider a round stalled while the lease
/// of another one is still live.
///
/// Keep this inequality in mind when tuning: `poll_interval ≪ lease_ttl ≤ stuck_round_threshold`.
/// A lease is renewed every `lease_ttl / 3` while a draw is in progress; a round that stays
/// `CLOSED` or `DRAWN` for longer than `stuck_round_threshold` is resumed by whichever replica
/// polls next.
#[derive(Clone, Debug, Serialize, Deserialize, Parser)]
pub struct Config {
    /// The identifier of this replica, used verbatim as its lease holder id.
    #[clap(long, env = "LUCKDRAW_REPLICA_ID", default_value = "replica-0")]
    pub replica_id: String,

    /// How often the scheduler looks for due and stalled rounds, in milliseconds.
    #[clap(long, env = "LUCKDRAW_POLL_INTERVAL", default_value = "1000")]
    pub poll_interval: u64,

    /// Lifetime of a draw lease before it implicitly expires, in milliseconds.
    #[clap(long, env = "LUCKDRAW_LEASE_TTL", default_value = "30000")]
    pub lease_ttl: u64,

    /// Age after which a `CLOSED` or `DRAWN` round is eligible for resumption, in milliseconds.
    #[clap(long, env = "LUCKDRAW_STUCK_ROUND_THRESHOLD", default_value = "60000")]
    pub stuck_round_threshold: u64,

    /// Upper bound of a single persistence call, in milliseconds.
    #[clap(long, env = "LUCKDRAW_STORE_TIMEOUT", default_value = "5000")]
    pub store_timeout: u64,

    /// How long a round stays in the per-process cache, in milliseconds. `0` disables the cache.
    #[clap(long, env = "LUCKDRAW_CACHE_TTL", default_value = "5000")]
    pub cache_ttl: u64,

    /// The maximum number of rounds kept in the per-process cache.
    #[clap(long, env = "LUCKDRAW_CACHE_CAPACITY", default_value = "10000")]
    pub cache_capacity: usize,

    /// How many times an entry append is re-read and retried after a version conflict.
    #[clap(long, env = "LUCKDRAW_CONFLICT_RETRIES", default_value = "1")]
    pub conflict_retries: u32,

    /// The price of one entry, in minor currency units.
    #[clap(long, env = "LUCKDRAW_TICKET_PRICE", default_value = "100")]
    pub ticket_price: u64,

    /// The share of the pool kept as commission, in percent.
    #[clap(long, env = "LUCKDRAW_COMMISSION_PERCENT", default_value = "10")]
    pub commission_percent: u8,

    /// How often recurring rounds are opened and the prize pool overview is announced, in
    /// milliseconds.
    #[clap(long, env = "LUCKDRAW_ANNOUNCE_INTERVAL", default_value = "86400000")]
    pub announce_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        <Self as Parser>::parse_from(Vec::<&'static str>::new())
    }
}

impl Config {
    /// Parse a config from command line style arguments and validate it.
    ///
    /// The first argument is the program name, as with `std::env::args()`.
    pub fn build(args: &[&str]) -> Result<Config, ConfigError> {
        let config = <Self as Parser>::try_parse_from(args).map_err(|e| ConfigError::ParseError {
            source: AnyError::new(&e),
            args: args.iter().map(|x| x.to_string()).collect(),
        })?;
        config.validate()
    }

    /// Validate the state of this config.
    pub fn validate(self) -> Result<Config, ConfigError> {
        if self.poll_interval == 0 {
            return Err(ConfigError::ZeroDuration { name: "poll_interval" });
        }

        if self.lease_ttl == 0 {
            return Err(ConfigError::ZeroDuration { name: "lease_ttl" });
        }

        if self.store_timeout == 0 {
            return Err(ConfigError::ZeroDuration { name: "store_timeout" });
        }

        if self.announce_interval == 0 {
            return Err(ConfigError::ZeroDuration { name: "announce_interval" });
        }

        if self.stuck_round_threshold < self.lease_ttl {
            return Err(ConfigError::StuckThresholdLTLeaseTTL {
                stuck_round_threshold: self.stuck_round_threshold,
                lease_ttl: self.lease_ttl,
            });
        }

        if !(1..=99).contains(&self.commission_percent) {
            return Err(ConfigError::InvalidCommission {
                commission_percent: self.commission_percent,
            });
        }

        if self.replica_id.is_empty() {
            return Err(ConfigError::EmptyReplicaId);
        }

        Ok(self)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl)
    }

    /// The interval at which a held lease is renewed.
    pub fn lease_renew_interval(&self) -> Duration {
        Duration::from_millis((self.lease_ttl / 3).max(1))
    }

    pub fn stuck_round_threshold(&self) -> Duration {
        Duration::from_millis(self.stuck_round_threshold)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl)
    }

    pub fn announce_interval(&self) -> Duration {
        Duration::from_millis(self.announce_interval)
    }

    pub fn prize_policy(&self) -> PrizePolicy {
        PrizePolicy {
            ticket_price: self.ticket_price,
            commission_percent: self.commission_percent,
        }
    }
}
