//! Prize pool arithmetic.

use serde::Deserialize;
use serde::Serialize;

use crate::round::Round;

/// How the prize of a round is derived from its entries.
#[derive(Debug, Clone, Copy)]
#[derive(PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct PrizePolicy {
    /// Price of one entry in minor currency units.
    pub ticket_price: u64,

    /// Share of the pool kept by the operator.
    pub commission_percent: u8,
}

impl PrizePolicy {
    /// `entries * ticket_price * (100 - commission_percent) / 100`, rounded down.
    pub fn prize(&self, entries: u32) -> u64 {
        let kept = 100u128.saturating_sub(self.commission_percent as u128);
        let prize = entries as u128 * self.ticket_price as u128 * kept / 100;
        u64::try_from(prize).unwrap_or(u64::MAX)
    }
}

/// An open round with its current prize.
#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct RoundPrize {
    pub round: Round,
    pub prize: u64,
}

impl RoundPrize {
    pub fn new(round: Round, policy: &PrizePolicy) -> Self {
        Self {
            prize: policy.prize(round.entry_count),
            round,
        }
    }
}

/// The upcoming rounds and what they pay out so far.
#[derive(Debug, Clone, Default)]
#[derive(PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct Overview {
    pub rounds: Vec<RoundPrize>,
    pub total_prize: u64,
}

impl Overview {
    pub fn new(rounds: Vec<Round>, policy: &PrizePolicy) -> Self {
        let rounds: Vec<_> = rounds.into_iter().map(|round| RoundPrize::new(round, policy)).collect();

        let total_prize = rounds.iter().fold(0u64, |acc, r| acc.saturating_add(r.prize));

        Self { rounds, total_prize }
    }
}
