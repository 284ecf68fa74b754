use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::errors::LeaseExpired;
use crate::errors::LeaseUnavailable;
use crate::HolderId;
use crate::RoundId;
use crate::TimestampMs;

/// The coordination record that grants one holder exclusive draw rights on a round.
///
/// A store keeps at most one record per round. A released record stays in place with an expiry
/// in the past, so that the fencing `token` keeps growing across acquisitions.
#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct Lease {
    pub round_id: RoundId,
    pub holder: HolderId,

    /// Incremented by every successful acquisition of this round's lease.
    pub token: u64,

    pub expires_at: TimestampMs,
}

impl Lease {
    pub fn is_live(&self, now: TimestampMs) -> bool {
        now < self.expires_at
    }

    /// Whether `other` is the same grant: same holder and fencing token.
    pub fn is_same_grant(&self, other: &Lease) -> bool {
        self.round_id == other.round_id && self.holder == other.holder && self.token == other.token
    }

    /// Decide whether `holder` may acquire the lease of `round_id`, given the stored record.
    ///
    /// Any live record refuses the acquisition, including one owned by `holder` itself.
    pub fn grant(
        round_id: RoundId,
        existing: Option<&Lease>,
        holder: &str,
        ttl_ms: u64,
        now: TimestampMs,
    ) -> Result<Lease, LeaseUnavailable> {
        let token = match existing {
            Some(l) if l.is_live(now) => {
                return Err(LeaseUnavailable {
                    round_id,
                    holder: l.holder.clone(),
                    expires_at: l.expires_at,
                });
            }
            Some(l) => l.token + 1,
            None => 1,
        };

        Ok(Lease {
            round_id,
            holder: holder.to_string(),
            token,
            expires_at: now.saturating_add(ttl_ms),
        })
    }

    /// Decide whether `lease` may be extended, given the stored record.
    ///
    /// Only the live grant identified by holder and token can be extended.
    pub fn extend(existing: Option<&Lease>, lease: &Lease, ttl_ms: u64, now: TimestampMs) -> Result<Lease, LeaseExpired> {
        match existing {
            Some(l) if l.is_same_grant(lease) && l.is_live(now) => Ok(Lease {
                expires_at: now.saturating_add(ttl_ms),
                ..l.clone()
            }),
            _ => Err(LeaseExpired {
                round_id: lease.round_id,
                holder: lease.holder.clone(),
                token: lease.token,
            }),
        }
    }

    /// The record to store when this grant is released.
    pub fn released(&self) -> Lease {
        Lease {
            expires_at: 0,
            ..self.clone()
        }
    }
}

impl fmt::Display for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Lease{{round:{}, holder:{}, token:{}, expires_at:{}}}",
            self.round_id, self.holder, self.token, self.expires_at
        )
    }
}
