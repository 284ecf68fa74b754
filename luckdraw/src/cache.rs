use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::round::Round;
use crate::RoundId;
use crate::TimestampMs;

/// A per-process, TTL bounded cache of rounds, keyed by round id.
///
/// It is never authoritative: a cached round may be stale by up to `ttl_ms`. Decisions that
/// require the latest state read the store.
#[derive(Debug)]
pub struct RoundCache {
    ttl_ms: u64,
    capacity: usize,
    slots: Mutex<BTreeMap<RoundId, Slot>>,
}

#[derive(Debug, Clone)]
struct Slot {
    round: Round,
    expires_at: TimestampMs,
}

impl RoundCache {
    /// A `ttl_ms` or `capacity` of 0 disables caching.
    pub fn new(ttl_ms: u64, capacity: usize) -> Self {
        Self {
            ttl_ms,
            capacity,
            slots: Mutex::new(BTreeMap::new()),
        }
    }

    fn is_disabled(&self) -> bool {
        self.ttl_ms == 0 || self.capacity == 0
    }

    fn slots(&self) -> MutexGuard<'_, BTreeMap<RoundId, Slot>> {
        // A panic while holding the lock can not leave a slot half written.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, round_id: RoundId, now: TimestampMs) -> Option<Round> {
        let mut slots = self.slots();

        let slot = slots.get(&round_id)?;
        if slot.expires_at <= now {
            slots.remove(&round_id);
            return None;
        }
        Some(slot.round.clone())
    }

    /// Cache `round` unless a newer version of it is cached already.
    pub fn put(&self, round: Round, now: TimestampMs) {
        if self.is_disabled() {
            return;
        }

        let mut slots = self.slots();

        if let Some(cached) = slots.get(&round.id) {
            if cached.round.version > round.version && cached.expires_at > now {
                return;
            }
        }

        if !slots.contains_key(&round.id) && slots.len() >= self.capacity {
            Self::evict(&mut slots, now);
        }

        slots.insert(round.id, Slot {
            round,
            expires_at: now.saturating_add(self.ttl_ms),
        });
    }

    pub fn invalidate(&self, round_id: RoundId) {
        self.slots().remove(&round_id);
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired slots; if none expired, drop the one closest to expiry.
    fn evict(slots: &mut BTreeMap<RoundId, Slot>, now: TimestampMs) {
        let before = slots.len();
        slots.retain(|_, s| s.expires_at > now);
        if slots.len() < before {
            return;
        }

        let oldest = slots.iter().min_by_key(|(_, s)| s.expires_at).map(|(id, _)| *id);
        if let Some(id) = oldest {
            slots.remove(&id);
        }
    }
}
