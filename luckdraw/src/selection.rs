//! Fair winner selection.
//!
//! A 32-byte seed keys a ChaCha20 stream. The stream yields 64-bit words; the first word inside
//! the largest multiple of `n` that fits in `2^64` is reduced modulo `n`. Every one of the `n`
//! entries therefore wins with probability exactly `1/n`.
//!
//! The seed and [`ALGORITHM_VERSION`] are stored with the draw result, so that anyone holding the
//! frozen entry list can [`replay`] the draw.

use std::collections::BTreeSet;
use std::sync::Mutex;

use rand::rngs::OsRng;
use rand::RngCore;
use rand::SeedableRng;
use rand::TryRngCore;
use rand_chacha::ChaCha20Rng;

use crate::errors::RandomSourceError;
use crate::errors::SelectionError;
use crate::round::Seed;
use crate::round::SEED_LEN;

/// Tag of the selection procedure implemented by [`select_winner`].
pub const ALGORITHM_VERSION: &str = "chacha20-rejection-v1";

/// Where draw seeds come from.
pub trait SeedSource: Send + Sync + 'static {
    fn next_seed(&self) -> Result<Seed, RandomSourceError>;
}

/// Seeds read from the operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSeedSource;

impl SeedSource for OsSeedSource {
    fn next_seed(&self) -> Result<Seed, RandomSourceError> {
        let mut buf = [0u8; SEED_LEN];
        OsRng.try_fill_bytes(&mut buf).map_err(|e| RandomSourceError::new(&e))?;
        Ok(Seed(buf))
    }
}

/// Seeds derived from a fixed number, for reproducible simulations.
///
/// Not suitable for real draws: the winners are predictable by anyone who knows the number.
#[derive(Debug)]
pub struct DeterministicSeedSource {
    rng: Mutex<ChaCha20Rng>,
}

impl DeterministicSeedSource {
    pub fn new(state: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::seed_from_u64(state)),
        }
    }
}

impl SeedSource for DeterministicSeedSource {
    fn next_seed(&self) -> Result<Seed, RandomSourceError> {
        let mut buf = [0u8; SEED_LEN];
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.fill_bytes(&mut buf);
        Ok(Seed(buf))
    }
}

/// The winner of a draw and the randomness it consumed.
#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
pub struct Selection {
    pub winning_sequence: u32,
    pub seed: Seed,
    pub algo_version: &'static str,
}

/// Select one winner among the entry `sequences`, with a fresh seed from `seeds`.
///
/// Duplicates are ignored and the order of `sequences` does not matter.
pub fn select_winner(sequences: &[u32], seeds: &dyn SeedSource) -> Result<Selection, SelectionError> {
    let candidates = normalize(sequences);
    if candidates.is_empty() {
        return Err(SelectionError::NoEntries);
    }

    let seed = seeds.next_seed()?;
    let index = pick_index(&seed, candidates.len() as u64);

    Ok(Selection {
        winning_sequence: candidates[index as usize],
        seed,
        algo_version: ALGORITHM_VERSION,
    })
}

/// Recompute the winner of a recorded draw.
pub fn replay(sequences: &[u32], seed: &Seed, algo_version: &str) -> Result<u32, SelectionError> {
    if algo_version != ALGORITHM_VERSION {
        return Err(SelectionError::UnknownAlgorithm {
            algo_version: algo_version.to_string(),
        });
    }

    let candidates = normalize(sequences);
    if candidates.is_empty() {
        return Err(SelectionError::NoEntries);
    }

    let index = pick_index(seed, candidates.len() as u64);
    Ok(candidates[index as usize])
}

fn normalize(sequences: &[u32]) -> Vec<u32> {
    sequences.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

/// A uniformly distributed index in `[0, n)`.
///
/// `n` must be > 0.
pub fn pick_index(seed: &Seed, n: u64) -> u64 {
    debug_assert!(n > 0);

    // `2^64 mod n`: this many of the largest words would bias the result.
    let rejected = (u64::MAX % n + 1) % n;
    let accept_max = u64::MAX - rejected;

    let mut rng = ChaCha20Rng::from_seed(seed.0);
    loop {
        let word = rng.next_u64();
        if word <= accept_max {
            return word % n;
        }
    }
}
