use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::RoundId;
use crate::TimestampMs;

/// Length of a draw seed in bytes.
pub const SEED_LEN: usize = 32;

/// The randomness consumed by a draw, recorded verbatim for replay.
///
/// Serialized as a lower case hex string.
#[derive(Clone, Copy)]
#[derive(PartialEq, Eq, Hash)]
pub struct Seed(pub [u8; SEED_LEN]);

impl Seed {
    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seed({})", self.to_hex())
    }
}

impl FromStr for Seed {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut buf = [0u8; SEED_LEN];
        hex::decode_to_slice(s, &mut buf)?;
        Ok(Seed(buf))
    }
}

impl Serialize for Seed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Seed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The persisted outcome of a draw. At most one exists per round.
#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct DrawResult {
    pub round_id: RoundId,
    pub winning_sequence: u32,
    pub seed: Seed,
    pub algo_version: String,
    pub executed_at: TimestampMs,
}

impl fmt::Display for DrawResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DrawResult{{round:{}, winner_seq:{}, algo:{}, seed:{}}}",
            self.round_id, self.winning_sequence, self.algo_version, self.seed
        )
    }
}
