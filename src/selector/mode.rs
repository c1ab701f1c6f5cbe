//! Selection modes.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::selector::error::SelectError;

/// Algorithm used to pick a peer for each call.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectMode {
    /// Uniform random index.
    #[default]
    RandomSelect = 0,
    /// Cyclic cursor over the peer list.
    RoundRobin = 1,
    /// Jump consistent hash over caller supplied key material.
    ConsistentHash = 2,
    /// Smooth weighted round robin.
    WeightedRoundRobin = 3,
}

impl SelectMode {
    /// All recognized modes.
    pub const ALL: [SelectMode; 4] = [
        SelectMode::RandomSelect,
        SelectMode::RoundRobin,
        SelectMode::ConsistentHash,
        SelectMode::WeightedRoundRobin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SelectMode::RandomSelect => "RandomSelect",
            SelectMode::RoundRobin => "RoundRobin",
            SelectMode::ConsistentHash => "ConsistentHash",
            SelectMode::WeightedRoundRobin => "WeightedRoundRobin",
        }
    }
}

impl TryFrom<u8> for SelectMode {
    type Error = SelectError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(SelectMode::RandomSelect),
            1 => Ok(SelectMode::RoundRobin),
            2 => Ok(SelectMode::ConsistentHash),
            3 => Ok(SelectMode::WeightedRoundRobin),
            other => Err(SelectError::UnsupportedSelectMode(format!("#{}", other))),
        }
    }
}

impl fmt::Display for SelectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectMode {
    type Err = SelectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "RandomSelect" | "random_select" | "random" => Ok(SelectMode::RandomSelect),
            "RoundRobin" | "round_robin" => Ok(SelectMode::RoundRobin),
            "ConsistentHash" | "consistent_hash" => Ok(SelectMode::ConsistentHash),
            "WeightedRoundRobin" | "weighted_round_robin" => Ok(SelectMode::WeightedRoundRobin),
            other => Err(SelectError::UnsupportedSelectMode(other.to_string())),
        }
    }
}
