#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Identifier of a link inside one chain. `0` is reserved for "no link".
pub type LinkId = u32;

/// Identifier of an entry in the external action-image catalog. `0` means unbound.
pub type ActionRef = u32;

/// Identifier of a node in the external decision tree.
pub type NodeId = i64;

pub const NO_LINK: LinkId = 0;
pub const UNBOUND_ACTION: ActionRef = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct ChainId(i64);

impl ChainId {
    pub fn get(self) -> i64 {
        self.0
    }

    pub fn try_new(value: i64) -> Result<Self, ChainIdError> {
        if value <= 0 {
            return Err(ChainIdError::NotPositive);
        }
        Ok(Self(value))
    }
}

impl TryFrom<i64> for ChainId {
    type Error = ChainIdError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<ChainId> for i64 {
    fn from(value: ChainId) -> Self {
        value.0
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ChainId {
    type Err = ChainIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parsed = value
            .trim()
            .parse::<i64>()
            .map_err(|_| ChainIdError::NotANumber)?;
        Self::try_new(parsed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainIdError {
    NotANumber,
    NotPositive,
}

impl ChainIdError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::NotANumber => "chain id must be an integer",
            Self::NotPositive => "chain id must be positive",
        }
    }
}

impl std::fmt::Display for ChainIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for ChainIdError {}
