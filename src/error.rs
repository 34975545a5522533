use thiserror::Error;

use crate::chain::{BlockHeight, ChainError, Point};

#[derive(Error, Debug)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("inconsistent database state at height {height}: {reason}")]
    Inconsistent {
        height: BlockHeight,
        reason: Inconsistency,
    },

    #[error("block {0} was delivered without its body")]
    MissingBody(Point),

    #[error("transaction aggregates of block {0} overflow")]
    AggregateOverflow(Point),

    #[error("{field} value {value} does not fit the storage column")]
    OutOfRange { field: &'static str, value: u64 },

    #[error("chain reverted past the {depth} most recent blocks being tracked")]
    ReorgTooDeep { depth: usize },

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("{0}")]
    Custom(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inconsistency {
    /// The mirror holds a height the chain has no block for
    MissingOnChain,
    /// The block stored at the height is not the one the chain has there
    HashMismatch,
}

impl std::fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingOnChain => f.write_str("chain has no block at the stored tip height"),
            Self::HashMismatch => f.write_str("stored tip hash differs from the chain"),
        }
    }
}

impl Error {
    pub fn custom(error: impl std::fmt::Display) -> Error {
        Error::Custom(format!("{error}"))
    }

    /// Errors that mean the mirror can no longer be trusted and processing must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Inconsistent { .. } | Error::ReorgTooDeep { .. })
    }
}
