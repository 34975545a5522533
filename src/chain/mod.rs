use std::{fmt, str::FromStr};

use async_trait::async_trait;
use hex::FromHex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod rpc;

pub type BlockHeight = u64;

/// A 32 byte digest, used for both block and transaction hashes.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash256(#[serde(with = "hex::serde")] [u8; 32]);

pub type BlockHash = Hash256;
pub type TxHash = Hash256;

impl Hash256 {
    pub const fn from_byte_array(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Self)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl FromStr for Hash256 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <[u8; 32]>::from_hex(s).map(Self)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(#[serde(with = "hex::serde")] [u8; 20]);

impl Address {
    pub const fn from_byte_array(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl FromStr for Address {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <[u8; 20]>::from_hex(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub height: BlockHeight,
    pub hash: BlockHash,
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.height, self.hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub hash: BlockHash,
    pub prev_hash: BlockHash,
    pub height: BlockHeight,
    pub timestamp: u64,
    pub n_bits: u32,
    /// Serialized size of the full block in bytes
    pub size: u64,
    /// Only present when the block was requested with its body
    #[serde(default)]
    pub body: Option<BlockBody>,
}

impl Block {
    pub fn point(&self) -> Point {
        Point {
            height: self.height,
            hash: self.hash,
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.body
            .as_ref()
            .map(|body| body.transactions.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockBody {
    pub miner: Address,
    #[serde(with = "hex::serde", default)]
    pub extra_data: Vec<u8>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: TxHash,
    pub sender_type: u8,
    pub sender: Address,
    pub recipient_type: u8,
    pub recipient: Address,
    pub value: u64,
    pub fee: u64,
    pub validity_start_height: BlockHeight,
    pub flags: u8,
    #[serde(with = "hex::serde", default)]
    pub data: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("decoding error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Read access to the authoritative chain.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Fetch the block at `height` on the currently accepted chain, if there is one. The body
    /// (miner, extra data and transactions) is only guaranteed when `include_body` is set.
    async fn block_at(
        &self,
        height: BlockHeight,
        include_body: bool,
    ) -> Result<Option<Block>, ChainError>;
}

#[async_trait]
impl<C: ChainSource + ?Sized> ChainSource for std::sync::Arc<C> {
    async fn block_at(
        &self,
        height: BlockHeight,
        include_body: bool,
    ) -> Result<Option<Block>, ChainError> {
        (**self).block_at(height, include_body).await
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub rpc_user: Option<String>,
    pub rpc_pass: Option<String>,
    pub timeout_secs: Option<u64>,
}
