use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
    time::Duration,
};

use async_trait::async_trait;

use super::{
    Address, Block, BlockBody, BlockHash, BlockHeight, ChainError, ChainSource, Hash256,
    Transaction,
};

/*
    In-memory chain

    Holds the accepted chain as a height-indexed map. Used to drive the exporter in-process and as
    the chain collaborator in tests. Clones share the same underlying chain.
*/

#[derive(Debug, Clone, Default)]
pub struct MemoryChain {
    blocks: Arc<RwLock<BTreeMap<BlockHeight, Block>>>,
    latency: Arc<RwLock<Option<Duration>>>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a chain of `tx_counts.len()` blocks starting at height 1, where block `i + 1` carries
    /// `tx_counts[i]` transactions.
    pub fn with_blocks(tx_counts: &[usize]) -> Self {
        let chain = Self::new();

        for &count in tx_counts {
            chain.extend(count);
        }

        chain
    }

    pub fn height(&self) -> BlockHeight {
        self.read().keys().next_back().copied().unwrap_or(0)
    }

    pub fn tip(&self) -> Option<Block> {
        self.read().values().next_back().cloned()
    }

    pub fn get(&self, height: BlockHeight) -> Option<Block> {
        self.read().get(&height).cloned()
    }

    /// Append a new block with `tx_count` transactions on top of the current tip.
    pub fn extend(&self, tx_count: usize) -> Block {
        self.extend_fork(0, tx_count)
    }

    /// Append a block whose hashes are derived from `fork`, so that blocks at the same height on
    /// different forks never collide.
    pub fn extend_fork(&self, fork: u8, tx_count: usize) -> Block {
        let mut blocks = self.write();

        let (height, prev_hash) = match blocks.values().next_back() {
            Some(tip) => (tip.height + 1, tip.hash),
            None => (1, Hash256::default()),
        };

        let block = synthetic_block(height, prev_hash, fork, tx_count);

        blocks.insert(height, block.clone());

        block
    }

    /// Insert `block` at its height, returning the block it replaced.
    pub fn push(&self, block: Block) -> Option<Block> {
        self.write().insert(block.height, block)
    }

    /// Remove the tip of the chain, as a reorg would.
    pub fn revert_tip(&self) -> Option<Block> {
        self.write().pop_last().map(|(_, block)| block)
    }

    /// Drop every block above `height`.
    pub fn truncate(&self, height: BlockHeight) -> Vec<Block> {
        let mut blocks = self.write();
        let removed = blocks.split_off(&(height + 1));

        removed.into_values().rev().collect()
    }

    /// Delay every query by `latency`, to emulate a slow node.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<BlockHeight, Block>> {
        self.blocks.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<BlockHeight, Block>> {
        self.blocks.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ChainSource for MemoryChain {
    async fn block_at(
        &self,
        height: BlockHeight,
        include_body: bool,
    ) -> Result<Option<Block>, ChainError> {
        let latency = *self.latency.read().unwrap_or_else(|e| e.into_inner());

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let block = self.get(height).map(|mut block| {
            if !include_body {
                block.body = None;
            }
            block
        });

        Ok(block)
    }
}

/// Deterministic block at `height` on fork `fork` with `tx_count` transactions.
pub fn synthetic_block(
    height: BlockHeight,
    prev_hash: BlockHash,
    fork: u8,
    tx_count: usize,
) -> Block {
    let transactions = (0..tx_count)
        .map(|index| synthetic_transaction(height, fork, index))
        .collect::<Vec<_>>();

    Block {
        hash: synthetic_hash(0x0b, fork, height, 0),
        prev_hash,
        height,
        timestamp: 1_523_727_000 + height * 60,
        n_bits: 0x1f01_0000,
        size: 200 + 150 * tx_count as u64,
        body: Some(BlockBody {
            miner: Address::from_byte_array([fork; 20]),
            extra_data: if height % 2 == 0 {
                vec![]
            } else {
                format!("block {height}").into_bytes()
            },
            transactions,
        }),
    }
}

fn synthetic_transaction(height: BlockHeight, fork: u8, index: usize) -> Transaction {
    let index = index as u64;

    Transaction {
        hash: synthetic_hash(0x7c, fork, height, index),
        sender_type: 0,
        sender: Address::from_byte_array([0xa0 | (index as u8 & 0x0f); 20]),
        recipient_type: (index % 3) as u8,
        recipient: Address::from_byte_array([0x50 | (index as u8 & 0x0f); 20]),
        value: 1_000 * (index + 1),
        fee: 100 + index,
        validity_start_height: height.saturating_sub(1),
        flags: 0,
        data: if index % 2 == 0 {
            vec![]
        } else {
            vec![0xde, 0xad, index as u8]
        },
    }
}

fn synthetic_hash(kind: u8, fork: u8, height: BlockHeight, index: u64) -> BlockHash {
    let mut bytes = [0u8; 32];

    bytes[0] = kind;
    bytes[1] = fork;
    bytes[8..16].copy_from_slice(&height.to_be_bytes());
    bytes[16..24].copy_from_slice(&index.to_be_bytes());

    Hash256::from_byte_array(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_blocks_by_height() {
        let chain = MemoryChain::with_blocks(&[0, 2, 1]);

        assert_eq!(chain.height(), 3);

        let block = chain.block_at(2, true).await.unwrap().unwrap();
        assert_eq!(block.height, 2);
        assert_eq!(block.transactions().len(), 2);

        let header = chain.block_at(2, false).await.unwrap().unwrap();
        assert!(header.body.is_none());
        assert_eq!(header.hash, block.hash);

        assert!(chain.block_at(4, true).await.unwrap().is_none());
        assert!(chain.block_at(0, true).await.unwrap().is_none());
    }

    #[test]
    fn forks_produce_distinct_hashes() {
        let chain = MemoryChain::with_blocks(&[1, 1]);
        let original = chain.revert_tip().unwrap();
        let replacement = chain.extend_fork(1, 1);

        assert_eq!(original.height, replacement.height);
        assert_ne!(original.hash, replacement.hash);
        assert_ne!(
            original.transactions()[0].hash,
            replacement.transactions()[0].hash
        );
    }

    #[test]
    fn truncate_returns_removed_blocks_tip_first() {
        let chain = MemoryChain::with_blocks(&[0, 0, 0, 0]);
        let removed = chain.truncate(2);

        assert_eq!(
            removed.iter().map(|b| b.height).collect::<Vec<_>>(),
            vec![4, 3]
        );
        assert_eq!(chain.height(), 2);
    }
}
