use crate::chain::{Block, Point};

pub mod index;
pub mod pull;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    /// A new head was accepted, carrying the full block
    HeadChanged(Block),
    /// A previously accepted block left the chain
    BlockReverted(Point),
}

impl ChainEvent {
    pub fn point(&self) -> Point {
        match self {
            Self::HeadChanged(block) => block.point(),
            Self::BlockReverted(point) => *point,
        }
    }
}
