use std::{collections::VecDeque, time::Duration};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    chain::{ChainSource, Point},
    error::Error,
    sync::{self, stages::ChainEvent},
};

/*
    Pull Stage

    Polls the chain and compares it with the blocks already passed downstream. Tracked blocks the
    chain no longer has at their height are sent as reverts (newest first), then every block past
    the tracked tip is sent as a new head, in height order. The last `max_reorg_depth` points are
    tracked plus one anchor below them; a reorg that also replaces the anchor cannot be followed
    and stops the stage.
*/

pub type DownstreamPort = mpsc::Sender<ChainEvent>;

pub struct Follower<C> {
    chain: C,
    // most recent first, at most `max_depth + 1` long
    tracked: VecDeque<Point>,
    max_depth: usize,
    poll_interval: Duration,
}

impl<C: ChainSource> Follower<C> {
    /// `tracked` are the most recent blocks already in the mirror, highest first. Only the first
    /// `max_reorg_depth + 1` are kept.
    pub fn new(chain: C, tracked: Vec<Point>, config: &sync::Config) -> Self {
        let max_depth = config.max_reorg_depth();

        let mut tracked = VecDeque::from(tracked);
        tracked.truncate(max_depth + 1);

        Self {
            chain,
            tracked,
            max_depth,
            poll_interval: config.poll_interval(),
        }
    }

    pub fn tip(&self) -> Option<Point> {
        self.tracked.front().copied()
    }

    /// Poll until the downstream side goes away. Chain errors are logged and retried on the next
    /// poll; anything else ends the stage.
    pub async fn run(mut self, downstream: DownstreamPort) -> Result<(), Error> {
        info!(tip = ?self.tip(), "following chain");

        loop {
            if let Err(e) = self.poll(&downstream).await {
                if downstream.is_closed() {
                    break;
                }

                match e {
                    Error::Chain(e) => warn!("failed to poll chain: {e}"),
                    e => return Err(e),
                }
            }

            tokio::select! {
                _ = downstream.closed() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(tip = ?self.tip(), "stopped following chain");

        Ok(())
    }

    /// Send the events that bring downstream in line with the chain. Returns how many were sent.
    pub async fn poll(&mut self, downstream: &DownstreamPort) -> Result<usize, Error> {
        let mut sent = 0;

        while let Some(tip) = self.tip() {
            let on_chain = self.chain.block_at(tip.height, false).await?;

            if on_chain.is_some_and(|block| block.hash == tip.hash) {
                break;
            }

            // the anchor is gone too, nothing left to find the fork point against
            if self.tracked.len() == 1 && tip.height > 1 {
                return Err(Error::ReorgTooDeep {
                    depth: self.max_depth,
                });
            }

            send(downstream, ChainEvent::BlockReverted(tip)).await?;
            self.tracked.pop_front();
            sent += 1;
        }

        let mut next = self.tip().map(|p| p.height + 1).unwrap_or(1);

        while let Some(block) = self.chain.block_at(next, true).await? {
            if let Some(tip) = self.tip() {
                // the chain moved under us between requests, the next poll sorts it out
                if block.prev_hash != tip.hash {
                    debug!(height = next, "new block does not extend tracked tip");
                    break;
                }
            }

            let point = block.point();

            send(downstream, ChainEvent::HeadChanged(block)).await?;

            self.tracked.push_front(point);
            self.tracked.truncate(self.max_depth + 1);

            next += 1;
            sent += 1;
        }

        Ok(sent)
    }
}

async fn send(downstream: &DownstreamPort, event: ChainEvent) -> Result<(), Error> {
    downstream
        .send(event)
        .await
        .map_err(|_| Error::custom("downstream stage closed"))
}
