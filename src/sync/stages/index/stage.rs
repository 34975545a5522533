use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::{error, info};

use crate::{
    chain::{Block, Point},
    error::Error,
    storage::SqlStore,
    sync::{RetryPolicy, stages::ChainEvent, stats::ExportStats},
};

use super::{ingest, revert, serializer::Serializer};

/*
    Index Stage

    Receives chain events from the pull stage (or directly from an embedding process) and applies
    them to the mirror through the serializer: new heads are exported, reverted blocks are deleted.
    A block that fails to export after all retries is logged and skipped so that later events keep
    flowing; the gap it leaves is only noticed by the consistency check on the next start.
*/

#[derive(Clone)]
pub struct Exporter {
    store: SqlStore,
    retry: RetryPolicy,
    stats: Arc<Mutex<ExportStats>>,
}

impl Exporter {
    pub fn new(store: SqlStore, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            stats: Default::default(),
        }
    }

    /// Number of blocks exported by this exporter since it was created.
    pub fn exported(&self) -> usize {
        self.lock_stats().exported()
    }

    /// Queue the handler for `event`. Returns as soon as the event is queued.
    pub fn on_event(&self, serializer: &Serializer, event: ChainEvent) -> Result<(), Error> {
        self.enqueue(serializer, event, None)
    }

    /// Apply every event received on `events`, in order, until the sender side is dropped. At
    /// most `capacity` events are queued or running at a time. Returns once the last queued event
    /// has been applied.
    pub async fn subscribe(
        &self,
        mut events: mpsc::Receiver<ChainEvent>,
        capacity: usize,
    ) -> Result<(), Error> {
        let serializer = Serializer::new();
        let permits = Arc::new(Semaphore::new(capacity.max(1)));

        let mut res = Ok(());

        while let Some(event) = events.recv().await {
            let permit = permits.clone().acquire_owned().await.map_err(Error::custom)?;

            if let Err(e) = self.enqueue(&serializer, event, Some(permit)) {
                res = Err(e);
                break;
            }
        }

        serializer.close().await;

        res
    }

    fn enqueue(
        &self,
        serializer: &Serializer,
        event: ChainEvent,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Result<(), Error> {
        let this = self.clone();

        match event {
            ChainEvent::HeadChanged(block) => serializer.push(move || async move {
                this.on_head_changed(block).await;
                drop(permit);
            }),
            ChainEvent::BlockReverted(point) => serializer.push(move || async move {
                this.on_block_reverted(point).await;
                drop(permit);
            }),
        }
    }

    async fn on_head_changed(&self, block: Block) {
        let res = self
            .retry
            .run("block export", || ingest::export_block(&self.store, &block))
            .await;

        match res {
            Ok(_) => {
                self.lock_stats().block_exported(block.height);

                info!("now at block #{} ({})", block.height, block.hash);
            }
            Err(e) => {
                error!(
                    height = block.height,
                    hash = %block.hash,
                    "failed to export block, the mirror is missing it until the next resync: {e}"
                );
            }
        }
    }

    async fn on_block_reverted(&self, point: Point) {
        let res = self
            .retry
            .run("block revert", || revert::revert_block(&self.store, &point.hash))
            .await;

        match res {
            Ok(true) => info!("reverted block #{} ({})", point.height, point.hash),
            Ok(false) => {}
            Err(e) => {
                error!(
                    height = point.height,
                    hash = %point.hash,
                    "failed to revert block, the mirror still holds it: {e}"
                );
            }
        }
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, ExportStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}
