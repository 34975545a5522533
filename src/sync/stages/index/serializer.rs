use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::error;

use crate::error::Error;

type Operation = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/*
    Serializer

    Runs deferred operations one at a time, in the order they were pushed. Pushing never waits, so
    it can be called straight from an event callback however many events arrive at once. The next
    operation is only started after the previous one has finished, which for exports and reverts
    means after its storage transaction has committed or rolled back.
*/

pub struct Serializer {
    queue: mpsc::UnboundedSender<Operation>,
    // queued plus running
    pending: Arc<AtomicUsize>,
    worker: JoinHandle<()>,
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer {
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));

        let worker = tokio::spawn(run_queue(rx, pending.clone()));

        Self {
            queue,
            pending,
            worker,
        }
    }

    pub fn push<F, Fut>(&self, op: F) -> Result<(), Error>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let op: Operation = Box::new(move || Box::pin(op()));

        self.pending.fetch_add(1, Ordering::SeqCst);

        if self.queue.send(op).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::custom("serializer worker is no longer running"));
        }

        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Stop accepting operations and wait until everything already queued has run.
    pub async fn close(self) {
        drop(self.queue);

        if let Err(e) = self.worker.await {
            error!("serializer worker stopped abnormally: {e}");
        }
    }
}

async fn run_queue(mut rx: mpsc::UnboundedReceiver<Operation>, pending: Arc<AtomicUsize>) {
    while let Some(op) = rx.recv().await {
        // a panicking operation only takes down its own task
        if let Err(e) = tokio::spawn(async move { op().await }).await {
            error!("queued operation did not complete: {e}");
        }

        pending.fetch_sub(1, Ordering::SeqCst);
    }
}
