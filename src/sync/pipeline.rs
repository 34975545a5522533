use std::future::Future;

use tokio::sync::mpsc;
use tracing::info;

use crate::{
    chain::ChainSource,
    error::Error,
    storage::SqlStore,
    sync::{
        RetryPolicy,
        resync::resync,
        stages::{index::Exporter, pull::Follower},
    },
};

use super::Config;

const DEFAULT_SYNC_STAGE_QUEUE_SIZE: usize = 20;

/// Bring the mirror up to date and keep it in sync with `chain` until `shutdown` resolves or a
/// fatal error occurs. On shutdown the pull stage stops first and every event already queued for
/// the index stage is applied before returning.
pub async fn run<C, S>(config: Config, chain: C, store: SqlStore, shutdown: S) -> Result<(), Error>
where
    C: ChainSource + 'static,
    S: Future<Output = ()>,
{
    let cursor = resync(&chain, &store).await?;

    info!(?cursor, "resync complete, following chain");

    let queue_size = config
        .queue_size
        .unwrap_or(DEFAULT_SYNC_STAGE_QUEUE_SIZE)
        .max(1);

    // the pull stage starts from what the mirror actually holds, so a block that failed to export
    // at the tip during resync is offered again
    let tracked = store.recent_points(config.max_reorg_depth() + 1).await?;

    let exporter = Exporter::new(store, RetryPolicy::from(&config.retry));
    let follower = Follower::new(chain, tracked, &config);

    // connect stages

    let (pull_to_index, index_from_pull) = mpsc::channel(queue_size);

    // spawn stages

    let exporting = tokio::spawn(async move {
        exporter.subscribe(index_from_pull, queue_size).await
    });
    let mut following = tokio::spawn(follower.run(pull_to_index));

    let followed = tokio::select! {
        res = &mut following => res,
        _ = shutdown => {
            info!("shutdown requested, draining queued events");

            following.abort();
            following.await
        }
    };

    let followed = match followed {
        Ok(res) => res,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(Error::custom(e)),
    };

    let exported = exporting.await.map_err(Error::custom)?;

    info!("pipeline stopped");

    followed.and(exported)
}
