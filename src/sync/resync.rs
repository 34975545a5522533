use std::future::Future;

use tracing::{error, info};

use crate::{
    chain::{BlockHeight, ChainSource, Point},
    error::{Error, Inconsistency},
    storage::SqlStore,
    sync::{stages::index::ingest, stats::ExportStats},
};

/*
    Resync

    Runs once before live events are consumed. The stored tip must still be on the chain, otherwise
    the mirror cannot be trusted and nothing is written. Every block above it is then exported in
    height order until the chain has no block at the next height.
*/

/// Check the mirror against the chain and backfill it. Returns the last chain point seen, which
/// is where live following picks up (`None` for an empty chain and mirror).
pub async fn resync<C: ChainSource>(chain: &C, store: &SqlStore) -> Result<Option<Point>, Error> {
    resync_until(chain, store, std::future::pending::<()>()).await
}

/// Like [`resync`], but the backfill stops early once `stop` resolves. `stop` is only checked
/// between blocks, a block being exported is always finished first.
pub async fn resync_until<C, S>(
    chain: &C,
    store: &SqlStore,
    stop: S,
) -> Result<Option<Point>, Error>
where
    C: ChainSource,
    S: Future<Output = ()>,
{
    let (mut cursor, start) = match store.max_height().await? {
        None => (None, 1),
        Some(height) => (Some(verify_tip(chain, store, height).await?), height + 1),
    };

    info!("exporting blocks from #{start}");

    tokio::pin!(stop);

    let mut stats = ExportStats::new();
    let mut height = start;

    loop {
        let next = tokio::select! {
            biased;

            _ = &mut stop => {
                info!("resync stopped before #{height}");
                break;
            }
            next = chain.block_at(height, true) => next?,
        };

        let Some(block) = next else {
            break;
        };

        match ingest::export_block(store, &block).await {
            Ok(_) => stats.block_exported(height),
            Err(e) => error!(
                height,
                hash = %block.hash,
                "failed to export block during resync, the mirror is missing it: {e}"
            ),
        }

        cursor = Some(block.point());
        height += 1;
    }

    match cursor {
        Some(tip) => info!(exported = stats.exported(), "mirror at {tip}"),
        None => info!("chain has no blocks yet"),
    }

    Ok(cursor)
}

async fn verify_tip<C: ChainSource>(
    chain: &C,
    store: &SqlStore,
    height: BlockHeight,
) -> Result<Point, Error> {
    let Some(block) = chain.block_at(height, true).await? else {
        return Err(Error::Inconsistent {
            height,
            reason: Inconsistency::MissingOnChain,
        });
    };

    if !store.contains_block(height, &block.hash).await? {
        return Err(Error::Inconsistent {
            height,
            reason: Inconsistency::HashMismatch,
        });
    }

    Ok(block.point())
}
