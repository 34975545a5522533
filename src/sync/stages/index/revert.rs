use tracing::{debug, warn};

use crate::{chain::BlockHash, error::Error, storage::SqlStore};

/// Remove the block with `hash` from the mirror, together with its transactions. A block that is
/// not in the mirror (already reverted, or never exported) is not an error: returns whether a row
/// was removed.
pub async fn revert_block(store: &SqlStore, hash: &BlockHash) -> Result<bool, Error> {
    let mut dbtx = store.begin().await?;

    match dbtx.delete_block(hash).await {
        Ok(removed) => {
            dbtx.commit().await?;

            if removed == 0 {
                debug!(%hash, "reverted block not in mirror, nothing to delete");
            }

            Ok(removed > 0)
        }
        Err(e) => {
            if let Err(rollback_err) = dbtx.rollback().await {
                warn!(%hash, "rollback failed: {rollback_err}");
            }

            Err(e)
        }
    }
}
