use tracing::{debug, warn};

use crate::{
    chain::Block,
    error::Error,
    storage::{
        SqlStore, StoreTx,
        rows::{BlockRow, TransactionRow, nullable, to_i64},
    },
};

/// Everything written for one block: its row and one row per transaction, in block order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRows {
    pub block: BlockRow,
    pub transactions: Vec<TransactionRow>,
}

impl BlockRows {
    pub fn from_block(block: &Block) -> Result<Self, Error> {
        let point = block.point();
        let body = block.body.as_ref().ok_or(Error::MissingBody(point))?;

        let mut tx_value: u64 = 0;
        let mut tx_fees: u64 = 0;

        for tx in &body.transactions {
            tx_value = tx_value
                .checked_add(tx.value)
                .ok_or(Error::AggregateOverflow(point))?;
            tx_fees = tx_fees
                .checked_add(tx.fee)
                .ok_or(Error::AggregateOverflow(point))?;
        }

        let transactions = body
            .transactions
            .iter()
            .map(|tx| -> Result<TransactionRow, Error> {
                Ok(TransactionRow {
                    hash: tx.hash.as_bytes().to_vec(),
                    sender_type: tx.sender_type.into(),
                    sender_address: tx.sender.as_bytes().to_vec(),
                    recipient_type: tx.recipient_type.into(),
                    recipient_address: tx.recipient.as_bytes().to_vec(),
                    value: to_i64("value", tx.value)?,
                    fee: to_i64("fee", tx.fee)?,
                    validity_start_height: to_i64(
                        "validity_start_height",
                        tx.validity_start_height,
                    )?,
                    flags: tx.flags.into(),
                    data: nullable(&tx.data),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let block = BlockRow {
            hash: block.hash.as_bytes().to_vec(),
            height: to_i64("height", block.height)?,
            timestamp: to_i64("timestamp", block.timestamp)?,
            n_bits: block.n_bits.into(),
            miner_address: body.miner.as_bytes().to_vec(),
            extra_data: nullable(&body.extra_data),
            tx_count: to_i64("tx_count", transactions.len() as u64)?,
            tx_value: to_i64("tx_value", tx_value)?,
            tx_fees: to_i64("tx_fees", tx_fees)?,
            size: to_i64("size", block.size)?,
        };

        Ok(Self {
            block,
            transactions,
        })
    }
}

/// Write a block and all of its transactions in a single storage transaction. On any failure the
/// transaction is rolled back and the mirror is left as it was. Returns the new block row id.
pub async fn export_block(store: &SqlStore, block: &Block) -> Result<i64, Error> {
    // rows are built before a connection is taken, so malformed blocks never touch storage
    let rows = BlockRows::from_block(block)?;

    let mut dbtx = store.begin().await?;

    match write_rows(&mut dbtx, &rows).await {
        Ok(block_id) => {
            dbtx.commit().await?;

            debug!(
                height = block.height,
                hash = %block.hash,
                block_id,
                txs = rows.transactions.len(),
                "exported block"
            );

            Ok(block_id)
        }
        Err(e) => {
            if let Err(rollback_err) = dbtx.rollback().await {
                warn!(height = block.height, "rollback failed: {rollback_err}");
            }

            Err(e)
        }
    }
}

async fn write_rows(dbtx: &mut StoreTx, rows: &BlockRows) -> Result<i64, Error> {
    let block_id = dbtx.insert_block(&rows.block).await?;

    for tx in &rows.transactions {
        dbtx.insert_transaction(block_id, tx).await?;
    }

    Ok(block_id)
}
