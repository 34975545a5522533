use sqlx::{Any, Row, Transaction};

use crate::{
    chain::BlockHash,
    error::Error,
    storage::rows::{BlockRow, TransactionRow},
};

/// A pooled connection with an open transaction. Dropping it without calling `commit` rolls the
/// transaction back and hands the connection back to the pool.
pub struct StoreTx {
    inner: Transaction<'static, Any>,
}

impl StoreTx {
    pub(super) fn new(inner: Transaction<'static, Any>) -> Self {
        Self { inner }
    }

    /// Insert a block row, returning the id the store assigned to it.
    pub async fn insert_block(&mut self, row: &BlockRow) -> Result<i64, Error> {
        let inserted = sqlx::query(
            "INSERT INTO block (
                hash, height, timestamp, n_bits, miner_address,
                extra_data, tx_count, tx_value, tx_fees, size
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id",
        )
        .bind(row.hash.as_slice())
        .bind(row.height)
        .bind(row.timestamp)
        .bind(row.n_bits)
        .bind(row.miner_address.as_slice())
        .bind(row.extra_data.as_deref())
        .bind(row.tx_count)
        .bind(row.tx_value)
        .bind(row.tx_fees)
        .bind(row.size)
        .fetch_one(&mut *self.inner)
        .await?;

        Ok(inserted.try_get("id")?)
    }

    pub async fn insert_transaction(
        &mut self,
        block_id: i64,
        row: &TransactionRow,
    ) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO \"transaction\" (
                hash, block_id, sender_type, sender_address, recipient_type,
                recipient_address, value, fee, validity_start_height, flags, data
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(row.hash.as_slice())
        .bind(block_id)
        .bind(row.sender_type)
        .bind(row.sender_address.as_slice())
        .bind(row.recipient_type)
        .bind(row.recipient_address.as_slice())
        .bind(row.value)
        .bind(row.fee)
        .bind(row.validity_start_height)
        .bind(row.flags)
        .bind(row.data.as_deref())
        .execute(&mut *self.inner)
        .await?;

        Ok(())
    }

    /// Delete the block with the given hash. Its transactions go with it through the
    /// `ON DELETE CASCADE` on `transaction.block_id`. Returns the number of block rows removed.
    pub async fn delete_block(&mut self, hash: &BlockHash) -> Result<u64, Error> {
        let res = sqlx::query("DELETE FROM block WHERE hash = $1")
            .bind(hash.as_bytes().as_slice())
            .execute(&mut *self.inner)
            .await?;

        Ok(res.rows_affected())
    }

    pub async fn commit(self) -> Result<(), Error> {
        self.inner.commit().await?;

        Ok(())
    }

    pub async fn rollback(self) -> Result<(), Error> {
        self.inner.rollback().await?;

        Ok(())
    }
}
