#![allow(dead_code)]

use std::time::Duration;

use chain_exporter::storage::{self, SqlStore};
use sqlx::Row;
use tracing_subscriber::EnvFilter;

/// One stored block: height, hash and the hashes of its transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlock {
    pub id: i64,
    pub height: i64,
    pub hash: Vec<u8>,
    pub tx_count: i64,
    pub tx_value: i64,
    pub tx_fees: i64,
    pub txs: Vec<Vec<u8>>,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn memory_store() -> SqlStore {
    init_tracing();

    SqlStore::connect(&storage::Config::new("sqlite::memory:"))
        .await
        .unwrap()
}

pub async fn file_store(path: &std::path::Path) -> SqlStore {
    init_tracing();

    let url = format!("sqlite://{}?mode=rwc", path.display());

    SqlStore::connect(&storage::Config::new(url)).await.unwrap()
}

pub async fn count(store: &SqlStore, table: &str) -> i64 {
    let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM \"{table}\""))
        .fetch_one(store.pool())
        .await
        .unwrap();

    row.try_get("n").unwrap()
}

pub async fn heights(store: &SqlStore) -> Vec<i64> {
    dump(store).await.into_iter().map(|b| b.height).collect()
}

/// Every stored block ordered by height, with its transactions ordered by row id.
pub async fn dump(store: &SqlStore) -> Vec<StoredBlock> {
    let blocks = sqlx::query(
        "SELECT id, height, hash, tx_count, tx_value, tx_fees FROM block ORDER BY height, id",
    )
    .fetch_all(store.pool())
    .await
    .unwrap();

    let mut out = vec![];

    for row in blocks {
        let id: i64 = row.try_get("id").unwrap();

        let txs = sqlx::query("SELECT hash FROM \"transaction\" WHERE block_id = $1 ORDER BY id")
            .bind(id)
            .fetch_all(store.pool())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.try_get::<Vec<u8>, _>("hash").unwrap())
            .collect();

        out.push(StoredBlock {
            id,
            height: row.try_get("height").unwrap(),
            hash: row.try_get("hash").unwrap(),
            tx_count: row.try_get("tx_count").unwrap(),
            tx_value: row.try_get("tx_value").unwrap(),
            tx_fees: row.try_get("tx_fees").unwrap(),
            txs,
        });
    }

    out
}

/// Poll the mirror until `done` holds for its contents.
pub async fn wait_for(store: &SqlStore, done: impl Fn(&[StoredBlock]) -> bool) {
    let res = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if done(&dump(store).await) {
                break;
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    if res.is_err() {
        panic!("mirror never reached expected state: {:?}", dump(store).await);
    }
}
