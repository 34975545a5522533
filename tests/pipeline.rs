mod common;

use std::time::Duration;

use chain_exporter::{
    Error,
    chain::memory::MemoryChain,
    error::Inconsistency,
    storage::SqlStore,
    sync::{self, pipeline, resync::resync},
};
use common::{count, dump, heights, memory_store, wait_for};
use tokio::{sync::oneshot, task::JoinHandle};

fn config() -> sync::Config {
    sync::Config {
        poll_interval_ms: Some(10),
        max_reorg_depth: Some(5),
        ..Default::default()
    }
}

fn spawn_pipeline(
    chain: &MemoryChain,
    store: &SqlStore,
) -> (oneshot::Sender<()>, JoinHandle<Result<(), Error>>) {
    let (stop, stopped) = oneshot::channel::<()>();

    let handle = tokio::spawn(pipeline::run(
        config(),
        chain.clone(),
        store.clone(),
        async move {
            let _ = stopped.await;
        },
    ));

    (stop, handle)
}

fn hash_at(chain: &MemoryChain, height: u64) -> Vec<u8> {
    chain.get(height).unwrap().hash.as_bytes().to_vec()
}

#[tokio::test]
async fn follows_new_heads_and_reorgs() {
    let chain = MemoryChain::with_blocks(&[0, 2, 1]);
    let store = memory_store().await;

    let (stop, handle) = spawn_pipeline(&chain, &store);

    wait_for(&store, |blocks| blocks.len() == 3).await;

    chain.extend(4);
    chain.extend(0);

    wait_for(&store, |blocks| blocks.len() == 5).await;
    assert_eq!(count(&store, "transaction").await, 7);

    // blocks 4 and 5 are replaced by a longer fork
    chain.truncate(3);
    chain.extend_fork(1, 1);
    chain.extend_fork(1, 1);
    chain.extend_fork(1, 1);

    let expected = (4..=6).map(|h| hash_at(&chain, h)).collect::<Vec<_>>();

    wait_for(&store, |blocks| {
        blocks.len() == 6
            && blocks[3..]
                .iter()
                .map(|b| b.hash.clone())
                .eq(expected.iter().cloned())
    })
    .await;

    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(heights(&store).await, (1..=6).collect::<Vec<_>>());
    assert_eq!(count(&store, "transaction").await, 6);
}

#[tokio::test]
async fn picks_up_where_a_previous_run_stopped() {
    let chain = MemoryChain::with_blocks(&[1, 1]);
    let store = memory_store().await;

    let (stop, handle) = spawn_pipeline(&chain, &store);
    wait_for(&store, |blocks| blocks.len() == 2).await;
    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();

    let before = dump(&store).await;

    chain.extend(1);

    let (stop, handle) = spawn_pipeline(&chain, &store);
    wait_for(&store, |blocks| blocks.len() == 3).await;
    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(&dump(&store).await[..2], &before[..]);
}

#[tokio::test]
async fn diverged_mirror_stops_before_following() {
    let chain = MemoryChain::with_blocks(&[1; 10]);
    let store = memory_store().await;

    resync(&chain, &store).await.unwrap();
    let before = dump(&store).await;

    chain.truncate(9);
    chain.extend_fork(2, 0);

    let (_stop, handle) = spawn_pipeline(&chain, &store);

    let res = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(
        res,
        Err(Error::Inconsistent {
            height: 10,
            reason: Inconsistency::HashMismatch
        })
    ));
    assert_eq!(dump(&store).await, before);
}

#[tokio::test]
async fn reorg_deeper_than_window_is_fatal() {
    let chain = MemoryChain::with_blocks(&[0; 8]);
    let store = memory_store().await;

    let (_stop, handle) = spawn_pipeline(&chain, &store);
    wait_for(&store, |blocks| blocks.len() == 8).await;

    // replaces 7 blocks, the pipeline only remembers 5
    chain.truncate(1);
    for _ in 0..8 {
        chain.extend_fork(3, 0);
    }

    let res = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(res, Err(Error::ReorgTooDeep { depth: 5 })));
}

#[tokio::test]
async fn shutdown_waits_for_queued_events() {
    let chain = MemoryChain::with_blocks(&[0]);
    let store = memory_store().await;

    let (stop, handle) = spawn_pipeline(&chain, &store);
    wait_for(&store, |blocks| blocks.len() == 1).await;

    for _ in 0..20 {
        chain.extend(10);
    }

    // let the pull stage hand over at least one new block before stopping
    wait_for(&store, |blocks| blocks.len() > 1).await;

    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();

    // whatever was exported forms a contiguous prefix with complete transactions
    let blocks = dump(&store).await;
    for (i, block) in blocks.iter().enumerate() {
        assert_eq!(block.height, i as i64 + 1);
        assert_eq!(block.txs.len() as i64, block.tx_count);
    }
}

#[tokio::test]
async fn slow_node_gives_the_same_mirror() {
    let chain = MemoryChain::with_blocks(&[2, 0, 3]);
    chain.set_latency(Some(Duration::from_millis(5)));

    let store = memory_store().await;
    let (stop, handle) = spawn_pipeline(&chain, &store);

    wait_for(&store, |blocks| blocks.len() == 3).await;

    // a fork off block 1 arrives while every node request is delayed
    chain.truncate(1);
    for txs in [1, 4, 0, 2] {
        chain.extend_fork(4, txs);
    }

    let expected = (1..=5).map(|h| hash_at(&chain, h)).collect::<Vec<_>>();

    wait_for(&store, |blocks| {
        blocks.iter().map(|b| b.hash.clone()).eq(expected.iter().cloned())
    })
    .await;

    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();

    // the same chain exported from scratch without delays
    chain.set_latency(None);
    let fresh = memory_store().await;
    resync(&chain, &fresh).await.unwrap();

    let strip = |blocks: Vec<common::StoredBlock>| {
        blocks
            .into_iter()
            .map(|b| (b.height, b.hash, b.tx_count, b.tx_value, b.tx_fees, b.txs))
            .collect::<Vec<_>>()
    };

    assert_eq!(strip(dump(&store).await), strip(dump(&fresh).await));
}
