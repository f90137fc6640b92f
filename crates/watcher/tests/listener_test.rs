//! Chain listener: bounded replay, filters, cancellation contexts.

use alloy_primitives::{address, Address, Bytes, B256, U256};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use offchan_watcher::events::{ChallengeUpdated, StateProgressed};
use offchan_watcher::{
    ChainConfig, ChainListener, ChainReader, EventTag, ListenerConfig, RawLog, WatcherError,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const REGISTRY: Address = address!("00000000000000000000000000000000000000cc");

fn challenge_log(identity_hash: B256, version: u64, block: u64) -> RawLog {
    let event = ChallengeUpdated {
        identityHash: identity_hash,
        status: 1,
        appStateHash: B256::repeat_byte(2),
        versionNumber: U256::from(version),
        finalizesAt: U256::from(500u64),
    };
    RawLog {
        address: REGISTRY,
        topics: vec![ChallengeUpdated::SIGNATURE_HASH, identity_hash],
        data: event.encode_data().into(),
        block_number: block,
    }
}

fn progressed_log(identity_hash: B256, block: u64) -> RawLog {
    let event = StateProgressed {
        identityHash: identity_hash,
        action: Bytes::from(vec![1, 2]),
        versionNumber: U256::from(4u64),
        timeout: U256::from(50u64),
        turnTaker: address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
        signature: Bytes::from(vec![0u8; 65]),
    };
    RawLog {
        address: REGISTRY,
        topics: vec![StateProgressed::SIGNATURE_HASH, identity_hash],
        data: event.encode_data().into(),
        block_number: block,
    }
}

struct MockChainReader {
    head: u64,
    logs: Vec<RawLog>,
    ranges: Mutex<Vec<(u64, u64)>>,
}

impl MockChainReader {
    fn new(head: u64, logs: Vec<RawLog>) -> Arc<Self> {
        Arc::new(Self {
            head,
            logs,
            ranges: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChainReader for MockChainReader {
    async fn block_number(&self) -> Result<u64, WatcherError> {
        Ok(self.head)
    }

    async fn logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, WatcherError> {
        self.ranges.lock().push((from_block, to_block));
        Ok(self
            .logs
            .iter()
            .filter(|l| {
                l.address == address && l.block_number >= from_block && l.block_number <= to_block
            })
            .cloned()
            .collect())
    }
}

fn listener_over(reader: Arc<MockChainReader>) -> Arc<ChainListener> {
    ChainListener::new(
        ListenerConfig::default(),
        vec![ChainConfig {
            chain_id: 1,
            challenge_registry: REGISTRY,
            reader,
        }],
    )
}

#[tokio::test]
async fn test_replay_parses_all_matching_logs_in_bounded_chunks() {
    let hash = B256::repeat_byte(7);
    let reader = MockChainReader::new(
        100,
        vec![
            challenge_log(hash, 1, 5),
            progressed_log(hash, 42),
            challenge_log(hash, 2, 99),
        ],
    );
    let listener = listener_over(reader.clone());
    let mut rx = listener.subscribe();

    let parsed = listener.parse_logs_from(0).await.unwrap();
    assert_eq!(parsed, 3);

    // Every fetched range spans at most 30 blocks and the walk covers
    // [0, head] without gaps.
    let ranges = reader.ranges.lock().clone();
    assert_eq!(ranges.first().unwrap().0, 0);
    assert_eq!(ranges.last().unwrap().1, 100);
    for window in ranges.windows(2) {
        assert_eq!(window[1].0, window[0].1 + 1);
    }
    assert!(ranges.iter().all(|(from, to)| to - from + 1 <= 30));

    // Events came out typed and in block order.
    let first = rx.recv().await.unwrap();
    assert_eq!(first.kind.tag(), EventTag::ChallengeUpdated);
    assert_eq!(first.block_number, 5);
    let second = rx.recv().await.unwrap();
    assert_eq!(second.kind.tag(), EventTag::StateProgressed);
}

#[tokio::test]
async fn test_replay_past_head_fails_without_emitting() {
    let reader = MockChainReader::new(50, vec![challenge_log(B256::repeat_byte(1), 1, 10)]);
    let listener = listener_over(reader.clone());
    let mut rx = listener.subscribe();

    let err = listener.parse_logs_from(51).await.unwrap_err();
    assert_eq!(
        err,
        WatcherError::StartBeyondHead {
            starting_block: 51,
            head: 50
        }
    );
    // No log fetches, no events.
    assert!(reader.ranges.lock().is_empty());
    assert!(matches!(
        rx.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn test_attach_filters_and_detach() {
    let target = B256::repeat_byte(7);
    let other = B256::repeat_byte(8);
    let reader = MockChainReader::new(
        10,
        vec![
            challenge_log(target, 1, 1),
            challenge_log(other, 1, 2),
            progressed_log(target, 3),
        ],
    );
    let listener = listener_over(reader);

    let hits = Arc::new(AtomicUsize::new(0));
    let counted = hits.clone();
    let ctx = listener.attach(
        Some(EventTag::ChallengeUpdated),
        Some(target),
        Arc::new(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        }),
    );

    listener.parse_logs_from(0).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    assert!(listener.detach(ctx));
    assert!(!listener.detach(ctx));

    listener.parse_logs_from(0).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_attach_once_fires_once() {
    let hash = B256::repeat_byte(3);
    let reader = MockChainReader::new(
        10,
        vec![challenge_log(hash, 1, 1), challenge_log(hash, 2, 2)],
    );
    let listener = listener_over(reader);

    let hits = Arc::new(AtomicUsize::new(0));
    let counted = hits.clone();
    listener.attach_once(
        Some(EventTag::ChallengeUpdated),
        None,
        Arc::new(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        }),
    );

    listener.parse_logs_from(0).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_wait_for_matches_and_times_out() {
    let hash = B256::repeat_byte(5);
    let reader = MockChainReader::new(10, vec![challenge_log(hash, 1, 4)]);
    let listener = listener_over(reader);

    let waiter = {
        let listener = listener.clone();
        tokio::spawn(async move {
            listener
                .wait_for(EventTag::ChallengeUpdated, Duration::from_secs(1), Some(hash))
                .await
        })
    };
    tokio::task::yield_now().await;
    listener.parse_logs_from(0).await.unwrap();
    let event = waiter.await.unwrap().unwrap();
    assert_eq!(event.kind.identity_hash(), hash);

    // Nothing else arrives: wait_for expires with a typed error.
    let err = listener
        .wait_for(
            EventTag::StateProgressed,
            Duration::from_millis(50),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WatcherError::WaitTimeout(_)));
}

#[tokio::test]
async fn test_enable_disable_idempotent() {
    let reader = MockChainReader::new(10, vec![]);
    let listener = listener_over(reader);
    listener.enable();
    listener.enable();
    listener.disable();
    listener.disable();
}
