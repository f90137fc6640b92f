//! Read-only chain access for the listener

use crate::error::WatcherError;
use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;

/// An undecoded log entry as returned by `eth_getLogs`.
#[derive(Clone, Debug)]
pub struct RawLog {
    /// Emitting contract.
    pub address: Address,
    /// Event topics; topic 0 is the signature hash.
    pub topics: Vec<B256>,
    /// Non-indexed event data.
    pub data: Bytes,
    /// Block the log landed in.
    pub block_number: u64,
}

/// Minimal chain-reading capability the listener polls through.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Current head block number.
    async fn block_number(&self) -> Result<u64, WatcherError>;

    /// Logs emitted by `address` in the inclusive block range.
    async fn logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, WatcherError>;
}
