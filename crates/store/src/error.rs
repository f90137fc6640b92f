//! Store error types

use alloy_primitives::{Address, B256};
use thiserror::Error;

/// Persistence errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No channel record under the given multisig.
    #[error("channel not found: {0}")]
    ChannelNotFound(Address),

    /// A channel record already exists under the given multisig.
    #[error("channel already exists: {0}")]
    ChannelExists(Address),

    /// Duplicate app or proposal identity hash.
    #[error("duplicate app identity hash: {0}")]
    DuplicateApp(B256),

    /// The composite write referenced a record the backend cannot find.
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// Schema downgrades are rejected.
    #[error("schema downgrade from {current} to {requested} rejected")]
    SchemaDowngrade {
        /// Version currently persisted.
        current: u64,
        /// Version requested by the caller.
        requested: u64,
    },

    /// A write failed mid-sequence; all prior writes were reverted.
    #[error("write failed at {0}; records reverted")]
    WriteFailed(&'static str),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
