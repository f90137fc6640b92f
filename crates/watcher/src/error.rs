//! Watcher error types

use thiserror::Error;

/// Errors from the chain listener.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WatcherError {
    /// Historical replay was asked to start past the chain head.
    #[error("starting block {starting_block} is beyond chain head {head}")]
    StartBeyondHead {
        /// Requested starting block.
        starting_block: u64,
        /// Current chain head.
        head: u64,
    },

    /// The underlying RPC provider failed.
    #[error("provider error: {0}")]
    Provider(String),

    /// A log matched an event signature but would not decode.
    #[error("log decode failed: {0}")]
    Decode(String),

    /// `wait_for` expired without a matching event.
    #[error("no matching event within {0:?}")]
    WaitTimeout(std::time::Duration),
}
