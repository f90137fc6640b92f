//! Data-model error types

use alloy_primitives::{Address, B256};
use thiserror::Error;

/// Errors raised by channel and app-instance transitions.
///
/// Every transition is pure; an error means the requested transition was
/// rejected and the input channel value is unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// An identifier string failed validation.
    #[error("invalid public identifier: {0}")]
    InvalidIdentifier(String),

    /// The referenced app instance does not exist in the channel.
    #[error("app instance not found: {0}")]
    AppNotFound(B256),

    /// The referenced proposal does not exist in the channel.
    #[error("app proposal not found: {0}")]
    ProposalNotFound(B256),

    /// An app or proposal with this identity hash already exists.
    #[error("duplicate app identity hash: {0}")]
    DuplicateApp(B256),

    /// A proposal carried a channel nonce that is not the next monotonic value.
    #[error("channel nonce {proposed} does not match next monotonic nonce {expected}")]
    NonMonotonicNonce {
        /// Nonce carried by the proposal.
        proposed: u64,
        /// The channel's next monotonic nonce.
        expected: u64,
    },

    /// A state update carried a version number at or below the latest.
    #[error("version number {proposed} does not advance latest version {current}")]
    StaleVersion {
        /// Latest version number held by the instance.
        current: u64,
        /// Version number carried by the update.
        proposed: u64,
    },

    /// A free-balance debit would overdraw a participant's column.
    #[error("insufficient free balance for {owner} under token {token}")]
    InsufficientBalance {
        /// Token address of the overdrawn column.
        token: Address,
        /// Participant whose column would go negative.
        owner: Address,
    },

    /// A participant address is not a member of the channel.
    #[error("address {0} is not a participant of this channel")]
    UnknownParticipant(Address),
}
