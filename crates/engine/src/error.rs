//! Engine error types
//!
//! Every engine method resolves to either a typed result or an
//! [`EngineError`] whose [`code`](EngineError::code) is stable across
//! releases, so the JSON-RPC façade can surface it unchanged.

use crate::messages::ProtocolName;
use alloy_primitives::Address;
use offchan_commitments::CommitmentError;
use offchan_crypto::CryptoError;
use offchan_store::StoreError;
use offchan_types::ModelError;
use thiserror::Error;

/// Errors surfaced by engine methods and protocol execution.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing channel, app, or proposal.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate channel, app, or proposal.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A protocol invariant was breached; fatal to the current protocol.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A peer signature recovered to the wrong address.
    #[error("signature mismatch: expected {expected}, recovered {recovered}")]
    SignatureMismatch {
        /// Participant the signature was required from.
        expected: Address,
        /// Address the signature actually recovered to.
        recovered: Address,
    },

    /// Validation middleware rejected the operation.
    #[error("validation rejected: {0}")]
    ValidationRejected(String),

    /// The counterparty did not answer within the configured window.
    #[error("{protocol} protocol timed out (process {process_id})")]
    Timeout {
        /// Protocol that was waiting.
        protocol: ProtocolName,
        /// Process id of the stalled exchange.
        process_id: String,
    },

    /// Persistence failed; the store reverted to its pre-write state.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An EVM call failed during state transition or outcome computation.
    #[error("chain error: {0}")]
    Chain(String),

    /// The message bus rejected a publish.
    #[error("message bus error: {0}")]
    MessageBus(String),

    /// A wire message could not be decoded or was addressed wrongly.
    #[error("bad message: {0}")]
    BadMessage(String),

    /// Signing or recovery failed locally.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Commitment construction failed.
    #[error(transparent)]
    Commitment(#[from] CommitmentError),

    /// A pure transition rejected its inputs.
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl EngineError {
    /// Stable error code for the RPC surface.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "CHAN_NOT_FOUND",
            EngineError::AlreadyExists(_) => "CHAN_ALREADY_EXISTS",
            EngineError::InvariantViolation(_) => "CHAN_INVARIANT_VIOLATION",
            EngineError::SignatureMismatch { .. } => "CHAN_SIGNATURE_MISMATCH",
            EngineError::ValidationRejected(_) => "CHAN_VALIDATION_REJECTED",
            EngineError::Timeout { .. } => "CHAN_TIMEOUT",
            EngineError::Store(StoreError::ChannelNotFound(_)) => "CHAN_NOT_FOUND",
            EngineError::Store(StoreError::ChannelExists(_))
            | EngineError::Store(StoreError::DuplicateApp(_)) => "CHAN_ALREADY_EXISTS",
            EngineError::Store(_) => "CHAN_STORE_ERROR",
            EngineError::Chain(_) => "CHAN_CHAIN_ERROR",
            EngineError::MessageBus(_) | EngineError::BadMessage(_) => "CHAN_MESSAGING_ERROR",
            EngineError::Crypto(_) | EngineError::Commitment(_) => "CHAN_SIGNATURE_MISMATCH",
            EngineError::Model(ModelError::AppNotFound(_))
            | EngineError::Model(ModelError::ProposalNotFound(_)) => "CHAN_NOT_FOUND",
            EngineError::Model(ModelError::DuplicateApp(_)) => "CHAN_ALREADY_EXISTS",
            EngineError::Model(_) => "CHAN_INVARIANT_VIOLATION",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(EngineError::NotFound("x".into()).code(), "CHAN_NOT_FOUND");
        assert_eq!(
            EngineError::Model(ModelError::DuplicateApp(Default::default())).code(),
            "CHAN_ALREADY_EXISTS"
        );
        assert_eq!(
            EngineError::Timeout {
                protocol: ProtocolName::Update,
                process_id: "p".into()
            }
            .code(),
            "CHAN_TIMEOUT"
        );
    }
}
