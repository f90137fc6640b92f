//! Commitment builder errors

use alloy_primitives::Address;
use offchan_crypto::CryptoError;
use thiserror::Error;

/// Errors from commitment construction and signature handling.
#[derive(Debug, Error)]
pub enum CommitmentError {
    /// A signed transaction was requested before both parties signed.
    #[error("commitment is missing a signature")]
    MissingSignature,

    /// A signature recovered to an address outside the participant set.
    #[error("signature recovers to non-participant {0}")]
    UnknownSigner(Address),

    /// A second, different signature arrived for the same participant.
    #[error("conflicting signature for participant {0}")]
    ConflictingSignature(Address),

    /// Signature recovery or validation failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// ABI decoding of a persisted commitment failed.
    #[error("commitment decode failed: {0}")]
    Decode(String),
}
