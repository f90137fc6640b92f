//! Crypto error types

use thiserror::Error;

/// Errors from signing, recovery, and identifier derivation.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Seed or scalar bytes did not form a valid secret key.
    #[error("invalid secret key material")]
    InvalidSecretKey,

    /// Signature bytes were malformed.
    #[error("invalid signature encoding")]
    InvalidSignature,

    /// The recovery byte was outside the accepted range.
    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    /// Public-key recovery from a digest failed.
    #[error("signature recovery failed")]
    RecoveryFailed,

    /// An extended public key failed to parse or derive.
    #[error("invalid extended key: {0}")]
    InvalidExtendedKey(String),

    /// Signing failed (deferred signers may be remote).
    #[error("signing failed: {0}")]
    SigningFailed(String),
}

impl From<bip32::Error> for CryptoError {
    fn from(err: bip32::Error) -> Self {
        CryptoError::InvalidExtendedKey(err.to_string())
    }
}
