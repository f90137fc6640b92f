//! Cryptographic operations for the offchan engine
//!
//! Recoverable secp256k1 ECDSA over 32-byte digests, Ethereum address
//! derivation, and the signer capability the protocol runner consumes.
//! Uses the k256 crate for curve operations and bip32 for extended-key
//! identifier handling.

pub mod error;
pub mod identifier;
pub mod signature;
pub mod signer;

pub use error::CryptoError;
pub use identifier::{address_from_verifying_key, signer_address_of};
pub use signature::RecoverableSignature;
pub use signer::{ChannelSigner, InMemorySigner};
