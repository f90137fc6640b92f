//! The signer capability consumed by the protocol runner
//!
//! Signing is process-scoped, never global: every engine instance holds
//! its own signer handle, and multiple engines per process hold distinct
//! ones. The trait is async because deferred signers (HSMs, remote
//! keystores) may be.

use crate::error::CryptoError;
use crate::identifier::address_from_verifying_key;
use crate::signature::{sign_digest_recoverable, RecoverableSignature};
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use bip32::{ChildNumber, Prefix, XPrv};
use offchan_types::PublicIdentifier;
use rand::{CryptoRng, RngCore};

/// A participant's signing capability.
#[async_trait]
pub trait ChannelSigner: Send + Sync {
    /// The extended public identifier peers know this signer by.
    fn public_identifier(&self) -> &PublicIdentifier;

    /// The derived signer address commitments recover to.
    fn signer_address(&self) -> Address;

    /// Sign a 32-byte digest, returning a 65-byte recoverable signature.
    async fn sign_digest(&self, digest: B256) -> Result<RecoverableSignature, CryptoError>;
}

/// Local in-memory signer backed by a BIP32 root key.
///
/// The signing key is the first non-hardened child (`m/0`) of the root,
/// matching the address peers derive from the neutered identifier.
pub struct InMemorySigner {
    signing_key: k256::ecdsa::SigningKey,
    identifier: PublicIdentifier,
    address: Address,
}

impl InMemorySigner {
    /// Build a signer from seed entropy (16–64 bytes).
    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        let root = XPrv::new(seed).map_err(|_| CryptoError::InvalidSecretKey)?;
        let identifier = PublicIdentifier::new(
            root.public_key().to_extended_key(Prefix::XPUB).to_string(),
        )
        .map_err(|e| CryptoError::InvalidExtendedKey(e.to_string()))?;
        let child = root.derive_child(ChildNumber(0))?;
        let signing_key = child.private_key().clone();
        let address = address_from_verifying_key(signing_key.verifying_key());
        Ok(Self {
            signing_key,
            identifier,
            address,
        })
    }

    /// Build a signer from fresh random entropy.
    pub fn random<R: CryptoRng + RngCore>(rng: &mut R) -> Result<Self, CryptoError> {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }
}

#[async_trait]
impl ChannelSigner for InMemorySigner {
    fn public_identifier(&self) -> &PublicIdentifier {
        &self.identifier
    }

    fn signer_address(&self) -> Address {
        self.address
    }

    async fn sign_digest(&self, digest: B256) -> Result<RecoverableSignature, CryptoError> {
        sign_digest_recoverable(&self.signing_key, digest)
    }
}

impl std::fmt::Debug for InMemorySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySigner")
            .field("identifier", &self.identifier)
            .field("address", &self.address)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_seed_is_deterministic() {
        let a = InMemorySigner::from_seed(&[5u8; 32]).unwrap();
        let b = InMemorySigner::from_seed(&[5u8; 32]).unwrap();
        assert_eq!(a.signer_address(), b.signer_address());
        assert_eq!(a.public_identifier(), b.public_identifier());
    }

    #[test]
    fn test_random_signers_differ() {
        let mut rng = rand::thread_rng();
        let a = InMemorySigner::random(&mut rng).unwrap();
        let b = InMemorySigner::random(&mut rng).unwrap();
        assert_ne!(a.signer_address(), b.signer_address());
    }

    #[test]
    fn test_debug_redacts_key_material() {
        let signer = InMemorySigner::from_seed(&[5u8; 32]).unwrap();
        let rendered = format!("{signer:?}");
        assert!(rendered.contains("[REDACTED]"));
    }
}
