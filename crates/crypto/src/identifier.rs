//! Signer-address derivation from extended public identifiers

use crate::error::CryptoError;
use alloy_primitives::{keccak256, Address};
use bip32::{ChildNumber, XPub};
use k256::ecdsa::VerifyingKey;
use offchan_types::PublicIdentifier;
use std::str::FromStr;

/// Derive an Ethereum address from a verifying key:
/// `keccak256(uncompressed_pubkey[1..])[12..]`.
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let uncompressed = key.to_encoded_point(false);
    // Skip the 0x04 prefix byte.
    let hash = keccak256(&uncompressed.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// The canonical signer address of a participant: the address of the
/// identifier's first non-hardened child key (`m/0`).
pub fn signer_address_of(identifier: &PublicIdentifier) -> Result<Address, CryptoError> {
    let xpub = XPub::from_str(identifier.as_str())
        .map_err(|e| CryptoError::InvalidExtendedKey(e.to_string()))?;
    let child = xpub.derive_child(ChildNumber(0))?;
    Ok(address_from_verifying_key(child.public_key()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{ChannelSigner, InMemorySigner};

    #[test]
    fn test_signer_address_matches_local_derivation() {
        let signer = InMemorySigner::from_seed(&[3u8; 32]).unwrap();
        let derived = signer_address_of(signer.public_identifier()).unwrap();
        assert_eq!(derived, signer.signer_address());
    }

    #[test]
    fn test_distinct_seeds_yield_distinct_addresses() {
        let a = InMemorySigner::from_seed(&[1u8; 32]).unwrap();
        let b = InMemorySigner::from_seed(&[2u8; 32]).unwrap();
        assert_ne!(
            signer_address_of(a.public_identifier()).unwrap(),
            signer_address_of(b.public_identifier()).unwrap()
        );
    }

    #[test]
    fn test_rejects_garbage_identifier() {
        let id = PublicIdentifier::new("xpubNotARealKey0000000000000").unwrap();
        assert!(signer_address_of(&id).is_err());
    }
}
