//! Recoverable ECDSA signatures
//!
//! Signatures travel as 65 bytes (`r ‖ s ‖ v`, with `v` in 27/28 as the
//! contracts expect) and always sign a 32-byte digest directly; prefixing
//! and hashing are the commitment builders' concern.

use crate::error::CryptoError;
use crate::identifier::address_from_verifying_key;
use alloy_primitives::{Address, B256};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

/// A 65-byte recoverable ECDSA signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature([u8; 65]);

impl RecoverableSignature {
    /// Load from raw bytes; the recovery byte may be 0/1 or 27/28 and is
    /// normalized to the 27/28 form.
    pub fn from_bytes(bytes: &[u8; 65]) -> Result<Self, CryptoError> {
        EcdsaSignature::from_slice(&bytes[..64]).map_err(|_| CryptoError::InvalidSignature)?;
        let v = match bytes[64] {
            v @ (0 | 1) => v + 27,
            v @ (27 | 28) => v,
            v => return Err(CryptoError::InvalidRecoveryId(v)),
        };
        let mut out = *bytes;
        out[64] = v;
        Ok(Self(out))
    }

    /// Load from a byte slice of exactly 65 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 65] = bytes.try_into().map_err(|_| CryptoError::InvalidSignature)?;
        Self::from_bytes(&arr)
    }

    /// Raw `r ‖ s ‖ v` bytes.
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    /// Owned byte vector, as embedded into `bytes[]` calldata fields.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// The recovery byte in 27/28 form.
    pub fn v(&self) -> u8 {
        self.0[64]
    }

    /// Recover the signer address for a digest.
    pub fn recover_address(&self, digest: B256) -> Result<Address, CryptoError> {
        let sig = EcdsaSignature::from_slice(&self.0[..64])
            .map_err(|_| CryptoError::InvalidSignature)?;
        let recid =
            RecoveryId::from_byte(self.0[64] - 27).ok_or(CryptoError::InvalidRecoveryId(self.0[64]))?;
        let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &sig, recid)
            .map_err(|_| CryptoError::RecoveryFailed)?;
        Ok(address_from_verifying_key(&key))
    }
}

/// Sign a 32-byte digest with recovery.
pub(crate) fn sign_digest_recoverable(
    key: &SigningKey,
    digest: B256,
) -> Result<RecoverableSignature, CryptoError> {
    let (sig, recid) = key
        .sign_prehash_recoverable(digest.as_slice())
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
    let mut bytes = [0u8; 65];
    bytes[..64].copy_from_slice(&sig.to_bytes());
    bytes[64] = 27 + recid.to_byte();
    Ok(RecoverableSignature(bytes))
}

impl std::fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecoverableSignature({}…)", hex::encode(&self.0[..8]))
    }
}

impl Serialize for RecoverableSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for RecoverableSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Self::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}
