//! SetState commitments against the challenge registry

use crate::contracts;
use crate::error::CommitmentError;
use crate::ordering;
use crate::Commitment;
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolValue};
use offchan_crypto::RecoverableSignature;
use offchan_types::{AppIdentity, MinimalTransaction};
use serde::{Deserialize, Serialize};

/// A commitment to one app state at one version number.
///
/// The digest layout is fixed by the challenge registry:
/// `keccak256(0x19 ‖ identityHash ‖ versionNumber ‖ timeout ‖ stateHash)`
/// under packed encoding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetStateCommitment {
    identity: AppIdentity,
    app_state_hash: B256,
    version_number: u64,
    state_timeout: u64,
    challenge_registry: Address,
    signatures: [Option<RecoverableSignature>; 2],
}

impl SetStateCommitment {
    /// Build an unsigned commitment.
    pub fn new(
        identity: AppIdentity,
        app_state_hash: B256,
        version_number: u64,
        state_timeout: u64,
        challenge_registry: Address,
    ) -> Self {
        Self {
            identity,
            app_state_hash,
            version_number,
            state_timeout,
            challenge_registry,
            signatures: [None; 2],
        }
    }

    /// Identity the commitment is scoped to.
    pub fn identity(&self) -> &AppIdentity {
        &self.identity
    }

    /// Committed state hash.
    pub fn app_state_hash(&self) -> B256 {
        self.app_state_hash
    }

    /// Committed version number.
    pub fn version_number(&self) -> u64 {
        self.version_number
    }

    /// Challenge window committed alongside the state.
    pub fn state_timeout(&self) -> u64 {
        self.state_timeout
    }

    /// Number of signatures attached so far.
    pub fn signature_count(&self) -> usize {
        self.signatures.iter().flatten().count()
    }

    /// Signatures in participant order (ascending by signer address).
    pub fn signatures(&self) -> &[Option<RecoverableSignature>; 2] {
        &self.signatures
    }

    fn update(&self) -> contracts::SignedStateHashUpdate {
        contracts::SignedStateHashUpdate {
            appStateHash: self.app_state_hash,
            versionNumber: U256::from(self.version_number),
            timeout: U256::from(self.state_timeout),
            signatures: self
                .signatures
                .iter()
                .flatten()
                .map(|s| Bytes::from(s.to_vec()))
                .collect(),
        }
    }
}

impl Commitment for SetStateCommitment {
    fn encode(&self) -> Vec<u8> {
        (contracts::sol_identity(&self.identity), self.update()).abi_encode()
    }

    fn hash_to_sign(&self) -> B256 {
        let mut buf = Vec::with_capacity(1 + 32 * 4);
        buf.push(0x19);
        buf.extend_from_slice(self.identity.identity_hash().as_slice());
        buf.extend_from_slice(&U256::from(self.version_number).to_be_bytes::<32>());
        buf.extend_from_slice(&U256::from(self.state_timeout).to_be_bytes::<32>());
        buf.extend_from_slice(self.app_state_hash.as_slice());
        keccak256(&buf)
    }

    fn add_signatures(&mut self, sigs: &[RecoverableSignature]) -> Result<(), CommitmentError> {
        let digest = self.hash_to_sign();
        let participants = self.identity.participants;
        ordering::slot_signatures(digest, &participants, &mut self.signatures, sigs)
    }

    fn signed_transaction(&self) -> Result<MinimalTransaction, CommitmentError> {
        ordering::ordered(&self.signatures)?;
        let data = contracts::setStateCall {
            identity: contracts::sol_identity(&self.identity),
            req: self.update(),
        }
        .abi_encode();
        Ok(MinimalTransaction {
            to: self.challenge_registry,
            value: U256::ZERO,
            data: data.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use alloy_sol_types::SolValue;
    use offchan_crypto::{ChannelSigner, InMemorySigner};

    fn signers() -> (InMemorySigner, InMemorySigner) {
        let a = InMemorySigner::from_seed(&[1u8; 32]).unwrap();
        let b = InMemorySigner::from_seed(&[2u8; 32]).unwrap();
        (a, b)
    }

    fn commitment(participants: [Address; 2]) -> SetStateCommitment {
        SetStateCommitment::new(
            AppIdentity::new(
                2,
                participants,
                address!("00000000000000000000000000000000000000aa"),
                100,
            ),
            keccak256(b"app-state"),
            2,
            50,
            address!("00000000000000000000000000000000000000cc"),
        )
    }

    #[test]
    fn test_digest_known_answer() {
        let c = commitment([
            address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
            address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"),
        ]);
        let mut buf = vec![0x19];
        buf.extend_from_slice(c.identity().identity_hash().as_slice());
        buf.extend_from_slice(&U256::from(2u64).to_be_bytes::<32>());
        buf.extend_from_slice(&U256::from(50u64).to_be_bytes::<32>());
        buf.extend_from_slice(keccak256(b"app-state").as_slice());
        assert_eq!(c.hash_to_sign(), keccak256(&buf));
    }

    #[tokio::test]
    async fn test_signed_transaction_orders_ascending() {
        let (a, b) = signers();
        let mut c = commitment([a.signer_address(), b.signer_address()]);
        let digest = c.hash_to_sign();
        // Add in whichever order; the builder slots by recovered address.
        c.add_signatures(&[b.sign_digest(digest).await.unwrap()]).unwrap();
        c.add_signatures(&[a.sign_digest(digest).await.unwrap()]).unwrap();

        let sigs = c.signatures();
        let lo = c.identity().participants[0];
        let hi = c.identity().participants[1];
        assert!(lo < hi);
        assert_eq!(sigs[0].unwrap().recover_address(digest).unwrap(), lo);
        assert_eq!(sigs[1].unwrap().recover_address(digest).unwrap(), hi);
        assert!(c.signed_transaction().is_ok());
    }

    #[tokio::test]
    async fn test_single_signed_cannot_broadcast() {
        let (a, b) = signers();
        let mut c = commitment([a.signer_address(), b.signer_address()]);
        let digest = c.hash_to_sign();
        c.add_signatures(&[a.sign_digest(digest).await.unwrap()]).unwrap();
        assert_eq!(c.signature_count(), 1);
        assert!(matches!(
            c.signed_transaction(),
            Err(CommitmentError::MissingSignature)
        ));
    }

    #[test]
    fn test_encode_round_trips_through_abi_decoder() {
        let c = commitment([
            address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
            address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"),
        ]);
        let encoded = c.encode();
        let (identity, update) = <(
            crate::contracts::AppIdentity,
            crate::contracts::SignedStateHashUpdate,
        )>::abi_decode(&encoded, true)
        .unwrap();
        assert_eq!(identity.channelNonce, U256::from(2u64));
        assert_eq!(identity.participants.len(), 2);
        assert_eq!(update.appStateHash, c.app_state_hash());
        assert_eq!(update.versionNumber, U256::from(2u64));
        assert_eq!(update.timeout, U256::from(50u64));
    }
}
