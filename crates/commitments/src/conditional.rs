//! Conditional transaction commitments binding an app's outcome

use crate::contracts;
use crate::error::CommitmentError;
use crate::multisig::{DomainParams, MultisigTransaction};
use crate::ordering;
use crate::Commitment;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use offchan_crypto::RecoverableSignature;
use offchan_types::{MinimalTransaction, Operation};
use serde::{Deserialize, Serialize};

/// Signed at Install: commits the multisig to route the named app's
/// adjudicated outcome through its interpreter. The app's channel nonce
/// doubles as the multisig replay nonce, so each installed app gets a
/// distinct digest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionalTransactionCommitment {
    multisig: Address,
    owners: [Address; 2],
    challenge_registry: Address,
    outcome_executor: Address,
    free_balance_identity_hash: B256,
    app_identity_hash: B256,
    interpreter: Address,
    interpreter_params: Bytes,
    channel_nonce: u64,
    domain: DomainParams,
    signatures: [Option<RecoverableSignature>; 2],
}

impl ConditionalTransactionCommitment {
    /// Build an unsigned conditional commitment. Owners must be ascending.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        multisig: Address,
        owners: [Address; 2],
        challenge_registry: Address,
        outcome_executor: Address,
        free_balance_identity_hash: B256,
        app_identity_hash: B256,
        interpreter: Address,
        interpreter_params: Bytes,
        channel_nonce: u64,
        domain: DomainParams,
    ) -> Self {
        Self {
            multisig,
            owners,
            challenge_registry,
            outcome_executor,
            free_balance_identity_hash,
            app_identity_hash,
            interpreter,
            interpreter_params,
            channel_nonce,
            domain,
            signatures: [None; 2],
        }
    }

    /// Identity hash of the app whose outcome this commitment routes.
    pub fn app_identity_hash(&self) -> B256 {
        self.app_identity_hash
    }

    fn transaction(&self) -> MultisigTransaction {
        let data = contracts::executeAppOutcomeCall {
            challengeRegistry: self.challenge_registry,
            freeBalanceIdentityHash: self.free_balance_identity_hash,
            appIdentityHash: self.app_identity_hash,
            interpreter: self.interpreter,
            interpreterParams: self.interpreter_params.clone(),
        }
        .abi_encode();
        MultisigTransaction {
            multisig: self.multisig,
            owners: self.owners,
            to: self.outcome_executor,
            value: U256::ZERO,
            data: data.into(),
            operation: Operation::DelegateCall,
            nonce: U256::from(self.channel_nonce),
            domain: self.domain.clone(),
        }
    }
}

impl Commitment for ConditionalTransactionCommitment {
    fn encode(&self) -> Vec<u8> {
        self.transaction().data.to_vec()
    }

    fn hash_to_sign(&self) -> B256 {
        self.transaction().hash_to_sign()
    }

    fn add_signatures(&mut self, sigs: &[RecoverableSignature]) -> Result<(), CommitmentError> {
        let digest = self.hash_to_sign();
        let owners = self.owners;
        ordering::slot_signatures(digest, &owners, &mut self.signatures, sigs)
    }

    fn signed_transaction(&self) -> Result<MinimalTransaction, CommitmentError> {
        let sigs = ordering::ordered(&self.signatures)?;
        Ok(self.transaction().exec_transaction(&sigs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn commitment(channel_nonce: u64) -> ConditionalTransactionCommitment {
        ConditionalTransactionCommitment::new(
            address!("1111111111111111111111111111111111111111"),
            [
                address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
                address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"),
            ],
            address!("00000000000000000000000000000000000000cc"),
            address!("00000000000000000000000000000000000000ee"),
            B256::repeat_byte(0xfb),
            B256::repeat_byte(0x7a),
            address!("00000000000000000000000000000000000000dd"),
            Bytes::from(vec![1, 2, 3]),
            channel_nonce,
            DomainParams {
                name: "MinimumViableMultisig".into(),
                version: "1".into(),
                chain_id: 1,
                salt: B256::ZERO,
            },
        )
    }

    #[test]
    fn test_each_app_nonce_gets_distinct_digest() {
        assert_ne!(commitment(1).hash_to_sign(), commitment(2).hash_to_sign());
    }

    #[test]
    fn test_digest_binds_interpreter_params() {
        let base = commitment(1);
        let mut other = commitment(1);
        other.interpreter_params = Bytes::from(vec![9]);
        assert_ne!(base.hash_to_sign(), other.hash_to_sign());
    }
}
