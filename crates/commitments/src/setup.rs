//! Setup commitments funding the free balance

use crate::contracts;
use crate::error::CommitmentError;
use crate::multisig::{DomainParams, MultisigTransaction};
use crate::ordering;
use crate::Commitment;
use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolCall;
use offchan_crypto::RecoverableSignature;
use offchan_types::{MinimalTransaction, Operation};
use serde::{Deserialize, Serialize};

/// The first commitment of a channel: a multisig transaction that
/// delegate-calls the outcome executor to settle the free balance after
/// a dispute. Nonce 0 is reserved for it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetupCommitment {
    multisig: Address,
    owners: [Address; 2],
    challenge_registry: Address,
    outcome_executor: Address,
    free_balance_identity_hash: B256,
    domain: DomainParams,
    signatures: [Option<RecoverableSignature>; 2],
}

impl SetupCommitment {
    /// Build an unsigned setup commitment. Owners must be ascending.
    pub fn new(
        multisig: Address,
        owners: [Address; 2],
        challenge_registry: Address,
        outcome_executor: Address,
        free_balance_identity_hash: B256,
        domain: DomainParams,
    ) -> Self {
        Self {
            multisig,
            owners,
            challenge_registry,
            outcome_executor,
            free_balance_identity_hash,
            domain,
            signatures: [None; 2],
        }
    }

    /// The multisig this commitment executes through.
    pub fn multisig(&self) -> Address {
        self.multisig
    }

    /// Identity hash of the free-balance app being protected.
    pub fn free_balance_identity_hash(&self) -> B256 {
        self.free_balance_identity_hash
    }

    fn transaction(&self) -> MultisigTransaction {
        let data = contracts::executeFreeBalanceOutcomeCall {
            challengeRegistry: self.challenge_registry,
            freeBalanceIdentityHash: self.free_balance_identity_hash,
        }
        .abi_encode();
        MultisigTransaction {
            multisig: self.multisig,
            owners: self.owners,
            to: self.outcome_executor,
            value: U256::ZERO,
            data: data.into(),
            operation: Operation::DelegateCall,
            nonce: U256::ZERO,
            domain: self.domain.clone(),
        }
    }
}

impl Commitment for SetupCommitment {
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
