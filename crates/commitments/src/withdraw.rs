//! Withdrawal commitments moving funds out of the multisig

use crate::contracts;
use crate::error::CommitmentError;
use crate::multisig::{DomainParams, MultisigTransaction};
use crate::ordering;
use crate::Commitment;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use offchan_crypto::RecoverableSignature;
use offchan_types::{MinimalTransaction, Operation, CONVENTION_FOR_ETH_TOKEN_ADDRESS};
use serde::{Deserialize, Serialize};

/// A double-signed transfer out of the multisig: a direct value send
/// for the native asset, an ERC20 `transfer` otherwise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WithdrawCommitment {
    multisig: Address,
    owners: [Address; 2],
    recipient: Address,
    asset_id: Address,
    amount: U256,
    withdrawal_nonce: u64,
    domain: DomainParams,
    signatures: [Option<RecoverableSignature>; 2],
}

impl WithdrawCommitment {
    /// Build an unsigned withdrawal. Owners must be ascending.
    pub fn new(
        multisig: Address,
        owners: [Address; 2],
        recipient: Address,
        asset_id: Address,
        amount: U256,
        withdrawal_nonce: u64,
        domain: DomainParams,
    ) -> Self {
        Self {
            multisig,
            owners,
            recipient,
            asset_id,
            amount,
            withdrawal_nonce,
            domain,
            signatures: [None; 2],
        }
    }

    /// Recipient of the withdrawn funds.
    pub fn recipient(&self) -> Address {
        self.recipient
    }

    /// Asset being withdrawn.
    pub fn asset_id(&self) -> Address {
        self.asset_id
    }

    /// Amount being withdrawn.
    pub fn amount(&self) -> U256 {
        self.amount
    }

    fn transaction(&self) -> MultisigTransaction {
        let (to, value, data) = if self.asset_id == CONVENTION_FOR_ETH_TOKEN_ADDRESS {
            (self.recipient, self.amount, Bytes::new())
        } else {
            let data = contracts::transferCall {
                to: self.recipient,
                amount: self.amount,
            }
            .abi_encode();
            (self.asset_id, U256::ZERO, Bytes::from(data))
        };
        MultisigTransaction {
            multisig: self.multisig,
            owners: self.owners,
            to,
            value,
            data,
            operation: Operation::Call,
            nonce: U256::from(self.withdrawal_nonce),
            domain: self.domain.clone(),
        }
    }
}

impl Commitment for WithdrawCommitment {
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

    fn commitment(asset: Address) -> WithdrawCommitment {
        WithdrawCommitment::new(
            address!("1111111111111111111111111111111111111111"),
            [
                address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
                address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"),
            ],
            address!("9999999999999999999999999999999999999999"),
            asset,
            U256::from(1000),
            1,
            DomainParams {
                name: "MinimumViableMultisig".into(),
                version: "1".into(),
                chain_id: 1,
                salt: B256::ZERO,
            },
        )
    }

    #[test]
    fn test_native_withdrawal_is_direct_value_send() {
        let c = commitment(CONVENTION_FOR_ETH_TOKEN_ADDRESS);
        let tx = c.transaction();
        assert_eq!(tx.to, c.recipient());
        assert_eq!(tx.value, U256::from(1000));
        assert!(tx.data.is_empty());
    }

    #[test]
    fn test_erc20_withdrawal_calls_transfer() {
        let token = address!("7777777777777777777777777777777777777777");
        let c = commitment(token);
        let tx = c.transaction();
        assert_eq!(tx.to, token);
        assert_eq!(tx.value, U256::ZERO);
        // transfer(address,uint256) selector.
        assert_eq!(tx.data[..4], contracts::transferCall::SELECTOR);
    }

    #[test]
    fn test_nonce_distinguishes_repeat_withdrawals() {
        let token = CONVENTION_FOR_ETH_TOKEN_ADDRESS;
        let a = commitment(token);
        let mut b = commitment(token);
        b.withdrawal_nonce = 2;
        assert_ne!(a.hash_to_sign(), b.hash_to_sign());
    }
}
