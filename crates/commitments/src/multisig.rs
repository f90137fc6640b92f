//! Multisig transaction hashing and CREATE2 address derivation

use crate::contracts;
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolValue};
use offchan_crypto::RecoverableSignature;
use offchan_types::{MinimalTransaction, Operation};
use serde::{Deserialize, Serialize};

/// EIP-712-style domain parameters baked into every multisig digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainParams {
    /// Domain name registered by the multisig master copy.
    pub name: String,
    /// Domain version string.
    pub version: String,
    /// Chain the multisig lives on.
    pub chain_id: u64,
    /// Salt distinguishing deployments.
    pub salt: B256,
}

/// A transaction to be executed by the multisig, in pre-image form.
///
/// The digest layout is fixed by the multisig contract:
/// `keccak256(0x19 ‖ owners[] ‖ to ‖ value ‖ keccak256(data) ‖ op ‖
/// domainSeparator ‖ nonce)` under packed encoding, with array elements
/// padded to 32 bytes as Solidity packs them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigTransaction {
    /// The multisig executing the call.
    pub multisig: Address,
    /// Owner addresses, ascending.
    pub owners: [Address; 2],
    /// Inner call target.
    pub to: Address,
    /// Inner call value.
    pub value: U256,
    /// Inner calldata.
    pub data: Bytes,
    /// Call or delegate-call.
    pub operation: Operation,
    /// Per-multisig replay nonce.
    pub nonce: U256,
    /// Domain parameters.
    pub domain: DomainParams,
}

impl MultisigTransaction {
    /// `keccak256(abi.encodePacked(keccak256(name), keccak256(version),
    /// chainId, address(multisig), salt))`.
    pub fn domain_separator(&self) -> B256 {
        let mut buf = Vec::with_capacity(32 * 4 + 20);
        buf.extend_from_slice(keccak256(self.domain.name.as_bytes()).as_slice());
        buf.extend_from_slice(keccak256(self.domain.version.as_bytes()).as_slice());
        buf.extend_from_slice(&U256::from(self.domain.chain_id).to_be_bytes::<32>());
        buf.extend_from_slice(self.multisig.as_slice());
        buf.extend_from_slice(self.domain.salt.as_slice());
        keccak256(&buf)
    }

    /// The digest both owners sign.
    pub fn hash_to_sign(&self) -> B256 {
        let mut buf = Vec::with_capacity(1 + 32 * 2 + 20 + 32 * 2 + 1 + 32 * 2);
        buf.push(0x19);
        for owner in &self.owners {
            // Array elements stay 32-byte padded even under packed encoding.
            buf.extend_from_slice(B256::left_padding_from(owner.as_slice()).as_slice());
        }
        buf.extend_from_slice(self.to.as_slice());
        buf.extend_from_slice(&self.value.to_be_bytes::<32>());
        buf.extend_from_slice(keccak256(&self.data).as_slice());
        buf.push(self.operation.as_u8());
        buf.extend_from_slice(self.domain_separator().as_slice());
        buf.extend_from_slice(&self.nonce.to_be_bytes::<32>());
        keccak256(&buf)
    }

    /// Wrap the inner call into `execTransaction` calldata with the
    /// ordered signatures attached.
    pub fn exec_transaction(&self, signatures: &[RecoverableSignature; 2]) -> MinimalTransaction {
        let data = contracts::execTransactionCall {
            to: self.to,
            value: self.value,
            data: self.data.clone(),
            operation: self.operation.as_u8(),
            domainName: self.domain.name.clone(),
            domainVersion: self.domain.version.clone(),
            chainId: U256::from(self.domain.chain_id),
            domainSalt: self.domain.salt,
            nonce: self.nonce,
            signatures: signatures.iter().map(|s| Bytes::from(s.to_vec())).collect(),
        }
        .abi_encode();
        MinimalTransaction {
            to: self.multisig,
            value: U256::ZERO,
            data: data.into(),
        }
    }
}

/// CREATE2-deterministic multisig address from the ordered owners, the
/// master copy, and the proxy factory that will deploy it.
pub fn derive_multisig_address(
    owners: [Address; 2],
    master_copy: Address,
    proxy_factory: Address,
    proxy_init_code: &Bytes,
) -> Address {
    let mut owners = owners;
    owners.sort();
    let salt = keccak256(owners.to_vec().abi_encode());
    let mut init_code = proxy_init_code.to_vec();
    init_code.extend_from_slice(&master_copy.abi_encode());
    let init_code_hash = keccak256(&init_code);
    let mut buf = Vec::with_capacity(1 + 20 + 32 + 32);
    buf.push(0xff);
    buf.extend_from_slice(proxy_factory.as_slice());
    buf.extend_from_slice(salt.as_slice());
    buf.extend_from_slice(init_code_hash.as_slice());
    Address::from_slice(&keccak256(&buf)[12..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn tx() -> MultisigTransaction {
        MultisigTransaction {
            multisig: address!("1111111111111111111111111111111111111111"),
            owners: [
                address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
                address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"),
            ],
            to: address!("2222222222222222222222222222222222222222"),
            value: U256::from(5),
            data: Bytes::from(vec![0xde, 0xad]),
            operation: Operation::Call,
            nonce: U256::from(3),
            domain: DomainParams {
                name: "MinimumViableMultisig".into(),
                version: "1".into(),
                chain_id: 1,
                salt: B256::ZERO,
            },
        }
    }

    #[test]
    fn test_domain_separator_known_answer() {
        let tx = tx();
        // Recompute by hand to pin the packed layout.
        let mut buf = Vec::new();
        buf.extend_from_slice(keccak256(b"MinimumViableMultisig").as_slice());
        buf.extend_from_slice(keccak256(b"1").as_slice());
        buf.extend_from_slice(&U256::from(1u64).to_be_bytes::<32>());
        buf.extend_from_slice(tx.multisig.as_slice());
        buf.extend_from_slice(&[0u8; 32]);
        assert_eq!(tx.domain_separator(), keccak256(&buf));
    }

    #[test]
    fn test_hash_to_sign_pins_packed_layout() {
        let tx = tx();
        let mut buf = vec![0x19];
        buf.extend_from_slice(&[0u8; 12]);
        buf.extend_from_slice(tx.owners[0].as_slice());
        buf.extend_from_slice(&[0u8; 12]);
        buf.extend_from_slice(tx.owners[1].as_slice());
        buf.extend_from_slice(tx.to.as_slice());
        buf.extend_from_slice(&U256::from(5u64).to_be_bytes::<32>());
        buf.extend_from_slice(keccak256([0xde, 0xad]).as_slice());
        buf.push(0);
        buf.extend_from_slice(tx.domain_separator().as_slice());
        buf.extend_from_slice(&U256::from(3u64).to_be_bytes::<32>());
        assert_eq!(tx.hash_to_sign(), keccak256(&buf));
    }

    #[test]
    fn test_digest_binds_operation() {
        let call = tx();
        let mut delegate = tx();
        delegate.operation = Operation::DelegateCall;
        assert_ne!(call.hash_to_sign(), delegate.hash_to_sign());
    }

    #[test]
    fn test_create2_is_deterministic_and_order_insensitive() {
        let a = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        let b = address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
        let master = address!("3333333333333333333333333333333333333333");
        let factory = address!("4444444444444444444444444444444444444444");
        let init_code = Bytes::from(vec![0x60, 0x80]);
        let addr_ab = derive_multisig_address([a, b], master, factory, &init_code);
        let addr_ba = derive_multisig_address([b, a], master, factory, &init_code);
        assert_eq!(addr_ab, addr_ba);

        let other_factory = address!("5555555555555555555555555555555555555555");
        assert_ne!(
            addr_ab,
            derive_multisig_address([a, b], master, other_factory, &init_code)
        );
    }
}
