//! App identity and its canonical hash

use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

mod abi {
    use alloy_sol_types::sol;

    sol! {
        /// On-chain identity layout expected by the challenge registry.
        struct AppIdentity {
            uint256 channelNonce;
            address[] participants;
            address appDefinition;
            uint256 defaultTimeout;
        }
    }
}

/// Identity of an app instance, fixed at install time.
///
/// `identity_hash()` is the canonical key for the instance everywhere:
/// store records, commitments, and dispute events all reference it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    /// Channel-wide nonce assigned by the monotonic proposal counter.
    pub channel_nonce: u64,
    /// Participant signer addresses, ascending.
    pub participants: [Address; 2],
    /// Address of the app-definition contract.
    pub app_definition: Address,
    /// Default dispute timeout in blocks.
    pub default_timeout: u64,
}

impl AppIdentity {
    /// Build an identity, sorting the participants into canonical order.
    pub fn new(
        channel_nonce: u64,
        mut participants: [Address; 2],
        app_definition: Address,
        default_timeout: u64,
    ) -> Self {
        participants.sort();
        Self {
            channel_nonce,
            participants,
            app_definition,
            default_timeout,
        }
    }

    /// ABI-encode the identity exactly as `abi.encode(identity)` would
    /// on chain.
    pub fn abi_encode(&self) -> Vec<u8> {
        abi::AppIdentity {
            channelNonce: U256::from(self.channel_nonce),
            participants: self.participants.to_vec(),
            appDefinition: self.app_definition,
            defaultTimeout: U256::from(self.default_timeout),
        }
        .abi_encode()
    }

    /// `keccak256(abi.encode(identity))`, the canonical app key.
    pub fn identity_hash(&self) -> B256 {
        keccak256(self.abi_encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn identity() -> AppIdentity {
        AppIdentity::new(
            7,
            [
                address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"),
                address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
            ],
            address!("00000000000000000000000000000000000000aa"),
            100,
        )
    }

    #[test]
    fn test_participants_sorted_on_construction() {
        let id = identity();
        assert!(id.participants[0] < id.participants[1]);
    }

    #[test]
    fn test_identity_hash_is_stable() {
        assert_eq!(identity().identity_hash(), identity().identity_hash());
    }

    #[test]
    fn test_identity_hash_binds_every_field() {
        let base = identity();
        let mut other = identity();
        other.channel_nonce += 1;
        assert_ne!(base.identity_hash(), other.identity_hash());

        let mut other = identity();
        other.default_timeout += 1;
        assert_ne!(base.identity_hash(), other.identity_hash());
    }

    #[test]
    fn test_abi_encoding_starts_with_static_head() {
        // channelNonce occupies the first word of the tuple encoding.
        let encoded = identity().abi_encode();
        assert_eq!(encoded[..32], U256::from(7u64).to_be_bytes::<32>());
    }
}
