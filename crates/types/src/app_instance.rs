//! Installed app instances

use crate::error::ModelError;
use crate::identity::AppIdentity;
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

mod abi {
    use alloy_sol_types::sol;

    sol! {
        /// Parameter blob consumed by the multi-asset outcome interpreter.
        struct MultiAssetInterpreterParams {
            uint256[] limit;
            address[] tokenAddresses;
        }
    }
}

/// Parameters for the outcome interpreter routing this app's final
/// outcome back into the free balance. `limit` caps the per-token value
/// the interpreter may move and equals the deposits locked at install.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterParams {
    /// Per-token caps, parallel to `token_addresses`.
    pub limit: Vec<U256>,
    /// Tokens the app's outcome may touch.
    pub token_addresses: Vec<Address>,
}

impl InterpreterParams {
    /// ABI-encode the blob embedded in the conditional commitment.
    pub fn abi_encode(&self) -> Vec<u8> {
        abi::MultiAssetInterpreterParams {
            limit: self.limit.clone(),
            tokenAddresses: self.token_addresses.clone(),
        }
        .abi_encode()
    }
}

/// An installed app instance.
///
/// The engine treats `latest_state` as opaque bytes owned by the
/// app-definition contract; it only ever hashes them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInstance {
    /// Install-time identity; `identity_hash()` is the canonical key.
    pub identity: AppIdentity,
    /// Latest ABI-encoded app state.
    pub latest_state: Bytes,
    /// Monotonically non-decreasing per instance.
    pub version_number: u64,
    /// Challenge window in blocks for the current state.
    pub state_timeout: u64,
    /// Action whose post-image is `latest_state`, kept while a
    /// TakeAction exchange is in flight to enable unilateral progress.
    pub latest_action: Option<Bytes>,
    /// Outcome-interpreter parameters fixed at install.
    pub interpreter_params: InterpreterParams,
}

impl AppInstance {
    /// Canonical app key.
    pub fn identity_hash(&self) -> B256 {
        self.identity.identity_hash()
    }

    /// Hash of the latest state bytes.
    pub fn latest_state_hash(&self) -> B256 {
        keccak256(&self.latest_state)
    }

    /// Pure transition to a new state at `version_number + 1`.
    ///
    /// `action` is recorded when the transition came from a TakeAction
    /// exchange and cleared otherwise.
    pub fn advanced(&self, new_state: Bytes, state_timeout: u64, action: Option<Bytes>) -> Self {
        Self {
            identity: self.identity.clone(),
            latest_state: new_state,
            version_number: self.version_number + 1,
            state_timeout,
            latest_action: action,
            interpreter_params: self.interpreter_params.clone(),
        }
    }

    /// Reject updates that do not advance the version number.
    pub fn ensure_advances(&self, proposed_version: u64) -> Result<(), ModelError> {
        if proposed_version <= self.version_number {
            return Err(ModelError::StaleVersion {
                current: self.version_number,
                proposed: proposed_version,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn instance() -> AppInstance {
        AppInstance {
            identity: AppIdentity::new(
                1,
                [
                    address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
                    address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"),
                ],
                address!("00000000000000000000000000000000000000aa"),
                100,
            ),
            latest_state: Bytes::from(vec![0u8; 32]),
            version_number: 1,
            state_timeout: 50,
            latest_action: None,
            interpreter_params: InterpreterParams {
                limit: vec![U256::from(200)],
                token_addresses: vec![Address::ZERO],
            },
        }
    }

    #[test]
    fn test_advanced_bumps_version_and_rehashes() {
        let app = instance();
        let next = app.advanced(Bytes::from(vec![1u8; 32]), 50, None);
        assert_eq!(next.version_number, 2);
        assert_ne!(next.latest_state_hash(), app.latest_state_hash());
        assert_eq!(next.identity_hash(), app.identity_hash());
    }

    #[test]
    fn test_pending_action_recorded_and_cleared() {
        let app = instance();
        let action = Bytes::from(vec![9u8; 4]);
        let pending = app.advanced(Bytes::from(vec![1u8; 32]), 50, Some(action.clone()));
        assert_eq!(pending.latest_action, Some(action));
        let settled = pending.advanced(Bytes::from(vec![2u8; 32]), 50, None);
        assert_eq!(settled.latest_action, None);
    }

    #[test]
    fn test_stale_version_rejected() {
        let app = instance();
        assert!(app.ensure_advances(2).is_ok());
        assert!(matches!(
            app.ensure_advances(1),
            Err(ModelError::StaleVersion { current: 1, proposed: 1 })
        ));
    }
}
