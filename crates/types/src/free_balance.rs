//! The distinguished free-balance app instance

use crate::error::ModelError;
use crate::identity::AppIdentity;
use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod abi {
    use alloy_sol_types::sol;

    sol! {
        struct CoinTransfer {
            address to;
            uint256 amount;
        }

        /// ABI schema of the free-balance app state. Token rows are
        /// parallel to `tokenAddresses`; entries within a row follow
        /// participant address order.
        struct FreeBalanceState {
            address[] tokenAddresses;
            CoinTransfer[][] balances;
            bytes32[] activeApps;
        }
    }
}

/// A single `(recipient, amount)` entry of an outcome or balance row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinTransfer {
    /// Recipient signer address.
    pub to: Address,
    /// Amount under the row's token.
    pub amount: U256,
}

/// Typed state of the free-balance app: per-token columns for each
/// participant plus the set of currently installed (funded) apps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeBalanceState {
    participants: [Address; 2],
    balances: BTreeMap<Address, [U256; 2]>,
    active_apps: Vec<B256>,
}

impl FreeBalanceState {
    /// Empty state for a fresh channel. Participants must already be in
    /// ascending address order.
    pub fn new(participants: [Address; 2]) -> Self {
        Self {
            participants,
            balances: BTreeMap::new(),
            active_apps: Vec::new(),
        }
    }

    /// The participant columns, ascending.
    pub fn participants(&self) -> &[Address; 2] {
        &self.participants
    }

    /// Tokens with at least one recorded column.
    pub fn tokens(&self) -> impl Iterator<Item = &Address> {
        self.balances.keys()
    }

    /// Identity hashes of apps currently funded out of this balance.
    pub fn active_apps(&self) -> &[B256] {
        &self.active_apps
    }

    fn column(&self, owner: &Address) -> Result<usize, ModelError> {
        self.participants
            .iter()
            .position(|p| p == owner)
            .ok_or(ModelError::UnknownParticipant(*owner))
    }

    /// Balance of one participant under one token.
    pub fn balance_of(&self, token: &Address, owner: &Address) -> Result<U256, ModelError> {
        let col = self.column(owner)?;
        Ok(self.balances.get(token).map(|row| row[col]).unwrap_or_default())
    }

    /// Sum of both columns under one token.
    pub fn total(&self, token: &Address) -> U256 {
        self.balances
            .get(token)
            .map(|row| row[0] + row[1])
            .unwrap_or_default()
    }

    /// Credit a participant's column.
    pub fn credit(
        &mut self,
        token: Address,
        owner: &Address,
        amount: U256,
    ) -> Result<(), ModelError> {
        let col = self.column(owner)?;
        let row = self.balances.entry(token).or_insert([U256::ZERO; 2]);
        row[col] += amount;
        Ok(())
    }

    /// Debit a participant's column, rejecting overdraws.
    pub fn debit(
        &mut self,
        token: Address,
        owner: &Address,
        amount: U256,
    ) -> Result<(), ModelError> {
        let col = self.column(owner)?;
        let row = self.balances.entry(token).or_insert([U256::ZERO; 2]);
        if row[col] < amount {
            return Err(ModelError::InsufficientBalance {
                token,
                owner: *owner,
            });
        }
        row[col] -= amount;
        Ok(())
    }

    /// Record an app as funded out of this balance.
    pub fn add_active_app(&mut self, identity_hash: B256) -> Result<(), ModelError> {
        if self.active_apps.contains(&identity_hash) {
            return Err(ModelError::DuplicateApp(identity_hash));
        }
        self.active_apps.push(identity_hash);
        Ok(())
    }

    /// Remove an app from the funded set.
    pub fn remove_active_app(&mut self, identity_hash: &B256) -> Result<(), ModelError> {
        let idx = self
            .active_apps
            .iter()
            .position(|h| h == identity_hash)
            .ok_or(ModelError::AppNotFound(*identity_hash))?;
        self.active_apps.remove(idx);
        Ok(())
    }

    /// ABI-encode the state under the on-chain schema.
    pub fn abi_encode(&self) -> Vec<u8> {
        let token_addresses: Vec<Address> = self.balances.keys().copied().collect();
        let balances: Vec<Vec<abi::CoinTransfer>> = self
            .balances
            .values()
            .map(|row| {
                self.participants
                    .iter()
                    .zip(row.iter())
                    .map(|(to, amount)| abi::CoinTransfer {
                        to: *to,
                        amount: *amount,
                    })
                    .collect()
            })
            .collect();
        abi::FreeBalanceState {
            tokenAddresses: token_addresses,
            balances,
            activeApps: self.active_apps.clone(),
        }
        .abi_encode()
    }

    /// `keccak256` of the ABI encoding, the hash committed to by
    /// free-balance SetState commitments.
    pub fn hash(&self) -> B256 {
        keccak256(self.abi_encode())
    }
}

/// The free-balance app instance: identity plus typed state and the
/// version counter advanced by every install/uninstall.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeBalanceApp {
    /// Identity of the free-balance app (channel nonce 0).
    pub identity: AppIdentity,
    /// Typed state; the ABI encoding is what gets hashed and signed.
    pub state: FreeBalanceState,
    /// Monotonically increasing version, 1 after Setup.
    pub version_number: u64,
    /// Challenge window in blocks for the current state.
    pub state_timeout: u64,
}

impl FreeBalanceApp {
    /// Canonical app key of the free-balance instance.
    pub fn identity_hash(&self) -> B256 {
        self.identity.identity_hash()
    }

    /// Hash of the current state.
    pub fn state_hash(&self) -> B256 {
        self.state.hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const A: Address = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    const B: Address = address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
    const TOKEN: Address = Address::ZERO;

    fn state() -> FreeBalanceState {
        FreeBalanceState::new([A, B])
    }

    #[test]
    fn test_credit_then_debit() {
        let mut fb = state();
        fb.credit(TOKEN, &A, U256::from(100)).unwrap();
        fb.debit(TOKEN, &A, U256::from(40)).unwrap();
        assert_eq!(fb.balance_of(&TOKEN, &A).unwrap(), U256::from(60));
        assert_eq!(fb.total(&TOKEN), U256::from(60));
    }

    #[test]
    fn test_overdraw_rejected() {
        let mut fb = state();
        fb.credit(TOKEN, &A, U256::from(10)).unwrap();
        let err = fb.debit(TOKEN, &A, U256::from(11)).unwrap_err();
        assert!(matches!(err, ModelError::InsufficientBalance { .. }));
        // Rejected debit leaves the column untouched.
        assert_eq!(fb.balance_of(&TOKEN, &A).unwrap(), U256::from(10));
    }

    #[test]
    fn test_unknown_participant_rejected() {
        let mut fb = state();
        let stranger = address!("cccccccccccccccccccccccccccccccccccccccc");
        assert!(matches!(
            fb.credit(TOKEN, &stranger, U256::from(1)),
            Err(ModelError::UnknownParticipant(_))
        ));
    }

    #[test]
    fn test_active_app_set_rejects_duplicates() {
        let mut fb = state();
        let h = B256::repeat_byte(7);
        fb.add_active_app(h).unwrap();
        assert!(matches!(fb.add_active_app(h), Err(ModelError::DuplicateApp(_))));
        fb.remove_active_app(&h).unwrap();
        assert!(matches!(
            fb.remove_active_app(&h),
            Err(ModelError::AppNotFound(_))
        ));
    }

    #[test]
    fn test_hash_tracks_state() {
        let mut fb = state();
        let empty = fb.hash();
        fb.credit(TOKEN, &B, U256::from(5)).unwrap();
        assert_ne!(fb.hash(), empty);
    }
}
