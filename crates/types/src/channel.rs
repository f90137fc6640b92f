//! The state-channel value and its pure transitions
//!
//! Channels are immutable-style: every transition consumes `&self` and
//! returns a new channel value. Callers observe a mutation only after a
//! successful transactional persist of the returned value.

use crate::app_instance::AppInstance;
use crate::constants::STATE_SCHEMA_VERSION;
use crate::error::ModelError;
use crate::free_balance::{CoinTransfer, FreeBalanceApp, FreeBalanceState};
use crate::identifier::PublicIdentifier;
use crate::identity::AppIdentity;
use crate::proposal::Proposal;
use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A two-party state channel anchored by one multisig.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChannel {
    multisig_address: Address,
    chain_id: u64,
    /// Extended public identifiers in setup order: `[initiator, responder]`.
    user_identifiers: [PublicIdentifier; 2],
    /// Derived signer addresses, parallel to `user_identifiers`.
    user_addresses: [Address; 2],
    /// The same two addresses in ascending order, as the multisig owns them.
    multisig_owners: [Address; 2],
    free_balance: FreeBalanceApp,
    app_instances: BTreeMap<B256, AppInstance>,
    proposed_app_instances: BTreeMap<B256, Proposal>,
    monotonic_num_proposed_apps: u64,
    schema_version: u64,
}

impl StateChannel {
    /// Build the channel value produced by a successful Setup exchange.
    ///
    /// The free balance occupies channel nonce 0 at version 1; the
    /// monotonic proposal counter starts at 1 so it is strictly larger
    /// than every existing app nonce.
    pub fn setup(
        multisig_address: Address,
        chain_id: u64,
        user_identifiers: [PublicIdentifier; 2],
        user_addresses: [Address; 2],
        free_balance_app_definition: Address,
        free_balance_timeout: u64,
    ) -> Self {
        let mut multisig_owners = user_addresses;
        multisig_owners.sort();
        let identity = AppIdentity::new(
            0,
            multisig_owners,
            free_balance_app_definition,
            free_balance_timeout,
        );
        let free_balance = FreeBalanceApp {
            identity,
            state: FreeBalanceState::new(multisig_owners),
            version_number: 1,
            state_timeout: free_balance_timeout,
        };
        Self {
            multisig_address,
            chain_id,
            user_identifiers,
            user_addresses,
            multisig_owners,
            free_balance,
            app_instances: BTreeMap::new(),
            proposed_app_instances: BTreeMap::new(),
            monotonic_num_proposed_apps: 1,
            schema_version: STATE_SCHEMA_VERSION,
        }
    }

    /// The multisig address keying this channel.
    pub fn multisig_address(&self) -> Address {
        self.multisig_address
    }

    /// Chain the multisig is deployed on.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Identifiers in setup order: `[initiator, responder]`.
    pub fn user_identifiers(&self) -> &[PublicIdentifier; 2] {
        &self.user_identifiers
    }

    /// Multisig owner addresses, ascending.
    pub fn multisig_owners(&self) -> &[Address; 2] {
        &self.multisig_owners
    }

    /// The free-balance app instance.
    pub fn free_balance(&self) -> &FreeBalanceApp {
        &self.free_balance
    }

    /// Value the monotonic counter will assign to the next proposal.
    pub fn next_channel_nonce(&self) -> u64 {
        self.monotonic_num_proposed_apps
    }

    /// Strictly-increasing count of apps ever proposed on this channel.
    pub fn monotonic_num_proposed_apps(&self) -> u64 {
        self.monotonic_num_proposed_apps
    }

    /// Schema version the channel was persisted under.
    pub fn schema_version(&self) -> u64 {
        self.schema_version
    }

    /// Signer address derived for one of the channel's identifiers.
    pub fn address_of(&self, identifier: &PublicIdentifier) -> Result<Address, ModelError> {
        self.user_identifiers
            .iter()
            .position(|id| id == identifier)
            .map(|i| self.user_addresses[i])
            .ok_or_else(|| ModelError::InvalidIdentifier(identifier.to_string()))
    }

    /// The other party's identifier.
    pub fn counterparty_of(
        &self,
        identifier: &PublicIdentifier,
    ) -> Result<&PublicIdentifier, ModelError> {
        let idx = self
            .user_identifiers
            .iter()
            .position(|id| id == identifier)
            .ok_or_else(|| ModelError::InvalidIdentifier(identifier.to_string()))?;
        Ok(&self.user_identifiers[1 - idx])
    }

    /// Look up an installed app.
    pub fn app(&self, identity_hash: &B256) -> Result<&AppInstance, ModelError> {
        self.app_instances
            .get(identity_hash)
            .ok_or(ModelError::AppNotFound(*identity_hash))
    }

    /// Look up a pending proposal.
    pub fn proposal(&self, identity_hash: &B256) -> Result<&Proposal, ModelError> {
        self.proposed_app_instances
            .get(identity_hash)
            .ok_or(ModelError::ProposalNotFound(*identity_hash))
    }

    /// Installed apps, keyed by identity hash.
    pub fn app_instances(&self) -> &BTreeMap<B256, AppInstance> {
        &self.app_instances
    }

    /// Pending proposals, keyed by identity hash.
    pub fn proposed_app_instances(&self) -> &BTreeMap<B256, Proposal> {
        &self.proposed_app_instances
    }

    /// Credit a participant's free-balance column (deposit settlement),
    /// bumping the free-balance version.
    pub fn credit_free_balance(
        &self,
        token: Address,
        owner: &Address,
        amount: U256,
    ) -> Result<Self, ModelError> {
        let mut next = self.clone();
        next.free_balance.state.credit(token, owner, amount)?;
        next.free_balance.version_number += 1;
        Ok(next)
    }

    /// Debit a participant's free-balance column (withdrawal), bumping
    /// the free-balance version. Overdraws are rejected.
    pub fn debit_free_balance(
        &self,
        token: Address,
        owner: &Address,
        amount: U256,
    ) -> Result<Self, ModelError> {
        let mut next = self.clone();
        next.free_balance.state.debit(token, owner, amount)?;
        next.free_balance.version_number += 1;
        Ok(next)
    }

    /// Insert a proposal allocated at the current monotonic nonce.
    pub fn propose_app(&self, proposal: Proposal) -> Result<Self, ModelError> {
        if proposal.identity.channel_nonce != self.monotonic_num_proposed_apps {
            return Err(ModelError::NonMonotonicNonce {
                proposed: proposal.identity.channel_nonce,
                expected: self.monotonic_num_proposed_apps,
            });
        }
        let identity_hash = proposal.identity_hash();
        if self.app_instances.contains_key(&identity_hash)
            || self.proposed_app_instances.contains_key(&identity_hash)
        {
            return Err(ModelError::DuplicateApp(identity_hash));
        }
        let mut next = self.clone();
        next.proposed_app_instances.insert(identity_hash, proposal);
        next.monotonic_num_proposed_apps += 1;
        Ok(next)
    }

    /// Replace a proposal with an installed app, debiting both deposits
    /// out of the free balance and bumping its version.
    pub fn install_app(&self, identity_hash: &B256) -> Result<Self, ModelError> {
        if self.app_instances.contains_key(identity_hash) {
            return Err(ModelError::DuplicateApp(*identity_hash));
        }
        let proposal = self.proposal(identity_hash)?.clone();
        let initiator = self.address_of(&proposal.initiator)?;
        let responder = self.address_of(&proposal.responder)?;

        let mut next = self.clone();
        next.free_balance.state.debit(
            proposal.initiator_deposit_token,
            &initiator,
            proposal.initiator_deposit,
        )?;
        next.free_balance.state.debit(
            proposal.responder_deposit_token,
            &responder,
            proposal.responder_deposit,
        )?;
        next.free_balance.state.add_active_app(*identity_hash)?;
        next.free_balance.version_number += 1;
        next.proposed_app_instances.remove(identity_hash);
        next.app_instances
            .insert(*identity_hash, proposal.into_app_instance());
        Ok(next)
    }

    /// Replace an app's state at the next version number.
    pub fn set_app_state(
        &self,
        identity_hash: &B256,
        new_state: Bytes,
        state_timeout: u64,
        action: Option<Bytes>,
    ) -> Result<Self, ModelError> {
        let app = self.app(identity_hash)?;
        let advanced = app.advanced(new_state, state_timeout, action);
        let mut next = self.clone();
        next.app_instances.insert(*identity_hash, advanced);
        Ok(next)
    }

    /// Remove an app, crediting its final outcome back into the free
    /// balance and bumping the free-balance version.
    pub fn uninstall_app(
        &self,
        identity_hash: &B256,
        refunds: &[(Address, Vec<CoinTransfer>)],
    ) -> Result<Self, ModelError> {
        self.app(identity_hash)?;
        let mut next = self.clone();
        for (token, transfers) in refunds {
            for transfer in transfers {
                next.free_balance
                    .state
                    .credit(*token, &transfer.to, transfer.amount)?;
            }
        }
        next.free_balance.state.remove_active_app(identity_hash)?;
        next.free_balance.version_number += 1;
        next.app_instances.remove(identity_hash);
        Ok(next)
    }
}
