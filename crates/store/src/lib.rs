//! Persistence boundary for the offchan engine
//!
//! The [`Store`] trait is the engine's only write surface. Every
//! multi-record operation is all-or-nothing observable: a backend with
//! native transactions wraps the writes in one; a backend without them
//! must capture each record's prior value before the attempt and restore
//! all of them on failure. Reads return `None` for missing records,
//! never partially populated ones.

pub mod error;
pub mod memory;

pub use error::{Result, StoreError};
pub use memory::{FaultPoint, InMemoryStore};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use offchan_commitments::{
    ConditionalTransactionCommitment, SetStateCommitment, SetupCommitment, WithdrawCommitment,
};
use offchan_types::{Proposal, StateChannel};
use serde::{Deserialize, Serialize};

/// Which signing stage a SetState commitment is stored under.
///
/// Both stages persist in parallel under distinct keys: the
/// single-signed commitment keeps the unilateral `progressState` path
/// open while a TakeAction exchange is in flight, the double-signed one
/// is the canonical latest commitment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signing {
    /// Signed only by the local party.
    Single,
    /// Signed by both participants.
    Double,
}

/// An outstanding withdrawal being monitored for on-chain confirmation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    /// Channel the withdrawal leaves from.
    pub multisig: Address,
    /// Recipient address.
    pub recipient: Address,
    /// Asset withdrawn.
    pub asset_id: Address,
    /// Amount withdrawn.
    pub amount: U256,
    /// Multisig nonce the withdrawal commitment was built with.
    pub withdrawal_nonce: u64,
}

/// Capability interface the engine persists through.
#[async_trait]
pub trait Store: Send + Sync {
    /// Channel snapshot by multisig address.
    async fn get_state_channel(&self, multisig: &Address) -> Result<Option<StateChannel>>;

    /// Channel snapshot by its (unordered) owner pair.
    async fn get_state_channel_by_owners(
        &self,
        owners: &[Address; 2],
    ) -> Result<Option<StateChannel>>;

    /// Channel snapshot owning the given app or proposal.
    async fn get_state_channel_by_app_identity_hash(
        &self,
        identity_hash: &B256,
    ) -> Result<Option<StateChannel>>;

    /// All channel snapshots, for registry queries.
    async fn get_all_channels(&self) -> Result<Vec<StateChannel>>;

    /// Atomically create a channel with its setup and free-balance
    /// SetState commitments. Fails if the multisig is already known.
    async fn create_state_channel(
        &self,
        channel: &StateChannel,
        setup: &SetupCommitment,
        free_balance_set_state: &SetStateCommitment,
    ) -> Result<()>;

    /// Atomically persist a proposal: the channel snapshot containing it
    /// plus the double-signed SetState over the proposed initial state.
    /// Duplicate identity hashes are rejected here.
    async fn create_app_proposal(
        &self,
        channel: &StateChannel,
        proposal: &Proposal,
        set_state: &SetStateCommitment,
    ) -> Result<()>;

    /// Drop a proposal (rejection path); persists the channel snapshot
    /// with the proposal removed.
    async fn remove_app_proposal(
        &self,
        channel: &StateChannel,
        identity_hash: &B256,
    ) -> Result<()>;

    /// Atomically replace a proposal with an installed app: channel
    /// snapshot, updated free-balance SetState, and the conditional
    /// transaction commitment.
    async fn create_app_instance(
        &self,
        channel: &StateChannel,
        identity_hash: &B256,
        free_balance_set_state: &SetStateCommitment,
        conditional: &ConditionalTransactionCommitment,
    ) -> Result<()>;

    /// Atomically persist an app state advance together with its
    /// SetState commitment at the given signing stage.
    async fn update_app_instance(
        &self,
        channel: &StateChannel,
        identity_hash: &B256,
        set_state: &SetStateCommitment,
        signing: Signing,
    ) -> Result<()>;

    /// Atomically remove an app and persist the post-uninstall
    /// free-balance SetState.
    async fn remove_app_instance(
        &self,
        channel: &StateChannel,
        identity_hash: &B256,
        free_balance_set_state: &SetStateCommitment,
    ) -> Result<()>;

    /// Setup commitment for a channel.
    async fn get_setup_commitment(&self, multisig: &Address) -> Result<Option<SetupCommitment>>;

    /// SetState commitment for an app at a signing stage.
    async fn get_set_state_commitment(
        &self,
        identity_hash: &B256,
        signing: Signing,
    ) -> Result<Option<SetStateCommitment>>;

    /// Conditional commitment for an installed app.
    async fn get_conditional_tx_commitment(
        &self,
        identity_hash: &B256,
    ) -> Result<Option<ConditionalTransactionCommitment>>;

    /// Atomically persist a completed withdrawal exchange: the debited
    /// channel snapshot, the new free-balance SetState, the withdrawal
    /// commitment, and the monitor record.
    async fn create_withdrawal(
        &self,
        channel: &StateChannel,
        free_balance_set_state: &SetStateCommitment,
        commitment: &WithdrawCommitment,
        record: &WithdrawalRecord,
    ) -> Result<()>;

    /// Latest withdrawal commitment for a channel.
    async fn get_withdrawal_commitment(
        &self,
        multisig: &Address,
    ) -> Result<Option<WithdrawCommitment>>;

    /// Persist a withdrawal commitment.
    async fn save_withdrawal_commitment(
        &self,
        multisig: &Address,
        commitment: &WithdrawCommitment,
    ) -> Result<()>;

    /// All withdrawals currently monitored.
    async fn get_user_withdrawals(&self) -> Result<Vec<WithdrawalRecord>>;

    /// Add a withdrawal to the monitor set.
    async fn save_user_withdrawal(&self, record: &WithdrawalRecord) -> Result<()>;

    /// Remove a withdrawal from the monitor set once confirmed.
    async fn remove_user_withdrawal(&self, record: &WithdrawalRecord) -> Result<()>;

    /// Persisted schema version.
    async fn get_schema_version(&self) -> Result<u64>;

    /// Bump the schema version; downgrades are rejected.
    async fn update_schema_version(&self, version: u64) -> Result<()>;
}
