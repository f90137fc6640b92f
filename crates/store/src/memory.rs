//! In-memory implementation of the Store
//!
//! Primarily for testing and single-process deployments. All records
//! live under one `parking_lot::RwLock`, so composite writes are
//! naturally atomic; the capture-and-revert scheme required of
//! non-transactional backends is still implemented literally, and a
//! fault-injection hook lets tests drive the revert path.

use crate::error::{Result, StoreError};
use crate::{Signing, Store, WithdrawalRecord};
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use offchan_commitments::{
    ConditionalTransactionCommitment, SetStateCommitment, SetupCommitment, WithdrawCommitment,
};
use offchan_types::{constants::STATE_SCHEMA_VERSION, Proposal, StateChannel};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

/// Write points at which a one-shot fault can be injected.
///
/// Used by crash-recovery tests to verify that a failure mid-sequence
/// leaves the records bit-identical to their pre-write state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultPoint {
    /// Fail while writing the channel snapshot.
    ChannelWrite,
    /// Fail while writing a SetState commitment.
    SetStateWrite,
    /// Fail while writing a conditional transaction commitment.
    ConditionalWrite,
}

/// All records under a single lock.
///
/// Grouping the maps under one lock keeps composite writes atomic
/// without any lock-ordering protocol between them.
struct Records {
    channels: HashMap<Address, StateChannel>,
    setup_commitments: HashMap<Address, SetupCommitment>,
    set_state_commitments: HashMap<(B256, Signing), SetStateCommitment>,
    conditional_commitments: HashMap<B256, ConditionalTransactionCommitment>,
    withdrawal_commitments: HashMap<Address, WithdrawCommitment>,
    user_withdrawals: Vec<WithdrawalRecord>,
    schema_version: u64,
}

impl Records {
    fn new() -> Self {
        Self {
            channels: HashMap::new(),
            setup_commitments: HashMap::new(),
            set_state_commitments: HashMap::new(),
            conditional_commitments: HashMap::new(),
            withdrawal_commitments: HashMap::new(),
            user_withdrawals: Vec::new(),
            schema_version: STATE_SCHEMA_VERSION,
        }
    }
}

/// In-memory store.
pub struct InMemoryStore {
    records: RwLock<Records>,
    fault: Mutex<Option<FaultPoint>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Records::new()),
            fault: Mutex::new(None),
        }
    }

    /// Arm a one-shot fault at the given write point (for testing).
    pub fn inject_fault(&self, point: FaultPoint) {
        *self.fault.lock() = Some(point);
    }

    fn take_fault(&self, point: FaultPoint) -> bool {
        let mut fault = self.fault.lock();
        if *fault == Some(point) {
            *fault = None;
            true
        } else {
            false
        }
    }

    fn require_known(records: &Records, multisig: &Address) -> Result<()> {
        if records.channels.contains_key(multisig) {
            Ok(())
        } else {
            Err(StoreError::ChannelNotFound(*multisig))
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_state_channel(&self, multisig: &Address) -> Result<Option<StateChannel>> {
        Ok(self.records.read().channels.get(multisig).cloned())
    }

    async fn get_state_channel_by_owners(
        &self,
        owners: &[Address; 2],
    ) -> Result<Option<StateChannel>> {
        let mut sorted = *owners;
        sorted.sort();
        let records = self.records.read();
        Ok(records
            .channels
            .values()
            .find(|c| *c.multisig_owners() == sorted)
            .cloned())
    }

    async fn get_state_channel_by_app_identity_hash(
        &self,
        identity_hash: &B256,
    ) -> Result<Option<StateChannel>> {
        let records = self.records.read();
        Ok(records
            .channels
            .values()
            .find(|c| {
                c.app_instances().contains_key(identity_hash)
                    || c.proposed_app_instances().contains_key(identity_hash)
                    || c.free_balance().identity_hash() == *identity_hash
            })
            .cloned())
    }

    async fn get_all_channels(&self) -> Result<Vec<StateChannel>> {
        Ok(self.records.read().channels.values().cloned().collect())
    }

    async fn create_state_channel(
        &self,
        channel: &StateChannel,
        setup: &SetupCommitment,
        free_balance_set_state: &SetStateCommitment,
    ) -> Result<()> {
        let multisig = channel.multisig_address();
        let fb_key = (channel.free_balance().identity_hash(), Signing::Double);
        let mut records = self.records.write();
        if records.channels.contains_key(&multisig) {
            return Err(StoreError::ChannelExists(multisig));
        }
        if self.take_fault(FaultPoint::ChannelWrite) {
            return Err(StoreError::WriteFailed("channel"));
        }
        records.channels.insert(multisig, channel.clone());
        if self.take_fault(FaultPoint::SetStateWrite) {
            records.channels.remove(&multisig);
            return Err(StoreError::WriteFailed("free balance set-state"));
        }
        records.setup_commitments.insert(multisig, setup.clone());
        records
            .set_state_commitments
            .insert(fb_key, free_balance_set_state.clone());
        Ok(())
    }

    async fn create_app_proposal(
        &self,
        channel: &StateChannel,
        proposal: &Proposal,
        set_state: &SetStateCommitment,
    ) -> Result<()> {
        let multisig = channel.multisig_address();
        let identity_hash = proposal.identity_hash();
        let mut records = self.records.write();
        Self::require_known(&records, &multisig)?;
        // Duplicate proposals are rejected at this boundary.
        let prior = &records.channels[&multisig];
        if prior.proposed_app_instances().contains_key(&identity_hash)
            || prior.app_instances().contains_key(&identity_hash)
        {
            return Err(StoreError::DuplicateApp(identity_hash));
        }
        let prev_channel = records.channels.insert(multisig, channel.clone());
        if self.take_fault(FaultPoint::SetStateWrite) {
            restore(&mut records.channels, multisig, prev_channel);
            return Err(StoreError::WriteFailed("proposal set-state"));
        }
        records
            .set_state_commitments
            .insert((identity_hash, Signing::Double), set_state.clone());
        Ok(())
    }

    async fn remove_app_proposal(
        &self,
        channel: &StateChannel,
        identity_hash: &B256,
    ) -> Result<()> {
        let multisig = channel.multisig_address();
        let mut records = self.records.write();
        Self::require_known(&records, &multisig)?;
        records.channels.insert(multisig, channel.clone());
        records
            .set_state_commitments
            .remove(&(*identity_hash, Signing::Double));
        Ok(())
    }

    async fn create_app_instance(
        &self,
        channel: &StateChannel,
        identity_hash: &B256,
        free_balance_set_state: &SetStateCommitment,
        conditional: &ConditionalTransactionCommitment,
    ) -> Result<()> {
        let multisig = channel.multisig_address();
        let fb_key = (channel.free_balance().identity_hash(), Signing::Double);
        let mut records = self.records.write();
        Self::require_known(&records, &multisig)?;

        // Capture prior values, attempt all writes, restore on failure.
        let prev_channel = records.channels.insert(multisig, channel.clone());
        let prev_fb = records
            .set_state_commitments
            .insert(fb_key, free_balance_set_state.clone());
        if self.take_fault(FaultPoint::ConditionalWrite) {
            restore(&mut records.set_state_commitments, fb_key, prev_fb);
            restore(&mut records.channels, multisig, prev_channel);
            return Err(StoreError::WriteFailed("conditional commitment"));
        }
        records
            .conditional_commitments
            .insert(*identity_hash, conditional.clone());
        Ok(())
    }

    async fn update_app_instance(
        &self,
        channel: &StateChannel,
        identity_hash: &B256,
        set_state: &SetStateCommitment,
        signing: Signing,
    ) -> Result<()> {
        let multisig = channel.multisig_address();
        let mut records = self.records.write();
        Self::require_known(&records, &multisig)?;
        let prev_channel = records.channels.insert(multisig, channel.clone());
        if self.take_fault(FaultPoint::SetStateWrite) {
            restore(&mut records.channels, multisig, prev_channel);
            return Err(StoreError::WriteFailed("set-state commitment"));
        }
        records
            .set_state_commitments
            .insert((*identity_hash, signing), set_state.clone());
        Ok(())
    }

    async fn remove_app_instance(
        &self,
        channel: &StateChannel,
        identity_hash: &B256,
        free_balance_set_state: &SetStateCommitment,
    ) -> Result<()> {
        let multisig = channel.multisig_address();
        let fb_key = (channel.free_balance().identity_hash(), Signing::Double);
        let mut records = self.records.write();
        Self::require_known(&records, &multisig)?;
        let prev_channel = records.channels.insert(multisig, channel.clone());
        if self.take_fault(FaultPoint::SetStateWrite) {
            restore(&mut records.channels, multisig, prev_channel);
            return Err(StoreError::WriteFailed("free balance set-state"));
        }
        records
            .set_state_commitments
            .insert(fb_key, free_balance_set_state.clone());
        // The app's own commitments stay: the final SetState remains the
        // only record of the app's last agreed state.
        let _ = identity_hash;
        Ok(())
    }

    async fn create_withdrawal(
        &self,
        channel: &StateChannel,
        free_balance_set_state: &SetStateCommitment,
        commitment: &WithdrawCommitment,
        record: &WithdrawalRecord,
    ) -> Result<()> {
        let multisig = channel.multisig_address();
        let fb_key = (channel.free_balance().identity_hash(), Signing::Double);
        let mut records = self.records.write();
        Self::require_known(&records, &multisig)?;
        let prev_channel = records.channels.insert(multisig, channel.clone());
        if self.take_fault(FaultPoint::SetStateWrite) {
            restore(&mut records.channels, multisig, prev_channel);
            return Err(StoreError::WriteFailed("free balance set-state"));
        }
        records
            .set_state_commitments
            .insert(fb_key, free_balance_set_state.clone());
        records
            .withdrawal_commitments
            .insert(multisig, commitment.clone());
        records.user_withdrawals.push(record.clone());
        Ok(())
    }

    async fn get_setup_commitment(&self, multisig: &Address) -> Result<Option<SetupCommitment>> {
        Ok(self.records.read().setup_commitments.get(multisig).cloned())
    }

    async fn get_set_state_commitment(
        &self,
        identity_hash: &B256,
        signing: Signing,
    ) -> Result<Option<SetStateCommitment>> {
        Ok(self
            .records
            .read()
            .set_state_commitments
            .get(&(*identity_hash, signing))
            .cloned())
    }

    async fn get_conditional_tx_commitment(
        &self,
        identity_hash: &B256,
    ) -> Result<Option<ConditionalTransactionCommitment>> {
        Ok(self
            .records
            .read()
            .conditional_commitments
            .get(identity_hash)
            .cloned())
    }

    async fn get_withdrawal_commitment(
        &self,
        multisig: &Address,
    ) -> Result<Option<WithdrawCommitment>> {
        Ok(self
            .records
            .read()
            .withdrawal_commitments
            .get(multisig)
            .cloned())
    }

    async fn save_withdrawal_commitment(
        &self,
        multisig: &Address,
        commitment: &WithdrawCommitment,
    ) -> Result<()> {
        self.records
            .write()
            .withdrawal_commitments
            .insert(*multisig, commitment.clone());
        Ok(())
    }

    async fn get_user_withdrawals(&self) -> Result<Vec<WithdrawalRecord>> {
        Ok(self.records.read().user_withdrawals.clone())
    }

    async fn save_user_withdrawal(&self, record: &WithdrawalRecord) -> Result<()> {
        self.records.write().user_withdrawals.push(record.clone());
        Ok(())
    }

    async fn remove_user_withdrawal(&self, record: &WithdrawalRecord) -> Result<()> {
        let mut records = self.records.write();
        let before = records.user_withdrawals.len();
        records.user_withdrawals.retain(|r| r != record);
        if records.user_withdrawals.len() == before {
            return Err(StoreError::RecordNotFound(format!(
                "withdrawal for {}",
                record.multisig
            )));
        }
        Ok(())
    }

    async fn get_schema_version(&self) -> Result<u64> {
        Ok(self.records.read().schema_version)
    }

    async fn update_schema_version(&self, version: u64) -> Result<()> {
        let mut records = self.records.write();
        if version < records.schema_version {
            return Err(StoreError::SchemaDowngrade {
                current: records.schema_version,
                requested: version,
            });
        }
        records.schema_version = version;
        Ok(())
    }
}

/// Put a captured prior value back, removing the key if there was none.
fn restore<K: std::hash::Hash + Eq, V>(map: &mut HashMap<K, V>, key: K, prev: Option<V>) {
    match prev {
        Some(v) => {
            map.insert(key, v);
        }
        None => {
            map.remove(&key);
        }
    }
}
