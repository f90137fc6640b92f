//! The engine: method surface, lock discipline, and message dispatch
//!
//! A local caller invokes a method; the engine acquires the channel's
//! lock, loads the freshest snapshot from the store, and drives the
//! initiator side of the protocol. The peer's engine receives the wire
//! message through [`Engine::handle_message`], acquires its own lock,
//! and drives the responder side. Chain events arrive asynchronously
//! and never run inside protocol execution.

use crate::bus::MessageBus;
use crate::config::{EngineConfig, NetworkContext};
use crate::error::EngineError;
use crate::evm::{erc20_transfer_calldata, EvmCaller};
use crate::locks::LockManager;
use crate::messages::{
    ProtocolEnvelope, ProtocolName, ProtocolParams, INITIATOR_SEQ, RESPONDER_SEQ,
};
use crate::middleware::{ProtocolValidator, ValidatorRegistry};
use crate::protocol::{self, ProtocolExecutor};
use alloy_primitives::{Address, Bytes, B256, U256};
use offchan_commitments::Commitment;
use offchan_crypto::{signer_address_of, ChannelSigner};
use offchan_store::Store;
use offchan_types::{
    AppInstance, FreeBalanceApp, InterpreterParams, MinimalTransaction, Proposal,
    PublicIdentifier, StateChannel, CONVENTION_FOR_ETH_TOKEN_ADDRESS,
};
use offchan_watcher::{ChainEvent, ChainEventKind};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

/// Caller-facing request for `propose_install`.
#[derive(Clone, Debug)]
pub struct ProposeInstallRequest {
    /// Channel to propose on.
    pub multisig: Address,
    /// App-definition contract.
    pub app_definition: Address,
    /// ABI-encoded initial state.
    pub initial_state: Bytes,
    /// Initiator deposit.
    pub initiator_deposit: U256,
    /// Token of the initiator deposit.
    pub initiator_deposit_token: Address,
    /// Responder deposit.
    pub responder_deposit: U256,
    /// Token of the responder deposit.
    pub responder_deposit_token: Address,
    /// Default dispute timeout of the app.
    pub default_timeout: u64,
    /// Challenge window of the initial state.
    pub state_timeout: u64,
}

impl ProposeInstallRequest {
    /// Interpreter parameters implied by the deposits: per-token caps
    /// equal to the total locked under each token.
    pub fn interpreter_params(&self) -> InterpreterParams {
        let mut totals: BTreeMap<Address, U256> = BTreeMap::new();
        *totals.entry(self.initiator_deposit_token).or_default() += self.initiator_deposit;
        *totals.entry(self.responder_deposit_token).or_default() += self.responder_deposit;
        InterpreterParams {
            limit: totals.values().copied().collect(),
            token_addresses: totals.keys().copied().collect(),
        }
    }
}

/// Notifications emitted as protocols and chain events complete.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    /// A channel finished Setup.
    ChannelCreated {
        /// Multisig of the new channel.
        multisig: Address,
    },
    /// A proposal was persisted.
    ProposalCreated {
        /// Channel of the proposal.
        multisig: Address,
        /// Identity hash of the proposed app.
        app_identity_hash: B256,
    },
    /// An app was installed.
    AppInstalled {
        /// Channel of the app.
        multisig: Address,
        /// Identity hash of the app.
        app_identity_hash: B256,
    },
    /// An app state advanced (Update or TakeAction).
    AppUpdated {
        /// Channel of the app.
        multisig: Address,
        /// Identity hash of the app.
        app_identity_hash: B256,
        /// New version number.
        version_number: u64,
    },
    /// An app was uninstalled.
    AppUninstalled {
        /// Channel of the app.
        multisig: Address,
        /// Identity hash of the removed app.
        app_identity_hash: B256,
    },
    /// The chain listener saw a dispute touching a known app.
    ChallengeDetected {
        /// Identity hash named by the challenge.
        app_identity_hash: B256,
        /// Challenge status reported by the registry.
        status: u8,
        /// Version number the challenge set.
        version_number: u64,
    },
}

pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) network: NetworkContext,
    pub(crate) signer: Arc<dyn ChannelSigner>,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) bus: Arc<dyn MessageBus>,
    pub(crate) evm: Arc<dyn EvmCaller>,
    pub(crate) validators: ValidatorRegistry,
    pub(crate) locks: LockManager,
    pub(crate) pending: Mutex<HashMap<String, oneshot::Sender<ProtocolEnvelope>>>,
    pub(crate) seen_processes: Mutex<HashSet<String>>,
    pub(crate) events: broadcast::Sender<EngineEvent>,
}

/// One engine instance: one signer, one store, one bus subscription.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Assemble an engine from its collaborators.
    pub fn new(
        config: EngineConfig,
        network: NetworkContext,
        signer: Arc<dyn ChannelSigner>,
        store: Arc<dyn Store>,
        bus: Arc<dyn MessageBus>,
        evm: Arc<dyn EvmCaller>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(EngineInner {
                config,
                network,
                signer,
                store,
                bus,
                evm,
                validators: ValidatorRegistry::default(),
                locks: LockManager::new(),
                pending: Mutex::new(HashMap::new()),
                seen_processes: Mutex::new(HashSet::new()),
                events,
            }),
        }
    }

    /// This engine's participant identifier.
    pub fn public_identifier(&self) -> &PublicIdentifier {
        self.inner.signer.public_identifier()
    }

    /// This engine's derived signer address.
    pub fn signer_address(&self) -> Address {
        self.inner.signer.signer_address()
    }

    /// Register validation middleware for an app definition.
    pub fn register_validator(
        &self,
        app_definition: Address,
        validator: Arc<dyn ProtocolValidator>,
    ) {
        self.inner.validators.register(app_definition, validator);
    }

    /// Subscribe to engine notifications.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.inner.events.send(event);
    }

    async fn load_channel(&self, multisig: &Address) -> Result<StateChannel, EngineError> {
        self.inner
            .store
            .get_state_channel(multisig)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("channel {multisig}")))
    }

    async fn load_channel_by_app(&self, identity_hash: &B256) -> Result<StateChannel, EngineError> {
        self.inner
            .store
            .get_state_channel_by_app_identity_hash(identity_hash)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("app {identity_hash}")))
    }

    // ------------------------------------------------------------------
    // Method surface
    // ------------------------------------------------------------------

    /// `chan_create`: run Setup with a counterparty.
    pub async fn create_channel(
        &self,
        responder: PublicIdentifier,
    ) -> Result<StateChannel, EngineError> {
        let responder_address = signer_address_of(&responder)?;
        let multisig = self
            .inner
            .network
            .multisig_for([self.signer_address(), responder_address]);
        if self.inner.store.get_state_channel(&multisig).await?.is_some() {
            return Err(EngineError::AlreadyExists(format!("channel {multisig}")));
        }
        let _guard = self.inner.locks.acquire(multisig).await;
        let exec = ProtocolExecutor::initiate(self.inner.clone(), ProtocolName::Setup);
        let channel = protocol::setup::initiate(&exec, responder).await?;
        self.emit(EngineEvent::ChannelCreated { multisig });
        Ok(channel)
    }

    /// The funding transaction for an on-chain deposit. Broadcast is the
    /// caller's concern; call [`deposit`](Self::deposit) once confirmed.
    pub async fn deposit_transaction(
        &self,
        multisig: Address,
        token: Address,
        amount: U256,
    ) -> Result<MinimalTransaction, EngineError> {
        self.load_channel(&multisig).await?;
        Ok(if token == CONVENTION_FOR_ETH_TOKEN_ADDRESS {
            MinimalTransaction {
                to: multisig,
                value: amount,
                data: Bytes::new(),
            }
        } else {
            MinimalTransaction {
                to: token,
                value: U256::ZERO,
                data: erc20_transfer_calldata(multisig, amount),
            }
        })
    }

    /// `chan_deposit`: credit a confirmed deposit into the free balance.
    pub async fn deposit(
        &self,
        multisig: Address,
        token: Address,
        amount: U256,
    ) -> Result<StateChannel, EngineError> {
        let _guard = self.inner.locks.acquire(multisig).await;
        let channel = self.load_channel(&multisig).await?;
        let exec = ProtocolExecutor::initiate(self.inner.clone(), ProtocolName::Deposit);
        protocol::deposit::initiate(&exec, &channel, token, amount).await
    }

    /// `chan_proposeInstall`: run Propose, leaving a proposal record.
    pub async fn propose_install(
        &self,
        request: ProposeInstallRequest,
    ) -> Result<B256, EngineError> {
        let _guard = self.inner.locks.acquire(request.multisig).await;
        let channel = self.load_channel(&request.multisig).await?;
        let exec = ProtocolExecutor::initiate(self.inner.clone(), ProtocolName::Propose);
        let (_, identity_hash) = protocol::propose::initiate(&exec, &channel, &request).await?;
        self.emit(EngineEvent::ProposalCreated {
            multisig: request.multisig,
            app_identity_hash: identity_hash,
        });
        Ok(identity_hash)
    }

    /// `chan_install`: run Install against an accepted proposal.
    pub async fn install(&self, app_identity_hash: B256) -> Result<AppInstance, EngineError> {
        let located = self.load_channel_by_app(&app_identity_hash).await?;
        let multisig = located.multisig_address();
        let _guard = self.inner.locks.acquire(multisig).await;
        let channel = self.load_channel(&multisig).await?;
        let exec = ProtocolExecutor::initiate(self.inner.clone(), ProtocolName::Install);
        let next = protocol::install::initiate(&exec, &channel, app_identity_hash).await?;
        self.emit(EngineEvent::AppInstalled {
            multisig,
            app_identity_hash,
        });
        Ok(next.app(&app_identity_hash)?.clone())
    }

    /// `chan_update`: consensually replace an app's state.
    pub async fn update(
        &self,
        app_identity_hash: B256,
        new_state: Bytes,
        state_timeout: u64,
    ) -> Result<AppInstance, EngineError> {
        let located = self.load_channel_by_app(&app_identity_hash).await?;
        let multisig = located.multisig_address();
        let _guard = self.inner.locks.acquire(multisig).await;
        let channel = self.load_channel(&multisig).await?;
        let exec = ProtocolExecutor::initiate(self.inner.clone(), ProtocolName::Update);
        let next =
            protocol::update::initiate(&exec, &channel, app_identity_hash, new_state, state_timeout)
                .await?;
        let app = next.app(&app_identity_hash)?.clone();
        self.emit(EngineEvent::AppUpdated {
            multisig,
            app_identity_hash,
            version_number: app.version_number,
        });
        Ok(app)
    }

    /// `chan_takeAction`: advance an app through its transition function.
    pub async fn take_action(
        &self,
        app_identity_hash: B256,
        action: Bytes,
        state_timeout: u64,
    ) -> Result<AppInstance, EngineError> {
        let located = self.load_channel_by_app(&app_identity_hash).await?;
        let multisig = located.multisig_address();
        let _guard = self.inner.locks.acquire(multisig).await;
        let channel = self.load_channel(&multisig).await?;
        let exec = ProtocolExecutor::initiate(self.inner.clone(), ProtocolName::TakeAction);
        let (next, _) =
            protocol::take_action::initiate(&exec, &channel, app_identity_hash, action, state_timeout)
                .await?;
        let app = next.app(&app_identity_hash)?.clone();
        self.emit(EngineEvent::AppUpdated {
            multisig,
            app_identity_hash,
            version_number: app.version_number,
        });
        Ok(app)
    }

    /// `chan_uninstall`: settle an app's outcome and remove it.
    pub async fn uninstall(&self, app_identity_hash: B256) -> Result<StateChannel, EngineError> {
        let located = self.load_channel_by_app(&app_identity_hash).await?;
        let multisig = located.multisig_address();
        let _guard = self.inner.locks.acquire(multisig).await;
        let channel = self.load_channel(&multisig).await?;
        let exec = ProtocolExecutor::initiate(self.inner.clone(), ProtocolName::Uninstall);
        let next = protocol::uninstall::initiate(&exec, &channel, app_identity_hash).await?;
        self.emit(EngineEvent::AppUninstalled {
            multisig,
            app_identity_hash,
        });
        Ok(next)
    }

    /// `chan_withdraw`: double-sign a withdrawal out of the multisig and
    /// record it in the monitor set. Returns the broadcast-ready
    /// transaction.
    pub async fn withdraw(
        &self,
        multisig: Address,
        recipient: Address,
        asset_id: Address,
        amount: U256,
    ) -> Result<MinimalTransaction, EngineError> {
        let _guard = self.inner.locks.acquire(multisig).await;
        let channel = self.load_channel(&multisig).await?;
        let withdrawal_nonce = self
            .inner
            .store
            .get_user_withdrawals()
            .await?
            .iter()
            .filter(|r| r.multisig == multisig)
            .count() as u64
            + 1;
        let exec = ProtocolExecutor::initiate(self.inner.clone(), ProtocolName::Withdraw);
        let (_, commitment) = protocol::withdraw::initiate(
            &exec,
            &channel,
            recipient,
            asset_id,
            amount,
            withdrawal_nonce,
        )
        .await?;
        Ok(commitment.signed_transaction()?)
    }

    /// `chan_getState`: current channel snapshot.
    pub async fn get_state_channel(&self, multisig: Address) -> Result<StateChannel, EngineError> {
        self.load_channel(&multisig).await
    }

    /// Channel snapshot by owner pair.
    pub async fn get_state_channel_by_owners(
        &self,
        owners: [Address; 2],
    ) -> Result<StateChannel, EngineError> {
        self.inner
            .store
            .get_state_channel_by_owners(&owners)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("channel of {} and {}", owners[0], owners[1])))
    }

    /// `chan_getAppInstance`: one installed app.
    pub async fn get_app_instance(&self, identity_hash: B256) -> Result<AppInstance, EngineError> {
        let channel = self.load_channel_by_app(&identity_hash).await?;
        Ok(channel.app(&identity_hash)?.clone())
    }

    /// Pending proposals on a channel.
    pub async fn get_proposed_apps(&self, multisig: Address) -> Result<Vec<Proposal>, EngineError> {
        let channel = self.load_channel(&multisig).await?;
        Ok(channel.proposed_app_instances().values().cloned().collect())
    }

    /// The free-balance app of a channel.
    pub async fn get_free_balance(&self, multisig: Address) -> Result<FreeBalanceApp, EngineError> {
        let channel = self.load_channel(&multisig).await?;
        Ok(channel.free_balance().clone())
    }

    // ------------------------------------------------------------------
    // Inbound dispatch
    // ------------------------------------------------------------------

    /// Decode and dispatch a bus payload addressed to this engine.
    pub async fn handle_message(&self, payload: &[u8]) -> Result<(), EngineError> {
        let envelope = ProtocolEnvelope::decode(payload)?;
        self.handle_envelope(envelope).await
    }

    /// Dispatch a decoded envelope: replies resolve the waiting
    /// initiator, requests run the responder flow under the channel lock.
    pub async fn handle_envelope(&self, envelope: ProtocolEnvelope) -> Result<(), EngineError> {
        if envelope.to != *self.public_identifier() {
            return Err(EngineError::BadMessage(format!(
                "envelope addressed to {}, this engine is {}",
                envelope.to,
                self.public_identifier()
            )));
        }

        if envelope.seq == RESPONDER_SEQ {
            let waiter = self.inner.pending.lock().remove(&envelope.process_id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(envelope);
                }
                None => debug!(
                    process_id = %envelope.process_id,
                    "unmatched reply (duplicate or timed out exchange)"
                ),
            }
            return Ok(());
        }
        if envelope.seq != INITIATOR_SEQ {
            return Err(EngineError::BadMessage(format!(
                "unexpected sequence number {}",
                envelope.seq
            )));
        }

        // Duplicate deliveries of the same exchange are idempotent.
        {
            let mut seen = self.inner.seen_processes.lock();
            if !seen.insert(envelope.process_id.clone()) {
                debug!(process_id = %envelope.process_id, "duplicate exchange ignored");
                return Ok(());
            }
            if seen.len() > 4096 {
                seen.clear();
            }
        }

        let multisig = envelope.params.multisig();
        let _guard = self.inner.locks.acquire(multisig).await;
        let exec = ProtocolExecutor::respond(
            self.inner.clone(),
            envelope.protocol,
            envelope.process_id.clone(),
        );

        match envelope.protocol {
            ProtocolName::Setup => {
                if self.inner.store.get_state_channel(&multisig).await?.is_some() {
                    return Err(EngineError::AlreadyExists(format!("channel {multisig}")));
                }
                protocol::setup::respond(&exec, &envelope).await?;
                self.emit(EngineEvent::ChannelCreated { multisig });
            }
            ProtocolName::Propose => {
                let channel = self.load_channel(&multisig).await?;
                let next = protocol::propose::respond(&exec, &envelope, &channel).await?;
                if let Some((hash, _)) = next
                    .proposed_app_instances()
                    .iter()
                    .max_by_key(|(_, prop)| prop.identity.channel_nonce)
                {
                    self.emit(EngineEvent::ProposalCreated {
                        multisig,
                        app_identity_hash: *hash,
                    });
                }
            }
            ProtocolName::Install => {
                let channel = self.load_channel(&multisig).await?;
                protocol::install::respond(&exec, &envelope, &channel).await?;
                if let ProtocolParams::Install(ref p) = envelope.params {
                    self.emit(EngineEvent::AppInstalled {
                        multisig,
                        app_identity_hash: p.app_identity_hash,
                    });
                }
            }
            ProtocolName::Update => {
                let channel = self.load_channel(&multisig).await?;
                if let Some(next) = protocol::update::respond(&exec, &envelope, &channel).await? {
                    if let ProtocolParams::Update(ref p) = envelope.params {
                        self.emit(EngineEvent::AppUpdated {
                            multisig,
                            app_identity_hash: p.app_identity_hash,
                            version_number: next.app(&p.app_identity_hash)?.version_number,
                        });
                    }
                }
            }
            ProtocolName::TakeAction => {
                let channel = self.load_channel(&multisig).await?;
                if let Some(next) =
                    protocol::take_action::respond(&exec, &envelope, &channel).await?
                {
                    if let ProtocolParams::TakeAction(ref p) = envelope.params {
                        self.emit(EngineEvent::AppUpdated {
                            multisig,
                            app_identity_hash: p.app_identity_hash,
                            version_number: next.app(&p.app_identity_hash)?.version_number,
                        });
                    }
                }
            }
            ProtocolName::Uninstall => {
                let channel = self.load_channel(&multisig).await?;
                protocol::uninstall::respond(&exec, &envelope, &channel).await?;
                if let ProtocolParams::Uninstall(ref p) = envelope.params {
                    self.emit(EngineEvent::AppUninstalled {
                        multisig,
                        app_identity_hash: p.app_identity_hash,
                    });
                }
            }
            ProtocolName::Deposit => {
                let channel = self.load_channel(&multisig).await?;
                protocol::deposit::respond(&exec, &envelope, &channel).await?;
            }
            ProtocolName::Withdraw => {
                let channel = self.load_channel(&multisig).await?;
                protocol::withdraw::respond(&exec, &envelope, &channel).await?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Chain notifications
    // ------------------------------------------------------------------

    /// Surface a chain-listener event. Runs outside protocol execution
    /// and never fails the engine.
    pub async fn handle_chain_event(&self, event: ChainEvent) {
        match &event.kind {
            ChainEventKind::ChallengeUpdated {
                identity_hash,
                status,
                version_number,
                ..
            } => {
                let known = self
                    .inner
                    .store
                    .get_state_channel_by_app_identity_hash(identity_hash)
                    .await
                    .ok()
                    .flatten()
                    .is_some();
                if known {
                    warn!(
                        identity_hash = %identity_hash,
                        status,
                        version_number,
                        block = event.block_number,
                        "on-chain challenge detected for a known app"
                    );
                    self.emit(EngineEvent::ChallengeDetected {
                        app_identity_hash: *identity_hash,
                        status: *status,
                        version_number: *version_number,
                    });
                } else {
                    debug!(identity_hash = %identity_hash, "challenge for unknown app ignored");
                }
            }
            ChainEventKind::StateProgressed {
                identity_hash,
                version_number,
                ..
            } => {
                warn!(
                    identity_hash = %identity_hash,
                    version_number,
                    block = event.block_number,
                    "counterparty progressed state on chain"
                );
            }
        }
    }
}
