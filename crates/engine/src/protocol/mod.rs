//! Protocol runner
//!
//! Each protocol role is a structured-async function over a
//! [`ProtocolExecutor`], which exposes exactly the runner's suspension
//! points: `sign` (OP_SIGN), `validate` (OP_VALIDATE), `send` (IO_SEND),
//! `send_and_wait` (IO_SEND_AND_WAIT) and `persist` (PERSIST). `persist`
//! is the sole write boundary and maps onto the store's transactional
//! composite operations, so a failure at any step leaves no partial
//! mutation behind.

pub(crate) mod deposit;
pub(crate) mod install;
pub(crate) mod propose;
pub(crate) mod setup;
pub(crate) mod take_action;
pub(crate) mod uninstall;
pub(crate) mod update;
pub(crate) mod withdraw;

use crate::engine::EngineInner;
use crate::error::EngineError;
use crate::messages::{
    CustomData, ProtocolEnvelope, ProtocolName, ProtocolParams, INITIATOR_SEQ,
};
use crate::middleware::ValidationContext;
use alloy_primitives::{Address, B256};
use offchan_commitments::{
    ConditionalTransactionCommitment, SetStateCommitment, SetupCommitment, WithdrawCommitment,
};
use offchan_crypto::RecoverableSignature;
use offchan_store::{Signing, WithdrawalRecord};
use offchan_types::{Proposal, PublicIdentifier, StateChannel};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// One atomic write against the store.
pub(crate) enum PersistOp<'a> {
    /// Setup completed: channel + setup commitment + free-balance SetState.
    CreateChannel {
        channel: &'a StateChannel,
        setup: &'a SetupCommitment,
        free_balance_set_state: &'a SetStateCommitment,
    },
    /// Propose completed: channel + proposal + initial-state SetState.
    CreateProposal {
        channel: &'a StateChannel,
        proposal: &'a Proposal,
        set_state: &'a SetStateCommitment,
    },
    /// Install completed: channel + updated free-balance SetState +
    /// conditional commitment.
    CreateAppInstance {
        channel: &'a StateChannel,
        identity_hash: B256,
        free_balance_set_state: &'a SetStateCommitment,
        conditional: &'a ConditionalTransactionCommitment,
    },
    /// Update/TakeAction step: channel + SetState at a signing stage.
    UpdateAppInstance {
        channel: &'a StateChannel,
        identity_hash: B256,
        set_state: &'a SetStateCommitment,
        signing: Signing,
    },
    /// Uninstall completed: channel + post-uninstall free-balance SetState.
    RemoveAppInstance {
        channel: &'a StateChannel,
        identity_hash: B256,
        free_balance_set_state: &'a SetStateCommitment,
    },
    /// Withdraw completed: debited channel + free-balance SetState +
    /// withdrawal commitment + monitor record.
    CreateWithdrawal {
        channel: &'a StateChannel,
        free_balance_set_state: &'a SetStateCommitment,
        commitment: &'a WithdrawCommitment,
        record: &'a WithdrawalRecord,
    },
}

/// Capability handle protocols run against.
pub(crate) struct ProtocolExecutor {
    pub(crate) inner: Arc<EngineInner>,
    pub(crate) protocol: ProtocolName,
    pub(crate) process_id: String,
}

impl ProtocolExecutor {
    /// Executor for a locally initiated protocol with a fresh process id.
    pub(crate) fn initiate(inner: Arc<EngineInner>, protocol: ProtocolName) -> Self {
        Self {
            inner,
            protocol,
            process_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Executor for the responder side of a received exchange.
    pub(crate) fn respond(inner: Arc<EngineInner>, protocol: ProtocolName, process_id: String) -> Self {
        Self {
            inner,
            protocol,
            process_id,
        }
    }

    pub(crate) fn me(&self) -> &PublicIdentifier {
        self.inner.signer.public_identifier()
    }

    pub(crate) fn my_address(&self) -> Address {
        self.inner.signer.signer_address()
    }

    /// OP_SIGN: sign a commitment digest with the local key.
    pub(crate) async fn sign(&self, digest: B256) -> Result<RecoverableSignature, EngineError> {
        Ok(self.inner.signer.sign_digest(digest).await?)
    }

    /// OP_VALIDATE: consult the middleware registered for an app type.
    pub(crate) fn validate(
        &self,
        app_definition: Address,
        ctx: &ValidationContext<'_>,
    ) -> Result<(), EngineError> {
        match self.inner.validators.validate(app_definition, ctx) {
            Some(reason) => {
                debug!(protocol = %self.protocol, %reason, "validation rejected");
                Err(EngineError::ValidationRejected(reason))
            }
            None => Ok(()),
        }
    }

    /// IO_SEND: fire-and-forget publish to the counterparty.
    pub(crate) async fn send(&self, envelope: &ProtocolEnvelope) -> Result<(), EngineError> {
        let subject = envelope.subject(&self.inner.config.service_key);
        debug!(
            protocol = %self.protocol,
            process_id = %self.process_id,
            seq = envelope.seq,
            %subject,
            "sending protocol message"
        );
        self.inner.bus.publish(&subject, envelope.encode()).await
    }

    /// IO_SEND_AND_WAIT: publish and suspend until the reply with this
    /// process id arrives, bounded by the engine timeout.
    pub(crate) async fn send_and_wait(
        &self,
        envelope: &ProtocolEnvelope,
    ) -> Result<ProtocolEnvelope, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .insert(self.process_id.clone(), tx);

        if let Err(e) = self.send(envelope).await {
            self.inner.pending.lock().remove(&self.process_id);
            return Err(e);
        }

        match tokio::time::timeout(self.inner.config.protocol_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => {
                self.inner.pending.lock().remove(&self.process_id);
                Err(EngineError::BadMessage(
                    "response channel closed before reply".to_string(),
                ))
            }
            Err(_) => {
                self.inner.pending.lock().remove(&self.process_id);
                warn!(
                    protocol = %self.protocol,
                    process_id = %self.process_id,
                    "counterparty reply timed out"
                );
                Err(EngineError::Timeout {
                    protocol: self.protocol,
                    process_id: self.process_id.clone(),
                })
            }
        }
    }

    /// PERSIST: one transactional write of channel + commitments.
    pub(crate) async fn persist(&self, op: PersistOp<'_>) -> Result<(), EngineError> {
        let store = &self.inner.store;
        match op {
            PersistOp::CreateChannel {
                channel,
                setup,
                free_balance_set_state,
            } => {
                debug!(multisig = %channel.multisig_address(), "persisting new channel");
                store
                    .create_state_channel(channel, setup, free_balance_set_state)
                    .await?
            }
            PersistOp::CreateProposal {
                channel,
                proposal,
                set_state,
            } => {
                store
                    .create_app_proposal(channel, proposal, set_state)
                    .await?
            }
            PersistOp::CreateAppInstance {
                channel,
                identity_hash,
                free_balance_set_state,
                conditional,
            } => {
                store
                    .create_app_instance(channel, &identity_hash, free_balance_set_state, conditional)
                    .await?
            }
            PersistOp::UpdateAppInstance {
                channel,
                identity_hash,
                set_state,
                signing,
            } => {
                store
                    .update_app_instance(channel, &identity_hash, set_state, signing)
                    .await?
            }
            PersistOp::RemoveAppInstance {
                channel,
                identity_hash,
                free_balance_set_state,
            } => {
                store
                    .remove_app_instance(channel, &identity_hash, free_balance_set_state)
                    .await?
            }
            PersistOp::CreateWithdrawal {
                channel,
                free_balance_set_state,
                commitment,
                record,
            } => {
                store
                    .create_withdrawal(channel, free_balance_set_state, commitment, record)
                    .await?
            }
        }
        Ok(())
    }

    /// Build the initiator's envelope for this exchange.
    pub(crate) fn envelope(
        &self,
        to: PublicIdentifier,
        params: ProtocolParams,
        custom_data: CustomData,
    ) -> ProtocolEnvelope {
        ProtocolEnvelope {
            process_id: self.process_id.clone(),
            protocol: self.protocol,
            seq: INITIATOR_SEQ,
            to,
            from: self.me().clone(),
            params,
            custom_data,
            prev_message_received: None,
        }
    }
}

/// Require a counterparty signature over a digest and check who signed.
pub(crate) fn expect_signature(
    signature: Option<RecoverableSignature>,
    digest: B256,
    expected: Address,
) -> Result<RecoverableSignature, EngineError> {
    let sig = signature
        .ok_or_else(|| EngineError::BadMessage("missing counterparty signature".to_string()))?;
    let recovered = sig.recover_address(digest)?;
    if recovered != expected {
        return Err(EngineError::SignatureMismatch { expected, recovered });
    }
    Ok(sig)
}

/// Turn order of an app: alternates with the version number.
pub(crate) fn turn_taker(app: &offchan_types::AppInstance) -> Address {
    app.identity.participants[(app.version_number % 2) as usize]
}

/// SetState commitment over a channel's current free-balance state.
pub(crate) fn free_balance_set_state(
    channel: &StateChannel,
    challenge_registry: Address,
) -> SetStateCommitment {
    let fb = channel.free_balance();
    SetStateCommitment::new(
        fb.identity.clone(),
        fb.state_hash(),
        fb.version_number,
        fb.state_timeout,
        challenge_registry,
    )
}
