//! Propose protocol
//!
//! Allocates the next channel nonce, agrees on the future app's
//! identity and initial state, and leaves a double-signed SetState over
//! that initial state behind. No app instance exists yet afterwards,
//! only a proposal record.

use crate::engine::ProposeInstallRequest;
use crate::error::EngineError;
use crate::messages::{CustomData, ProposeParams, ProtocolEnvelope, ProtocolParams};
use crate::middleware::ValidationContext;
use crate::protocol::{expect_signature, PersistOp, ProtocolExecutor};
use alloy_primitives::{keccak256, B256};
use offchan_commitments::{Commitment, SetStateCommitment};
use offchan_types::{AppIdentity, Proposal, StateChannel};
use tracing::info;

pub(crate) async fn initiate(
    exec: &ProtocolExecutor,
    channel: &StateChannel,
    request: &ProposeInstallRequest,
) -> Result<(StateChannel, B256), EngineError> {
    let network = &exec.inner.network;
    let me = exec.me().clone();
    let peer = channel.counterparty_of(&me)?.clone();
    let channel_nonce = channel.next_channel_nonce();

    let identity = AppIdentity::new(
        channel_nonce,
        *channel.multisig_owners(),
        request.app_definition,
        request.default_timeout,
    );
    let proposal = Proposal {
        identity: identity.clone(),
        initiator: me,
        responder: peer.clone(),
        initiator_deposit: request.initiator_deposit,
        initiator_deposit_token: request.initiator_deposit_token,
        responder_deposit: request.responder_deposit,
        responder_deposit_token: request.responder_deposit_token,
        initial_state: request.initial_state.clone(),
        state_timeout: request.state_timeout,
        interpreter_params: request.interpreter_params(),
    };
    let identity_hash = proposal.identity_hash();

    let mut set_state = SetStateCommitment::new(
        identity,
        keccak256(&request.initial_state),
        1,
        request.state_timeout,
        network.challenge_registry,
    );

    let wire_params = ProtocolParams::Propose(ProposeParams {
        multisig: channel.multisig_address(),
        channel_nonce,
        app_definition: request.app_definition,
        initial_state: request.initial_state.clone(),
        initiator_deposit: request.initiator_deposit,
        initiator_deposit_token: request.initiator_deposit_token,
        responder_deposit: request.responder_deposit,
        responder_deposit_token: request.responder_deposit_token,
        default_timeout: request.default_timeout,
        state_timeout: request.state_timeout,
        interpreter_params: proposal.interpreter_params.clone(),
    });

    exec.validate(
        request.app_definition,
        &ValidationContext {
            protocol: exec.protocol,
            channel,
            app: None,
            params: &wire_params,
            actor: exec.my_address(),
            turn_taker: None,
        },
    )?;

    let my_sig = exec.sign(set_state.hash_to_sign()).await?;
    let envelope = exec.envelope(
        peer.clone(),
        wire_params,
        CustomData {
            signature: Some(my_sig),
            free_balance_signature: None,
        },
    );
    let reply = exec.send_and_wait(&envelope).await?;

    let peer_address = channel.address_of(&peer)?;
    let their_sig = expect_signature(
        reply.custom_data.signature,
        set_state.hash_to_sign(),
        peer_address,
    )?;
    set_state.add_signatures(&[my_sig, their_sig])?;

    let next = channel.propose_app(proposal.clone())?;
    exec.persist(PersistOp::CreateProposal {
        channel: &next,
        proposal: &proposal,
        set_state: &set_state,
    })
    .await?;
    info!(multisig = %channel.multisig_address(), %identity_hash, "app proposed");
    Ok((next, identity_hash))
}

pub(crate) async fn respond(
    exec: &ProtocolExecutor,
    envelope: &ProtocolEnvelope,
    channel: &StateChannel,
) -> Result<StateChannel, EngineError> {
    let params = match &envelope.params {
        ProtocolParams::Propose(p) => p,
        _ => {
            return Err(EngineError::BadMessage(
                "expected propose params".to_string(),
            ))
        }
    };
    let network = &exec.inner.network;
    let me = exec.me().clone();

    if params.channel_nonce != channel.next_channel_nonce() {
        return Err(EngineError::InvariantViolation(format!(
            "proposal nonce {} desynced from local counter {}",
            params.channel_nonce,
            channel.next_channel_nonce()
        )));
    }

    let identity = AppIdentity::new(
        params.channel_nonce,
        *channel.multisig_owners(),
        params.app_definition,
        params.default_timeout,
    );
    let proposal = Proposal {
        identity: identity.clone(),
        initiator: envelope.from.clone(),
        responder: me,
        initiator_deposit: params.initiator_deposit,
        initiator_deposit_token: params.initiator_deposit_token,
        responder_deposit: params.responder_deposit,
        responder_deposit_token: params.responder_deposit_token,
        initial_state: params.initial_state.clone(),
        state_timeout: params.state_timeout,
        interpreter_params: params.interpreter_params.clone(),
    };
    let identity_hash = proposal.identity_hash();

    let mut set_state = SetStateCommitment::new(
        identity,
        keccak256(&params.initial_state),
        1,
        params.state_timeout,
        network.challenge_registry,
    );

    let initiator_address = channel.address_of(&envelope.from)?;
    let their_sig = expect_signature(
        envelope.custom_data.signature,
        set_state.hash_to_sign(),
        initiator_address,
    )?;

    exec.validate(
        params.app_definition,
        &ValidationContext {
            protocol: exec.protocol,
            channel,
            app: None,
            params: &envelope.params,
            actor: initiator_address,
            turn_taker: None,
        },
    )?;

    let my_sig = exec.sign(set_state.hash_to_sign()).await?;
    set_state.add_signatures(&[their_sig, my_sig])?;

    let next = channel.propose_app(proposal.clone())?;
    exec.persist(PersistOp::CreateProposal {
        channel: &next,
        proposal: &proposal,
        set_state: &set_state,
    })
    .await?;

    let reply = envelope.reply(
        envelope.params.clone(),
        CustomData {
            signature: Some(my_sig),
            free_balance_signature: None,
        },
    );
    exec.send(&reply).await?;
    info!(multisig = %channel.multisig_address(), %identity_hash, "app proposed (responder)");
    Ok(next)
}
