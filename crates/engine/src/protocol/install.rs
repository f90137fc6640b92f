//! Install protocol
//!
//! Conditional on a matching accepted proposal. Both parties debit the
//! deposits out of the free balance, sign the conditional transaction
//! binding the multisig to the app's interpreted outcome, and sign the
//! free-balance SetState at its bumped version. The proposal record is
//! replaced by an app instance.

use crate::error::EngineError;
use crate::messages::{CustomData, InstallParams, ProtocolEnvelope, ProtocolParams};
use crate::middleware::ValidationContext;
use crate::protocol::{expect_signature, free_balance_set_state, PersistOp, ProtocolExecutor};
use alloy_primitives::B256;
use offchan_commitments::{Commitment, ConditionalTransactionCommitment};
use offchan_types::StateChannel;
use tracing::info;

fn build_conditional(
    exec: &ProtocolExecutor,
    channel: &StateChannel,
    next: &StateChannel,
    identity_hash: B256,
    proposal: &offchan_types::Proposal,
) -> ConditionalTransactionCommitment {
    let network = &exec.inner.network;
    ConditionalTransactionCommitment::new(
        channel.multisig_address(),
        *channel.multisig_owners(),
        network.challenge_registry,
        network.outcome_executor,
        next.free_balance().identity_hash(),
        identity_hash,
        network.multi_asset_interpreter,
        proposal.interpreter_params.abi_encode().into(),
        proposal.identity.channel_nonce,
        network.domain(),
    )
}

pub(crate) async fn initiate(
    exec: &ProtocolExecutor,
    channel: &StateChannel,
    identity_hash: B256,
) -> Result<StateChannel, EngineError> {
    let me = exec.me().clone();
    let peer = channel.counterparty_of(&me)?.clone();
    let proposal = channel.proposal(&identity_hash)?.clone();
    let next = channel.install_app(&identity_hash)?;

    let mut conditional = build_conditional(exec, channel, &next, identity_hash, &proposal);
    let mut fb_set_state =
        free_balance_set_state(&next, exec.inner.network.challenge_registry);

    let wire_params = ProtocolParams::Install(InstallParams {
        multisig: channel.multisig_address(),
        app_identity_hash: identity_hash,
    });
    exec.validate(
        proposal.identity.app_definition,
        &ValidationContext {
            protocol: exec.protocol,
            channel,
            app: Some(next.app(&identity_hash)?),
            params: &wire_params,
            actor: exec.my_address(),
            turn_taker: None,
        },
    )?;

    let my_cond_sig = exec.sign(conditional.hash_to_sign()).await?;
    let my_fb_sig = exec.sign(fb_set_state.hash_to_sign()).await?;

    let envelope = exec.envelope(
        peer.clone(),
        wire_params,
        CustomData {
            signature: Some(my_cond_sig),
            free_balance_signature: Some(my_fb_sig),
        },
    );
    let reply = exec.send_and_wait(&envelope).await?;

    let peer_address = channel.address_of(&peer)?;
    let their_cond_sig = expect_signature(
        reply.custom_data.signature,
        conditional.hash_to_sign(),
        peer_address,
    )?;
    let their_fb_sig = expect_signature(
        reply.custom_data.free_balance_signature,
        fb_set_state.hash_to_sign(),
        peer_address,
    )?;
    conditional.add_signatures(&[my_cond_sig, their_cond_sig])?;
    fb_set_state.add_signatures(&[my_fb_sig, their_fb_sig])?;

    exec.persist(PersistOp::CreateAppInstance {
        channel: &next,
        identity_hash,
        free_balance_set_state: &fb_set_state,
        conditional: &conditional,
    })
    .await?;
    info!(multisig = %channel.multisig_address(), %identity_hash, "app installed");
    Ok(next)
}

pub(crate) async fn respond(
    exec: &ProtocolExecutor,
    envelope: &ProtocolEnvelope,
    channel: &StateChannel,
) -> Result<StateChannel, EngineError> {
    let params = match &envelope.params {
        ProtocolParams::Install(p) => p,
        _ => {
            return Err(EngineError::BadMessage(
                "expected install params".to_string(),
            ))
        }
    };
    let identity_hash = params.app_identity_hash;
    let proposal = channel.proposal(&identity_hash)?.clone();
    let next = channel.install_app(&identity_hash)?;

    let mut conditional = build_conditional(exec, channel, &next, identity_hash, &proposal);
    let mut fb_set_state =
        free_balance_set_state(&next, exec.inner.network.challenge_registry);

    let initiator_address = channel.address_of(&envelope.from)?;
    let their_cond_sig = expect_signature(
        envelope.custom_data.signature,
        conditional.hash_to_sign(),
        initiator_address,
    )?;
    let their_fb_sig = expect_signature(
        envelope.custom_data.free_balance_signature,
        fb_set_state.hash_to_sign(),
        initiator_address,
    )?;

    exec.validate(
        proposal.identity.app_definition,
        &ValidationContext {
            protocol: exec.protocol,
            channel,
            app: Some(next.app(&identity_hash)?),
            params: &envelope.params,
            actor: initiator_address,
            turn_taker: None,
        },
    )?;

    let my_cond_sig = exec.sign(conditional.hash_to_sign()).await?;
    let my_fb_sig = exec.sign(fb_set_state.hash_to_sign()).await?;
    conditional.add_signatures(&[their_cond_sig, my_cond_sig])?;
    fb_set_state.add_signatures(&[their_fb_sig, my_fb_sig])?;

    exec.persist(PersistOp::CreateAppInstance {
        channel: &next,
        identity_hash,
        free_balance_set_state: &fb_set_state,
        conditional: &conditional,
    })
    .await?;

    let reply = envelope.reply(
        envelope.params.clone(),
        CustomData {
            signature: Some(my_cond_sig),
            free_balance_signature: Some(my_fb_sig),
        },
    );
    exec.send(&reply).await?;
    info!(multisig = %channel.multisig_address(), %identity_hash, "app installed (responder)");
    Ok(next)
}
