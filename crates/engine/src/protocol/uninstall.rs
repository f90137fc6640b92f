//! Uninstall protocol
//!
//! Both parties run the outcome interpreter over the app's final state,
//! credit the redistribution back into the free balance, and sign the
//! free-balance SetState at its next version. The app record is removed
//! on successful persistence; its last SetState commitment remains the
//! only trace of its final state.

use crate::error::EngineError;
use crate::evm::compute_outcome;
use crate::messages::{CustomData, ProtocolEnvelope, ProtocolParams, UninstallParams};
use crate::middleware::ValidationContext;
use crate::protocol::{expect_signature, free_balance_set_state, PersistOp, ProtocolExecutor};
use alloy_primitives::B256;
use offchan_commitments::Commitment;
use offchan_types::StateChannel;
use tracing::info;

pub(crate) async fn initiate(
    exec: &ProtocolExecutor,
    channel: &StateChannel,
    identity_hash: B256,
) -> Result<StateChannel, EngineError> {
    let me = exec.me().clone();
    let peer = channel.counterparty_of(&me)?.clone();
    let app = channel.app(&identity_hash)?.clone();

    let wire_params = ProtocolParams::Uninstall(UninstallParams {
        multisig: channel.multisig_address(),
        app_identity_hash: identity_hash,
    });
    exec.validate(
        app.identity.app_definition,
        &ValidationContext {
            protocol: exec.protocol,
            channel,
            app: Some(&app),
            params: &wire_params,
            actor: exec.my_address(),
            turn_taker: None,
        },
    )?;

    let refunds = compute_outcome(exec.inner.evm.as_ref(), &app).await?;
    let next = channel.uninstall_app(&identity_hash, &refunds)?;
    let mut fb_set_state =
        free_balance_set_state(&next, exec.inner.network.challenge_registry);

    let my_sig = exec.sign(fb_set_state.hash_to_sign()).await?;
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
        fb_set_state.hash_to_sign(),
        peer_address,
    )?;
    fb_set_state.add_signatures(&[my_sig, their_sig])?;

    exec.persist(PersistOp::RemoveAppInstance {
        channel: &next,
        identity_hash,
        free_balance_set_state: &fb_set_state,
    })
    .await?;
    info!(multisig = %channel.multisig_address(), %identity_hash, "app uninstalled");
    Ok(next)
}

pub(crate) async fn respond(
    exec: &ProtocolExecutor,
    envelope: &ProtocolEnvelope,
    channel: &StateChannel,
) -> Result<StateChannel, EngineError> {
    let params = match &envelope.params {
        ProtocolParams::Uninstall(p) => p,
        _ => {
            return Err(EngineError::BadMessage(
                "expected uninstall params".to_string(),
            ))
        }
    };
    let identity_hash = params.app_identity_hash;
    let app = channel.app(&identity_hash)?.clone();
    let initiator_address = channel.address_of(&envelope.from)?;

    exec.validate(
        app.identity.app_definition,
        &ValidationContext {
            protocol: exec.protocol,
            channel,
            app: Some(&app),
            params: &envelope.params,
            actor: initiator_address,
            turn_taker: None,
        },
    )?;

    // The interpreter is deterministic; a diverging outcome surfaces as
    // a signature mismatch below.
    let refunds = compute_outcome(exec.inner.evm.as_ref(), &app).await?;
    let next = channel.uninstall_app(&identity_hash, &refunds)?;
    let mut fb_set_state =
        free_balance_set_state(&next, exec.inner.network.challenge_registry);

    let their_sig = expect_signature(
        envelope.custom_data.signature,
        fb_set_state.hash_to_sign(),
        initiator_address,
    )?;
    let my_sig = exec.sign(fb_set_state.hash_to_sign()).await?;
    fb_set_state.add_signatures(&[their_sig, my_sig])?;

    exec.persist(PersistOp::RemoveAppInstance {
        channel: &next,
        identity_hash,
        free_balance_set_state: &fb_set_state,
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
    info!(multisig = %channel.multisig_address(), %identity_hash, "app uninstalled (responder)");
    Ok(next)
}
