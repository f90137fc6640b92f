//! Setup protocol
//!
//! Two rounds. The initiator derives the multisig from both signer
//! addresses and signs the setup commitment plus the free-balance
//! SetState at version 1; the responder re-derives, verifies, counter
//! signs and persists; the initiator persists on receipt of the reply.

use crate::error::EngineError;
use crate::messages::{CustomData, ProtocolEnvelope, ProtocolParams, SetupParams};
use crate::protocol::{expect_signature, free_balance_set_state, PersistOp, ProtocolExecutor};
use offchan_commitments::{Commitment, SetupCommitment};
use offchan_crypto::signer_address_of;
use offchan_types::{PublicIdentifier, StateChannel};
use tracing::info;

pub(crate) async fn initiate(
    exec: &ProtocolExecutor,
    responder: PublicIdentifier,
) -> Result<StateChannel, EngineError> {
    let network = &exec.inner.network;
    let me = exec.me().clone();
    if responder == me {
        return Err(EngineError::InvariantViolation(
            "cannot open a channel with yourself".to_string(),
        ));
    }
    let my_address = exec.my_address();
    let responder_address = signer_address_of(&responder)?;
    let multisig = network.multisig_for([my_address, responder_address]);

    let channel = StateChannel::setup(
        multisig,
        network.chain_id,
        [me.clone(), responder.clone()],
        [my_address, responder_address],
        network.free_balance_app_definition,
        exec.inner.config.free_balance_timeout,
    );

    let mut setup = SetupCommitment::new(
        multisig,
        *channel.multisig_owners(),
        network.challenge_registry,
        network.outcome_executor,
        channel.free_balance().identity_hash(),
        network.domain(),
    );
    let mut fb_set_state = free_balance_set_state(&channel, network.challenge_registry);

    let my_setup_sig = exec.sign(setup.hash_to_sign()).await?;
    let my_fb_sig = exec.sign(fb_set_state.hash_to_sign()).await?;

    let envelope = exec.envelope(
        responder.clone(),
        ProtocolParams::Setup(SetupParams {
            multisig,
            initiator: me,
            responder: responder.clone(),
        }),
        CustomData {
            signature: Some(my_setup_sig),
            free_balance_signature: Some(my_fb_sig),
        },
    );
    let reply = exec.send_and_wait(&envelope).await?;

    let their_setup_sig = expect_signature(
        reply.custom_data.signature,
        setup.hash_to_sign(),
        responder_address,
    )?;
    let their_fb_sig = expect_signature(
        reply.custom_data.free_balance_signature,
        fb_set_state.hash_to_sign(),
        responder_address,
    )?;
    setup.add_signatures(&[my_setup_sig, their_setup_sig])?;
    fb_set_state.add_signatures(&[my_fb_sig, their_fb_sig])?;

    exec.persist(PersistOp::CreateChannel {
        channel: &channel,
        setup: &setup,
        free_balance_set_state: &fb_set_state,
    })
    .await?;
    info!(%multisig, "channel created");
    Ok(channel)
}

pub(crate) async fn respond(
    exec: &ProtocolExecutor,
    envelope: &ProtocolEnvelope,
) -> Result<StateChannel, EngineError> {
    let params = match &envelope.params {
        ProtocolParams::Setup(p) => p,
        _ => return Err(EngineError::BadMessage("expected setup params".to_string())),
    };
    let network = &exec.inner.network;
    let me = exec.me().clone();
    if params.responder != me {
        return Err(EngineError::BadMessage(
            "setup addressed to a different responder".to_string(),
        ));
    }

    let my_address = exec.my_address();
    let initiator_address = signer_address_of(&params.initiator)?;
    let expected_multisig = network.multisig_for([initiator_address, my_address]);
    if expected_multisig != params.multisig {
        return Err(EngineError::InvariantViolation(format!(
            "proposed multisig {} does not match derived {expected_multisig}",
            params.multisig
        )));
    }

    let channel = StateChannel::setup(
        params.multisig,
        network.chain_id,
        [params.initiator.clone(), me],
        [initiator_address, my_address],
        network.free_balance_app_definition,
        exec.inner.config.free_balance_timeout,
    );

    let mut setup = SetupCommitment::new(
        params.multisig,
        *channel.multisig_owners(),
        network.challenge_registry,
        network.outcome_executor,
        channel.free_balance().identity_hash(),
        network.domain(),
    );
    let mut fb_set_state = free_balance_set_state(&channel, network.challenge_registry);

    let their_setup_sig = expect_signature(
        envelope.custom_data.signature,
        setup.hash_to_sign(),
        initiator_address,
    )?;
    let their_fb_sig = expect_signature(
        envelope.custom_data.free_balance_signature,
        fb_set_state.hash_to_sign(),
        initiator_address,
    )?;

    let my_setup_sig = exec.sign(setup.hash_to_sign()).await?;
    let my_fb_sig = exec.sign(fb_set_state.hash_to_sign()).await?;
    setup.add_signatures(&[their_setup_sig, my_setup_sig])?;
    fb_set_state.add_signatures(&[their_fb_sig, my_fb_sig])?;

    exec.persist(PersistOp::CreateChannel {
        channel: &channel,
        setup: &setup,
        free_balance_set_state: &fb_set_state,
    })
    .await?;

    let reply = envelope.reply(
        envelope.params.clone(),
        CustomData {
            signature: Some(my_setup_sig),
            free_balance_signature: Some(my_fb_sig),
        },
    );
    exec.send(&reply).await?;
    info!(multisig = %params.multisig, "channel created (responder)");
    Ok(channel)
}
