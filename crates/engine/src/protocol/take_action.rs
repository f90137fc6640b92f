//! TakeAction protocol
//!
//! Both sides run the app's pure transition themselves; the wire only
//! carries the action. The initiator persists a single-signed SetState
//! with the pending action before the exchange, keeping the unilateral
//! `progressState` path open if the counterparty vanishes, and replaces
//! it with the double-signed commitment on completion.

use crate::error::EngineError;
use crate::evm::compute_state_transition;
use crate::messages::{CustomData, ProtocolEnvelope, ProtocolParams, TakeActionParams};
use crate::middleware::ValidationContext;
use crate::protocol::{
    expect_signature, turn_taker, update::check_replay, PersistOp, ProtocolExecutor,
};
use alloy_primitives::{keccak256, Bytes, B256};
use offchan_commitments::{Commitment, SetStateCommitment};
use offchan_store::Signing;
use offchan_types::StateChannel;
use tracing::info;

pub(crate) async fn initiate(
    exec: &ProtocolExecutor,
    channel: &StateChannel,
    identity_hash: B256,
    action: Bytes,
    state_timeout: u64,
) -> Result<(StateChannel, Bytes), EngineError> {
    let me = exec.me().clone();
    let peer = channel.counterparty_of(&me)?.clone();
    let app = channel.app(&identity_hash)?;
    let version_number = app.version_number + 1;

    let wire_params = ProtocolParams::TakeAction(TakeActionParams {
        multisig: channel.multisig_address(),
        app_identity_hash: identity_hash,
        action: action.clone(),
        state_timeout,
        version_number,
    });
    exec.validate(
        app.identity.app_definition,
        &ValidationContext {
            protocol: exec.protocol,
            channel,
            app: Some(app),
            params: &wire_params,
            actor: exec.my_address(),
            turn_taker: Some(turn_taker(app)),
        },
    )?;

    let new_state = compute_state_transition(
        exec.inner.evm.as_ref(),
        app.identity.app_definition,
        &app.latest_state,
        &action,
    )
    .await?;

    let mut set_state = SetStateCommitment::new(
        app.identity.clone(),
        keccak256(&new_state),
        version_number,
        state_timeout,
        exec.inner.network.challenge_registry,
    );
    let my_sig = exec.sign(set_state.hash_to_sign()).await?;

    // Single-signed checkpoint with the pending action, before the peer
    // is involved at all.
    let mut single = set_state.clone();
    single.add_signatures(&[my_sig])?;
    let pending = channel.set_app_state(
        &identity_hash,
        new_state.clone(),
        state_timeout,
        Some(action.clone()),
    )?;
    exec.persist(PersistOp::UpdateAppInstance {
        channel: &pending,
        identity_hash,
        set_state: &single,
        signing: Signing::Single,
    })
    .await?;

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

    let next = channel.set_app_state(&identity_hash, new_state.clone(), state_timeout, None)?;
    exec.persist(PersistOp::UpdateAppInstance {
        channel: &next,
        identity_hash,
        set_state: &set_state,
        signing: Signing::Double,
    })
    .await?;
    info!(
        multisig = %channel.multisig_address(),
        %identity_hash,
        version_number,
        "action taken"
    );
    Ok((next, new_state))
}

pub(crate) async fn respond(
    exec: &ProtocolExecutor,
    envelope: &ProtocolEnvelope,
    channel: &StateChannel,
) -> Result<Option<StateChannel>, EngineError> {
    let params = match &envelope.params {
        ProtocolParams::TakeAction(p) => p,
        _ => {
            return Err(EngineError::BadMessage(
                "expected take-action params".to_string(),
            ))
        }
    };
    let identity_hash = params.app_identity_hash;
    let app = channel.app(&identity_hash)?;
    let initiator_address = channel.address_of(&envelope.from)?;

    if check_replay(
        exec,
        envelope,
        identity_hash,
        app.version_number,
        params.version_number,
        initiator_address,
    )
    .await?
    {
        return Ok(None);
    }

    exec.validate(
        app.identity.app_definition,
        &ValidationContext {
            protocol: exec.protocol,
            channel,
            app: Some(app),
            params: &envelope.params,
            actor: initiator_address,
            turn_taker: Some(turn_taker(app)),
        },
    )?;

    // Deterministic: our transition must reproduce the state the
    // initiator signed, or their signature will not recover.
    let new_state = compute_state_transition(
        exec.inner.evm.as_ref(),
        app.identity.app_definition,
        &app.latest_state,
        &params.action,
    )
    .await?;

    let mut set_state = SetStateCommitment::new(
        app.identity.clone(),
        keccak256(&new_state),
        params.version_number,
        params.state_timeout,
        exec.inner.network.challenge_registry,
    );
    let their_sig = expect_signature(
        envelope.custom_data.signature,
        set_state.hash_to_sign(),
        initiator_address,
    )?;

    let my_sig = exec.sign(set_state.hash_to_sign()).await?;
    set_state.add_signatures(&[their_sig, my_sig])?;

    // Responders persist only the double-signed commitment; they cannot
    // unilaterally progress state.
    let next = channel.set_app_state(&identity_hash, new_state, params.state_timeout, None)?;
    exec.persist(PersistOp::UpdateAppInstance {
        channel: &next,
        identity_hash,
        set_state: &set_state,
        signing: Signing::Double,
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
    info!(
        multisig = %channel.multisig_address(),
        %identity_hash,
        version_number = params.version_number,
        "action taken (responder)"
    );
    Ok(Some(next))
}
