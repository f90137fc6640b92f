//! Update protocol
//!
//! Consensual replacement of an app's state at the next version number.
//! A received commitment at a version that does not advance the local
//! latest is a replay: acknowledged without any write when it matches
//! the stored commitment exactly, rejected otherwise.

use crate::error::EngineError;
use crate::messages::{CustomData, ProtocolEnvelope, ProtocolParams, UpdateParams};
use crate::middleware::ValidationContext;
use crate::protocol::{expect_signature, PersistOp, ProtocolExecutor};
use alloy_primitives::{keccak256, Address, Bytes, B256};
use offchan_commitments::{Commitment, SetStateCommitment};
use offchan_store::Signing;
use offchan_types::StateChannel;
use tracing::{debug, info};

pub(crate) async fn initiate(
    exec: &ProtocolExecutor,
    channel: &StateChannel,
    identity_hash: B256,
    new_state: Bytes,
    state_timeout: u64,
) -> Result<StateChannel, EngineError> {
    let me = exec.me().clone();
    let peer = channel.counterparty_of(&me)?.clone();
    let app = channel.app(&identity_hash)?;
    let version_number = app.version_number + 1;

    let mut set_state = SetStateCommitment::new(
        app.identity.clone(),
        keccak256(&new_state),
        version_number,
        state_timeout,
        exec.inner.network.challenge_registry,
    );

    let wire_params = ProtocolParams::Update(UpdateParams {
        multisig: channel.multisig_address(),
        app_identity_hash: identity_hash,
        new_state: new_state.clone(),
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

    let next = channel.set_app_state(&identity_hash, new_state, state_timeout, None)?;
    exec.persist(PersistOp::UpdateAppInstance {
        channel: &next,
        identity_hash,
        set_state: &set_state,
        signing: Signing::Double,
    })
    .await?;
    info!(multisig = %channel.multisig_address(), %identity_hash, version_number, "app updated");
    Ok(next)
}

/// Check a non-advancing version against the stored double-signed
/// commitment; exact replays are acknowledged without a write.
pub(crate) async fn check_replay(
    exec: &ProtocolExecutor,
    envelope: &ProtocolEnvelope,
    identity_hash: B256,
    current_version: u64,
    proposed_version: u64,
    initiator_address: Address,
) -> Result<bool, EngineError> {
    if proposed_version > current_version {
        if proposed_version != current_version + 1 {
            return Err(EngineError::InvariantViolation(format!(
                "version {proposed_version} skips ahead of latest {current_version}"
            )));
        }
        return Ok(false);
    }
    if let Some(stored) = exec
        .inner
        .store
        .get_set_state_commitment(&identity_hash, Signing::Double)
        .await?
    {
        if stored.version_number() == proposed_version
            && expect_signature(
                envelope.custom_data.signature,
                stored.hash_to_sign(),
                initiator_address,
            )
            .is_ok()
        {
            debug!(
                %identity_hash,
                proposed_version, "replayed exchange ignored"
            );
            return Ok(true);
        }
    }
    Err(EngineError::InvariantViolation(format!(
        "version {proposed_version} does not advance latest {current_version}"
    )))
}

pub(crate) async fn respond(
    exec: &ProtocolExecutor,
    envelope: &ProtocolEnvelope,
    channel: &StateChannel,
) -> Result<Option<StateChannel>, EngineError> {
    let params = match &envelope.params {
        ProtocolParams::Update(p) => p,
        _ => return Err(EngineError::BadMessage("expected update params".to_string())),
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

    let mut set_state = SetStateCommitment::new(
        app.identity.clone(),
        keccak256(&params.new_state),
        params.version_number,
        params.state_timeout,
        exec.inner.network.challenge_registry,
    );

    let their_sig = expect_signature(
        envelope.custom_data.signature,
        set_state.hash_to_sign(),
        initiator_address,
    )?;

    exec.validate(
        app.identity.app_definition,
        &ValidationContext {
            protocol: exec.protocol,
            channel,
            app: Some(app),
            params: &envelope.params,
            actor: initiator_address,
            turn_taker: None,
        },
    )?;

    let my_sig = exec.sign(set_state.hash_to_sign()).await?;
    set_state.add_signatures(&[their_sig, my_sig])?;

    let next = channel.set_app_state(
        &identity_hash,
        params.new_state.clone(),
        params.state_timeout,
        None,
    )?;
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
        "app updated (responder)"
    );
    Ok(Some(next))
}
