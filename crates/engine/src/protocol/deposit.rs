//! Deposit settlement exchange
//!
//! Credits a confirmed on-chain deposit into the depositor's
//! free-balance column and re-signs the free-balance SetState at its
//! next version. The funding transaction itself is built and broadcast
//! outside the engine.

use crate::error::EngineError;
use crate::messages::{CustomData, DepositParams, ProtocolEnvelope, ProtocolParams};
use crate::protocol::{expect_signature, free_balance_set_state, PersistOp, ProtocolExecutor};
use alloy_primitives::{Address, U256};
use offchan_commitments::Commitment;
use offchan_store::Signing;
use offchan_types::StateChannel;
use tracing::info;

pub(crate) async fn initiate(
    exec: &ProtocolExecutor,
    channel: &StateChannel,
    token: Address,
    amount: U256,
) -> Result<StateChannel, EngineError> {
    let me = exec.me().clone();
    let peer = channel.counterparty_of(&me)?.clone();
    let my_address = exec.my_address();

    let next = channel.credit_free_balance(token, &my_address, amount)?;
    let mut fb_set_state =
        free_balance_set_state(&next, exec.inner.network.challenge_registry);

    let my_sig = exec.sign(fb_set_state.hash_to_sign()).await?;
    let envelope = exec.envelope(
        peer.clone(),
        ProtocolParams::Deposit(DepositParams {
            multisig: channel.multisig_address(),
            token,
            amount,
        }),
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

    let fb_identity_hash = next.free_balance().identity_hash();
    exec.persist(PersistOp::UpdateAppInstance {
        channel: &next,
        identity_hash: fb_identity_hash,
        set_state: &fb_set_state,
        signing: Signing::Double,
    })
    .await?;
    info!(multisig = %channel.multisig_address(), %token, %amount, "deposit credited");
    Ok(next)
}

pub(crate) async fn respond(
    exec: &ProtocolExecutor,
    envelope: &ProtocolEnvelope,
    channel: &StateChannel,
) -> Result<StateChannel, EngineError> {
    let params = match &envelope.params {
        ProtocolParams::Deposit(p) => p,
        _ => {
            return Err(EngineError::BadMessage(
                "expected deposit params".to_string(),
            ))
        }
    };
    let depositor_address = channel.address_of(&envelope.from)?;

    // A deposit can only ever grow the depositor's own column.
    let next = channel.credit_free_balance(params.token, &depositor_address, params.amount)?;
    let mut fb_set_state =
        free_balance_set_state(&next, exec.inner.network.challenge_registry);

    let their_sig = expect_signature(
        envelope.custom_data.signature,
        fb_set_state.hash_to_sign(),
        depositor_address,
    )?;
    let my_sig = exec.sign(fb_set_state.hash_to_sign()).await?;
    fb_set_state.add_signatures(&[their_sig, my_sig])?;

    let fb_identity_hash = next.free_balance().identity_hash();
    exec.persist(PersistOp::UpdateAppInstance {
        channel: &next,
        identity_hash: fb_identity_hash,
        set_state: &fb_set_state,
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
        token = %params.token,
        amount = %params.amount,
        "deposit credited (responder)"
    );
    Ok(next)
}
