//! Withdraw exchange
//!
//! Debits the withdrawer's free-balance column, double-signs both the
//! withdrawal commitment (the conditional transfer out of the multisig)
//! and the free-balance SetState at its next version, and records the
//! withdrawal in the monitor set. Broadcast is the caller's concern.

use crate::error::EngineError;
use crate::messages::{CustomData, ProtocolEnvelope, ProtocolParams, WithdrawParams};
use crate::protocol::{expect_signature, free_balance_set_state, PersistOp, ProtocolExecutor};
use alloy_primitives::{Address, U256};
use offchan_commitments::{Commitment, WithdrawCommitment};
use offchan_store::WithdrawalRecord;
use offchan_types::StateChannel;
use tracing::info;

fn build_commitment(
    exec: &ProtocolExecutor,
    channel: &StateChannel,
    params: &WithdrawParams,
) -> WithdrawCommitment {
    WithdrawCommitment::new(
        channel.multisig_address(),
        *channel.multisig_owners(),
        params.recipient,
        params.asset_id,
        params.amount,
        params.withdrawal_nonce,
        exec.inner.network.domain(),
    )
}

fn record_of(params: &WithdrawParams) -> WithdrawalRecord {
    WithdrawalRecord {
        multisig: params.multisig,
        recipient: params.recipient,
        asset_id: params.asset_id,
        amount: params.amount,
        withdrawal_nonce: params.withdrawal_nonce,
    }
}

pub(crate) async fn initiate(
    exec: &ProtocolExecutor,
    channel: &StateChannel,
    recipient: Address,
    asset_id: Address,
    amount: U256,
    withdrawal_nonce: u64,
) -> Result<(StateChannel, WithdrawCommitment), EngineError> {
    let me = exec.me().clone();
    let peer = channel.counterparty_of(&me)?.clone();
    let my_address = exec.my_address();

    let params = WithdrawParams {
        multisig: channel.multisig_address(),
        recipient,
        asset_id,
        amount,
        withdrawal_nonce,
    };
    let mut commitment = build_commitment(exec, channel, &params);
    let next = channel.debit_free_balance(asset_id, &my_address, amount)?;
    let mut fb_set_state =
        free_balance_set_state(&next, exec.inner.network.challenge_registry);

    let my_commit_sig = exec.sign(commitment.hash_to_sign()).await?;
    let my_fb_sig = exec.sign(fb_set_state.hash_to_sign()).await?;

    let envelope = exec.envelope(
        peer.clone(),
        ProtocolParams::Withdraw(params.clone()),
        CustomData {
            signature: Some(my_commit_sig),
            free_balance_signature: Some(my_fb_sig),
        },
    );
    let reply = exec.send_and_wait(&envelope).await?;

    let peer_address = channel.address_of(&peer)?;
    let their_commit_sig = expect_signature(
        reply.custom_data.signature,
        commitment.hash_to_sign(),
        peer_address,
    )?;
    let their_fb_sig = expect_signature(
        reply.custom_data.free_balance_signature,
        fb_set_state.hash_to_sign(),
        peer_address,
    )?;
    commitment.add_signatures(&[my_commit_sig, their_commit_sig])?;
    fb_set_state.add_signatures(&[my_fb_sig, their_fb_sig])?;

    exec.persist(PersistOp::CreateWithdrawal {
        channel: &next,
        free_balance_set_state: &fb_set_state,
        commitment: &commitment,
        record: &record_of(&params),
    })
    .await?;
    info!(
        multisig = %channel.multisig_address(),
        %recipient,
        %amount,
        "withdrawal signed"
    );
    Ok((next, commitment))
}

pub(crate) async fn respond(
    exec: &ProtocolExecutor,
    envelope: &ProtocolEnvelope,
    channel: &StateChannel,
) -> Result<StateChannel, EngineError> {
    let params = match &envelope.params {
        ProtocolParams::Withdraw(p) => p,
        _ => {
            return Err(EngineError::BadMessage(
                "expected withdraw params".to_string(),
            ))
        }
    };
    let withdrawer_address = channel.address_of(&envelope.from)?;

    // Withdrawals only ever debit the withdrawer's own column.
    let mut commitment = build_commitment(exec, channel, params);
    let next = channel.debit_free_balance(params.asset_id, &withdrawer_address, params.amount)?;
    let mut fb_set_state =
        free_balance_set_state(&next, exec.inner.network.challenge_registry);

    let their_commit_sig = expect_signature(
        envelope.custom_data.signature,
        commitment.hash_to_sign(),
        withdrawer_address,
    )?;
    let their_fb_sig = expect_signature(
        envelope.custom_data.free_balance_signature,
        fb_set_state.hash_to_sign(),
        withdrawer_address,
    )?;

    let my_commit_sig = exec.sign(commitment.hash_to_sign()).await?;
    let my_fb_sig = exec.sign(fb_set_state.hash_to_sign()).await?;
    commitment.add_signatures(&[their_commit_sig, my_commit_sig])?;
    fb_set_state.add_signatures(&[their_fb_sig, my_fb_sig])?;

    exec.persist(PersistOp::CreateWithdrawal {
        channel: &next,
        free_balance_set_state: &fb_set_state,
        commitment: &commitment,
        record: &record_of(params),
    })
    .await?;

    let reply = envelope.reply(
        envelope.params.clone(),
        CustomData {
            signature: Some(my_commit_sig),
            free_balance_signature: Some(my_fb_sig),
        },
    );
    exec.send(&reply).await?;
    info!(
        multisig = %channel.multisig_address(),
        recipient = %params.recipient,
        amount = %params.amount,
        "withdrawal signed (responder)"
    );
    Ok(next)
}
