//! Peer wire protocol
//!
//! One envelope shape for all six protocols, JSON-encoded onto pub/sub
//! subjects of the form `<service_key>.<to>.<from>`. Request/response
//! pairs correlate by `process_id`; `seq` distinguishes the initiator's
//! message (1) from the responder's reply (2).

use crate::error::EngineError;
use alloy_primitives::{Address, Bytes, B256, U256};
use offchan_crypto::RecoverableSignature;
use offchan_types::{InterpreterParams, PublicIdentifier};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequence number of the initiator's message in every exchange.
pub const INITIATOR_SEQ: u32 = 1;
/// Sequence number of the responder's reply.
pub const RESPONDER_SEQ: u32 = 2;

/// The six protocols the runner executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolName {
    /// Create a channel with its free balance.
    Setup,
    /// Agree on a future app instance.
    Propose,
    /// Fund and install a proposed app.
    Install,
    /// Replace an app's state consensually.
    Update,
    /// Advance an app's state through its transition function.
    TakeAction,
    /// Settle an app's outcome back into the free balance.
    Uninstall,
    /// Credit a confirmed on-chain deposit into the free balance.
    Deposit,
    /// Sign a withdrawal commitment and debit the free balance.
    Withdraw,
}

impl fmt::Display for ProtocolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolName::Setup => "setup",
            ProtocolName::Propose => "propose",
            ProtocolName::Install => "install",
            ProtocolName::Update => "update",
            ProtocolName::TakeAction => "take-action",
            ProtocolName::Uninstall => "uninstall",
            ProtocolName::Deposit => "deposit",
            ProtocolName::Withdraw => "withdraw",
        };
        f.write_str(name)
    }
}

/// Parameters of a Setup exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetupParams {
    /// CREATE2-derived multisig both parties must agree on.
    pub multisig: Address,
    /// Channel initiator.
    pub initiator: PublicIdentifier,
    /// Channel responder.
    pub responder: PublicIdentifier,
}

/// Parameters of a Propose exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposeParams {
    /// Channel the app is proposed on.
    pub multisig: Address,
    /// Nonce the initiator allocated from the monotonic counter.
    pub channel_nonce: u64,
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
    /// Outcome-interpreter parameters.
    pub interpreter_params: InterpreterParams,
}

/// Parameters of an Install exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstallParams {
    /// Channel the proposal lives on.
    pub multisig: Address,
    /// Identity hash of the accepted proposal.
    pub app_identity_hash: B256,
}

/// Parameters of an Update exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateParams {
    /// Channel the app lives on.
    pub multisig: Address,
    /// App being updated.
    pub app_identity_hash: B256,
    /// Replacement state bytes.
    pub new_state: Bytes,
    /// Challenge window of the new state.
    pub state_timeout: u64,
    /// Version the new state commits at; must advance the latest.
    pub version_number: u64,
}

/// Parameters of a TakeAction exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TakeActionParams {
    /// Channel the app lives on.
    pub multisig: Address,
    /// App the action applies to.
    pub app_identity_hash: B256,
    /// ABI-encoded action; both sides run the transition themselves.
    pub action: Bytes,
    /// Challenge window of the post-state.
    pub state_timeout: u64,
    /// Version the post-state commits at; must advance the latest.
    pub version_number: u64,
}

/// Parameters of an Uninstall exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UninstallParams {
    /// Channel the app lives on.
    pub multisig: Address,
    /// App being uninstalled.
    pub app_identity_hash: B256,
}

/// Parameters of a Deposit exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepositParams {
    /// Channel being funded.
    pub multisig: Address,
    /// Token deposited.
    pub token: Address,
    /// Amount credited to the initiator's column.
    pub amount: U256,
}

/// Parameters of a Withdraw exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WithdrawParams {
    /// Channel being withdrawn from.
    pub multisig: Address,
    /// Recipient of the withdrawn funds.
    pub recipient: Address,
    /// Asset withdrawn.
    pub asset_id: Address,
    /// Amount debited from the initiator's column.
    pub amount: U256,
    /// Multisig nonce the withdrawal commitment is built with.
    pub withdrawal_nonce: u64,
}

/// Protocol-specific payload of an envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ProtocolParams {
    /// Setup payload.
    Setup(SetupParams),
    /// Propose payload.
    Propose(ProposeParams),
    /// Install payload.
    Install(InstallParams),
    /// Update payload.
    Update(UpdateParams),
    /// TakeAction payload.
    TakeAction(TakeActionParams),
    /// Uninstall payload.
    Uninstall(UninstallParams),
    /// Deposit payload.
    Deposit(DepositParams),
    /// Withdraw payload.
    Withdraw(WithdrawParams),
}

impl ProtocolParams {
    /// The multisig this exchange serializes on.
    pub fn multisig(&self) -> Address {
        match self {
            ProtocolParams::Setup(p) => p.multisig,
            ProtocolParams::Propose(p) => p.multisig,
            ProtocolParams::Install(p) => p.multisig,
            ProtocolParams::Update(p) => p.multisig,
            ProtocolParams::TakeAction(p) => p.multisig,
            ProtocolParams::Uninstall(p) => p.multisig,
            ProtocolParams::Deposit(p) => p.multisig,
            ProtocolParams::Withdraw(p) => p.multisig,
        }
    }
}

/// Free-form signed material riding alongside the params.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomData {
    /// Signature over the exchange's primary commitment digest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<RecoverableSignature>,
    /// Signature over the free-balance SetState digest, for exchanges
    /// that update the free balance alongside (Setup, Install).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_balance_signature: Option<RecoverableSignature>,
}

/// The wire envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtocolEnvelope {
    /// Correlates the two messages of one exchange.
    pub process_id: String,
    /// Protocol being executed.
    pub protocol: ProtocolName,
    /// 1 for the initiator's message, 2 for the reply.
    pub seq: u32,
    /// Recipient identifier.
    pub to: PublicIdentifier,
    /// Sender identifier.
    pub from: PublicIdentifier,
    /// Protocol-specific parameters.
    pub params: ProtocolParams,
    /// Signatures and other signed material.
    #[serde(default)]
    pub custom_data: CustomData,
    /// Milliseconds timestamp of the previous message's receipt, for
    /// timing telemetry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_message_received: Option<u64>,
}

impl ProtocolEnvelope {
    /// The bus subject this envelope publishes to.
    pub fn subject(&self, service_key: &str) -> String {
        format!("{service_key}.{}.{}", self.to, self.from)
    }

    /// JSON-encode for the bus.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Decode a bus payload.
    pub fn decode(payload: &[u8]) -> Result<Self, EngineError> {
        serde_json::from_slice(payload).map_err(|e| EngineError::BadMessage(e.to_string()))
    }

    /// Build the responder's reply: same process id and protocol, the
    /// direction reversed, `seq` advanced.
    pub fn reply(&self, params: ProtocolParams, custom_data: CustomData) -> Self {
        Self {
            process_id: self.process_id.clone(),
            protocol: self.protocol,
            seq: RESPONDER_SEQ,
            to: self.from.clone(),
            from: self.to.clone(),
            params,
            custom_data,
            prev_message_received: Some(now_millis()),
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
