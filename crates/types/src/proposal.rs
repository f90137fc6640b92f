//! App-instance proposals

use crate::app_instance::{AppInstance, InterpreterParams};
use crate::identifier::PublicIdentifier;
use crate::identity::AppIdentity;
use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// A proposed app instance, agreed during Propose and consumed by
/// Install. Carries everything both parties need to deterministically
/// reconstruct the initial app state and the funding commitments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Identity the app will install under; `channel_nonce` inside was
    /// allocated from the channel's monotonic counter at Propose time.
    pub identity: AppIdentity,
    /// Proposing party.
    pub initiator: PublicIdentifier,
    /// Accepting party.
    pub responder: PublicIdentifier,
    /// Initiator's deposit amount.
    pub initiator_deposit: U256,
    /// Token the initiator's deposit is denominated in.
    pub initiator_deposit_token: Address,
    /// Responder's deposit amount.
    pub responder_deposit: U256,
    /// Token the responder's deposit is denominated in.
    pub responder_deposit_token: Address,
    /// ABI-encoded initial state of the app.
    pub initial_state: Bytes,
    /// Challenge window for the initial state.
    pub state_timeout: u64,
    /// Outcome-interpreter parameters fixed for the app's lifetime.
    pub interpreter_params: InterpreterParams,
}

impl Proposal {
    /// Canonical key of the proposed app.
    pub fn identity_hash(&self) -> B256 {
        self.identity.identity_hash()
    }

    /// Materialize the app instance this proposal describes, at its
    /// initial state and version 1.
    pub fn into_app_instance(&self) -> AppInstance {
        AppInstance {
            identity: self.identity.clone(),
            latest_state: self.initial_state.clone(),
            version_number: 1,
            state_timeout: self.state_timeout,
            latest_action: None,
            interpreter_params: self.interpreter_params.clone(),
        }
    }
}
