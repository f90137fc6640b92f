//! Validation middleware
//!
//! App types supply their own acceptance rules (turn-taking, stake
//! limits, state sanity). The runner consults the registry at every
//! `OP_VALIDATE` point; a returned reason aborts the protocol with
//! `ValidationRejected` and is propagated to the caller verbatim.

use crate::messages::{ProtocolName, ProtocolParams};
use alloy_primitives::Address;
use offchan_types::{AppInstance, StateChannel};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a validator may inspect about the pending operation.
pub struct ValidationContext<'a> {
    /// Protocol being validated.
    pub protocol: ProtocolName,
    /// Channel snapshot the operation runs against.
    pub channel: &'a StateChannel,
    /// The targeted app, when one exists already.
    pub app: Option<&'a AppInstance>,
    /// Wire parameters of the exchange.
    pub params: &'a ProtocolParams,
    /// Signer address of the party driving this exchange.
    pub actor: Address,
    /// Whose turn the app says it is, for action-taking protocols.
    pub turn_taker: Option<Address>,
}

/// Per-app-type validation hook.
pub trait ProtocolValidator: Send + Sync {
    /// Return `Some(reason)` to reject the operation.
    fn validate(&self, ctx: &ValidationContext<'_>) -> Option<String>;
}

/// Registry dispatching validation by app-definition address.
///
/// Unregistered app definitions are accepted; registering is how an app
/// type opts into stricter rules.
#[derive(Default)]
pub struct ValidatorRegistry {
    by_app: RwLock<HashMap<Address, Arc<dyn ProtocolValidator>>>,
}

impl ValidatorRegistry {
    /// Register a validator for an app definition.
    pub fn register(&self, app_definition: Address, validator: Arc<dyn ProtocolValidator>) {
        self.by_app.write().insert(app_definition, validator);
    }

    /// Run the registered validator, if any.
    pub fn validate(&self, app_definition: Address, ctx: &ValidationContext<'_>) -> Option<String> {
        let validator = self.by_app.read().get(&app_definition).cloned();
        validator.and_then(|v| v.validate(ctx))
    }
}

/// Reject actions taken out of turn.
///
/// The default turn order alternates with the version number; apps with
/// richer turn logic register their own validator instead.
pub struct TurnBasedValidator;

impl ProtocolValidator for TurnBasedValidator {
    fn validate(&self, ctx: &ValidationContext<'_>) -> Option<String> {
        if ctx.protocol != ProtocolName::TakeAction {
            return None;
        }
        match ctx.turn_taker {
            Some(turn_taker) if turn_taker != ctx.actor => Some(format!(
                "action out of turn: it is {turn_taker}'s turn, not {}",
                ctx.actor
            )),
            _ => None,
        }
    }
}
