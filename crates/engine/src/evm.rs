//! Read-only EVM access for app state transitions
//!
//! App semantics live in on-chain bytecode; the engine only ever calls
//! the pure `applyAction` and `computeOutcome` views and hashes what
//! comes back. The provider is abstract so deployments can plug any
//! RPC client and tests can substitute deterministic apps.

use crate::error::EngineError;
use alloy_primitives::{Address, Bytes};
use alloy_sol_types::{sol, SolCall, SolValue};
use async_trait::async_trait;
use offchan_types::{AppInstance, CoinTransfer};

sol! {
    /// Pure state transition of an app definition.
    function applyAction(bytes state, bytes action) returns (bytes newState);

    /// Final outcome of an app state, ABI-encoded `OutcomeTransfer[][]`
    /// parallel to the app's interpreter token list.
    function computeOutcome(bytes state) returns (bytes outcome);

    struct OutcomeTransfer {
        address to;
        uint256 amount;
    }

    /// ERC20 transfer, used to build funding transactions.
    function transfer(address to, uint256 amount) returns (bool);
}

/// Read-only `eth_call` capability.
#[async_trait]
pub trait EvmCaller: Send + Sync {
    /// Execute a call against a contract and return its raw output.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, EngineError>;
}

/// Run an app's `applyAction(state, action)` and return the post-state.
pub async fn compute_state_transition(
    evm: &dyn EvmCaller,
    app_definition: Address,
    state: &Bytes,
    action: &Bytes,
) -> Result<Bytes, EngineError> {
    let call = applyActionCall {
        state: state.clone(),
        action: action.clone(),
    };
    let ret = evm.call(app_definition, call.abi_encode().into()).await?;
    let decoded = applyActionCall::abi_decode_returns(&ret, true)
        .map_err(|e| EngineError::Chain(format!("applyAction returned malformed data: {e}")))?;
    Ok(decoded.newState)
}

/// Run `computeOutcome` on an app's latest state and interpret the
/// result as per-token refund rows.
pub async fn compute_outcome(
    evm: &dyn EvmCaller,
    app: &AppInstance,
) -> Result<Vec<(Address, Vec<CoinTransfer>)>, EngineError> {
    let call = computeOutcomeCall {
        state: app.latest_state.clone(),
    };
    let ret = evm
        .call(app.identity.app_definition, call.abi_encode().into())
        .await?;
    let outcome = computeOutcomeCall::abi_decode_returns(&ret, true)
        .map_err(|e| EngineError::Chain(format!("computeOutcome returned malformed data: {e}")))?
        .outcome;
    let rows = <Vec<Vec<OutcomeTransfer>>>::abi_decode(&outcome, true)
        .map_err(|e| EngineError::Chain(format!("outcome rows malformed: {e}")))?;

    let tokens = &app.interpreter_params.token_addresses;
    if rows.len() != tokens.len() {
        return Err(EngineError::InvariantViolation(format!(
            "outcome has {} token rows, interpreter expects {}",
            rows.len(),
            tokens.len()
        )));
    }
    Ok(tokens
        .iter()
        .zip(rows)
        .map(|(token, row)| {
            let transfers = row
                .into_iter()
                .map(|t| CoinTransfer {
                    to: t.to,
                    amount: t.amount,
                })
                .collect();
            (*token, transfers)
        })
        .collect())
}

/// Build ERC20 `transfer(to, amount)` calldata.
pub(crate) fn erc20_transfer_calldata(to: Address, amount: alloy_primitives::U256) -> Bytes {
    transferCall { to, amount }.abi_encode().into()
}
