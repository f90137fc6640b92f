//! Solidity interfaces of the channel contracts
//!
//! One `sol!` block per on-chain surface; the generated call structs are
//! the single source of calldata layout in this crate.

use alloy_primitives::U256;
use alloy_sol_types::sol;

sol! {
    /// App identity layout expected by the challenge registry.
    struct AppIdentity {
        uint256 channelNonce;
        address[] participants;
        address appDefinition;
        uint256 defaultTimeout;
    }

    /// Signed state update submitted to the registry on dispute.
    struct SignedStateHashUpdate {
        bytes32 appStateHash;
        uint256 versionNumber;
        uint256 timeout;
        bytes[] signatures;
    }

    /// Challenge registry entry point commitments target.
    function setState(AppIdentity identity, SignedStateHashUpdate req);

    /// Multisig wallet entry point.
    function execTransaction(
        address to,
        uint256 value,
        bytes data,
        uint8 operation,
        string domainName,
        string domainVersion,
        uint256 chainId,
        bytes32 domainSalt,
        uint256 nonce,
        bytes[] signatures
    );

    /// Outcome executor: settle the free balance after a dispute.
    function executeFreeBalanceOutcome(
        address challengeRegistry,
        bytes32 freeBalanceIdentityHash
    );

    /// Outcome executor: route an app's outcome through its interpreter.
    function executeAppOutcome(
        address challengeRegistry,
        bytes32 freeBalanceIdentityHash,
        bytes32 appIdentityHash,
        address interpreter,
        bytes interpreterParams
    );

    /// ERC20 transfer, used by withdrawal commitments.
    function transfer(address to, uint256 amount) returns (bool);
}

/// Convert the model identity into its on-chain layout.
pub(crate) fn sol_identity(identity: &offchan_types::AppIdentity) -> AppIdentity {
    AppIdentity {
        channelNonce: U256::from(identity.channel_nonce),
        participants: identity.participants.to_vec(),
        appDefinition: identity.app_definition,
        defaultTimeout: U256::from(identity.default_timeout),
    }
}
