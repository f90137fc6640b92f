//! Minimal transaction shape handed to callers for broadcast

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// A fully-formed transaction ready for submission by an external
/// provider: the engine never broadcasts, it only builds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimalTransaction {
    /// Destination contract or account.
    pub to: Address,
    /// Native value carried by the call.
    pub value: U256,
    /// ABI-encoded calldata.
    pub data: Bytes,
}

/// Multisig call operation discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Plain `CALL`.
    Call,
    /// `DELEGATECALL` into a library-style target.
    DelegateCall,
}

impl Operation {
    /// The `uint8` the multisig contract expects.
    pub fn as_u8(self) -> u8 {
        match self {
            Operation::Call => 0,
            Operation::DelegateCall => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_discriminants() {
        assert_eq!(Operation::Call.as_u8(), 0);
        assert_eq!(Operation::DelegateCall.as_u8(), 1);
    }
}
