//! Protocol-wide constants

use alloy_primitives::Address;

/// Token address conventionally used for the chain's native asset in
/// free-balance columns and deposit parameters.
pub const CONVENTION_FOR_ETH_TOKEN_ADDRESS: Address = Address::ZERO;

/// Current schema version of persisted channel records.
pub const STATE_SCHEMA_VERSION: u64 = 1;
