//! Protocol runner and engine surface for offchan state channels
//!
//! The engine coordinates two counterparties operating a multisignature
//! escrow: it negotiates and signs off-chain commitments through
//! deterministic two-round protocols, serializes protocol execution per
//! channel, and persists every outcome through a transactional store
//! boundary. On-chain settlement only happens when a caller broadcasts
//! one of the commitments this engine produces.

pub mod bus;
pub mod config;
mod engine;
pub mod error;
pub mod evm;
pub mod locks;
pub mod messages;
pub mod middleware;
mod protocol;

pub use bus::MessageBus;
pub use config::{EngineConfig, NetworkContext};
pub use engine::{Engine, EngineEvent, ProposeInstallRequest};
pub use error::EngineError;
pub use evm::{compute_outcome, compute_state_transition, EvmCaller};
pub use messages::{
    CustomData, DepositParams, InstallParams, ProposeParams, ProtocolEnvelope, ProtocolName,
    ProtocolParams, SetupParams, TakeActionParams, UninstallParams, UpdateParams, WithdrawParams,
    INITIATOR_SEQ, RESPONDER_SEQ,
};
pub use middleware::{ProtocolValidator, TurnBasedValidator, ValidationContext, ValidatorRegistry};
