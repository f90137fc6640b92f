//! Core types for the offchan state-channels engine.
//!
//! This crate provides the channel data model shared by every layer of the
//! engine: participant identifiers, app identities, the state-channel and
//! app-instance values with their pure transitions, and the minimal
//! transaction shape handed to callers for on-chain submission.

#![deny(missing_docs)]

pub mod app_instance;
pub mod channel;
pub mod constants;
pub mod error;
pub mod free_balance;
pub mod identifier;
pub mod identity;
pub mod proposal;
pub mod transaction;

pub use app_instance::{AppInstance, InterpreterParams};
pub use channel::StateChannel;
pub use constants::CONVENTION_FOR_ETH_TOKEN_ADDRESS;
pub use error::ModelError;
pub use free_balance::{CoinTransfer, FreeBalanceApp, FreeBalanceState};
pub use identifier::PublicIdentifier;
pub use identity::AppIdentity;
pub use proposal::Proposal;
pub use transaction::{MinimalTransaction, Operation};
