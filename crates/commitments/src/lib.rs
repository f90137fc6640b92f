//! Commitment builders for the offchan engine
//!
//! Every commitment is a pure encoder over channel state whose digest
//! must match, byte for byte, what the on-chain contracts would verify
//! during a dispute. Deviation makes commitments unverifiable exactly
//! when they are needed, so hashing lives here behind known-answer
//! tests and signature ordering is enforced at the builder boundary.

pub mod conditional;
mod contracts;
pub mod error;
pub mod multisig;
mod ordering;
pub mod set_state;
pub mod setup;
pub mod withdraw;

pub use conditional::ConditionalTransactionCommitment;
pub use error::CommitmentError;
pub use multisig::{derive_multisig_address, DomainParams, MultisigTransaction};
pub use set_state::SetStateCommitment;
pub use setup::SetupCommitment;
pub use withdraw::WithdrawCommitment;

use alloy_primitives::B256;
use offchan_crypto::RecoverableSignature;
use offchan_types::MinimalTransaction;

/// The contract every commitment builder implements.
pub trait Commitment {
    /// Canonical byte encoding of the commitment body (no signatures).
    fn encode(&self) -> Vec<u8>;

    /// The 32-byte digest participants sign.
    fn hash_to_sign(&self) -> B256;

    /// Attach one or both signatures, slotting each by the participant
    /// it recovers to. Unknown or conflicting signers are rejected;
    /// callers never order signatures themselves.
    fn add_signatures(&mut self, sigs: &[RecoverableSignature]) -> Result<(), CommitmentError>;

    /// The broadcast-ready transaction. Requires both signatures.
    fn signed_transaction(&self) -> Result<MinimalTransaction, CommitmentError>;
}
