//! Signature slotting by recovered address

use crate::error::CommitmentError;
use alloy_primitives::{Address, B256};
use offchan_crypto::RecoverableSignature;

/// Slot each signature into the position of the participant it recovers
/// to. Participants arrive pre-sorted ascending, so a filled slot array
/// is already in on-chain verification order.
pub(crate) fn slot_signatures(
    digest: B256,
    participants: &[Address; 2],
    slots: &mut [Option<RecoverableSignature>; 2],
    sigs: &[RecoverableSignature],
) -> Result<(), CommitmentError> {
    for sig in sigs {
        let recovered = sig.recover_address(digest)?;
        let idx = participants
            .iter()
            .position(|p| *p == recovered)
            .ok_or(CommitmentError::UnknownSigner(recovered))?;
        match slots[idx] {
            Some(existing) if existing != *sig => {
                return Err(CommitmentError::ConflictingSignature(recovered));
            }
            _ => slots[idx] = Some(*sig),
        }
    }
    Ok(())
}

/// Require both slots filled and return them in participant order.
pub(crate) fn ordered(
    slots: &[Option<RecoverableSignature>; 2],
) -> Result<[RecoverableSignature; 2], CommitmentError> {
    match (slots[0], slots[1]) {
        (Some(a), Some(b)) => Ok([a, b]),
        _ => Err(CommitmentError::MissingSignature),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offchan_crypto::{ChannelSigner, InMemorySigner};

    async fn sorted_signers() -> (InMemorySigner, InMemorySigner) {
        let a = InMemorySigner::from_seed(&[1u8; 32]).unwrap();
        let b = InMemorySigner::from_seed(&[2u8; 32]).unwrap();
        if a.signer_address() < b.signer_address() {
            (a, b)
        } else {
            (b, a)
        }
    }

    #[tokio::test]
    async fn test_slots_regardless_of_arrival_order() {
        let (lo, hi) = sorted_signers().await;
        let digest = B256::repeat_byte(3);
        let sig_lo = lo.sign_digest(digest).await.unwrap();
        let sig_hi = hi.sign_digest(digest).await.unwrap();
        let participants = [lo.signer_address(), hi.signer_address()];

        let mut slots = [None; 2];
        // Arrive in descending order; slots end up ascending anyway.
        slot_signatures(digest, &participants, &mut slots, &[sig_hi, sig_lo]).unwrap();
        let ordered = ordered(&slots).unwrap();
        assert_eq!(ordered[0].recover_address(digest).unwrap(), participants[0]);
        assert_eq!(ordered[1].recover_address(digest).unwrap(), participants[1]);
    }

    #[tokio::test]
    async fn test_rejects_stranger() {
        let (lo, hi) = sorted_signers().await;
        let stranger = InMemorySigner::from_seed(&[9u8; 32]).unwrap();
        let digest = B256::repeat_byte(4);
        let sig = stranger.sign_digest(digest).await.unwrap();
        let participants = [lo.signer_address(), hi.signer_address()];
        let mut slots = [None; 2];
        assert!(matches!(
            slot_signatures(digest, &participants, &mut slots, &[sig]),
            Err(CommitmentError::UnknownSigner(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_signature_detected() {
        let (lo, hi) = sorted_signers().await;
        let digest = B256::repeat_byte(5);
        let sig = lo.sign_digest(digest).await.unwrap();
        let participants = [lo.signer_address(), hi.signer_address()];
        let mut slots = [None; 2];
        slot_signatures(digest, &participants, &mut slots, &[sig]).unwrap();
        assert!(matches!(ordered(&slots), Err(CommitmentError::MissingSignature)));
    }
}
