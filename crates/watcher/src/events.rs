//! Typed dispute events of the challenge registry

use crate::error::WatcherError;
use crate::provider::RawLog;
use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::{sol, SolEvent};

sol! {
    /// A challenge was opened or answered on the registry.
    event ChallengeUpdated(
        bytes32 indexed identityHash,
        uint8 status,
        bytes32 appStateHash,
        uint256 versionNumber,
        uint256 finalizesAt
    );

    /// A state was progressed unilaterally with a signed action.
    event StateProgressed(
        bytes32 indexed identityHash,
        bytes action,
        uint256 versionNumber,
        uint256 timeout,
        address turnTaker,
        bytes signature
    );
}

/// Discriminant used by listener filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventTag {
    /// `ChallengeUpdated` events.
    ChallengeUpdated,
    /// `StateProgressed` events.
    StateProgressed,
}

/// A decoded registry event with its chain coordinates.
#[derive(Clone, Debug)]
pub struct ChainEvent {
    /// Chain the event was observed on.
    pub chain_id: u64,
    /// Block the event landed in.
    pub block_number: u64,
    /// The decoded event body.
    pub kind: ChainEventKind,
}

/// Decoded body of a registry event.
#[derive(Clone, Debug)]
pub enum ChainEventKind {
    /// A challenge was opened or answered.
    ChallengeUpdated {
        /// App the challenge names.
        identity_hash: B256,
        /// Registry status code.
        status: u8,
        /// State hash the challenge set.
        app_state_hash: B256,
        /// Version number the challenge set.
        version_number: u64,
        /// Block at which the challenge finalizes.
        finalizes_at: u64,
    },
    /// A state was progressed unilaterally.
    StateProgressed {
        /// App whose state progressed.
        identity_hash: B256,
        /// Action that was applied.
        action: Bytes,
        /// Resulting version number.
        version_number: u64,
        /// Challenge window of the resulting state.
        timeout: u64,
        /// Participant who took the action.
        turn_taker: Address,
        /// Their signature over the action.
        signature: Bytes,
    },
}

impl ChainEventKind {
    /// Filter discriminant of this event.
    pub fn tag(&self) -> EventTag {
        match self {
            ChainEventKind::ChallengeUpdated { .. } => EventTag::ChallengeUpdated,
            ChainEventKind::StateProgressed { .. } => EventTag::StateProgressed,
        }
    }

    /// The app the event names.
    pub fn identity_hash(&self) -> B256 {
        match self {
            ChainEventKind::ChallengeUpdated { identity_hash, .. } => *identity_hash,
            ChainEventKind::StateProgressed { identity_hash, .. } => *identity_hash,
        }
    }
}

fn to_u64(value: alloy_primitives::U256, field: &str) -> Result<u64, WatcherError> {
    u64::try_from(value).map_err(|_| WatcherError::Decode(format!("{field} exceeds u64")))
}

/// Decode a raw log against the registry's event signatures. Logs of
/// other events return `None`.
pub fn decode_log(log: &RawLog) -> Result<Option<ChainEventKind>, WatcherError> {
    let Some(topic0) = log.topics.first() else {
        return Ok(None);
    };
    if *topic0 == ChallengeUpdated::SIGNATURE_HASH {
        let decoded =
            ChallengeUpdated::decode_raw_log(log.topics.iter().copied(), &log.data, true)
                .map_err(|e| WatcherError::Decode(e.to_string()))?;
        Ok(Some(ChainEventKind::ChallengeUpdated {
            identity_hash: decoded.identityHash,
            status: decoded.status,
            app_state_hash: decoded.appStateHash,
            version_number: to_u64(decoded.versionNumber, "versionNumber")?,
            finalizes_at: to_u64(decoded.finalizesAt, "finalizesAt")?,
        }))
    } else if *topic0 == StateProgressed::SIGNATURE_HASH {
        let decoded = StateProgressed::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .map_err(|e| WatcherError::Decode(e.to_string()))?;
        Ok(Some(ChainEventKind::StateProgressed {
            identity_hash: decoded.identityHash,
            action: decoded.action,
            version_number: to_u64(decoded.versionNumber, "versionNumber")?,
            timeout: to_u64(decoded.timeout, "timeout")?,
            turn_taker: decoded.turnTaker,
            signature: decoded.signature,
        }))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use alloy_sol_types::SolEvent;

    pub(crate) fn challenge_log(identity_hash: B256, version: u64, block: u64) -> RawLog {
        let event = ChallengeUpdated {
            identityHash: identity_hash,
            status: 1,
            appStateHash: B256::repeat_byte(2),
            versionNumber: U256::from(version),
            finalizesAt: U256::from(100u64),
        };
        RawLog {
            address: Address::ZERO,
            topics: vec![ChallengeUpdated::SIGNATURE_HASH, identity_hash],
            data: event.encode_data().into(),
            block_number: block,
        }
    }

    #[test]
    fn test_decodes_challenge_updated() {
        let hash = B256::repeat_byte(7);
        let kind = decode_log(&challenge_log(hash, 3, 10)).unwrap().unwrap();
        match kind {
            ChainEventKind::ChallengeUpdated {
                identity_hash,
                status,
                version_number,
                ..
            } => {
                assert_eq!(identity_hash, hash);
                assert_eq!(status, 1);
                assert_eq!(version_number, 3);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_foreign_events_skipped() {
        let log = RawLog {
            address: Address::ZERO,
            topics: vec![B256::repeat_byte(0xee)],
            data: Bytes::new(),
            block_number: 1,
        };
        assert!(decode_log(&log).unwrap().is_none());
    }
}
