//! External event-stream types supplied by the chain-reading layer

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// User address as reported by the event source (hex string upstream)
pub type UserId = String;

/// Reward token identifier (token contract address upstream)
pub type TokenId = String;

/// A single stake or unstake event from the reference contract's log.
///
/// Events for a single user must be submitted in non-decreasing `timestamp`
/// order; the caller sorts and merges the streams before replay. No
/// reordering or deduplication happens here.
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum GeyserEvent {
    Stake {
        user: UserId,
        /// Tokens staked (base units)
        amount: u128,
        /// Timestamp recorded on the stake itself
        staked_at: i64,
        /// Timestamp of the event
        timestamp: i64,
        /// User's total staked balance after this event, as reported by the
        /// contract. Stored verbatim as the authoritative total.
        user_total_after: u128,
    },
    Unstake {
        user: UserId,
        /// Tokens unstaked (base units)
        amount: u128,
        /// Timestamp of the event
        timestamp: i64,
        /// User's total staked balance after this event (authoritative)
        user_total_after: u128,
    },
}

impl GeyserEvent {
    /// Timestamp at which this event takes effect
    pub fn timestamp(&self) -> i64 {
        match self {
            GeyserEvent::Stake { timestamp, .. } => *timestamp,
            GeyserEvent::Unstake { timestamp, .. } => *timestamp,
        }
    }

    /// User the event belongs to
    pub fn user(&self) -> &UserId {
        match self {
            GeyserEvent::Stake { user, .. } => user,
            GeyserEvent::Unstake { user, .. } => user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = GeyserEvent::Stake {
            user: "0xabc".to_string(),
            amount: 1_000_000,
            staked_at: 1600000000,
            timestamp: 1600000000,
            user_total_after: 1_000_000,
        };
        let serialized = borsh::to_vec(&event).unwrap();
        let deserialized: GeyserEvent = GeyserEvent::try_from_slice(&serialized).unwrap();
        assert_eq!(deserialized, event);
        assert_eq!(deserialized.timestamp(), 1600000000);
        assert_eq!(deserialized.user(), "0xabc");
    }

    #[test]
    fn test_unstake_event_serialization() {
        let event = GeyserEvent::Unstake {
            user: "0xdef".to_string(),
            amount: 42,
            timestamp: 1600000100,
            user_total_after: 0,
        };
        let serialized = borsh::to_vec(&event).unwrap();
        let deserialized: GeyserEvent = GeyserEvent::try_from_slice(&serialized).unwrap();
        assert_eq!(deserialized, event);
    }
}
