//! Unlock schedules gating distributable reward supply
//!
//! Each schedule releases a fixed token amount linearly over its duration.
//! A token may carry several schedules (successive grants); the total
//! distributable amount at a time is the sum across its schedules.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::error::GeyserError;
use crate::events::TokenId;
use crate::math::U256;

/// A single linear vesting schedule for one reward token.
/// Immutable after registration.
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UnlockSchedule {
    /// Tokens locked at the start of the schedule (base units)
    pub initial_locked: u128,

    /// Unix timestamp the schedule starts unlocking at
    pub start_time: i64,

    /// Unlock duration in seconds
    pub duration_seconds: u64,

    /// Unix timestamp the schedule is fully unlocked at, as reported by the
    /// contract. Carried for audit output; the unlock math uses
    /// `start_time + duration_seconds`.
    pub end_time: i64,
}

impl UnlockSchedule {
    /// Create a new schedule, rejecting zero durations up front (the unlock
    /// formula divides by the duration).
    pub fn new(
        token: &TokenId,
        initial_locked: u128,
        start_time: i64,
        duration_seconds: u64,
        end_time: i64,
    ) -> Result<Self, GeyserError> {
        if duration_seconds == 0 {
            return Err(GeyserError::InvalidSchedule {
                token: token.clone(),
                reason: "zero duration",
            });
        }
        Ok(Self {
            initial_locked,
            start_time,
            duration_seconds,
            end_time,
        })
    }

    /// Tokens unlocked by this schedule at time `t`:
    /// `min(initial_locked, floor(initial_locked * (t - start_time) / duration))`.
    ///
    /// A non-positive range duration (`t <= start_time`) unlocks nothing —
    /// clamped explicitly rather than allowed to go negative.
    pub fn unlocked_at(&self, t: i64) -> u128 {
        let range_duration = t.saturating_sub(self.start_time);
        if range_duration <= 0 {
            return 0;
        }
        // min taken in 256-bit space, so the clamped result always fits u128
        let unlocked = U256::from_u128(self.initial_locked) * U256::from(range_duration as u64)
            / U256::from(self.duration_seconds);
        unlocked
            .min(U256::from_u128(self.initial_locked))
            .to_u128()
            .unwrap_or(self.initial_locked)
    }
}
