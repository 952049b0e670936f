//! Per-user ledger state

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// A single stake position: an amount and the time it was staked.
///
/// Immutable once created; only unstake processing reduces it. Stakes live
/// in a per-user stack (oldest first) and are consumed last-in-first-out,
/// mirroring the reference contract's unstake policy.
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Stake {
    /// Staked tokens (base units)
    pub amount: u128,

    /// Unix timestamp the stake was created at
    pub staked_at: i64,
}

/// Accounting ledger for one user.
///
/// Created lazily on the user's first stake and never deleted — a fully
/// unstaked user persists with an empty stack so their accrued
/// share-seconds stay in the audit output.
#[derive(
    BorshSerialize, BorshDeserialize, Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq,
)]
pub struct UserLedger {
    /// Active stakes, oldest first; unstakes pop from the back
    pub stakes: Vec<Stake>,

    /// Total staked balance as reported by the contract after the user's
    /// last event. Authoritative — never recomputed from `stakes`.
    pub total: u128,

    /// Timestamp of the user's last processed event (0 = never updated)
    pub last_update: i64,

    /// All-time share-seconds accumulator. Monotonically non-decreasing.
    pub share_seconds: u128,

    /// Share-seconds accrued inside the current query range
    pub share_seconds_in_range: u128,
}

impl UserLedger {
    /// Sum of active stake amounts in the stack.
    ///
    /// Normally equals `total`; a divergence means the event stream and the
    /// contract's reported totals disagree.
    pub fn staked_total(&self) -> u128 {
        self.stakes.iter().map(|s| s.amount).sum()
    }
}
