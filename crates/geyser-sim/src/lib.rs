//! Geyser-sim: off-chain accounting replica of a token staking geyser
//!
//! Replays stake/unstake events against per-user ledgers, accumulates
//! time-weighted stake, and splits reward tokens released under per-token
//! unlock schedules. Used to validate the on-chain contract's accounting:
//! the contract's own event log and reported totals are the inputs, and the
//! claims table this crate produces feeds the merkle distribution.
//!
//! Accrual: `share_seconds += stake_amount × seconds_held` per stake
//! Unlock: `min(locked, floor(locked × (t - start) / duration))` per schedule
//! Claim: `floor(distributed × user_share_seconds_in_range / total_in_range)`
//!
//! Deterministic, single-threaded, pure computation — no chain access, no
//! signing, no I/O. Event acquisition and claim-file serialization live in
//! the driving harness.

pub mod distribution;
pub mod error;
pub mod events;
pub mod geyser;
pub mod math;
pub mod schedule;
pub mod state;

pub use distribution::{
    distributed_for_token_at, token_distributions_at, token_distributions_in_range, token_totals,
    user_distributions, DistributionReport, UserShareMetadata, DUST_TOLERANCE,
};
pub use error::GeyserError;
pub use events::{GeyserEvent, TokenId, UserId};
pub use geyser::GeyserAccount;
pub use schedule::UnlockSchedule;
pub use state::{Stake, UserLedger};
