use thiserror::Error;

use crate::events::{TokenId, UserId};

/// Errors raised while replaying events or computing distributions.
///
/// Every variant carries the state context needed to locate the offending
/// input. None of these are recoverable: replays are deterministic, so a
/// failed run is rerun from scratch after the inputs are fixed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeyserError {
    #[error(
        "unstake of {requested} at t={timestamp} exceeds tracked stake {available} for user {user}"
    )]
    InsufficientStake {
        user: UserId,
        requested: u128,
        available: u128,
        timestamp: i64,
    },

    #[error("invariant violation: {detail}")]
    InvariantViolation { detail: String },

    #[error("distribution for token {token} with zero eligible share-seconds in range")]
    DivisionByZero { token: TokenId },

    #[error(
        "rounding dust for token {token} exceeds tolerance: distributed {distributed}, claimed {claimed}"
    )]
    RoundingToleranceExceeded {
        token: TokenId,
        distributed: u128,
        claimed: u128,
    },

    #[error("invalid unlock schedule for token {token}: {reason}")]
    InvalidSchedule { token: TokenId, reason: &'static str },

    #[error("math overflow")]
    MathOverflow,
}

impl GeyserError {
    /// Shorthand for building an `InvariantViolation` from a formatted detail.
    pub(crate) fn invariant(detail: impl Into<String>) -> Self {
        GeyserError::InvariantViolation {
            detail: detail.into(),
        }
    }
}
