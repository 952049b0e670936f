//! Distribution calculator: per-token unlock totals and per-user claims
//!
//! Pure computation over finalized `GeyserAccount` state. Each user receives
//! `floor(token_amount * share_seconds_in_range / total_share_seconds_in_range)`
//! per token; floor division leaves a bounded residue ("dust") absorbed by
//! the default recipient downstream.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::GeyserError;
use crate::events::{TokenId, UserId};
use crate::geyser::GeyserAccount;
use crate::math::mul_div_floor;

/// Maximum rounding dust per token (base units). Dust at or beyond this
/// bound signals an accrual bug, not floor-division residue.
pub const DUST_TOLERANCE: u128 = 30_000;

/// Audit record of one user's share-second accumulators.
#[derive(
    BorshSerialize, BorshDeserialize, Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct UserShareMetadata {
    pub share_seconds: u128,
    pub share_seconds_in_range: u128,
}

/// Result of a distribution query, ready for the merkle-distribution
/// harness to serialize. Map-valued fields are ordered for deterministic
/// output.
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DistributionReport {
    /// user -> token -> claimable amount
    pub claims: BTreeMap<UserId, BTreeMap<TokenId, u128>>,

    /// token -> sum of claims across users
    pub totals: BTreeMap<TokenId, u128>,

    /// user -> share-second accumulators for audit
    pub metadata: BTreeMap<UserId, UserShareMetadata>,
}

/// Total tokens unlocked for `token` up to time `t`, summed across every
/// schedule registered for it.
pub fn distributed_for_token_at(
    geyser: &GeyserAccount,
    token: &TokenId,
    t: i64,
) -> Result<u128, GeyserError> {
    let mut total: u128 = 0;
    if let Some(schedules) = geyser.unlock_schedules.get(token) {
        for schedule in schedules {
            total = total
                .checked_add(schedule.unlocked_at(t))
                .ok_or(GeyserError::MathOverflow)?;
        }
    }
    Ok(total)
}

/// Tokens distributed per token in the half-open range `[start_time,
/// end_time)`.
///
/// Computed as `total(end) - total(start)` at the per-token aggregate level.
/// Schedules may overlap, so the subtraction happens after summing across
/// schedules, matching the reference contract's two-call pattern. Results
/// are also recorded into `total_distributions` for later cross-checks.
pub fn token_distributions_in_range(
    geyser: &mut GeyserAccount,
    start_time: i64,
    end_time: i64,
) -> Result<BTreeMap<TokenId, u128>, GeyserError> {
    let tokens = geyser.distribution_tokens.clone();
    let mut distributions = BTreeMap::new();
    for token in tokens {
        let at_end = distributed_for_token_at(geyser, &token, end_time)?;
        let at_start = distributed_for_token_at(geyser, &token, start_time)?;
        let amount = at_end.checked_sub(at_start).ok_or_else(|| {
            GeyserError::invariant(format!(
                "unlocked total for token {} decreased over [{}, {})",
                token, start_time, end_time
            ))
        })?;
        geyser.total_distributions.insert(token.clone(), amount);
        distributions.insert(token, amount);
    }
    Ok(distributions)
}

/// Tokens distributed per token from schedule inception up to `end_time`.
pub fn token_distributions_at(
    geyser: &mut GeyserAccount,
    end_time: i64,
) -> Result<BTreeMap<TokenId, u128>, GeyserError> {
    let tokens = geyser.distribution_tokens.clone();
    let mut distributions = BTreeMap::new();
    for token in tokens {
        let amount = distributed_for_token_at(geyser, &token, end_time)?;
        geyser.total_distributions.insert(token.clone(), amount);
        distributions.insert(token, amount);
    }
    Ok(distributions)
}

/// Split `token_distributions` across users proportionally to their
/// in-range share-seconds.
///
/// The geyser must be finalized (`finalize_range`) first. Users with zero
/// in-range share-seconds appear in the output with zero claims so the
/// audit metadata stays complete.
pub fn user_distributions(
    geyser: &GeyserAccount,
    token_distributions: &BTreeMap<TokenId, u128>,
) -> Result<DistributionReport, GeyserError> {
    // Tokens unlocked but nobody staked in range: a configuration error
    // upstream, not a zero distribution
    if geyser.total_share_seconds_in_range == 0 && !token_distributions.is_empty() {
        let token = token_distributions.keys().next().cloned().unwrap_or_default();
        return Err(GeyserError::DivisionByZero { token });
    }

    let mut claims: BTreeMap<UserId, BTreeMap<TokenId, u128>> = BTreeMap::new();
    let mut metadata: BTreeMap<UserId, UserShareMetadata> = BTreeMap::new();
    let mut share_seconds_used: u128 = 0;

    for (user, ledger) in &geyser.users {
        metadata.insert(
            user.clone(),
            UserShareMetadata {
                share_seconds: ledger.share_seconds,
                share_seconds_in_range: ledger.share_seconds_in_range,
            },
        );
        share_seconds_used = share_seconds_used
            .checked_add(ledger.share_seconds_in_range)
            .ok_or(GeyserError::MathOverflow)?;

        let mut user_claims = BTreeMap::new();
        for (token, amount) in token_distributions {
            let user_share = if ledger.share_seconds_in_range == 0 {
                0
            } else {
                mul_div_floor(
                    *amount,
                    ledger.share_seconds_in_range,
                    geyser.total_share_seconds_in_range,
                )?
            };
            user_claims.insert(token.clone(), user_share);
        }
        claims.insert(user.clone(), user_claims);
    }

    if share_seconds_used != geyser.total_share_seconds_in_range {
        return Err(GeyserError::invariant(format!(
            "[{}] share-seconds used {} != aggregate in-range total {}",
            geyser.key, share_seconds_used, geyser.total_share_seconds_in_range
        )));
    }

    let totals = token_totals(&claims)?;
    for (token, claimed) in &totals {
        let distributed = token_distributions.get(token).copied().unwrap_or(0);
        verify_claim_totals(token, distributed, *claimed)?;
        info!(
            "[{}] range={}h token={} distributed={} claimed={} dust={}",
            geyser.key,
            (geyser.end_time - geyser.start_time) / 3600,
            token,
            distributed,
            claimed,
            distributed - claimed
        );
    }

    Ok(DistributionReport {
        claims,
        totals,
        metadata,
    })
}

/// Per-token sums over a claims table.
pub fn token_totals(
    claims: &BTreeMap<UserId, BTreeMap<TokenId, u128>>,
) -> Result<BTreeMap<TokenId, u128>, GeyserError> {
    let mut totals: BTreeMap<TokenId, u128> = BTreeMap::new();
    for user_claims in claims.values() {
        for (token, amount) in user_claims {
            let entry = totals.entry(token.clone()).or_insert(0);
            *entry = entry
                .checked_add(*amount)
                .ok_or(GeyserError::MathOverflow)?;
        }
    }
    Ok(totals)
}

/// Claims for a token must never exceed its distribution, and the dust left
/// by floor division must stay under `DUST_TOLERANCE`.
fn verify_claim_totals(
    token: &TokenId,
    distributed: u128,
    claimed: u128,
) -> Result<(), GeyserError> {
    if claimed > distributed {
        return Err(GeyserError::invariant(format!(
            "claims for token {} exceed distribution: {} > {}",
            token, claimed, distributed
        )));
    }
    if distributed - claimed >= DUST_TOLERANCE {
        return Err(GeyserError::RoundingToleranceExceeded {
            token: token.clone(),
            distributed,
            claimed,
        });
    }
    Ok(())
}
