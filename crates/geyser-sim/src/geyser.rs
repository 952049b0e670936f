//! The geyser aggregate: ledgers, schedules, and the event processor
//!
//! One `GeyserAccount` owns all per-user ledgers and unlock schedules for a
//! single staking pool. Stake and unstake events are replayed in timestamp
//! order (per user) and accrue share-seconds incrementally; at query time
//! the distribution calculator reads the finalized state.

use std::collections::BTreeMap;

use log::debug;

use crate::error::GeyserError;
use crate::events::{GeyserEvent, TokenId, UserId};
use crate::schedule::UnlockSchedule;
use crate::state::{Stake, UserLedger};

/// Accounting state for one staking pool.
///
/// Constructed once per pool, mutated only by the sequential event
/// processor. Safe to run in parallel only across independent instances:
/// the aggregate share-second counters require strictly sequential updates.
#[derive(Debug, Clone)]
pub struct GeyserAccount {
    /// Pool identifier, used to label log output
    pub key: String,

    /// Start of the active query range
    pub start_time: i64,

    /// End of the active query range
    pub end_time: i64,

    /// Per-user ledgers, created lazily on first stake and never deleted
    pub users: BTreeMap<UserId, UserLedger>,

    /// Registered unlock schedules per reward token, in registration order
    pub unlock_schedules: BTreeMap<TokenId, Vec<UnlockSchedule>>,

    /// Reward tokens this pool distributes
    pub distribution_tokens: Vec<TokenId>,

    /// All-time share-seconds summed over every user
    pub total_share_seconds: u128,

    /// In-range share-seconds summed over every user
    pub total_share_seconds_in_range: u128,

    /// Total distribution per token as last computed, kept for cross-checks
    pub total_distributions: BTreeMap<TokenId, u128>,
}

impl GeyserAccount {
    /// Create an empty aggregate for the pool identified by `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            start_time: 0,
            end_time: 0,
            users: BTreeMap::new(),
            unlock_schedules: BTreeMap::new(),
            distribution_tokens: Vec::new(),
            total_share_seconds: 0,
            total_share_seconds_in_range: 0,
            total_distributions: BTreeMap::new(),
        }
    }

    /// Set the query-range boundaries. Must happen before events are
    /// replayed, since in-range accrual gates on `start_time`.
    pub fn set_range(&mut self, start_time: i64, end_time: i64) {
        self.start_time = start_time;
        self.end_time = end_time;
    }

    /// Register a reward token for distribution.
    pub fn add_distribution_token(&mut self, token: TokenId) {
        if !self.distribution_tokens.contains(&token) {
            self.distribution_tokens.push(token);
        }
    }

    /// Register an unlock schedule for `token`. Argument order follows the
    /// contract's schedule tuple: (initial locked, end time, duration,
    /// start time).
    pub fn add_unlock_schedule(
        &mut self,
        token: &TokenId,
        initial_locked: u128,
        end_time: i64,
        duration_seconds: u64,
        start_time: i64,
    ) -> Result<(), GeyserError> {
        let schedule =
            UnlockSchedule::new(token, initial_locked, start_time, duration_seconds, end_time)?;
        debug!(
            "[{}] add_unlock_schedule token={} initial_locked={} start={} duration={}s",
            self.key, token, initial_locked, start_time, duration_seconds
        );
        self.unlock_schedules
            .entry(token.clone())
            .or_default()
            .push(schedule);
        Ok(())
    }

    /// Apply one event from the replay stream.
    pub fn apply(&mut self, event: &GeyserEvent) -> Result<(), GeyserError> {
        match event {
            GeyserEvent::Stake {
                user,
                amount,
                staked_at,
                timestamp,
                user_total_after,
            } => self.stake(user, *amount, *staked_at, *timestamp, *user_total_after),
            GeyserEvent::Unstake {
                user,
                amount,
                timestamp,
                user_total_after,
            } => self.unstake(user, *amount, *timestamp, *user_total_after),
        }
    }

    /// Process a stake event.
    ///
    /// Share-seconds accrue over the pre-stake stake set first, then the new
    /// stake is pushed and the ledger's `total` is overwritten with the
    /// contract-reported `user_total_after`.
    pub fn stake(
        &mut self,
        user: &UserId,
        amount: u128,
        staked_at: i64,
        timestamp: i64,
        user_total_after: u128,
    ) -> Result<(), GeyserError> {
        self.process_share_seconds(user, timestamp)?;

        let ledger = self.users.entry(user.clone()).or_default();
        ledger.stakes.push(Stake { amount, staked_at });
        ledger.last_update = timestamp;
        ledger.total = user_total_after;

        debug!(
            "[{}] stake user={} amount={} t={} total_after={}",
            self.key, user, amount, timestamp, user_total_after
        );
        Ok(())
    }

    /// Process an unstake event.
    ///
    /// Share-seconds accrue over the pre-unstake stake set first, then the
    /// amount is consumed from the most recent stake backward (LIFO). An
    /// amount the stack cannot cover means the input events are corrupt and
    /// the run is unrecoverable.
    pub fn unstake(
        &mut self,
        user: &UserId,
        amount: u128,
        timestamp: i64,
        user_total_after: u128,
    ) -> Result<(), GeyserError> {
        self.process_share_seconds(user, timestamp)?;

        let Some(ledger) = self.users.get_mut(user) else {
            return Err(GeyserError::InsufficientStake {
                user: user.clone(),
                requested: amount,
                available: 0,
                timestamp,
            });
        };

        let available = ledger.staked_total();
        if amount > available {
            return Err(GeyserError::InsufficientStake {
                user: user.clone(),
                requested: amount,
                available,
                timestamp,
            });
        }

        let mut remaining = amount;
        while remaining > 0 {
            // The pre-check above guarantees the stack covers `remaining`
            let Some(last) = ledger.stakes.last_mut() else {
                return Err(GeyserError::InsufficientStake {
                    user: user.clone(),
                    requested: amount,
                    available,
                    timestamp,
                });
            };
            if remaining >= last.amount {
                remaining -= last.amount;
                ledger.stakes.pop();
            } else {
                last.amount -= remaining;
                remaining = 0;
            }
        }

        ledger.last_update = timestamp;
        ledger.total = user_total_after;

        debug!(
            "[{}] unstake user={} amount={} t={} total_after={}",
            self.key, user, amount, timestamp, user_total_after
        );
        Ok(())
    }

    /// Accrue share-seconds for `user` from their last update to
    /// `timestamp`, over the user's current stake set.
    ///
    /// Per-user and aggregate accumulators are updated together; every
    /// fallible step happens before the first write, so no partial update is
    /// observable. Returns the all-time share-seconds added.
    ///
    /// A `timestamp` behind the user's last update is a timestamp
    /// regression and fails rather than clamping.
    pub fn process_share_seconds(
        &mut self,
        user: &UserId,
        timestamp: i64,
    ) -> Result<u128, GeyserError> {
        let start_time = self.start_time;
        let Some(ledger) = self.users.get_mut(user) else {
            // User has never staked
            return Ok(0);
        };

        let elapsed = timestamp - ledger.last_update;
        if elapsed == 0 {
            return Ok(0);
        }
        if elapsed < 0 {
            return Err(GeyserError::invariant(format!(
                "timestamp regression for user {}: last update {}, event at {}",
                user, ledger.last_update, timestamp
            )));
        }

        // Accrual inside the range starts at the cycle start or the last
        // update, whichever comes later
        let elapsed_in_range = timestamp - start_time.max(ledger.last_update);

        let mut to_add: u128 = 0;
        let mut to_add_in_range: u128 = 0;
        for stake in &ledger.stakes {
            let contribution = stake
                .amount
                .checked_mul(elapsed as u128)
                .ok_or(GeyserError::MathOverflow)?;
            to_add = to_add
                .checked_add(contribution)
                .ok_or(GeyserError::MathOverflow)?;

            if timestamp > start_time {
                let in_range = stake
                    .amount
                    .checked_mul(elapsed_in_range as u128)
                    .ok_or(GeyserError::MathOverflow)?;
                to_add_in_range = to_add_in_range
                    .checked_add(in_range)
                    .ok_or(GeyserError::MathOverflow)?;
            }
        }

        let user_all_time = ledger
            .share_seconds
            .checked_add(to_add)
            .ok_or(GeyserError::MathOverflow)?;
        let user_in_range = ledger
            .share_seconds_in_range
            .checked_add(to_add_in_range)
            .ok_or(GeyserError::MathOverflow)?;
        let total_all_time = self
            .total_share_seconds
            .checked_add(to_add)
            .ok_or(GeyserError::MathOverflow)?;
        let total_in_range = self
            .total_share_seconds_in_range
            .checked_add(to_add_in_range)
            .ok_or(GeyserError::MathOverflow)?;

        ledger.share_seconds = user_all_time;
        ledger.share_seconds_in_range = user_in_range;
        self.total_share_seconds = total_all_time;
        self.total_share_seconds_in_range = total_in_range;

        Ok(to_add)
    }

    /// Accrue share-seconds for every known user up to `end_time`.
    ///
    /// Captures the window tail after each user's last event, and whole-range
    /// holdings for users with no events inside the window. Idempotent: a
    /// second call no-ops because every ledger's `last_update` is already at
    /// `end_time`.
    pub fn finalize_range(&mut self) -> Result<(), GeyserError> {
        let end_time = self.end_time;
        let users: Vec<UserId> = self.users.keys().cloned().collect();
        for user in users {
            self.process_share_seconds(&user, end_time)?;
            if let Some(ledger) = self.users.get_mut(&user) {
                ledger.last_update = end_time;
            }
        }
        Ok(())
    }

    /// Cross-check the aggregate share-second counters against the per-user
    /// ledgers. A divergence means event misordering or an accrual bug and
    /// aborts the run.
    pub fn verify_totals(&self) -> Result<(), GeyserError> {
        let mut sum_all_time: u128 = 0;
        let mut sum_in_range: u128 = 0;
        for ledger in self.users.values() {
            sum_all_time = sum_all_time
                .checked_add(ledger.share_seconds)
                .ok_or(GeyserError::MathOverflow)?;
            sum_in_range = sum_in_range
                .checked_add(ledger.share_seconds_in_range)
                .ok_or(GeyserError::MathOverflow)?;
        }
        if sum_all_time != self.total_share_seconds {
            return Err(GeyserError::invariant(format!(
                "[{}] per-user share-seconds {} != aggregate {}",
                self.key, sum_all_time, self.total_share_seconds
            )));
        }
        if sum_in_range != self.total_share_seconds_in_range {
            return Err(GeyserError::invariant(format!(
                "[{}] per-user in-range share-seconds {} != aggregate {}",
                self.key, sum_in_range, self.total_share_seconds_in_range
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> UserId {
        name.to_string()
    }

    fn stake_amounts(geyser: &GeyserAccount, u: &str) -> Vec<u128> {
        geyser.users[u].stakes.iter().map(|s| s.amount).collect()
    }

    #[test]
    fn test_first_stake_accrues_nothing() {
        let mut geyser = GeyserAccount::new("test");
        geyser.set_range(0, 100);
        geyser.stake(&user("a"), 100, 10, 10, 100).unwrap();

        let ledger = &geyser.users["a"];
        assert_eq!(ledger.share_seconds, 0);
        assert_eq!(ledger.total, 100);
        assert_eq!(ledger.last_update, 10);
    }

    #[test]
    fn test_accrual_between_events() {
        let mut geyser = GeyserAccount::new("test");
        geyser.set_range(0, 100);
        geyser.stake(&user("a"), 100, 0, 0, 100).unwrap();
        geyser.stake(&user("a"), 50, 10, 10, 150).unwrap();

        // 100 tokens held for 10 seconds
        assert_eq!(geyser.users["a"].share_seconds, 1000);
        assert_eq!(geyser.users["a"].share_seconds_in_range, 1000);
        assert_eq!(geyser.total_share_seconds, 1000);
        assert_eq!(geyser.total_share_seconds_in_range, 1000);
    }

    #[test]
    fn test_in_range_accrual_gated_on_range_start() {
        let mut geyser = GeyserAccount::new("test");
        geyser.set_range(100, 200);

        // Staked 50 seconds before the range opens
        geyser.stake(&user("a"), 10, 50, 50, 10).unwrap();
        let added = geyser.process_share_seconds(&user("a"), 150).unwrap();

        // All-time covers the full 100 seconds, in-range only the 50 past
        // the range start
        assert_eq!(added, 1000);
        assert_eq!(geyser.users["a"].share_seconds, 1000);
        assert_eq!(geyser.users["a"].share_seconds_in_range, 500);
    }

    #[test]
    fn test_accrual_before_range_start_counts_all_time_only() {
        let mut geyser = GeyserAccount::new("test");
        geyser.set_range(100, 200);
        geyser.stake(&user("a"), 10, 0, 0, 10).unwrap();
        geyser.process_share_seconds(&user("a"), 80).unwrap();

        assert_eq!(geyser.users["a"].share_seconds, 800);
        assert_eq!(geyser.users["a"].share_seconds_in_range, 0);
        assert_eq!(geyser.total_share_seconds_in_range, 0);
    }

    #[test]
    fn test_unknown_user_accrues_nothing() {
        let mut geyser = GeyserAccount::new("test");
        geyser.set_range(0, 100);
        assert_eq!(geyser.process_share_seconds(&user("ghost"), 50).unwrap(), 0);
        assert!(geyser.users.is_empty());
    }

    #[test]
    fn test_lifo_unstake_removes_most_recent_first() {
        let mut geyser = GeyserAccount::new("test");
        geyser.set_range(0, 100);
        geyser.stake(&user("a"), 10, 1, 1, 10).unwrap();
        geyser.stake(&user("a"), 20, 2, 2, 30).unwrap();

        // 15 < 20, so the newest stake is reduced in place
        geyser.unstake(&user("a"), 15, 3, 15).unwrap();
        assert_eq!(stake_amounts(&geyser, "a"), vec![10, 5]);

        // Boundary: exactly the remaining newest stake pops it
        geyser.unstake(&user("a"), 5, 4, 10).unwrap();
        assert_eq!(stake_amounts(&geyser, "a"), vec![10]);
    }

    #[test]
    fn test_lifo_unstake_spans_stakes() {
        let mut geyser = GeyserAccount::new("test");
        geyser.set_range(0, 100);
        geyser.stake(&user("a"), 10, 1, 1, 10).unwrap();
        geyser.stake(&user("a"), 20, 2, 2, 30).unwrap();

        // 25 pops the 20-stake and eats 5 of the older one
        geyser.unstake(&user("a"), 25, 3, 5).unwrap();
        assert_eq!(stake_amounts(&geyser, "a"), vec![5]);
        assert_eq!(geyser.users["a"].staked_total(), 5);
    }

    #[test]
    fn test_full_unstake_leaves_empty_ledger() {
        let mut geyser = GeyserAccount::new("test");
        geyser.set_range(0, 100);
        geyser.stake(&user("a"), 10, 1, 1, 10).unwrap();
        geyser.unstake(&user("a"), 10, 2, 0).unwrap();

        // Ledger persists with zero stakes
        let ledger = &geyser.users["a"];
        assert!(ledger.stakes.is_empty());
        assert_eq!(ledger.total, 0);
        assert_eq!(ledger.share_seconds, 10);
    }

    #[test]
    fn test_restake_after_full_unstake() {
        let mut geyser = GeyserAccount::new("test");
        geyser.set_range(0, 100);
        geyser.stake(&user("a"), 10, 0, 0, 10).unwrap();
        geyser.unstake(&user("a"), 10, 10, 0).unwrap();
        geyser.stake(&user("a"), 40, 20, 20, 40).unwrap();
        geyser.finalize_range().unwrap();

        // 10*10 for the first position, nothing while out, 40*80 after
        assert_eq!(geyser.users["a"].share_seconds, 100 + 3200);
        geyser.verify_totals().unwrap();
    }

    #[test]
    fn test_unstake_exceeding_stake_fails() {
        let mut geyser = GeyserAccount::new("test");
        geyser.set_range(0, 100);
        geyser.stake(&user("a"), 10, 1, 1, 10).unwrap();

        let err = geyser.unstake(&user("a"), 11, 2, 0).unwrap_err();
        assert_eq!(
            err,
            GeyserError::InsufficientStake {
                user: user("a"),
                requested: 11,
                available: 10,
                timestamp: 2,
            }
        );
    }

    #[test]
    fn test_unstake_unknown_user_fails() {
        let mut geyser = GeyserAccount::new("test");
        geyser.set_range(0, 100);
        let err = geyser.unstake(&user("ghost"), 1, 2, 0).unwrap_err();
        assert_eq!(
            err,
            GeyserError::InsufficientStake {
                user: user("ghost"),
                requested: 1,
                available: 0,
                timestamp: 2,
            }
        );
    }

    #[test]
    fn test_timestamp_regression_fails() {
        let mut geyser = GeyserAccount::new("test");
        geyser.set_range(0, 100);
        geyser.stake(&user("a"), 10, 50, 50, 10).unwrap();

        let err = geyser.process_share_seconds(&user("a"), 40).unwrap_err();
        assert!(matches!(err, GeyserError::InvariantViolation { .. }));

        // Nothing accrued on the failed path
        assert_eq!(geyser.users["a"].share_seconds, 0);
        assert_eq!(geyser.total_share_seconds, 0);
    }

    #[test]
    fn test_share_seconds_monotonic_over_replay() {
        let mut geyser = GeyserAccount::new("test");
        geyser.set_range(0, 1000);
        let mut prev = 0u128;
        for t in [0i64, 100, 250, 400, 800] {
            geyser.stake(&user("a"), 7, t, t, 0).unwrap();
            assert!(geyser.users["a"].share_seconds >= prev);
            prev = geyser.users["a"].share_seconds;
        }
        geyser.unstake(&user("a"), 20, 900, 15).unwrap();
        assert!(geyser.users["a"].share_seconds >= prev);
    }

    #[test]
    fn test_finalize_captures_inactive_holder() {
        let mut geyser = GeyserAccount::new("test");
        geyser.set_range(100, 200);

        // Staked before the window, no events inside it
        geyser.stake(&user("a"), 100, 0, 0, 100).unwrap();
        geyser.finalize_range().unwrap();

        assert_eq!(geyser.users["a"].share_seconds, 100 * 200);
        assert_eq!(geyser.users["a"].share_seconds_in_range, 100 * 100);
        geyser.verify_totals().unwrap();
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut geyser = GeyserAccount::new("test");
        geyser.set_range(0, 100);
        geyser.stake(&user("a"), 100, 0, 0, 100).unwrap();
        geyser.finalize_range().unwrap();
        let after_first = geyser.users["a"].share_seconds_in_range;
        let total_after_first = geyser.total_share_seconds_in_range;

        geyser.finalize_range().unwrap();
        assert_eq!(geyser.users["a"].share_seconds_in_range, after_first);
        assert_eq!(geyser.total_share_seconds_in_range, total_after_first);
    }

    #[test]
    fn test_verify_totals_detects_divergence() {
        let mut geyser = GeyserAccount::new("test");
        geyser.set_range(0, 100);
        geyser.stake(&user("a"), 100, 0, 0, 100).unwrap();
        geyser.finalize_range().unwrap();
        geyser.verify_totals().unwrap();

        geyser.total_share_seconds += 1;
        let err = geyser.verify_totals().unwrap_err();
        assert!(matches!(err, GeyserError::InvariantViolation { .. }));
    }

    #[test]
    fn test_apply_dispatches_events() {
        let mut geyser = GeyserAccount::new("test");
        geyser.set_range(0, 100);
        let events = [
            GeyserEvent::Stake {
                user: user("a"),
                amount: 10,
                staked_at: 0,
                timestamp: 0,
                user_total_after: 10,
            },
            GeyserEvent::Unstake {
                user: user("a"),
                amount: 4,
                timestamp: 50,
                user_total_after: 6,
            },
        ];
        for event in &events {
            geyser.apply(event).unwrap();
        }
        assert_eq!(stake_amounts(&geyser, "a"), vec![6]);
        assert_eq!(geyser.users["a"].share_seconds, 500);
    }

    #[test]
    fn test_distribution_token_registration_dedupes() {
        let mut geyser = GeyserAccount::new("test");
        geyser.add_distribution_token("tok".to_string());
        geyser.add_distribution_token("tok".to_string());
        assert_eq!(geyser.distribution_tokens.len(), 1);
    }
}
