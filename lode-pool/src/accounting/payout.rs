//! Proportional reward settlement.

use std::time::Duration;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mining::difficulty::effective_hash_rate;

use super::share::{ShareMap, TARGET_WINDOW};

/// Decimal scale used when truncating proportions. The persisted schema pins
/// `decimal(20,8)`, so this is a crate constant rather than configuration.
pub const ACCOUNTING_PRECISION: u32 = 8;

/// Users must mine at least this long before their estimated hash rate
/// counts toward the pool aggregate; shorter windows are too noisy.
const HASHRATE_FLOOR: Duration = Duration::from_secs(20);

/// Settlement failures. These abort the affected job, never the pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayoutError {
    #[error("share map was not sealed before settlement")]
    UnsealedMap,

    #[error("pool difficulty is zero but {0} user(s) recorded shares")]
    ZeroPoolDifficulty(usize),
}

/// The reward issued for one job. Immutable once issued upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    /// Block height of the reward payout.
    pub job_id: i32,
    pub pool_reward: i64,

    /// Records in the winning set.
    pub winning: u32,
    /// Records in the graded set.
    pub graded: u32,
}

/// One user's slice of a settled job. `(job_id, user_id)` is the identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPayout {
    pub job_id: i32,
    pub user_id: String,
    pub user_difficulty: f64,
    pub total_submissions: u64,

    /// `user_difficulty / pool_difficulty`, truncated to
    /// [`ACCOUNTING_PRECISION`] decimal places.
    pub proportion: Decimal,
    pub payout: i64,

    /// Estimated hash rate in hashes per second.
    pub hashrate: f64,
}

/// The settled books for one job.
///
/// Invariant: `pool_fee + dust + Σ user_payouts.payout == reward.pool_reward`.
/// Truncating at every multiplication means the sum of payouts can only fall
/// short of the distributable amount; whatever is left lands in `dust`,
/// reported but not distributed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payouts {
    #[serde(flatten)]
    pub reward: Reward,

    pub pool_fee_rate: Decimal,
    pub pool_fee: i64,
    pub dust: i64,

    /// Copy of the sealed map's total difficulty.
    pub pool_difficulty: f64,
    /// Sum of estimated hash rates over users who mined long enough to
    /// produce a trustworthy estimate.
    pub total_hashrate: f64,

    pub user_payouts: Vec<UserPayout>,
}

impl Payouts {
    /// Split `reward` across the users in a sealed share map.
    ///
    /// The pool fee comes off the top (skipped entirely at a zero rate),
    /// then each user receives `floor(remaining × proportion)` where the
    /// proportion is truncated decimal arithmetic — never floating point, so
    /// conservation is exact and testable. Iteration order over the map
    /// affects nothing but the order of `user_payouts`.
    ///
    /// An empty map is a valid settlement: the fee is still taken and the
    /// whole remainder becomes dust.
    pub fn settle(
        reward: Reward,
        pool_fee_rate: Decimal,
        work: &ShareMap,
    ) -> Result<Self, PayoutError> {
        if !work.is_sealed() {
            return Err(PayoutError::UnsealedMap);
        }

        let pool_fee = if pool_fee_rate.is_zero() {
            0
        } else {
            cut(reward.pool_reward, pool_fee_rate)
        };
        let remaining = reward.pool_reward - pool_fee;
        let pool_difficulty = work.total_diff();

        let mut payouts = Self {
            reward,
            pool_fee_rate,
            pool_fee,
            dust: 0,
            pool_difficulty,
            total_hashrate: 0.0,
            user_payouts: Vec::with_capacity(work.sums().len()),
        };

        if work.sums().is_empty() {
            payouts.dust = remaining;
            return Ok(payouts);
        }

        let pool_diff_dec = Decimal::from_f64(pool_difficulty).unwrap_or(Decimal::ZERO);
        if pool_diff_dec.is_zero() {
            return Err(PayoutError::ZeroPoolDifficulty(work.sums().len()));
        }

        let mut total_payout: i64 = 0;
        for (user, sum) in work.sums() {
            let user_diff_dec = Decimal::from_f64(sum.total_difficulty).unwrap_or(Decimal::ZERO);
            let proportion = (user_diff_dec / pool_diff_dec).trunc_with_scale(ACCOUNTING_PRECISION);
            let payout = cut(remaining, proportion);

            // Anchor the estimate on the smallest of the user's top-k
            // targets over their observed mining window.
            let window = (sum.total_shares as usize).min(TARGET_WINDOW);
            let hashrate = if window == 0 {
                0.0
            } else {
                let anchor = sum.targets[window - 1];
                effective_hash_rate(anchor, window, sum.mining_duration().as_secs_f64())
            };

            payouts.user_payouts.push(UserPayout {
                job_id: payouts.reward.job_id,
                user_id: user.clone(),
                user_difficulty: sum.total_difficulty,
                total_submissions: sum.total_shares,
                proportion,
                payout,
                hashrate,
            });
            total_payout += payout;

            if sum.mining_duration() >= HASHRATE_FLOOR {
                payouts.total_hashrate += hashrate;
            }
        }

        payouts.dust = remaining - total_payout;
        Ok(payouts)
    }
}

/// `floor(total × prop)` under decimal semantics.
pub fn cut(total: i64, prop: Decimal) -> i64 {
    (Decimal::from(total) * prop).trunc().to_i64().unwrap_or(0)
}
