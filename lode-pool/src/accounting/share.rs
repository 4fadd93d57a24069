//! Accepted-share aggregation per job.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// How many targets each user keeps per job: the 20 best, in descending
/// order. Bounds memory per user and anchors hash-rate estimation on the
/// best recent work.
pub const TARGET_WINDOW: usize = 20;

/// An accepted unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Share {
    /// Block height identifying the job.
    pub job_id: i32,
    /// Nonce the miner submitted.
    pub nonce: Vec<u8>,
    /// Difficulty as a float, for summing.
    pub difficulty: f64,
    /// The same eight hash bytes as an integer, for ranking.
    pub target: u64,
    /// Rejected shares are never aggregated.
    pub accepted: bool,
    /// Device that submitted the share.
    pub miner_id: String,
    /// Account that earns the payout.
    pub user_id: String,
}

/// Aggregate of one user's accepted shares within one job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShareSum {
    pub total_difficulty: f64,
    pub total_shares: u64,

    /// Set once, by the first accepted share.
    pub first_share: Option<SystemTime>,
    /// Advances with every accepted share.
    pub last_share: Option<SystemTime>,

    /// The highest observed targets, descending; slots past
    /// `min(total_shares, TARGET_WINDOW)` are untouched zeros.
    pub targets: [u64; TARGET_WINDOW],
}

impl ShareSum {
    fn add_share_at(&mut self, share: &Share, at: SystemTime) {
        if self.first_share.is_none() {
            self.first_share = Some(at);
        }
        self.last_share = Some(at);

        self.total_difficulty += share.difficulty;
        self.total_shares += 1;
        insert_target(share.target, &mut self.targets, self.total_shares);
    }

    /// Wall-clock span from the first to the last accepted share. Zero
    /// until two shares exist (or if the clock stepped backwards between
    /// them).
    pub fn mining_duration(&self) -> Duration {
        match (self.first_share, self.last_share) {
            (Some(first), Some(last)) => last.duration_since(first).unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }
}

/// Rank `t` into the descending target ring.
///
/// Only the first `min(total_shares, TARGET_WINDOW)` slots hold real values.
/// The insertion point is the first slot strictly smaller than `t` — equal
/// targets therefore insert ahead of prior equals, which no downstream
/// metric observes. A full ring discards `t` when nothing is smaller;
/// otherwise the tail shifts right, dropping the old last slot.
pub fn insert_target(t: u64, targets: &mut [u64; TARGET_WINDOW], total_shares: u64) {
    let filled = (total_shares as usize).min(TARGET_WINDOW);
    let index = targets[..filled].partition_point(|&existing| existing >= t);
    if index == TARGET_WINDOW {
        return;
    }
    targets.copy_within(index..TARGET_WINDOW - 1, index + 1);
    targets[index] = t;
}

/// Per-job share aggregation, keyed by user.
///
/// Owned and mutated by a single coordinator task; workers never touch it.
/// Once sealed it only shrinks to read-only use by the payout calculator.
#[derive(Debug, Default)]
pub struct ShareMap {
    sealed: bool,
    total_diff: f64,
    sums: HashMap<String, ShareSum>,
}

impl ShareMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop accepting shares. Idempotent.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Sum of difficulties over every accepted share in the job.
    pub fn total_diff(&self) -> f64 {
        self.total_diff
    }

    pub fn sums(&self) -> &HashMap<String, ShareSum> {
        &self.sums
    }

    /// Record an accepted share for `user`. A no-op after sealing.
    pub fn add_share(&mut self, user: &str, share: &Share) {
        self.add_share_at(user, share, SystemTime::now());
    }

    /// [`ShareMap::add_share`] with an explicit timestamp, for callers that
    /// need a deterministic clock.
    pub fn add_share_at(&mut self, user: &str, share: &Share, at: SystemTime) {
        if self.sealed {
            return;
        }
        self.total_diff += share.difficulty;
        self.sums
            .entry(user.to_string())
            .or_default()
            .add_share_at(share, at);
    }
}
