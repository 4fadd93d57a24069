//! Per-worker mining counters.

use std::time::SystemTime;

use crate::types::HashRate;

/// Running counters for one worker's active mining window.
///
/// A fresh block is installed by the `ResetRecords` command; `SubmitStats`
/// freezes `stop` and ships a copy out while the worker keeps accumulating.
#[derive(Debug, Clone)]
pub struct MinerStats {
    /// Personal id of the worker that produced these counters.
    pub id: u32,
    pub start: SystemTime,
    pub stop: Option<SystemTime>,
    pub total_hashes: u64,
    pub best_difficulty: u64,
    pub total_submissions: u64,
}

impl MinerStats {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            start: SystemTime::now(),
            stop: None,
            total_hashes: 0,
            best_difficulty: 0,
            total_submissions: 0,
        }
    }

    /// Count one hash attempt and keep the best difficulty seen.
    pub fn record_hash(&mut self, difficulty: u64) {
        self.total_hashes += 1;
        self.best_difficulty = self.best_difficulty.max(difficulty);
    }

    /// Count one winner pushed to the outbox.
    pub fn record_submission(&mut self) {
        self.total_submissions += 1;
    }

    /// Average rate over the window, up to `stop` if frozen, else up to now.
    pub fn hashrate(&self) -> HashRate {
        let end = self.stop.unwrap_or_else(SystemTime::now);
        let secs = end
            .duration_since(self.start)
            .unwrap_or_default()
            .as_secs_f64();
        if secs == 0.0 {
            return HashRate::default();
        }
        HashRate(self.total_hashes as f64 / secs)
    }
}
