//! Work feeds for the mining pool.
//!
//! A feed is wherever OPR hashes come from — in production an upstream
//! coordinator, here a synthetic generator that lets the whole engine run
//! end to end without one.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::tracing::prelude::*;

/// One round of work for the pool.
#[derive(Debug, Clone)]
pub struct OprJob {
    /// Block height identifying the job.
    pub job_id: i32,
    /// The work unit miners append nonces to.
    pub opr_hash: Vec<u8>,
    /// Acceptance bar for winners.
    pub min_difficulty: u64,
}

/// Source of mining jobs.
#[async_trait]
pub trait JobFeed: Send {
    /// The next job to mine, or `None` when the feed is shutting down.
    /// The first call should resolve promptly; later calls pace the rounds.
    async fn next_job(&mut self) -> Option<OprJob>;
}

/// Synthetic feed: a fresh random OPR hash every interval, heights counting
/// up from wherever the feed was started.
pub struct DummyFeed {
    job_id: i32,
    min_difficulty: u64,
    interval: Duration,
    shutdown: CancellationToken,
    started: bool,
}

impl DummyFeed {
    pub fn new(
        start_height: i32,
        min_difficulty: u64,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            job_id: start_height,
            min_difficulty,
            interval,
            shutdown,
            started: false,
        }
    }
}

#[async_trait]
impl JobFeed for DummyFeed {
    async fn next_job(&mut self) -> Option<OprJob> {
        if self.started {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.cancelled() => return None,
            }
        }
        self.started = true;

        self.job_id += 1;
        let opr_hash: [u8; 32] = rand::random();
        debug!(job_id = self.job_id, "synthesized job");
        Some(OprJob {
            job_id: self.job_id,
            opr_hash: opr_hash.to_vec(),
            min_difficulty: self.min_difficulty,
        })
    }
}
