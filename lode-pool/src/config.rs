//! Configuration for the pool daemon.
//!
//! Everything is environment-driven with defaults supplied in code; there is
//! deliberately no config file. `POOL_*` variables override individual
//! fields and are validated on load.

use std::env;
use std::thread;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Pool id, the u32 half of every worker's nonce prefix.
    pub pool_id: u32,

    /// Worker thread count. At most 255: the other half of the nonce prefix
    /// is a single personal-id byte.
    pub miners: usize,

    /// Pool cut taken off the top of each reward, in `[0, 1]`.
    pub pool_fee_rate: Decimal,

    /// Acceptance bar handed to workers with each job.
    pub min_difficulty: u64,

    /// Reward booked per settled job. Stands in for the upstream
    /// coordinator's reward notification.
    pub block_reward: i64,

    /// Seconds between synthetic jobs.
    pub job_interval_secs: u64,

    /// Depth of each worker's command inbox.
    pub command_buffer: usize,

    /// Depth of the shared winners channel. Sized generously: winner sends
    /// are non-blocking and a full channel drops.
    pub winner_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_id: 1,
            miners: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            pool_fee_rate: Decimal::new(1, 2), // 0.01
            // One winner per ~4096 hashes per worker.
            min_difficulty: u64::MAX - (1 << 52),
            block_reward: 200_000_000,
            job_interval_secs: 600,
            command_buffer: 16,
            winner_buffer: 4096,
        }
    }
}

impl Config {
    /// Load configuration from the environment over the defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = parse_env("POOL_ID")? {
            config.pool_id = v;
        }
        if let Some(v) = parse_env("POOL_MINERS")? {
            config.miners = v;
        }
        if let Some(v) = parse_env("POOL_FEE_RATE")? {
            config.pool_fee_rate = v;
        }
        if let Some(v) = parse_env("POOL_MIN_DIFFICULTY")? {
            config.min_difficulty = v;
        }
        if let Some(v) = parse_env("POOL_BLOCK_REWARD")? {
            config.block_reward = v;
        }
        if let Some(v) = parse_env("POOL_JOB_INTERVAL")? {
            config.job_interval_secs = v;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.miners == 0 || self.miners > 255 {
            return Err(Error::Config(format!(
                "miner count {} outside 1..=255 (the nonce prefix carries one id byte)",
                self.miners
            )));
        }
        if self.pool_fee_rate < Decimal::ZERO || self.pool_fee_rate > Decimal::ONE {
            return Err(Error::Config(format!(
                "pool fee rate {} outside [0, 1]",
                self.pool_fee_rate
            )));
        }
        if self.block_reward < 0 {
            return Err(Error::Config(format!(
                "block reward {} is negative",
                self.block_reward
            )));
        }
        Ok(())
    }

    pub fn job_interval(&self) -> Duration {
        Duration::from_secs(self.job_interval_secs)
    }
}

/// Parse an env var, distinguishing absent (None) from malformed (error).
fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name}={raw} did not parse"))),
        Err(_) => Ok(None),
    }
}
