//! Daemon lifecycle management for poold.
//!
//! Wires the mining pool to a job feed and to share accounting: jobs rebase
//! the workers, winners are validated and recorded per job, and a job
//! closing seals its share map and settles the payout. The settled record is
//! logged as JSON for the persistence collaborator to pick up.

use std::time::Duration;

use tokio::signal::unix::{self, SignalKind};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::accounting::{Payouts, Reward, Share, ShareMap};
use crate::config::Config;
use crate::job_feed::{DummyFeed, JobFeed, OprJob};
use crate::lxr;
use crate::mining::difficulty::compute_difficulty;
use crate::mining::{MiningPool, Winner};
use crate::tracing::prelude::*;
use crate::types::HashRate;

/// User credited with the synthetic feed's work. A real deployment maps
/// miner ids to accounts through the upstream coordinator instead.
const LOCAL_USER: &str = "local";

/// The main daemon.
pub struct Daemon {
    config: Config,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Run the daemon until shutdown is requested.
    pub async fn run(self) -> anyhow::Result<()> {
        // The byte map build is the slow part of startup; do it before
        // anything concurrent wants to hash. A bad configuration here is
        // fatal by design.
        lxr::init()?;

        let (pool, winners) = MiningPool::spawn(&self.config, self.shutdown.clone())?;

        let feed = DummyFeed::new(
            0,
            self.config.min_difficulty,
            self.config.job_interval(),
            self.shutdown.clone(),
        );

        // The feed runs as its own task so that a busy winner stream can
        // never starve the job clock.
        let (job_tx, job_rx) = mpsc::channel(4);
        self.tracker.spawn(pump_jobs(feed, job_tx));

        self.tracker.spawn(coordinate(
            self.config.clone(),
            pool,
            winners,
            job_rx,
            self.shutdown.clone(),
        ));
        self.tracker.close();

        info!(miners = self.config.miners, "started");

        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }

        self.shutdown.cancel();
        self.tracker.wait().await;
        info!("exiting");

        Ok(())
    }
}

/// Forward jobs from the feed until it ends or nobody is listening.
async fn pump_jobs(mut feed: impl JobFeed, jobs: mpsc::Sender<OprJob>) {
    while let Some(job) = feed.next_job().await {
        if jobs.send(job).await.is_err() {
            break;
        }
    }
}

/// Drive jobs into the pool and winners into the books.
async fn coordinate(
    config: Config,
    pool: MiningPool,
    mut winners: mpsc::Receiver<Winner>,
    mut jobs: mpsc::Receiver<OprJob>,
    shutdown: CancellationToken,
) {
    let mut current: Option<(OprJob, ShareMap)> = None;
    let mut stats_tick = tokio::time::interval(Duration::from_secs(60));
    stats_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    stats_tick.tick().await; // the immediate first tick carries no data

    loop {
        tokio::select! {
            job = jobs.recv() => {
                let Some(job) = job else { break };
                if let Some((closed, map)) = current.take() {
                    settle_job(&config, &closed, map);
                }
                info!(job_id = job.job_id, min_difficulty = job.min_difficulty, "starting job");
                pool.start_job(&job.opr_hash, job.min_difficulty).await;
                current = Some((job, ShareMap::new()));
            }

            winner = winners.recv() => {
                let Some(winner) = winner else { break };
                if let Some((job, map)) = current.as_mut() {
                    record_winner(job, map, &winner);
                }
            }

            _ = stats_tick.tick() => {
                let stats = pool.collect_stats(Duration::from_millis(500)).await;
                let pool_rate: f64 = stats.iter().map(|s| f64::from(s.hashrate())).sum();
                info!(
                    workers = stats.len(),
                    hashrate = %HashRate(pool_rate),
                    "mining stats"
                );
            }

            _ = shutdown.cancelled() => break,
        }
    }

    if let Some((closed, map)) = current.take() {
        settle_job(&config, &closed, map);
    }
    pool.shutdown();
}

/// Validate a submission against the current job and record it.
///
/// Winners are rechecked from scratch — the hex must decode, the nonce must
/// belong to this job's work unit, and the claimed target must match a
/// recomputation. Anything that fails is a rejected share and is silently
/// not aggregated.
fn record_winner(job: &OprJob, map: &mut ShareMap, winner: &Winner) {
    let Ok(opr_hash) = hex::decode(&winner.opr_hash) else {
        debug!("rejecting winner with bad opr hex");
        return;
    };
    let Ok(nonce) = hex::decode(&winner.nonce) else {
        debug!("rejecting winner with bad nonce hex");
        return;
    };
    if opr_hash != job.opr_hash {
        // A worker that hadn't rebased yet; stale work is not this job's.
        debug!(job_id = job.job_id, "rejecting winner for stale work");
        return;
    }

    let target = compute_difficulty(&job.opr_hash, &nonce);
    let claimed = u64::from_str_radix(&winner.target, 16).unwrap_or(0);
    let accepted = target == claimed && target > job.min_difficulty;
    if !accepted {
        debug!(job_id = job.job_id, claimed, target, "rejecting winner");
        return;
    }

    let miner_id = nonce
        .get(4)
        .map(|id| format!("miner-{id}"))
        .unwrap_or_else(|| "miner-?".into());
    let share = Share {
        job_id: job.job_id,
        nonce,
        difficulty: target as f64,
        target,
        accepted,
        miner_id,
        user_id: LOCAL_USER.into(),
    };
    map.add_share(LOCAL_USER, &share);
}

/// Seal the closed job's books and settle the reward.
fn settle_job(config: &Config, job: &OprJob, mut map: ShareMap) {
    map.seal();
    let reward = Reward {
        job_id: job.job_id,
        pool_reward: config.block_reward,
        winning: 0,
        graded: 0,
    };

    match Payouts::settle(reward, config.pool_fee_rate, &map) {
        Ok(payouts) => match serde_json::to_string(&payouts) {
            Ok(record) => info!(
                job_id = job.job_id,
                hashrate = %HashRate(payouts.total_hashrate),
                payouts = %record,
                "job settled"
            ),
            Err(e) => error!(job_id = job.job_id, "payout record did not serialize: {e}"),
        },
        Err(e) => warn!(job_id = job.job_id, "settlement failed: {e}"),
    }
}
