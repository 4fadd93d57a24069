//! Pool supervisor: spawns workers and fans commands out to them.

use std::thread;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::tracing::prelude::*;

use super::miner::{Command, Miner, Winner};
use super::stats::MinerStats;

struct MinerHandle {
    personal_id: u32,
    commands: mpsc::Sender<Command>,
    thread: thread::JoinHandle<()>,
}

/// A set of mining workers, one OS thread each.
///
/// Workers get personal ids 1..=N, so every worker carries a distinct nonce
/// prefix and the pool as a whole never produces a duplicate nonce. The
/// supervisor keeps one command sender per worker plus the shutdown token;
/// winners arrive on the single receiver handed back from [`MiningPool::spawn`].
pub struct MiningPool {
    pool_id: u32,
    miners: Vec<MinerHandle>,
    shutdown: CancellationToken,
}

impl MiningPool {
    /// Spawn the configured number of workers. Returns the supervisor and
    /// the shared winners channel.
    ///
    /// Workers start paused and hold no work until the first broadcast.
    pub fn spawn(
        config: &Config,
        shutdown: CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<Winner>)> {
        let (winner_tx, winner_rx) = mpsc::channel(config.winner_buffer);

        let mut miners = Vec::with_capacity(config.miners);
        for personal_id in 1..=config.miners as u32 {
            let (command_tx, command_rx) = mpsc::channel(config.command_buffer);
            let miner = Miner::new(
                config.pool_id,
                personal_id,
                command_rx,
                winner_tx.clone(),
                shutdown.clone(),
            );
            let thread = thread::Builder::new()
                .name(format!("miner-{personal_id}"))
                .spawn(move || miner.run())
                .map_err(Error::Io)?;
            miners.push(MinerHandle {
                personal_id,
                commands: command_tx,
                thread,
            });
        }
        info!(miners = miners.len(), pool_id = config.pool_id, "mining pool up");

        Ok((
            Self {
                pool_id: config.pool_id,
                miners,
                shutdown,
            },
            winner_rx,
        ))
    }

    /// Send every worker its own command, built per worker by `build`.
    ///
    /// Commands are not `Clone` (a stats reply handle is single-use), hence
    /// the closure. A worker whose inbox is gone is skipped with a warning;
    /// losing one worker must not wedge the rest of the pool.
    pub async fn broadcast_with(&self, mut build: impl FnMut() -> Command) {
        for miner in &self.miners {
            if miner.commands.send(build()).await.is_err() {
                warn!(miner = miner.personal_id, "worker inbox closed, skipping");
            }
        }
    }

    /// Rebase every worker onto a new work unit: install the OPR hash and
    /// acceptance bar, reset counters, and resume — atomically per worker.
    pub async fn start_job(&self, opr_hash: &[u8], minimum_difficulty: u64) {
        self.broadcast_with(|| {
            Command::batch()
                .new_opr_hash(opr_hash.to_vec())
                .minimum_accept(minimum_difficulty)
                .reset_records()
                .resume()
                .build()
        })
        .await;
    }

    pub async fn pause_all(&self) {
        self.broadcast_with(|| Command::Pause).await;
    }

    pub async fn resume_all(&self) {
        self.broadcast_with(|| Command::Resume).await;
    }

    /// Ask every worker for its stats block, waiting at most `wait` per
    /// pool. Workers that miss the deadline are simply absent from the
    /// result; a busy hash loop drains its inbox once per iteration, so
    /// misses mean a wedged worker, not a slow one.
    pub async fn collect_stats(&self, wait: Duration) -> Vec<MinerStats> {
        let mut replies = Vec::with_capacity(self.miners.len());
        for miner in &self.miners {
            let (reply_tx, reply_rx) = oneshot::channel();
            if miner.commands.send(Command::SubmitStats(reply_tx)).await.is_ok() {
                replies.push(reply_rx);
            }
        }

        let mut stats = Vec::with_capacity(replies.len());
        let deadline = tokio::time::Instant::now() + wait;
        for reply in replies {
            match tokio::time::timeout_at(deadline, reply).await {
                Ok(Ok(s)) => stats.push(s),
                Ok(Err(_)) | Err(_) => {}
            }
        }
        stats
    }

    /// Number of workers spawned.
    pub fn len(&self) -> usize {
        self.miners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.miners.is_empty()
    }

    /// Stop every worker and join its thread.
    ///
    /// Cancels the token (wakes hot loops) and drops the command senders
    /// (wakes paused workers blocked on their inbox), then joins. Workers
    /// exit within one loop iteration, so this returns promptly.
    pub fn shutdown(self) {
        self.shutdown.cancel();
        for miner in self.miners {
            drop(miner.commands);
            if miner.thread.join().is_err() {
                error!(miner = miner.personal_id, "worker thread panicked");
            }
        }
        debug!(pool_id = self.pool_id, "mining pool down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lxr;
    use tokio::time::timeout;

    fn test_config(miners: usize) -> Config {
        Config {
            miners,
            pool_id: 9,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn workers_share_pool_prefix_but_not_personal_ids() {
        lxr::init_for_tests();
        let shutdown = CancellationToken::new();
        let (pool, mut winners) =
            MiningPool::spawn(&test_config(2), shutdown).expect("spawn pool");
        assert_eq!(pool.len(), 2);

        pool.start_job(&[0x5a; 32], 0).await;

        // Read winners until both workers have shown up; every nonce must
        // carry the pool prefix and one of the two personal ids.
        let mut seen = std::collections::HashSet::new();
        while seen.len() < 2 {
            let winner = timeout(Duration::from_secs(60), winners.recv())
                .await
                .expect("one worker never contributed")
                .expect("winners channel open");
            let nonce = hex::decode(&winner.nonce).expect("hex nonce");
            assert_eq!(&nonce[..4], &9u32.to_be_bytes());
            assert!(nonce[4] == 1 || nonce[4] == 2);
            seen.insert(nonce[4]);
        }

        pool.shutdown();
    }

    #[tokio::test]
    async fn stats_come_back_from_every_worker() {
        lxr::init_for_tests();
        let shutdown = CancellationToken::new();
        let (pool, mut winners) =
            MiningPool::spawn(&test_config(2), shutdown).expect("spawn pool");

        pool.start_job(&[0x33; 32], 0).await;
        let _ = timeout(Duration::from_secs(30), winners.recv())
            .await
            .expect("no winner within bound");

        let stats = pool.collect_stats(Duration::from_secs(10)).await;
        assert_eq!(stats.len(), 2);
        let mut ids: Vec<u32> = stats.iter().map(|s| s.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
        // At least the worker behind the received winner has hashed.
        assert!(stats.iter().any(|s| s.total_hashes > 0));

        pool.shutdown();
    }

    #[tokio::test]
    async fn pause_all_quiesces_the_pool() {
        lxr::init_for_tests();
        let shutdown = CancellationToken::new();
        let (pool, mut winners) =
            MiningPool::spawn(&test_config(2), shutdown).expect("spawn pool");

        pool.start_job(&[0x44; 32], 0).await;
        let _ = timeout(Duration::from_secs(30), winners.recv())
            .await
            .expect("no winner within bound");

        pool.pause_all().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        while winners.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(winners.try_recv().is_err());

        pool.resume_all().await;
        assert!(timeout(Duration::from_secs(30), winners.recv())
            .await
            .expect("no winner after resume")
            .is_some());

        pool.shutdown();
    }
}
