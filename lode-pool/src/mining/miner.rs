//! Miner worker loop and its command protocol.
//!
//! A worker is a CPU-bound loop on its own OS thread. It owns every piece of
//! hot-path state (nonce counter, stats, current work, acceptance bar) and is
//! steered exclusively through typed commands on its inbox, so no locks exist
//! anywhere near the hash loop. Winners go out over a channel shared across
//! the pool; sends are non-blocking, and a winner that finds the outbox full
//! is dropped and logged rather than stalling the loop.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::tracing::prelude::*;

use super::difficulty::compute_difficulty;
use super::nonce::NonceIncrementer;
use super::stats::MinerStats;

/// Control message for one worker.
///
/// Commands never fail; a worker applies what it understands and carries on.
#[derive(Debug)]
pub enum Command {
    /// Install a new work unit. Leaves the nonce counter and stats alone.
    NewOprHash(Vec<u8>),

    /// Change the pool id half of the nonce prefix and reset the counter.
    NewNoncePrefix(u32),

    /// Reset the nonce counter and start a fresh stats window.
    ResetRecords,

    /// Set the minimum difficulty a hash must beat to become a winner.
    MinimumAccept(u64),

    /// Freeze the stats clock and ship a copy back on the reply handle.
    /// The send never blocks the worker; a dropped receiver loses the copy.
    SubmitStats(oneshot::Sender<MinerStats>),

    Pause,
    Resume,

    /// Apply the contained commands back to back, with no hash iteration
    /// interleaved. This is how a coordinator rebases a worker onto a new
    /// job atomically.
    Batch(Vec<Command>),
}

impl Command {
    /// Start building a [`Command::Batch`].
    pub fn batch() -> CommandBatch {
        CommandBatch::default()
    }
}

/// Fluent builder for [`Command::Batch`].
///
/// ```
/// use lode_pool::mining::Command;
///
/// let rebase = Command::batch()
///     .new_opr_hash(vec![0u8; 32])
///     .minimum_accept(1 << 40)
///     .reset_records()
///     .resume()
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct CommandBatch {
    commands: Vec<Command>,
}

impl CommandBatch {
    pub fn new_opr_hash(mut self, opr_hash: Vec<u8>) -> Self {
        self.commands.push(Command::NewOprHash(opr_hash));
        self
    }

    pub fn new_nonce_prefix(mut self, pool_id: u32) -> Self {
        self.commands.push(Command::NewNoncePrefix(pool_id));
        self
    }

    pub fn reset_records(mut self) -> Self {
        self.commands.push(Command::ResetRecords);
        self
    }

    pub fn minimum_accept(mut self, bar: u64) -> Self {
        self.commands.push(Command::MinimumAccept(bar));
        self
    }

    pub fn submit_stats(mut self, reply: oneshot::Sender<MinerStats>) -> Self {
        self.commands.push(Command::SubmitStats(reply));
        self
    }

    pub fn pause(mut self) -> Self {
        self.commands.push(Command::Pause);
        self
    }

    pub fn resume(mut self) -> Self {
        self.commands.push(Command::Resume);
        self
    }

    pub fn build(self) -> Command {
        Command::Batch(self.commands)
    }
}

/// A submission whose difficulty cleared the acceptance bar, in the wire
/// shape the coordinator consumes: lowercase hex, no prefix, and the target
/// printed with the minimum number of hex digits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Winner {
    pub opr_hash: String,
    pub nonce: String,
    pub target: String,
}

impl Winner {
    fn new(opr_hash: &[u8], nonce: &[u8], target: u64) -> Self {
        Self {
            opr_hash: hex::encode(opr_hash),
            nonce: hex::encode(nonce),
            target: format!("{target:x}"),
        }
    }
}

/// One mining worker.
///
/// Built paused with no work; the first inbox command wakes it. Run
/// [`Miner::run`] on a dedicated thread — the loop blocks the thread while
/// paused and monopolizes it while mining.
pub struct Miner {
    pool_id: u32,
    personal_id: u32,
    opr_hash: Vec<u8>,
    incrementer: NonceIncrementer,
    stats: MinerStats,
    minimum_difficulty: u64,
    paused: bool,
    commands: mpsc::Receiver<Command>,
    winners: mpsc::Sender<Winner>,
    shutdown: CancellationToken,
}

impl Miner {
    pub fn new(
        pool_id: u32,
        personal_id: u32,
        commands: mpsc::Receiver<Command>,
        winners: mpsc::Sender<Winner>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            pool_id,
            personal_id,
            opr_hash: Vec::new(),
            incrementer: NonceIncrementer::new(pool_id, personal_id),
            stats: MinerStats::new(personal_id),
            minimum_difficulty: 0,
            paused: true,
            commands,
            winners,
            shutdown,
        }
    }

    /// The worker loop. Returns when the cancel token fires or the inbox
    /// closes; both are clean exits.
    ///
    /// Iteration order: check cancellation, drain whatever commands are
    /// ready, fall back to paused if there is no work unit, wait on the
    /// inbox while paused, otherwise take one hash step.
    pub fn run(mut self) {
        // Born paused: nothing to do until the coordinator says so.
        match self.commands.blocking_recv() {
            Some(command) => self.handle_command(command),
            None => return,
        }

        loop {
            if self.shutdown.is_cancelled() {
                debug!(miner = self.personal_id, "cancelled, exiting");
                return;
            }

            while let Ok(command) = self.commands.try_recv() {
                self.handle_command(command);
            }

            if self.opr_hash.is_empty() {
                self.paused = true;
            }

            if self.paused {
                if !self.wait_for_resume() {
                    return;
                }
                continue;
            }

            self.incrementer.next_nonce();
            let difficulty = compute_difficulty(&self.opr_hash, self.incrementer.nonce());
            self.stats.record_hash(difficulty);

            if difficulty > self.minimum_difficulty {
                self.stats.record_submission();
                let winner = Winner::new(&self.opr_hash, self.incrementer.nonce(), difficulty);
                if self.winners.try_send(winner).is_err() {
                    // Full or closed outbox. Dropping is the documented
                    // policy; the outbox should be sized so this is rare.
                    trace!(miner = self.personal_id, "winner dropped");
                }
            }
        }
    }

    /// Block on the inbox until something clears the pause flag. Returns
    /// false when the worker should exit instead (cancel or closed inbox —
    /// the pool drops every command sender on shutdown precisely so paused
    /// workers wake up here).
    fn wait_for_resume(&mut self) -> bool {
        loop {
            if self.shutdown.is_cancelled() {
                return false;
            }
            match self.commands.blocking_recv() {
                Some(command) => {
                    self.handle_command(command);
                    if !self.paused {
                        return true;
                    }
                }
                None => return false,
            }
        }
    }

    fn reset_nonce(&mut self) {
        self.incrementer = NonceIncrementer::new(self.pool_id, self.personal_id);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Batch(commands) => {
                for command in commands {
                    self.handle_command(command);
                }
            }
            Command::NewOprHash(opr_hash) => self.opr_hash = opr_hash,
            Command::NewNoncePrefix(pool_id) => {
                self.pool_id = pool_id;
                self.reset_nonce();
            }
            Command::ResetRecords => {
                self.reset_nonce();
                self.stats = MinerStats::new(self.personal_id);
            }
            Command::MinimumAccept(bar) => self.minimum_difficulty = bar,
            Command::SubmitStats(reply) => {
                self.stats.stop = Some(SystemTime::now());
                let _ = reply.send(self.stats.clone());
            }
            Command::Pause => self.paused = true,
            Command::Resume => self.paused = false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lxr;
    use std::time::Duration;
    use tokio::time::timeout;

    const RECV_WAIT: Duration = Duration::from_secs(30);

    struct Harness {
        commands: mpsc::Sender<Command>,
        winners: mpsc::Receiver<Winner>,
        shutdown: CancellationToken,
        thread: std::thread::JoinHandle<()>,
    }

    fn spawn_miner(pool_id: u32, personal_id: u32) -> Harness {
        lxr::init_for_tests();
        let (command_tx, command_rx) = mpsc::channel(16);
        let (winner_tx, winner_rx) = mpsc::channel(1024);
        let shutdown = CancellationToken::new();
        let miner = Miner::new(
            pool_id,
            personal_id,
            command_rx,
            winner_tx,
            shutdown.clone(),
        );
        let thread = std::thread::spawn(move || miner.run());
        Harness {
            commands: command_tx,
            winners: winner_rx,
            shutdown,
            thread,
        }
    }

    impl Harness {
        fn stop(self) {
            self.shutdown.cancel();
            drop(self.commands);
            self.thread.join().expect("miner thread panicked");
        }
    }

    /// Ordering key for nonces: the counter grows by inserting a leading
    /// byte, so longer always means numerically larger.
    fn nonce_key(hex_nonce: &str) -> (usize, Vec<u8>) {
        let bytes = hex::decode(hex_nonce).expect("winner nonce is hex");
        (bytes.len(), bytes)
    }

    #[tokio::test]
    async fn starts_paused_and_produces_after_rebase() {
        let mut harness = spawn_miner(7, 1);
        let opr = vec![0xab; 32];

        harness
            .commands
            .send(
                Command::batch()
                    .new_opr_hash(opr.clone())
                    .minimum_accept(0)
                    .reset_records()
                    .resume()
                    .build(),
            )
            .await
            .expect("miner inbox open");

        let winner = timeout(RECV_WAIT, harness.winners.recv())
            .await
            .expect("no winner within bound")
            .expect("winners channel open");

        assert_eq!(winner.opr_hash, hex::encode(&opr));
        let nonce = hex::decode(&winner.nonce).expect("hex nonce");
        assert_eq!(&nonce[..5], &[0, 0, 0, 7, 1]);
        // Wire target equals a recomputation from the wire nonce.
        let recomputed = compute_difficulty(&opr, &nonce);
        assert_eq!(winner.target, format!("{recomputed:x}"));

        harness.stop();
    }

    #[tokio::test]
    async fn pause_stops_emission_and_resume_advances() {
        let mut harness = spawn_miner(1, 2);

        harness
            .commands
            .send(
                Command::batch()
                    .new_opr_hash(vec![0x11; 32])
                    .minimum_accept(0)
                    .reset_records()
                    .resume()
                    .build(),
            )
            .await
            .expect("miner inbox open");

        let first = timeout(RECV_WAIT, harness.winners.recv())
            .await
            .expect("no winner within bound")
            .expect("winners channel open");

        harness
            .commands
            .send(Command::Pause)
            .await
            .expect("miner inbox open");

        // Drain the backlog emitted before the pause landed, then confirm
        // silence.
        let mut last = nonce_key(&first.nonce);
        tokio::time::sleep(Duration::from_millis(200)).await;
        while let Ok(w) = harness.winners.try_recv() {
            let key = nonce_key(&w.nonce);
            assert!(key > last, "nonce order must be strictly increasing");
            last = key;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(harness.winners.try_recv().is_err());

        harness
            .commands
            .send(Command::Resume)
            .await
            .expect("miner inbox open");
        let resumed = timeout(RECV_WAIT, harness.winners.recv())
            .await
            .expect("no winner after resume")
            .expect("winners channel open");
        // No re-emission of the last pre-pause nonce.
        assert!(nonce_key(&resumed.nonce) > last);

        harness.stop();
    }

    #[tokio::test]
    async fn empty_opr_hash_pauses_mining() {
        let mut harness = spawn_miner(1, 3);

        // Resume without work: the worker must fall back to paused rather
        // than hash an empty unit.
        harness
            .commands
            .send(Command::batch().minimum_accept(0).resume().build())
            .await
            .expect("miner inbox open");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(harness.winners.try_recv().is_err());

        harness
            .commands
            .send(
                Command::batch()
                    .new_opr_hash(vec![0x42; 32])
                    .resume()
                    .build(),
            )
            .await
            .expect("miner inbox open");
        assert!(timeout(RECV_WAIT, harness.winners.recv())
            .await
            .expect("no winner within bound")
            .is_some());

        harness.stop();
    }

    #[tokio::test]
    async fn submit_stats_reports_progress() {
        let mut harness = spawn_miner(1, 4);

        harness
            .commands
            .send(
                Command::batch()
                    .new_opr_hash(vec![0x77; 32])
                    .minimum_accept(0)
                    .reset_records()
                    .resume()
                    .build(),
            )
            .await
            .expect("miner inbox open");
        let _ = timeout(RECV_WAIT, harness.winners.recv())
            .await
            .expect("no winner within bound");

        let (reply_tx, reply_rx) = oneshot::channel();
        harness
            .commands
            .send(Command::SubmitStats(reply_tx))
            .await
            .expect("miner inbox open");
        let stats = timeout(RECV_WAIT, reply_rx)
            .await
            .expect("no stats within bound")
            .expect("reply handle intact");

        assert_eq!(stats.id, 4);
        assert!(stats.total_hashes >= 1);
        assert!(stats.total_submissions >= 1);
        assert!(stats.best_difficulty > 0);
        assert!(stats.stop.is_some());

        harness.stop();
    }

    #[tokio::test]
    async fn high_bar_suppresses_submissions() {
        let mut harness = spawn_miner(1, 5);

        harness
            .commands
            .send(
                Command::batch()
                    .new_opr_hash(vec![0x55; 32])
                    .minimum_accept(u64::MAX)
                    .reset_records()
                    .resume()
                    .build(),
            )
            .await
            .expect("miner inbox open");
        tokio::time::sleep(Duration::from_millis(200)).await;
        // Nothing beats an impossible bar, but hashing still happened.
        assert!(harness.winners.try_recv().is_err());

        let (reply_tx, reply_rx) = oneshot::channel();
        harness
            .commands
            .send(Command::SubmitStats(reply_tx))
            .await
            .expect("miner inbox open");
        let stats = timeout(RECV_WAIT, reply_rx)
            .await
            .expect("no stats within bound")
            .expect("reply handle intact");
        assert!(stats.total_hashes > 0);
        assert_eq!(stats.total_submissions, 0);

        harness.stop();
    }

    #[test]
    fn winner_wire_shape() {
        let winner = Winner::new(&[0x00, 0xab, 0xcd], &[0, 0, 0, 1, 2, 9], 0xff00);
        assert_eq!(winner.opr_hash, "00abcd");
        assert_eq!(winner.nonce, "000000010209");
        assert_eq!(winner.target, "ff00");
    }
}
