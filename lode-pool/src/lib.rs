//! Mining-pool worker and reward-accounting engine.
//!
//! Two subsystems make up the core:
//!
//! - **Mining** ([`mining`]): a pool of worker threads that enumerate nonces
//!   over an OPR hash, score each attempt with the table hash in [`lxr`], and
//!   emit winners whose difficulty clears a configurable bar. Each worker is
//!   driven by typed commands over its own channel and owns all of its
//!   hot-path state; nonce spaces are partitioned by a per-worker prefix so
//!   workers never collide.
//! - **Accounting** ([`accounting`]): per-job aggregation of accepted shares
//!   per user, followed by a proportional payout with a pool fee, conserved
//!   rounding dust, and hash-rate estimates anchored on each user's best
//!   recent targets.
//!
//! The [`daemon`] module wires the two together behind a [`job_feed`] and is
//! what the `poold` binary runs. Upstream work coordination and payout
//! persistence are external collaborators; this crate only produces and
//! consumes their wire shapes.

pub mod accounting;
pub mod config;
pub mod daemon;
pub mod error;
pub mod job_feed;
pub mod lxr;
pub mod mining;
pub mod tracing;
pub mod types;

pub use error::{Error, Result};
