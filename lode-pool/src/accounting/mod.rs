//! Share accounting: per-job aggregation of accepted work and proportional
//! reward settlement.
//!
//! A job accumulates accepted shares in a [`ShareMap`] until the coordinator
//! seals it; the sealed map is then the read-only input to
//! [`Payouts::settle`], which splits the reward between users, takes the pool
//! fee, and traps every rounding remainder in `dust` so the books always
//! balance to the block reward exactly.

mod payout;
mod share;

pub use payout::{cut, PayoutError, Payouts, Reward, UserPayout, ACCOUNTING_PRECISION};
pub use share::{insert_target, Share, ShareMap, ShareSum, TARGET_WINDOW};
