//! Common error types for lode-pool.
//!
//! Module-specific failures carry their own enums ([`crate::lxr::HashInitError`],
//! [`crate::accounting::PayoutError`]); this module folds them into one crate
//! error for callers that don't care which subsystem failed.

use thiserror::Error;

/// Main error type for lode-pool operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from tokio or std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Hash engine initialization failures (fatal at startup)
    #[error("hash engine: {0}")]
    HashInit(#[from] crate::lxr::HashInitError),

    /// Payout settlement failures (abort the affected job only)
    #[error("payout: {0}")]
    Payout(#[from] crate::accounting::PayoutError),
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
