//! Provide tracing, tailored to this daemon.
//!
//! Call [`init_journald_or_stdout`] once at startup to install a subscriber.
//! Everything else in the crate pulls `use crate::tracing::prelude::*` for
//! the level macros.

use std::fmt;

use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer as FmtWriter, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// Check whether stderr really is the systemd journal socket by comparing
/// the device and inode numbers from `JOURNAL_STREAM` against stderr's file
/// descriptor, per the systemd documentation. Plain env-var presence is not
/// enough: the stream may have been redirected since the variable was set.
#[cfg(target_os = "linux")]
fn stderr_is_journal_stream() -> bool {
    use std::os::unix::io::AsRawFd;

    let Ok(journal_stream) = std::env::var("JOURNAL_STREAM") else {
        return false;
    };
    let Some((dev, ino)) = journal_stream.split_once(':') else {
        return false;
    };
    let (Ok(expected_dev), Ok(expected_ino)) = (dev.parse::<u64>(), ino.parse::<u64>()) else {
        return false;
    };

    let fd = std::io::stderr().as_raw_fd();
    let mut stat: nix::libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { nix::libc::fstat(fd, &mut stat) } != 0 {
        return false;
    }
    stat.st_dev == expected_dev && stat.st_ino == expected_ino
}

/// Initialize logging: journald when running under systemd, stdout
/// otherwise.
pub fn init_journald_or_stdout() {
    #[cfg(target_os = "linux")]
    {
        if stderr_is_journal_stream() {
            match tracing_journald::layer() {
                Ok(layer) => {
                    tracing_subscriber::registry().with(layer).init();
                    return;
                }
                Err(e) => {
                    // Fall through to stdout; nothing is listening yet, so
                    // report the failure after init.
                    use_stdout();
                    warn!("journald unavailable ({e}), logging to stdout");
                    return;
                }
            }
        }
    }

    use_stdout();
}

// Log to stdout, filtering according to RUST_LOG with a default level of
// INFO rather than the subscriber's usual ERROR.
fn use_stdout() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTimer)
                .with_target(true),
        )
        .init();
}

// Timestamps in local time at second resolution, with the date — payout
// records in the log are read back days later.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut FmtWriter<'_>) -> fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        write!(
            w,
            "{}",
            now.format(time::macros::format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second]"
            ))
            .unwrap_or_default(),
        )
    }
}
