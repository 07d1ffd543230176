//! A thin, colored presentation layer over `tracing`.
//!
//! The library never installs a process-wide logger implicitly; the builder
//! (§4.11) calls [`init`] once with the level/color preference resolved from
//! configuration, mirroring the teacher's preference for an explicit
//! `tracing_subscriber` setup over a global mutable logger instance.

use std::time::Duration;

use colored::Colorize;
use tracing_subscriber::EnvFilter;

use crate::error::RateLimiter;

/// Installs a `tracing_subscriber` formatter at the given level.
///
/// Returns an error string instead of panicking if a subscriber is already
/// installed (harmless in tests, which may call this more than once).
pub fn init(level: &str, color: bool) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(color)
        .with_target(false)
        .try_init();
}

/// Formats a level label with color, for callers building their own
/// one-line summaries instead of going through a `tracing` subscriber
/// (e.g. the CLI/builder glue printing a short startup banner).
pub fn colorize_level(level: &str) -> String {
    match level.to_ascii_lowercase().as_str() {
        "error" => level.red().bold().to_string(),
        "warn" => level.yellow().bold().to_string(),
        "info" => level.green().to_string(),
        "debug" => level.blue().to_string(),
        "trace" => level.dimmed().to_string(),
        other => other.to_string(),
    }
}

/// Logs a warning through `tracing::warn!`, suppressing repeats of the exact
/// same message within `limiter`'s window. Used around reconnect attempts
/// and queue-overflow notices, both of which can otherwise repeat rapidly.
pub fn warn_ratelimited(limiter: &RateLimiter, message: &str) {
    if limiter.should_emit(message) {
        tracing::warn!("{message}");
    }
}

pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(5);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colorizes_known_levels() {
        assert!(colorize_level("error").contains("error"));
        assert!(colorize_level("unknown") == "unknown");
    }
}
