use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// The complete error taxonomy surfaced by this crate.
///
/// Every public operation returns `Result<T, Error>`. Each variant carries
/// enough context to render the "class / operation / reason" message shape
/// described by the user-visible failure format.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error / {operation} / {reason}")]
    ConfigurationError { operation: String, reason: String },

    #[error("connection failed / {operation} / {reason}")]
    ConnectionFailed {
        operation: String,
        reason: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("invalid state / {operation} / {reason}")]
    InvalidState { operation: String, reason: String },

    #[error("overflow / {operation} / queue at capacity ({max_pending} pending)")]
    Overflow { operation: String, max_pending: usize },

    #[error("type mismatch / {operation} / field '{field}' expected {expected}, got {actual}")]
    TypeMismatch {
        operation: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("decode error / {operation} / {reason}")]
    DecodeError { operation: String, reason: String },

    #[error("driver error / {operation} / {reason}")]
    DriverError {
        backend: &'static str,
        operation: String,
        statement: String,
        reason: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl Error {
    pub fn configuration(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ConfigurationError {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_state(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidState {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn type_mismatch(
        operation: impl Into<String>,
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Error::TypeMismatch {
            operation: operation.into(),
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn decode(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::DecodeError {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn driver(
        backend: &'static str,
        operation: impl Into<String>,
        statement: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        let source = source.into();
        Error::DriverError {
            backend,
            operation: operation.into(),
            statement: statement.into(),
            reason: source.to_string(),
            source: Some(source),
        }
    }

    /// An extra, user-facing hint appended after the class/operation/reason
    /// triple, e.g. "(+ check mysql.connection_string)".
    pub fn help(&self) -> Option<&'static str> {
        match self {
            Error::ConfigurationError { .. } => Some("check the enabled backend's config keys"),
            Error::ConnectionFailed { .. } => Some("verify the backend is reachable"),
            Error::Overflow { .. } => Some("raise max_requests_pending or drain the queue"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::driver("sqlite", "execute", "", anyhow::Error::new(e))
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::driver("mysql", "execute", "", anyhow::Error::new(e))
    }
}

impl From<mongodb::error::Error> for Error {
    fn from(e: mongodb::error::Error) -> Self {
        Error::driver("mongo", "execute", "", anyhow::Error::new(e))
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::configuration("load", e.to_string())
    }
}

/// Suppresses user-visible messages that repeat within a short window, so a
/// reconnect storm doesn't flood the console with an identical line per
/// retry. Keyed on the rendered message text.
pub struct RateLimiter {
    window: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true the first time `message` is seen, and again once `window`
    /// has elapsed since the last time it passed; false otherwise.
    pub fn should_emit(&self, message: &str) -> bool {
        let mut seen = self.seen.lock().unwrap();
        let now = Instant::now();
        match seen.get(message) {
            Some(last) if now.duration_since(*last) < self.window => false,
            _ => {
                seen.insert(message.to_string(), now);
                true
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_repeats_within_window() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        assert!(limiter.should_emit("reconnecting"));
        assert!(!limiter.should_emit("reconnecting"));
        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.should_emit("reconnecting"));
    }

    #[test]
    fn distinct_messages_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        assert!(limiter.should_emit("a"));
        assert!(limiter.should_emit("b"));
    }

    #[test]
    fn error_message_shape() {
        let err = Error::invalid_state("disconnect", "already reconnecting");
        assert_eq!(
            err.to_string(),
            "invalid state / disconnect / already reconnecting"
        );
    }
}
