//! The external configuration component (C10) is consumed, not built, by
//! this crate: a hierarchical, dot-path addressed key/value store with
//! type-coerced accessors. [`Section`] is the narrow trait the rest of the
//! crate depends on; [`ConfigSection`] is the concrete adapter over the
//! `config` crate so callers can hand the builder a `config::Config` built
//! however they like (file, environment, in-memory map).

use crate::error::{Error, Result};

/// A dot-path addressed, type-coerced view over configuration state.
///
/// Implementors decide how paths like `"mysql.connection_string"` resolve;
/// this crate never performs file I/O itself (that's explicitly out of
/// scope, per the purpose statement).
pub trait Section {
    fn get_bool(&self, path: &str) -> Option<bool>;
    fn get_string(&self, path: &str) -> Option<String>;
    fn get_i64(&self, path: &str) -> Option<i64>;

    fn get_bool_or(&self, path: &str, default: bool) -> bool {
        self.get_bool(path).unwrap_or(default)
    }

    fn get_string_or(&self, path: &str, default: &str) -> String {
        self.get_string(path).unwrap_or_else(|| default.to_string())
    }

    fn get_i64_or(&self, path: &str, default: i64) -> i64 {
        self.get_i64(path).unwrap_or(default)
    }

    fn require_string(&self, path: &str) -> Result<String> {
        self.get_string(path).ok_or_else(|| {
            Error::configuration("load", format!("missing required key '{path}'"))
        })
    }
}

/// Adapter binding [`Section`] to the `config` crate's [`config::Config`].
pub struct ConfigSection(pub config::Config);

impl ConfigSection {
    pub fn new(inner: config::Config) -> Self {
        Self(inner)
    }

    /// Builds a `ConfigSection` from an in-memory map, convenient for tests
    /// that don't want to stand up a config file.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (&'static str, config::Value)>) -> Result<Self> {
        let mut builder = config::Config::builder();
        for (key, value) in pairs {
            builder = builder
                .set_override(key, value)
                .map_err(|e| Error::configuration("load", e.to_string()))?;
        }
        Ok(Self(builder.build().map_err(|e| {
            Error::configuration("load", e.to_string())
        })?))
    }
}

impl Section for ConfigSection {
    fn get_bool(&self, path: &str) -> Option<bool> {
        self.0.get_bool(path).ok()
    }

    fn get_string(&self, path: &str) -> Option<String> {
        self.0.get_string(path).ok()
    }

    fn get_i64(&self, path: &str) -> Option<i64> {
        self.0.get_int(path).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_dot_path_keys_with_defaults() {
        let section = ConfigSection::from_pairs([
            ("sqlite.enabled", true.into()),
            ("sqlite.path", "/tmp/a.db".into()),
            ("max_requests_pending", 250i64.into()),
        ])
        .unwrap();

        assert_eq!(section.get_bool("sqlite.enabled"), Some(true));
        assert_eq!(section.get_string("sqlite.path").as_deref(), Some("/tmp/a.db"));
        assert_eq!(section.get_i64_or("max_requests_pending", 500), 250);
        assert_eq!(section.get_i64_or("time_between_requests_millis", 500), 500);
        assert!(section.get_bool("mysql.enabled").is_none());
    }

    #[test]
    fn require_string_fails_when_absent() {
        let section = ConfigSection::from_pairs([]).unwrap();
        assert!(section.require_string("mysql.connection_string").is_err());
    }
}
