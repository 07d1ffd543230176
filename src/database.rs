//! The database façade and its builder (C13): the single entry point that
//! interprets configuration, picks a driver, and wires the queue and
//! logging façade together. Everything downstream (the table façade)
//! operates on already-resolved Rust values.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::mongo::{MongoConfig, MongoDriver};
use crate::backend::mysql::{MysqlConfig, MysqlDriver};
use crate::backend::sqlite::SqliteDriver;
use crate::backend::Driver;
use crate::config::Section;
use crate::connection::{ConnectionState, ReconnectPolicy};
use crate::error::{Error, RateLimiter, Result};
use crate::logging;
use crate::queue::{QueueConfig, RequestQueue};

/// A live handle to one backend. Cheap to clone — every clone shares the
/// same driver instance and request queue.
#[derive(Clone)]
pub struct Database {
    driver: Arc<dyn Driver>,
    queue: RequestQueue,
    reconnect_cooldown: Duration,
    /// Parsed per §6 but never acted on — see the SPEC_FULL §9 resolution
    /// for `should_reconnect_every_cycle`.
    pub should_reconnect_every_cycle: bool,
}

impl Database {
    pub fn backend(&self) -> crate::types::Backend {
        self.driver.backend()
    }

    pub fn status(&self) -> ConnectionState {
        self.driver.state().status()
    }

    pub fn is_connected(&self) -> bool {
        self.driver.state().is_connected()
    }

    /// Opens the driver's native handle (§4.5, `connect-async`).
    pub async fn connect(&self) -> Result<()> {
        self.driver.open().await
    }

    /// Closes the native handle and, if `reconnect`, begins a new connect
    /// attempt in the background (§4.5, `disconnect-async`).
    pub async fn disconnect(&self, reconnect: bool) -> Result<()> {
        let driver_close = Arc::clone(&self.driver);
        let driver_open = Arc::clone(&self.driver);
        self.driver
            .state_arc()
            .disconnect_async(
                move || {
                    let driver = driver_close;
                    async move { driver.close().await }
                },
                reconnect,
                move || {
                    let driver = Arc::clone(&driver_open);
                    async move { driver.open().await }
                },
            )
            .await
    }

    pub async fn drop_database(&self) -> Result<()> {
        self.driver.drop_database().await
    }

    pub(crate) fn driver(&self) -> Arc<dyn Driver> {
        Arc::clone(&self.driver)
    }

    pub(crate) fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub(crate) fn reconnect_wait(&self) -> Duration {
        self.reconnect_cooldown * 4
    }
}

/// Reads the builder configuration of §6 from a [`Section`] and assembles a
/// [`Database`]. The only place in the crate that interprets configuration.
pub struct DatabaseBuilder;

impl DatabaseBuilder {
    pub async fn build(section: &dyn Section) -> Result<Database> {
        let sqlite_enabled = section.get_bool_or("sqlite.enabled", false);
        let mysql_enabled = section.get_bool_or("mysql.enabled", false);
        let mongo_enabled = section.get_bool_or("mongo.enabled", false);

        let enabled_count = [sqlite_enabled, mysql_enabled, mongo_enabled]
            .iter()
            .filter(|enabled| **enabled)
            .count();
        if enabled_count != 1 {
            return Err(Error::configuration(
                "build",
                format!("exactly one backend must be enabled, found {enabled_count}"),
            ));
        }

        let will_reconnect = section.get_bool_or("will_reconnect", false);
        let reconnect_cooldown_millis = section.get_i64_or("reconnect_cooldown_millis", 500);
        let reconnect_cooldown = Duration::from_millis(reconnect_cooldown_millis.max(0) as u64);
        let reconnect = ReconnectPolicy {
            will_reconnect,
            cooldown: reconnect_cooldown,
        };

        let time_between_requests =
            Duration::from_millis(section.get_i64_or("time_between_requests_millis", 500).max(0) as u64);
        let max_pending = section.get_i64_or("max_requests_pending", 500).max(1) as usize;
        let queue_config = QueueConfig {
            time_between_requests,
            max_pending,
        };

        let rate_limiter = Arc::new(RateLimiter::default());

        let driver: Arc<dyn Driver> = if sqlite_enabled {
            let path = section.require_string("sqlite.path")?;
            Arc::new(SqliteDriver::new(path, reconnect, Arc::clone(&rate_limiter)))
        } else if mysql_enabled {
            let connection_string = section.require_string("mysql.connection_string")?;
            let (host, port) = parse_host_port(&connection_string)?;
            let database = section.require_string("mysql.database_name")?;
            let user = section.require_string("mysql.username")?;
            let password = section.require_string("mysql.password")?;
            Arc::new(MysqlDriver::new(
                MysqlConfig {
                    host,
                    port,
                    user,
                    password,
                    database,
                },
                reconnect,
                Arc::clone(&rate_limiter),
            ))
        } else {
            let uri = section.require_string("mongo.connection_string")?;
            let database = section.require_string("mongo.database_name")?;
            Arc::new(MongoDriver::new(
                MongoConfig { uri, database },
                reconnect,
                Arc::clone(&rate_limiter),
            ))
        };

        let level = section.get_string_or("logging.level", "info");
        let color = section.get_bool_or("logging.color", true);
        logging::init(&level, color);

        let should_reconnect_every_cycle = section.get_bool_or("should_reconnect_every_cycle", true);

        Ok(Database {
            driver,
            queue: RequestQueue::new(queue_config, rate_limiter),
            reconnect_cooldown,
            should_reconnect_every_cycle,
        })
    }
}

fn parse_host_port(connection_string: &str) -> Result<(String, u16)> {
    let (host, port) = connection_string.split_once(':').ok_or_else(|| {
        Error::configuration(
            "build",
            format!("mysql.connection_string '{connection_string}' is not 'host:port'"),
        )
    })?;
    let port: u16 = port.parse().map_err(|_| {
        Error::configuration(
            "build",
            format!("mysql.connection_string '{connection_string}' has a non-numeric port"),
        )
    })?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSection;

    #[tokio::test]
    async fn requires_exactly_one_backend_enabled() {
        let section = ConfigSection::from_pairs([]).unwrap();
        let err = DatabaseBuilder::build(&section).await;
        assert!(matches!(err, Err(Error::ConfigurationError { .. })));
    }

    #[tokio::test]
    async fn rejects_more_than_one_backend_enabled() {
        let section = ConfigSection::from_pairs([
            ("sqlite.enabled", true.into()),
            ("sqlite.path", "/tmp/a.db".into()),
            ("mongo.enabled", true.into()),
        ])
        .unwrap();
        let err = DatabaseBuilder::build(&section).await;
        assert!(matches!(err, Err(Error::ConfigurationError { .. })));
    }

    #[tokio::test]
    async fn builds_sqlite_database_from_config() {
        let section = ConfigSection::from_pairs([
            ("sqlite.enabled", true.into()),
            ("sqlite.path", "/tmp/polystore-test.db".into()),
        ])
        .unwrap();
        let database = DatabaseBuilder::build(&section).await.unwrap();
        assert_eq!(database.backend(), crate::types::Backend::Sqlite);
        assert_eq!(database.status(), ConnectionState::Disconnected);
    }

    #[test]
    fn parses_host_and_port() {
        assert_eq!(
            parse_host_port("db.internal:3306").unwrap(),
            ("db.internal".to_string(), 3306)
        );
        assert!(parse_host_port("db.internal").is_err());
    }
}
