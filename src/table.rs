//! The table façade (C9): a thin forwarder that stores a back-pointer to its
//! database and, on each call, builds a fresh `(table, descriptor)` pair and
//! delegates to the active driver through the request queue.

use std::future::Future;
use std::sync::Arc;

use crate::database::Database;
use crate::error::{Error, Result};
use crate::query::Query;
use crate::record::{PrimaryPool, Record};
use crate::schema;
use crate::value::RecordSection;

/// Binds a record type to a table name and a database (§3, "Table
/// binding"). `factory` is the empty-record constructor supplied by the
/// implementor — the bridge between reflection and application types.
pub struct Table<R: Record> {
    name: String,
    database: Database,
    factory: Arc<dyn Fn(&PrimaryPool) -> R + Send + Sync>,
}

impl<R: Record + Send + 'static> Table<R> {
    pub fn new(
        database: Database,
        name: impl Into<String>,
        factory: impl Fn(&PrimaryPool) -> R + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            database,
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers the table and reconciles its schema against the live
    /// database (§4.6): creates the table if absent, or adds any newly
    /// declared columns if present. Idempotent (P7).
    pub async fn ensure_schema(&self) -> Result<()> {
        let driver = self.database.driver();
        let name = self.name.clone();
        let descriptor = R::descriptor();
        self.run("ensure_schema", async move {
            if !driver.has_table(&name).await? {
                driver.create_table(&name, descriptor).await
            } else {
                let existing = driver.list_columns(&name, descriptor).await?;
                for field in schema::missing_fields(descriptor, &existing) {
                    driver.add_column(&name, field).await?;
                }
                Ok(())
            }
        })
        .await
    }

    pub async fn find_first(&self, query: Query) -> Result<Option<R>> {
        let driver = self.database.driver();
        let name = self.name.clone();
        let descriptor = R::descriptor();
        let section = self
            .run("find_first", async move { driver.find_first(&name, descriptor, &query).await })
            .await?;
        Ok(section.map(|section| self.hydrate(section)))
    }

    pub async fn find_all(&self, query: Query) -> Result<Vec<R>> {
        let driver = self.database.driver();
        let name = self.name.clone();
        let descriptor = R::descriptor();
        let sections = self
            .run("find_all", async move { driver.find_all(&name, descriptor, &query).await })
            .await?;
        Ok(sections.into_iter().map(|section| self.hydrate(section)).collect())
    }

    pub async fn count(&self, query: Query) -> Result<u64> {
        let driver = self.database.driver();
        let name = self.name.clone();
        let descriptor = R::descriptor();
        self.run("count", async move { driver.count(&name, descriptor, &query).await })
            .await
    }

    /// Inserts `record` if no record shares its primary-field values, or
    /// updates the existing one otherwise (§4.7, the upsert contract).
    pub async fn insert_or_update(&self, record: &R) -> Result<()> {
        let driver = self.database.driver();
        let name = self.name.clone();
        let descriptor = R::descriptor();
        let values = record.field_values();
        self.run("insert_or_update", async move {
            driver.insert_or_update(&name, descriptor, &values).await
        })
        .await
    }

    pub async fn delete_all(&self, query: Query) -> Result<bool> {
        let driver = self.database.driver();
        let name = self.name.clone();
        let descriptor = R::descriptor();
        self.run("delete_all", async move { driver.delete_all(&name, descriptor, &query).await })
            .await
    }

    /// Builds a record via the factory, seeded with the primary values read
    /// back from `section`, then fills the rest via `convert` (§4.2).
    fn hydrate(&self, section: RecordSection) -> R {
        let mut pool = PrimaryPool::new();
        for field in R::descriptor().primary_fields() {
            if let Some(value) = section.get(&field.name) {
                pool.insert(field.name.clone(), value.clone());
            }
        }
        let mut record = (self.factory)(&pool);
        record.convert(&section);
        record
    }

    /// Submits `fut` through the database's request queue, masking a
    /// transient disconnect first (§4.5), and turns the queue's
    /// cancelled/null marker into an error so callers always get a
    /// definite answer.
    async fn run<T: Send + 'static>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>> + Send + 'static,
    ) -> Result<T> {
        let driver = self.database.driver();
        let wait = self.database.reconnect_wait();
        let guarded = async move {
            let _ = driver.state_arc().reconnect_if_disconnected(wait).await;
            fut.await
        };
        match self.database.queue().submit(operation, guarded).await? {
            Some(value) => Ok(value),
            None => Err(Error::invalid_state(operation, "cancelled: request queue was at capacity")),
        }
    }
}
