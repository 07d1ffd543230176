//! Backend drivers (C8): per-backend implementations of open/close, DDL,
//! CRUD, upsert, and column-listing, behind the common [`Driver`] trait so
//! the table façade (C9) and request queue (C5) never need to know which
//! backend is active.

pub mod mongo;
pub mod mysql;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::ConnectionStateMachine;
use crate::error::Result;
use crate::field::Field;
use crate::query::Query;
use crate::record::RecordDescriptor;
use crate::types::Backend;
use crate::value::RecordSection;

/// The per-backend capability surface consumed by [`crate::table::Table`].
///
/// A "table-selection" in the distilled spec's terms is simply the
/// `(table, descriptor)` pair a façade call passes in; the façade builds a
/// fresh one on every call rather than caching it (§4.8), so there is no
/// separate `TableSelection` type here.
#[async_trait]
pub trait Driver: Send + Sync {
    fn backend(&self) -> Backend;

    fn state(&self) -> &ConnectionStateMachine;

    /// A cloned handle to the same state machine, for callers (the database
    /// façade) that need to drive `connect_async`/`disconnect_async`, both
    /// of which require an owned `Arc` receiver.
    fn state_arc(&self) -> Arc<ConnectionStateMachine>;

    /// Opens the native handle, per the connection state machine (§4.5).
    async fn open(&self) -> Result<()>;

    /// Closes the native handle.
    async fn close(&self) -> Result<()>;

    /// Drops the whole database/file (never a single table — the library
    /// never emits `DROP TABLE`, per §6).
    async fn drop_database(&self) -> Result<()>;

    async fn has_table(&self, table: &str) -> Result<bool>;

    async fn list_columns(&self, table: &str, descriptor: &RecordDescriptor) -> Result<Vec<String>>;

    async fn create_table(&self, table: &str, descriptor: &RecordDescriptor) -> Result<()>;

    async fn add_column(&self, table: &str, field: &Field) -> Result<()>;

    async fn find_first(
        &self,
        table: &str,
        descriptor: &RecordDescriptor,
        query: &Query,
    ) -> Result<Option<RecordSection>>;

    async fn find_all(
        &self,
        table: &str,
        descriptor: &RecordDescriptor,
        query: &Query,
    ) -> Result<Vec<RecordSection>>;

    async fn count(&self, table: &str, descriptor: &RecordDescriptor, query: &Query) -> Result<u64>;

    /// Insert-or-update keyed on primary-field equality (§4.7): looks up
    /// the record by its primary fields and either inserts or updates.
    async fn insert_or_update(
        &self,
        table: &str,
        descriptor: &RecordDescriptor,
        values: &[(String, crate::value::Value)],
    ) -> Result<()>;

    async fn delete_all(&self, table: &str, descriptor: &RecordDescriptor, query: &Query) -> Result<bool>;
}
