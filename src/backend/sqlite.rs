//! The embedded relational driver (SQLite), via `rusqlite`.
//!
//! `rusqlite::Connection` is `Send` but not `Sync`, so the live handle is
//! held behind a `std::sync::Mutex` and every operation runs inside
//! `spawn_blocking` — the request queue already guarantees at most one
//! in-flight request per database, so this never contends with itself.

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use rusqlite::{types::Value as SqlValue, Connection, OptionalExtension};

use crate::connection::{ConnectionStateMachine, ReconnectPolicy};
use crate::error::{Error, RateLimiter, Result};
use crate::field::Field;
use crate::query::Query;
use crate::record::RecordDescriptor;
use crate::schema;
use crate::types::{Backend, DataType};
use crate::value::{RecordSection, Value};

use super::Driver;

pub struct SqliteDriver {
    path: PathBuf,
    conn: Arc<StdMutex<Option<Connection>>>,
    state: Arc<ConnectionStateMachine>,
}

impl SqliteDriver {
    pub fn new(path: impl Into<PathBuf>, reconnect: ReconnectPolicy, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            path: path.into(),
            conn: Arc::new(StdMutex::new(None)),
            state: Arc::new(ConnectionStateMachine::new(reconnect, rate_limiter)),
        }
    }

    /// Runs `f` against the live connection on a blocking thread, so a slow
    /// SQLite call never stalls the tokio runtime. `operation`/`statement`
    /// label a `DriverError` if `f` fails.
    async fn with_connection<T: Send + 'static>(
        &self,
        operation: &'static str,
        statement: String,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    ) -> Result<T> {
        let conn = Arc::clone(&self.conn);
        let statement_for_closure = statement.clone();
        let joined = tokio::task::spawn_blocking(move || -> Result<T> {
            let guard = conn.lock().unwrap();
            let connection = guard
                .as_ref()
                .ok_or_else(|| Error::invalid_state(operation, "sqlite connection is not open"))?;
            f(connection).map_err(|e| Error::driver("sqlite", operation, statement_for_closure.clone(), e))
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(e) => Err(Error::driver("sqlite", operation, statement, e)),
        }
    }
}

fn wire_from_sql(v: SqlValue) -> crate::types::Wire {
    use crate::types::Wire;
    match v {
        SqlValue::Null => Wire::Null,
        SqlValue::Integer(i) => Wire::I64(i),
        SqlValue::Real(f) => Wire::F64(f),
        SqlValue::Text(s) => Wire::Text(s),
        SqlValue::Blob(b) => Wire::Text(String::from_utf8_lossy(&b).into_owned()),
    }
}

fn sql_from_wire(w: crate::types::Wire) -> SqlValue {
    use crate::types::Wire;
    match w {
        Wire::Null => SqlValue::Null,
        Wire::I64(i) => SqlValue::Integer(i),
        Wire::F64(f) => SqlValue::Real(f),
        Wire::Text(s) => SqlValue::Text(s),
    }
}

fn row_to_section(
    descriptor: &RecordDescriptor,
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<RecordSection> {
    let mut section = RecordSection::new();
    for (idx, field) in descriptor.fields().iter().enumerate() {
        let raw: SqlValue = row.get(idx)?;
        let wire = wire_from_sql(raw);
        let value = field
            .data_type
            .wire_to_value(&field.name, wire, Backend::Sqlite)
            .unwrap_or(Value::Null);
        section.insert(field.name.clone(), value);
    }
    Ok(section)
}

#[async_trait]
impl Driver for SqliteDriver {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn state(&self) -> &ConnectionStateMachine {
        &self.state
    }

    fn state_arc(&self) -> Arc<ConnectionStateMachine> {
        Arc::clone(&self.state)
    }

    async fn open(&self) -> Result<()> {
        let path = self.path.clone();
        let conn_slot = Arc::clone(&self.conn);
        let opened = tokio::task::spawn_blocking(move || Connection::open(path))
            .await
            .map_err(|e| Error::driver("sqlite", "open", "", e))?;

        match opened {
            Ok(connection) => {
                *conn_slot.lock().unwrap() = Some(connection);
                self.state.connect_async(|| async { Ok(()) }).await
            }
            Err(e) => Err(Error::ConnectionFailed {
                operation: "open".to_string(),
                reason: e.to_string(),
                source: Some(anyhow::Error::new(e)),
            }),
        }
    }

    async fn close(&self) -> Result<()> {
        *self.conn.lock().unwrap() = None;
        Ok(())
    }

    async fn drop_database(&self) -> Result<()> {
        self.close().await?;
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .map_err(|e| Error::driver("sqlite", "drop_database", "", e))?;
        }
        Ok(())
    }

    async fn has_table(&self, table: &str) -> Result<bool> {
        let table = table.to_string();
        self.with_connection(
            "has_table",
            "SELECT name FROM sqlite_master WHERE type='table' AND name = ?".to_string(),
            move |conn| {
                conn.query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?1",
                    [table],
                    |_| Ok(()),
                )
                .optional()
                .map(|found| found.is_some())
            },
        )
        .await
    }

    async fn list_columns(&self, table: &str, _descriptor: &RecordDescriptor) -> Result<Vec<String>> {
        let table = table.to_string();
        self.with_connection(
            "list_columns",
            format!("PRAGMA table_info({table})"),
            move |conn| {
                let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
                stmt.query_map([], |row| row.get::<_, String>(1))?
                    .collect::<rusqlite::Result<Vec<_>>>()
            },
        )
        .await
    }

    async fn create_table(&self, table: &str, descriptor: &RecordDescriptor) -> Result<()> {
        let sql = schema::create_table_sql(table, descriptor, Backend::Sqlite);
        self.with_connection("create_table", sql.clone(), move |conn| {
            conn.execute(&sql, []).map(|_| ())
        })
        .await
    }

    async fn add_column(&self, table: &str, field: &Field) -> Result<()> {
        let sql = schema::add_column_sql(table, field, Backend::Sqlite);
        self.with_connection("add_column", sql.clone(), move |conn| {
            conn.execute(&sql, []).map(|_| ())
        })
        .await
    }

    async fn find_first(
        &self,
        table: &str,
        descriptor: &RecordDescriptor,
        query: &Query,
    ) -> Result<Option<RecordSection>> {
        let narrowed = query.clone().limit(1);
        let mut results = self.find_all(table, descriptor, &narrowed).await?;
        Ok(results.pop())
    }

    async fn find_all(
        &self,
        table: &str,
        descriptor: &RecordDescriptor,
        query: &Query,
    ) -> Result<Vec<RecordSection>> {
        let columns: Vec<&str> = descriptor.fields().iter().map(|f| f.name.as_str()).collect();
        let mut sql = format!("SELECT {} FROM {table}", columns.join(", "));
        let where_clause = query.render_sql_where();
        if !where_clause.is_empty() {
            sql.push_str(&format!(" WHERE {where_clause}"));
        }
        sql.push_str(&query.render_sql_suffix());

        let binds: Vec<SqlValue> = query
            .bind_values(Some(descriptor), Backend::Sqlite)?
            .into_iter()
            .map(sql_from_wire)
            .collect();

        let descriptor = descriptor.clone();
        self.with_connection("find_all", sql.clone(), move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map(rusqlite::params_from_iter(binds), |row| row_to_section(&descriptor, row))?
                .collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }

    async fn count(&self, table: &str, descriptor: &RecordDescriptor, query: &Query) -> Result<u64> {
        let mut sql = format!("SELECT COUNT(*) FROM {table}");
        let where_clause = query.render_sql_where();
        if !where_clause.is_empty() {
            sql.push_str(&format!(" WHERE {where_clause}"));
        }
        let binds: Vec<SqlValue> = query
            .bind_values(Some(descriptor), Backend::Sqlite)?
            .into_iter()
            .map(sql_from_wire)
            .collect();

        let count = self
            .with_connection("count", sql.clone(), move |conn| {
                conn.query_row(&sql, rusqlite::params_from_iter(binds), |row| row.get::<_, i64>(0))
            })
            .await?;
        Ok(count as u64)
    }

    async fn insert_or_update(
        &self,
        table: &str,
        descriptor: &RecordDescriptor,
        values: &[(String, Value)],
    ) -> Result<()> {
        let mut primary_query = Query::new();
        for field in descriptor.primary_fields() {
            match values.iter().find(|(name, _)| name == &field.name) {
                Some((_, Value::Null)) | None => {
                    return Err(Error::invalid_state(
                        "insert_or_update",
                        format!("primary field '{}' is missing a value (I3)", field.name),
                    ))
                }
                Some((_, v)) => primary_query = primary_query.match_eq(field.name.clone(), v.clone()),
            }
        }

        let existing = self.find_first(table, descriptor, &primary_query).await?;

        if existing.is_some() {
            let non_primary: Vec<&(String, Value)> = values
                .iter()
                .filter(|(name, _)| {
                    descriptor
                        .field_named(name)
                        .map(|f| !f.is_primary())
                        .unwrap_or(false)
                })
                .collect();
            let set_clause = non_primary
                .iter()
                .map(|(name, _)| format!("{name} = ?"))
                .collect::<Vec<_>>()
                .join(", ");
            let where_clause = primary_query.render_sql_where();
            let sql = format!("UPDATE {table} SET {set_clause} WHERE {where_clause}");

            let mut binds = Vec::new();
            for (name, value) in &non_primary {
                let data_type = descriptor.field_named(name).unwrap().data_type;
                binds.push(sql_from_wire(data_type.value_to_wire(name, value, Backend::Sqlite)?));
            }
            binds.extend(
                primary_query
                    .bind_values(Some(descriptor), Backend::Sqlite)?
                    .into_iter()
                    .map(sql_from_wire),
            );

            self.with_connection("insert_or_update", sql.clone(), move |conn| {
                conn.execute(&sql, rusqlite::params_from_iter(binds)).map(|_| ())
            })
            .await
        } else {
            let columns: Vec<&str> = values.iter().map(|(name, _)| name.as_str()).collect();
            let placeholders = vec!["?"; values.len()].join(", ");
            let sql = format!(
                "INSERT INTO {table} ({}) VALUES ({placeholders})",
                columns.join(", ")
            );
            let mut binds = Vec::new();
            for (name, value) in values {
                let data_type = descriptor
                    .field_named(name)
                    .map(|f| f.data_type)
                    .unwrap_or(DataType::Default);
                binds.push(sql_from_wire(data_type.value_to_wire(name, value, Backend::Sqlite)?));
            }
            self.with_connection("insert_or_update", sql.clone(), move |conn| {
                conn.execute(&sql, rusqlite::params_from_iter(binds)).map(|_| ())
            })
            .await
        }
    }

    async fn delete_all(&self, table: &str, descriptor: &RecordDescriptor, query: &Query) -> Result<bool> {
        let where_clause = query.render_sql_where();
        let mut sql = format!("DELETE FROM {table}");
        if !where_clause.is_empty() {
            sql.push_str(&format!(" WHERE {where_clause}"));
        }
        let binds: Vec<SqlValue> = query
            .bind_values(Some(descriptor), Backend::Sqlite)?
            .into_iter()
            .map(sql_from_wire)
            .collect();
        let changed = self
            .with_connection("delete_all", sql.clone(), move |conn| {
                conn.execute(&sql, rusqlite::params_from_iter(binds))
            })
            .await?;
        Ok(changed > 0)
    }
}
