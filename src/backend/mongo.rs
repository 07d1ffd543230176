//! The document-store driver (MongoDB), via the `mongodb` crate.
//!
//! Schemaless by nature: `list_columns` reports the declared fields
//! verbatim rather than inspecting live documents, and `add_column` is a
//! no-op — a new field simply shows up absent on old documents until
//! they're next written (§4.6, document-backend note).

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::{Client, Database};
use tokio::sync::RwLock;

use crate::connection::{ConnectionStateMachine, ReconnectPolicy};
use crate::error::{Error, RateLimiter, Result};
use crate::field::Field;
use crate::query::Query;
use crate::record::RecordDescriptor;
use crate::types::{Backend, DataType, Wire};
use crate::value::{RecordSection, Value};

use super::Driver;

/// Dial-in parameters for a MongoDB deployment, sourced from the builder
/// config keys under `mongo.*` (§6).
#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

pub struct MongoDriver {
    config: MongoConfig,
    client: RwLock<Option<Client>>,
    state: std::sync::Arc<ConnectionStateMachine>,
}

impl MongoDriver {
    pub fn new(
        config: MongoConfig,
        reconnect: ReconnectPolicy,
        rate_limiter: std::sync::Arc<RateLimiter>,
    ) -> Self {
        Self {
            config,
            client: RwLock::new(None),
            state: std::sync::Arc::new(ConnectionStateMachine::new(reconnect, rate_limiter)),
        }
    }

    async fn database(&self, operation: &'static str) -> Result<Database> {
        let client = self.client.read().await;
        let client = client
            .as_ref()
            .ok_or_else(|| Error::invalid_state(operation, "mongo connection is not open"))?;
        Ok(client.database(&self.config.database))
    }
}

fn bson_from_wire(w: Wire) -> Bson {
    match w {
        Wire::Null => Bson::Null,
        Wire::Bool(b) => Bson::Boolean(b),
        Wire::I64(n) => Bson::Int64(n),
        Wire::F64(f) => Bson::Double(f),
        Wire::Text(s) => Bson::String(s),
    }
}

fn wire_from_bson(b: Bson) -> Wire {
    match b {
        Bson::Null => Wire::Null,
        Bson::Boolean(b) => Wire::Bool(b),
        Bson::Int32(n) => Wire::I64(n as i64),
        Bson::Int64(n) => Wire::I64(n),
        Bson::Double(f) => Wire::F64(f),
        Bson::String(s) => Wire::Text(s),
        other => Wire::Text(other.to_string()),
    }
}

fn document_from_values(
    descriptor: &RecordDescriptor,
    values: &[(String, Value)],
) -> Result<Document> {
    let mut document = Document::new();
    for (name, value) in values {
        let data_type = descriptor
            .field_named(name)
            .map(|f| f.data_type)
            .unwrap_or(DataType::Default);
        let wire = data_type.value_to_wire(name, value, Backend::Mongo)?;
        document.insert(name.clone(), bson_from_wire(wire));
    }
    Ok(document)
}

fn section_from_document(descriptor: &RecordDescriptor, document: &Document) -> RecordSection {
    let mut section = RecordSection::new();
    for field in descriptor.fields() {
        let bson = document.get(&field.name).cloned().unwrap_or(Bson::Null);
        let wire = wire_from_bson(bson);
        let value = field
            .data_type
            .wire_to_value(&field.name, wire, Backend::Mongo)
            .unwrap_or(Value::Null);
        section.insert(field.name.clone(), value);
    }
    section
}

fn filter_from_query(descriptor: &RecordDescriptor, query: &Query) -> Result<Document> {
    let mut document = Document::new();
    for (key, value) in query.render_document_filter() {
        let data_type = descriptor
            .field_named(&key)
            .map(|f| f.data_type)
            .unwrap_or_else(|| DataType::of(&value));
        let wire = data_type.value_to_wire(&key, &value, Backend::Mongo)?;
        document.insert(key, bson_from_wire(wire));
    }
    Ok(document)
}

#[async_trait]
impl Driver for MongoDriver {
    fn backend(&self) -> Backend {
        Backend::Mongo
    }

    fn state(&self) -> &ConnectionStateMachine {
        &self.state
    }

    fn state_arc(&self) -> std::sync::Arc<ConnectionStateMachine> {
        std::sync::Arc::clone(&self.state)
    }

    async fn open(&self) -> Result<()> {
        let uri = self.config.uri.clone();
        let database_name = self.config.database.clone();
        let result = Client::with_uri_str(&uri).await;
        match result {
            Ok(client) => {
                client
                    .database(&database_name)
                    .run_command(doc! { "ping": 1 })
                    .await
                    .map_err(|e| Error::ConnectionFailed {
                        operation: "open".to_string(),
                        reason: e.to_string(),
                        source: Some(anyhow::Error::new(e)),
                    })?;
                *self.client.write().await = Some(client);
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
        *self.client.write().await = None;
        Ok(())
    }

    async fn drop_database(&self) -> Result<()> {
        let db = self.database("drop_database").await?;
        db.drop().await?;
        self.close().await
    }

    async fn has_table(&self, table: &str) -> Result<bool> {
        let db = self.database("has_table").await?;
        let names = db.list_collection_names().await?;
        Ok(names.iter().any(|n| n == table))
    }

    async fn list_columns(&self, _table: &str, descriptor: &RecordDescriptor) -> Result<Vec<String>> {
        Ok(descriptor.fields().iter().map(|f| f.name.clone()).collect())
    }

    async fn create_table(&self, table: &str, _descriptor: &RecordDescriptor) -> Result<()> {
        let db = self.database("create_table").await?;
        if !self.has_table(table).await? {
            db.create_collection(table).await?;
        }
        Ok(())
    }

    async fn add_column(&self, _table: &str, _field: &Field) -> Result<()> {
        Ok(())
    }

    async fn find_first(
        &self,
        table: &str,
        descriptor: &RecordDescriptor,
        query: &Query,
    ) -> Result<Option<RecordSection>> {
        let db = self.database("find_first").await?;
        let collection = db.collection::<Document>(table);
        let filter = filter_from_query(descriptor, query)?;
        let mut find = collection.find(filter);
        if let Some((key, direction)) = query.mongo_sort() {
            find = find.sort(doc! { key: direction });
        }
        let document = find.await?.try_next().await?;
        Ok(document.map(|d| section_from_document(descriptor, &d)))
    }

    async fn find_all(
        &self,
        table: &str,
        descriptor: &RecordDescriptor,
        query: &Query,
    ) -> Result<Vec<RecordSection>> {
        let db = self.database("find_all").await?;
        let collection = db.collection::<Document>(table);
        let filter = filter_from_query(descriptor, query)?;
        let mut find = collection.find(filter);
        if let Some((key, direction)) = query.mongo_sort() {
            find = find.sort(doc! { key: direction });
        }
        if let Some(limit) = query.limit_value() {
            find = find.limit(limit);
        }
        let cursor = find.await?;
        let documents: Vec<Document> = cursor.try_collect().await?;
        Ok(documents
            .iter()
            .map(|d| section_from_document(descriptor, d))
            .collect())
    }

    async fn count(&self, table: &str, descriptor: &RecordDescriptor, query: &Query) -> Result<u64> {
        let db = self.database("count").await?;
        let collection = db.collection::<Document>(table);
        let filter = filter_from_query(descriptor, query)?;
        Ok(collection.count_documents(filter).await?)
    }

    async fn insert_or_update(
        &self,
        table: &str,
        descriptor: &RecordDescriptor,
        values: &[(String, Value)],
    ) -> Result<()> {
        let db = self.database("insert_or_update").await?;
        let collection = db.collection::<Document>(table);

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
        let filter = filter_from_query(descriptor, &primary_query)?;
        let document = document_from_values(descriptor, values)?;

        collection.delete_many(filter).await?;
        collection.insert_one(document).await?;
        Ok(())
    }

    async fn delete_all(&self, table: &str, descriptor: &RecordDescriptor, query: &Query) -> Result<bool> {
        let db = self.database("delete_all").await?;
        let collection = db.collection::<Document>(table);
        let filter = filter_from_query(descriptor, query)?;
        let result = collection.delete_many(filter).await?;
        Ok(result.deleted_count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;

    fn descriptor() -> RecordDescriptor {
        RecordDescriptor::builder()
            .primary(Field::primary("id", DataType::String))
            .field(Field::plain("n", DataType::I64))
            .field(Field::plain("active", DataType::Boolean))
            .build()
    }

    #[test]
    fn document_round_trips_through_bson() {
        let descriptor = descriptor();
        let values = vec![
            ("id".to_string(), Value::String("k1".into())),
            ("n".to_string(), Value::I64(7)),
            ("active".to_string(), Value::Bool(true)),
        ];
        let document = document_from_values(&descriptor, &values).unwrap();
        assert_eq!(document.get_str("id").unwrap(), "k1");
        assert_eq!(document.get_bool("active").unwrap(), true);

        let section = section_from_document(&descriptor, &document);
        assert_eq!(section.get("id"), Some(&Value::String("k1".into())));
        assert_eq!(section.get("n"), Some(&Value::I64(7)));
        assert_eq!(section.get("active"), Some(&Value::Bool(true)));
    }

    #[test]
    fn filter_from_query_dispatches_declared_types() {
        let descriptor = descriptor();
        let query = Query::new().match_eq("active", Value::Bool(false));
        let filter = filter_from_query(&descriptor, &query).unwrap();
        assert_eq!(filter.get_bool("active").unwrap(), false);
    }
}
