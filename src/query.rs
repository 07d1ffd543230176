//! The query model (C4): an ordered set of equality patterns plus optional
//! limit/ordering, with renderers for SQL and document filters.

use crate::error::Result;
use crate::record::{PrimaryPool, RecordDescriptor};
use crate::types::{Backend, DataType, Wire};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Asc,
    Desc,
}

impl Comparator {
    fn sql(&self) -> &'static str {
        match self {
            Comparator::Asc => "ASC",
            Comparator::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub key: String,
    pub comparator: Comparator,
}

/// An ordered mapping `{name -> value}` (equality patterns only,
/// conjunctive), plus optional limit and ordering (§3).
#[derive(Debug, Clone, Default)]
pub struct Query {
    patterns: Vec<(String, Value)>,
    limit: Option<i64>,
    order: Option<OrderBy>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or overwrites an equality pattern. Insertion order matters: it
    /// defines wildcard binding order.
    pub fn match_eq(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if let Some(existing) = self.patterns.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = value;
        } else {
            self.patterns.push((key, value));
        }
        self
    }

    /// Bulk-adds equality patterns for every field in a primary-field pool.
    pub fn match_pool(mut self, pool: &PrimaryPool) -> Self {
        for (key, value) in pool.iter() {
            self = self.match_eq(key.clone(), value.clone());
        }
        self
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn order_by(mut self, key: impl Into<String>, comparator: Comparator) -> Self {
        self.order = Some(OrderBy {
            key: key.into(),
            comparator,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[(String, Value)] {
        &self.patterns
    }

    /// `k1 = ? AND k2 = ? AND ...`; empty string when there are no patterns.
    pub fn render_sql_where(&self) -> String {
        self.patterns
            .iter()
            .map(|(k, _)| format!("{k} = ?"))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// The `ORDER BY`/`LIMIT` suffix appended after the `WHERE` clause.
    pub fn render_sql_suffix(&self) -> String {
        let mut suffix = String::new();
        if let Some(order) = &self.order {
            suffix.push_str(&format!(" ORDER BY {} {}", order.key, order.comparator.sql()));
        }
        if let Some(limit) = self.limit {
            suffix.push_str(&format!(" LIMIT {limit}"));
        }
        suffix
    }

    /// Walks the pattern map in order, dispatching each value through the
    /// data-type bridge exactly once (resolved open question — see
    /// SPEC_FULL §9) to produce the wildcard bindings 1..N.
    ///
    /// When `descriptor` is given, a pattern's declared type is taken from
    /// the matching field; otherwise the value's natural type is used
    /// (§4.1, "Dispatch of declared type").
    pub fn bind_values(&self, descriptor: Option<&RecordDescriptor>, backend: Backend) -> Result<Vec<Wire>> {
        self.patterns
            .iter()
            .map(|(key, value)| {
                let data_type = descriptor
                    .and_then(|d| d.field_named(key))
                    .map(|f| f.data_type)
                    .unwrap_or_else(|| DataType::of(value));
                data_type.value_to_wire(key, value, backend)
            })
            .collect()
    }

    /// A conjunctive list of equality predicates for the document backend.
    pub fn render_document_filter(&self) -> Vec<(String, Value)> {
        self.patterns.clone()
    }

    /// Mongo-style sort direction, for the document backend's equivalent of
    /// `ORDER BY` (resolved open question — see SPEC_FULL §9).
    pub fn mongo_sort(&self) -> Option<(String, i32)> {
        self.order.as_ref().map(|o| {
            let direction = match o.comparator {
                Comparator::Asc => 1,
                Comparator::Desc => -1,
            };
            (o.key.clone(), direction)
        })
    }

    pub fn limit_value(&self) -> Option<i64> {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwriting_a_key_preserves_its_original_position() {
        let q = Query::new()
            .match_eq("a", Value::I64(1))
            .match_eq("b", Value::I64(2))
            .match_eq("a", Value::I64(3));
        assert_eq!(q.patterns()[0], ("a".to_string(), Value::I64(3)));
        assert_eq!(q.patterns()[1], ("b".to_string(), Value::I64(2)));
    }

    #[test]
    fn renders_sql_where_and_suffix() {
        let q = Query::new()
            .match_eq("id", Value::String("k1".into()))
            .order_by("id", Comparator::Desc)
            .limit(10);
        assert_eq!(q.render_sql_where(), "id = ?");
        assert_eq!(q.render_sql_suffix(), " ORDER BY id DESC LIMIT 10");
    }

    #[test]
    fn empty_query_renders_empty_where() {
        assert_eq!(Query::new().render_sql_where(), "");
        assert_eq!(Query::new().render_sql_suffix(), "");
    }

    #[test]
    fn bind_values_without_descriptor_uses_natural_type() {
        let q = Query::new().match_eq("active", Value::Bool(true));
        let bound = q.bind_values(None, Backend::Sqlite).unwrap();
        assert_eq!(bound, vec![Wire::I64(1)]);
    }

    #[test]
    fn document_filter_matches_patterns() {
        let q = Query::new().match_eq("id", Value::String("k1".into()));
        assert_eq!(
            q.render_document_filter(),
            vec![("id".to_string(), Value::String("k1".into()))]
        );
    }
}
