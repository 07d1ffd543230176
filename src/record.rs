//! Record reflection (C3): the views extracted from a declared record type
//! and a live instance, built against a static [`RecordDescriptor`] rather
//! than by scanning runtime attributes (see the SPEC_FULL §9 design note).

use crate::field::{Field, FieldKind};
use crate::value::{RecordSection, Value};

/// The static, once-built description of a record type's fields, in
/// declaration order. Implementors build one of these (typically behind a
/// `once_cell::sync::Lazy` or a `fn descriptor() -> &'static RecordDescriptor`)
/// and return it from [`Record::descriptor`].
#[derive(Debug, Clone)]
pub struct RecordDescriptor {
    fields: Vec<Field>,
}

/// Builds a [`RecordDescriptor`], validating the invariants of §3 at
/// `build()` time: at least one primary field (I1), and unique field names
/// (I2). Violating either is a programming error in the record type's
/// declaration, so `build()` panics rather than returning a `Result`.
#[derive(Debug, Default)]
pub struct RecordDescriptorBuilder {
    fields: Vec<Field>,
}

impl RecordDescriptorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn primary(mut self, field: Field) -> Self {
        assert!(matches!(field.kind, FieldKind::Primary), "expected a primary field");
        self.fields.push(field);
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> RecordDescriptor {
        assert!(
            self.fields.iter().any(Field::is_primary),
            "record descriptor must declare at least one primary field (I1)"
        );
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            assert!(
                seen.insert(field.name.as_str()),
                "duplicate field name '{}' in record descriptor (I2)",
                field.name
            );
        }
        RecordDescriptor { fields: self.fields }
    }
}

impl RecordDescriptor {
    pub fn builder() -> RecordDescriptorBuilder {
        RecordDescriptorBuilder::new()
    }

    /// Ordered field list (§4.2.1), used to form DDL column lists.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Primary-field subset, in declaration order (§4.2.2).
    pub fn primary_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_primary())
    }

    /// Foreign-field subset (§4.2.3).
    pub fn foreign_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.foreign_ref().is_some())
    }

    /// Plain (non-primary, non-foreign) fields.
    pub fn plain_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|f| matches!(f.kind, FieldKind::Plain))
    }

    pub fn field_named(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A user-declared record type. Conversion to/from a [`RecordSection`] is
/// the sole mechanism the library uses to read and write record state.
pub trait Record: Sized {
    fn descriptor() -> &'static RecordDescriptor;

    /// Materializes this record's current field values into a section.
    fn to_section(&self) -> RecordSection;

    /// Mutates `self` in place from a section built from row/document
    /// values, filling in everything beyond the primary fields the
    /// record-factory already initialized.
    fn convert(&mut self, section: &RecordSection);

    /// Field-value map (§4.2.4): materializes to a section, then looks up
    /// each declared field's value within it, preserving declaration order.
    fn field_values(&self) -> Vec<(String, Value)> {
        let section = self.to_section();
        Self::descriptor()
            .fields()
            .iter()
            .filter_map(|f| section.get(&f.name).map(|v| (f.name.clone(), v.clone())))
            .collect()
    }

    /// The primary-field pool for this record instance (§3).
    fn primary_pool(&self) -> PrimaryPool {
        let section = self.to_section();
        let pairs = Self::descriptor()
            .primary_fields()
            .filter_map(|f| section.get(&f.name).map(|v| (f.name.clone(), v.clone())))
            .collect();
        PrimaryPool(pairs)
    }
}

/// An unordered set of `(field, value)` pairs identifying a record by its
/// primary fields without requiring a full instance (§3).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimaryPool(Vec<(String, Value)>);

impl PrimaryPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.push((field.into(), value));
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.iter().find(|(name, _)| name == field).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn sample_descriptor() -> RecordDescriptor {
        RecordDescriptor::builder()
            .primary(Field::primary("id", DataType::String))
            .field(Field::plain("name", DataType::String))
            .field(Field::plain("active", DataType::Boolean))
            .build()
    }

    #[test]
    fn field_views_partition_correctly() {
        let d = sample_descriptor();
        assert_eq!(d.primary_fields().count(), 1);
        assert_eq!(d.plain_fields().count(), 2);
        assert_eq!(d.foreign_fields().count(), 0);
        assert_eq!(d.fields().len(), 3);
    }

    #[test]
    #[should_panic(expected = "at least one primary field")]
    fn build_panics_without_primary() {
        RecordDescriptor::builder()
            .field(Field::plain("name", DataType::String))
            .build();
    }

    #[test]
    #[should_panic(expected = "duplicate field name")]
    fn build_panics_on_duplicate_name() {
        RecordDescriptor::builder()
            .primary(Field::primary("id", DataType::String))
            .field(Field::plain("id", DataType::String))
            .build();
    }

    #[test]
    fn primary_pool_lookup() {
        let mut pool = PrimaryPool::new();
        pool.insert("id", Value::String("k1".into()));
        assert_eq!(pool.get("id"), Some(&Value::String("k1".into())));
        assert_eq!(pool.get("missing"), None);
    }
}
