//! The schema reconciler (C7): compares declared fields against live
//! columns and emits the DDL to create a table or add missing columns.
//!
//! DDL text assembly lives here and is shared between the two relational
//! drivers; the document driver doesn't need DDL (schema is implicit) and
//! implements table/column reconciliation directly against collection
//! existence.

use crate::field::FieldKind;
use crate::record::RecordDescriptor;
use crate::types::Backend;

/// `CREATE TABLE IF NOT EXISTS <table> (...)` with a single table-level
/// `PRIMARY KEY (...)` clause covering every primary column (resolved open
/// question — see SPEC_FULL §9; the distilled spec's per-column inline
/// marker is invalid DDL once a record has more than one primary field).
pub fn create_table_sql(table: &str, descriptor: &RecordDescriptor, backend: Backend) -> String {
    let mut columns = Vec::new();

    for field in descriptor.fields() {
        let type_name = field.data_type.type_name(backend, field.max_size);
        let mut column = format!("{} {}", field.name, type_name);
        if let FieldKind::Foreign(r) = &field.kind {
            column.push_str(&format!(" REFERENCES {}({})", r.table, r.column));
        }
        columns.push(column);
    }

    let primary_cols: Vec<&str> = descriptor
        .primary_fields()
        .map(|f| f.name.as_str())
        .collect();
    columns.push(format!("PRIMARY KEY ({})", primary_cols.join(", ")));

    format!(
        "CREATE TABLE IF NOT EXISTS {table} ({})",
        columns.join(", ")
    )
}

/// `ALTER TABLE <table> ADD COLUMN <name> <type>` for one missing field.
pub fn add_column_sql(table: &str, field: &crate::field::Field, backend: Backend) -> String {
    let type_name = field.data_type.type_name(backend, field.max_size);
    format!("ALTER TABLE {table} ADD COLUMN {} {}", field.name, type_name)
}

/// The set difference `declared \ current` (§4.6 step 4), preserving the
/// descriptor's declaration order.
pub fn missing_fields<'a>(
    descriptor: &'a RecordDescriptor,
    existing_columns: &[String],
) -> Vec<&'a crate::field::Field> {
    descriptor
        .fields()
        .iter()
        .filter(|f| !existing_columns.iter().any(|c| c.eq_ignore_ascii_case(&f.name)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Field, Size};
    use crate::types::DataType;

    fn descriptor() -> RecordDescriptor {
        RecordDescriptor::builder()
            .primary(Field::primary("id", DataType::String))
            .field(Field::plain("name", DataType::String).with_size(Size::Bounded(100)))
            .field(Field::foreign("owner_id", DataType::String, "users", "id"))
            .build()
    }

    #[test]
    fn emits_single_table_level_primary_key() {
        let sql = create_table_sql("widgets", &descriptor(), Backend::Mysql);
        assert!(sql.contains("PRIMARY KEY (id)"));
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS widgets ("));
        assert!(sql.contains("owner_id VARCHAR(100) REFERENCES users(id)"));
    }

    #[test]
    fn compound_primary_key_is_a_single_clause() {
        let descriptor = RecordDescriptor::builder()
            .primary(Field::primary("a", DataType::String))
            .primary(Field::primary("b", DataType::String))
            .build();
        let sql = create_table_sql("pairs", &descriptor, Backend::Sqlite);
        assert_eq!(sql.matches("PRIMARY KEY").count(), 1);
        assert!(sql.contains("PRIMARY KEY (a, b)"));
    }

    #[test]
    fn missing_fields_is_case_insensitive_and_ordered() {
        let descriptor = descriptor();
        let existing = vec!["ID".to_string(), "name".to_string()];
        let missing = missing_fields(&descriptor, &existing);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "owner_id");
    }

    #[test]
    fn add_column_sql_uses_backend_type_name() {
        let field = Field::plain("n", DataType::I64);
        assert_eq!(
            add_column_sql("widgets", &field, Backend::Mysql),
            "ALTER TABLE widgets ADD COLUMN n BIGINT(255)"
        );
    }
}
