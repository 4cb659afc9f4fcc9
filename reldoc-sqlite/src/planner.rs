//! Schema to DDL planning.
//!
//! Each collection maps to one table holding the canonical JSON body plus a
//! generated column per declared field, extracted with `json_extract` and
//! cast to the field's physical type. Indexes build on the generated
//! columns, so filter translation and index usage agree on one expression.
//!
//! All emitted statements are idempotent (`IF NOT EXISTS`, or `ALTER TABLE
//! ADD COLUMN` guarded by the live column list), so re-planning an existing
//! collection is a no-op and a schema with added fields extends the table
//! in place without touching stored rows.

use reldoc_core::schema::{FieldType, Schema, SchemaField};

/// Name of the generated column backing a schema field.
pub fn field_column(name: &str) -> String {
    format!("f_{name}")
}

fn column_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Text => "TEXT",
        FieldType::Integer => "INTEGER",
        FieldType::Real => "REAL",
        FieldType::Boolean => "INTEGER",
        FieldType::Json => "TEXT",
    }
}

/// The generated-column clause for one field.
///
/// `Json` fields skip the cast: `json_extract` already yields the stored
/// representation, and casting would collapse objects and arrays to text.
fn column_def(field: &SchemaField) -> String {
    let column = field_column(&field.name);
    let ty = column_type(field.field_type);
    let extract = format!("json_extract(body, '{}')", field.path.as_str());
    let expr = match field.field_type {
        FieldType::Json => extract,
        _ => format!("CAST({extract} AS {ty})"),
    };
    format!("\"{column}\" {ty} GENERATED ALWAYS AS ({expr}) VIRTUAL")
}

/// Produces the DDL reconciling `table` with `schema`.
///
/// `existing_columns` is the live column list (empty when the table does
/// not exist yet). Statements come out in execution order: the table first,
/// then column additions, then indexes.
pub fn collection_ddl(table: &str, schema: &Schema, existing_columns: &[String]) -> Vec<String> {
    let mut statements = Vec::new();

    if existing_columns.is_empty() {
        let mut columns = vec![
            "id TEXT PRIMARY KEY".to_string(),
            "body TEXT NOT NULL".to_string(),
        ];
        if schema.timestamps() {
            columns.push("created_at INTEGER".to_string());
            columns.push("updated_at INTEGER".to_string());
        }
        for field in schema.fields() {
            columns.push(column_def(field));
        }
        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" ({})",
            columns.join(", ")
        ));
    } else {
        for field in schema.fields() {
            if !existing_columns.iter().any(|c| *c == field_column(&field.name)) {
                statements.push(format!(
                    "ALTER TABLE \"{table}\" ADD COLUMN {}",
                    column_def(field)
                ));
            }
        }
        if schema.timestamps() && !existing_columns.iter().any(|c| c == "created_at") {
            statements.push(format!("ALTER TABLE \"{table}\" ADD COLUMN created_at INTEGER"));
            statements.push(format!("ALTER TABLE \"{table}\" ADD COLUMN updated_at INTEGER"));
        }
    }

    for field in schema.fields() {
        let column = field_column(&field.name);
        if field.unique {
            statements.push(format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS \"uidx_{table}_{name}\" ON \"{table}\" (\"{column}\")",
                name = field.name,
            ));
        } else if field.indexed {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS \"idx_{table}_{name}\" ON \"{table}\" (\"{column}\")",
                name = field.name,
            ));
        }
    }

    for index in schema.compound_indexes() {
        let columns = index
            .fields
            .iter()
            .map(|f| format!("\"{}\"", field_column(f)))
            .collect::<Vec<_>>()
            .join(", ");
        let unique = if index.unique { "UNIQUE " } else { "" };
        statements.push(format!(
            "CREATE {unique}INDEX IF NOT EXISTS \"idx_{table}_{name}\" ON \"{table}\" ({columns})",
            name = index.name,
        ));
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use reldoc_core::schema::{CompoundIndex, FieldDef};

    fn user_schema() -> Schema {
        Schema::builder()
            .add_field(FieldDef::new("email", FieldType::Text).unique())
            .add_field(FieldDef::new("age", FieldType::Integer).indexed())
            .add_field(FieldDef::new("city", FieldType::Text).path("$.profile.city").indexed())
            .add_compound_index(CompoundIndex::new("age_city", ["age", "city"]))
            .timestamps(true)
            .build()
            .unwrap()
    }

    #[test]
    fn fresh_table_carries_generated_columns() {
        let ddl = collection_ddl("users", &user_schema(), &[]);
        assert!(ddl[0].starts_with("CREATE TABLE IF NOT EXISTS \"users\""));
        assert!(ddl[0].contains("id TEXT PRIMARY KEY"));
        assert!(ddl[0].contains("created_at INTEGER"));
        assert!(ddl[0].contains(
            "\"f_age\" INTEGER GENERATED ALWAYS AS (CAST(json_extract(body, '$.age') AS INTEGER)) VIRTUAL"
        ));
        assert!(ddl[0].contains("json_extract(body, '$.profile.city')"));
    }

    #[test]
    fn unique_fields_get_unique_indexes() {
        let ddl = collection_ddl("users", &user_schema(), &[]);
        assert!(ddl
            .iter()
            .any(|s| s == "CREATE UNIQUE INDEX IF NOT EXISTS \"uidx_users_email\" ON \"users\" (\"f_email\")"));
        assert!(ddl
            .iter()
            .any(|s| s == "CREATE INDEX IF NOT EXISTS \"idx_users_age\" ON \"users\" (\"f_age\")"));
        assert!(ddl
            .iter()
            .any(|s| s == "CREATE INDEX IF NOT EXISTS \"idx_users_age_city\" ON \"users\" (\"f_age\", \"f_city\")"));
    }

    #[test]
    fn existing_table_only_gains_missing_columns() {
        let existing = vec![
            "id".to_string(),
            "body".to_string(),
            "created_at".to_string(),
            "updated_at".to_string(),
            "f_email".to_string(),
            "f_age".to_string(),
        ];
        let ddl = collection_ddl("users", &user_schema(), &existing);
        let alters: Vec<_> = ddl.iter().filter(|s| s.starts_with("ALTER TABLE")).collect();
        assert_eq!(alters.len(), 1);
        assert!(alters[0].contains("\"f_city\""));
    }

    #[test]
    fn replanning_same_schema_emits_no_alters() {
        let existing = vec![
            "id".to_string(),
            "body".to_string(),
            "created_at".to_string(),
            "updated_at".to_string(),
            "f_email".to_string(),
            "f_age".to_string(),
            "f_city".to_string(),
        ];
        let ddl = collection_ddl("users", &user_schema(), &existing);
        assert!(ddl.iter().all(|s| s.starts_with("CREATE") && s.contains("IF NOT EXISTS")));
    }
}
