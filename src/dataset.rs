//! Search-target discovery from dataset definitions.
//!
//! A dataset definition names a database and lists its tables, each with a
//! schema and typed columns. Columns whose declared type looks like free
//! text (`text`, `char`, or `string` anywhere in the type name, any case)
//! become [`SearchTarget`]s.
//!
//! The output is advisory, so missing names fall back to fixed defaults
//! instead of failing. A field of the wrong shape (a mapping where a list is
//! expected, a number where a name is expected) counts as missing. Only input
//! that does not parse at all is an error. JSON input is accepted too, being
//! valid YAML.
//!
//! ```yaml
//! database: production
//! tables:
//!   - name: users
//!     schema: public
//!     columns:
//!       - { name: id, type: integer }
//!       - { name: email, type: varchar(255) }
//! ```

use serde_yaml::Value;

use crate::error::{ErrorKind, Result, StoredValuesError};
use crate::models::SearchTarget;
use crate::validate::validate_target;

pub const DEFAULT_DATABASE: &str = "unknown";
pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_TABLE: &str = "unknown_table";
pub const DEFAULT_COLUMN: &str = "unknown_column";

/// Whether a declared column type suggests free-text content.
pub fn is_searchable_type(data_type: &str) -> bool {
    let t = data_type.to_lowercase();
    t.contains("text") || t.contains("char") || t.contains("string")
}

/// A non-blank string field, or `None` for anything else.
fn str_field<'a>(node: &'a Value, key: &str) -> Option<&'a str> {
    node.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn seq_field<'a>(node: &'a Value, key: &str) -> &'a [Value] {
    node.get(key)
        .and_then(Value::as_sequence)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Walks a parsed definition and collects its free-text columns.
pub fn searchable_columns(definition: &Value) -> Vec<SearchTarget> {
    let database = str_field(definition, "database").unwrap_or(DEFAULT_DATABASE);
    let mut targets = Vec::new();

    for table in seq_field(definition, "tables") {
        let schema = str_field(table, "schema").unwrap_or(DEFAULT_SCHEMA);
        // Older definitions name the table under `table` instead of `name`.
        let table_name = str_field(table, "name")
            .or_else(|| str_field(table, "table"))
            .unwrap_or(DEFAULT_TABLE);

        for column in seq_field(table, "columns") {
            let searchable = column
                .get("type")
                .and_then(Value::as_str)
                .map(is_searchable_type)
                .unwrap_or(false);
            if !searchable {
                continue;
            }
            let column_name = str_field(column, "name").unwrap_or(DEFAULT_COLUMN);
            targets.push(SearchTarget::new(database, schema, table_name, column_name));
        }
    }

    targets
}

/// Parses a dataset definition and returns its free-text columns as targets.
pub fn extract_searchable_columns(content: &str) -> Result<Vec<SearchTarget>> {
    let definition: Value = serde_yaml::from_str(content).map_err(|e| {
        StoredValuesError::wrap(ErrorKind::Parse, "Failed to parse dataset YAML content", e)
    })?;
    let targets = searchable_columns(&definition);
    for target in &targets {
        validate_target(target).map_err(|e| e.context("Failed to parse dataset YAML content"))?;
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_text_columns() {
        let yaml = r#"
database: production
tables:
  - name: users
    schema: public
    columns:
      - name: id
        type: integer
      - name: bio
        type: text
"#;
        let targets = extract_searchable_columns(yaml).unwrap();
        assert_eq!(
            targets,
            vec![SearchTarget::new("production", "public", "users", "bio")]
        );
    }

    #[test]
    fn test_type_matching_case_insensitive() {
        for t in ["VARCHAR(255)", "Text", "character varying", "STRING", "nchar"] {
            assert!(is_searchable_type(t), "{} should be searchable", t);
        }
        for t in ["integer", "timestamp", "boolean", "numeric(10,2)", ""] {
            assert!(!is_searchable_type(t), "{} should not be searchable", t);
        }
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let yaml = r#"
tables:
  - columns:
      - type: string
  - table: legacy_orders
    schema: "  "
    columns:
      - name: note
        type: varchar
"#;
        let targets = extract_searchable_columns(yaml).unwrap();
        assert_eq!(
            targets,
            vec![
                SearchTarget::new("unknown", "public", "unknown_table", "unknown_column"),
                SearchTarget::new("unknown", "public", "legacy_orders", "note"),
            ]
        );
    }

    #[test]
    fn test_json_input() {
        let json = r#"{
            "database": "production",
            "tables": [{
                "name": "users",
                "schema": "public",
                "columns": [
                    {"name": "email", "type": "varchar(255)"},
                    {"name": "bio", "type": "text"},
                    {"name": "age", "type": "int"}
                ]
            }]
        }"#;
        let targets = extract_searchable_columns(json).unwrap();
        let columns: Vec<&str> = targets.iter().map(|t| t.column_name.as_str()).collect();
        assert_eq!(columns, vec!["email", "bio"]);
    }

    #[test]
    fn test_no_tables() {
        assert!(extract_searchable_columns("database: prod\n").unwrap().is_empty());
        assert!(extract_searchable_columns("database: prod\ntables: ~\n")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_wrong_shaped_fields_are_skipped() {
        assert!(extract_searchable_columns("database: prod\ntables: {}\n")
            .unwrap()
            .is_empty());
        assert!(extract_searchable_columns("tables: 42\n").unwrap().is_empty());
        assert!(extract_searchable_columns("just a string").unwrap().is_empty());

        let yaml = r#"
database: 7
tables:
  - name: notes
    columns: none
  - name: [not, a, name]
    schema: {}
    columns:
      - name: 12
        type: text
      - name: flag
        type: 3
      - "bare column"
  - 99
"#;
        let targets = extract_searchable_columns(yaml).unwrap();
        assert_eq!(
            targets,
            vec![SearchTarget::new("unknown", "public", "unknown_table", "unknown_column")]
        );
    }

    #[test]
    fn test_malformed_input_fails() {
        let err = extract_searchable_columns("tables: [unclosed").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.message().starts_with("Failed to parse dataset YAML content"));
    }
}
