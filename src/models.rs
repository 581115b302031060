//! Core data models returned by the search operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The ranking signal attached to a search result.
///
/// A result carries either a raw distance (default ranking) or a similarity
/// (`1 - distance`, used when a threshold was requested), never both.
/// Serializes as a single `"distance"` or `"similarity"` field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Ranking {
    Distance(f64),
    Similarity(f64),
}

impl Ranking {
    pub fn distance(&self) -> Option<f64> {
        match self {
            Ranking::Distance(d) => Some(*d),
            Ranking::Similarity(_) => None,
        }
    }

    pub fn similarity(&self) -> Option<f64> {
        match self {
            Ranking::Similarity(s) => Some(*s),
            Ranking::Distance(_) => None,
        }
    }
}

/// One previously ingested column value matched by a search.
///
/// `schema_name` is the schema inside the source database, not the tenant
/// namespace the row is stored in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredValueResult {
    pub id: Uuid,
    pub value: String,
    pub database_name: String,
    pub column_name: String,
    pub table_name: String,
    pub schema_name: String,
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub ranking: Ranking,
}

/// A fully qualified column to search within a tenant namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchTarget {
    pub database_name: String,
    pub schema_name: String,
    pub table_name: String,
    pub column_name: String,
}

impl SearchTarget {
    pub fn new(
        database_name: impl Into<String>,
        schema_name: impl Into<String>,
        table_name: impl Into<String>,
        column_name: impl Into<String>,
    ) -> Self {
        Self {
            database_name: database_name.into(),
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            column_name: column_name.into(),
        }
    }
}

impl std::fmt::Display for SearchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.database_name, self.schema_name, self.table_name, self.column_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(ranking: Ranking) -> StoredValueResult {
        StoredValueResult {
            id: Uuid::nil(),
            value: "alice@example.com".to_string(),
            database_name: "prod".to_string(),
            column_name: "email".to_string(),
            table_name: "users".to_string(),
            schema_name: "public".to_string(),
            synced_at: None,
            ranking,
        }
    }

    #[test]
    fn test_ranking_serializes_one_field() {
        let json = serde_json::to_value(result(Ranking::Distance(0.25))).unwrap();
        assert_eq!(json["distance"], 0.25);
        assert!(json.get("similarity").is_none());

        let json = serde_json::to_value(result(Ranking::Similarity(0.75))).unwrap();
        assert_eq!(json["similarity"], 0.75);
        assert!(json.get("distance").is_none());
        assert_eq!(json["synced_at"], serde_json::Value::Null);
    }

    #[test]
    fn test_target_display() {
        let t = SearchTarget::new("prod", "public", "users", "email");
        assert_eq!(t.to_string(), "prod.public.users.email");
    }
}
