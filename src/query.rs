//! Parameterized similarity-query construction.
//!
//! Builds the SQL text and positional parameter list for a search against a
//! tenant's `searchable_column_values` table. Construction is pure and never
//! fails; errors only surface when a [`ValueStore`](crate::store::ValueStore)
//! executes the query.
//!
//! # Parameter layout
//!
//! Parameters are appended in a fixed order so the placeholders in the text
//! and the parameter list always agree:
//!
//! | Position | Value |
//! |----------|-------|
//! | `$1` | embedding as a halfvec literal (`[0.1,0.2,...]`) |
//! | `$2` | limit |
//! | `$3..` | `database_name`, `schema_name`, `table_name`, `column_name` filters, if present |
//! | last | similarity threshold, when present |
//!
//! The tenant namespace is the only value written into the text itself, and
//! it can only come from [`TenantNamespace`].

use serde::{Deserialize, Serialize};

use crate::models::SearchTarget;
use crate::schema::TenantNamespace;
use crate::validate::{Embedding, SearchOptions};

/// A positional query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Text(String),
    Int(i64),
    Float(f64),
}

/// Which ranking signal a query selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingMode {
    /// `embedding <=> $1` ascending, no floor.
    Distance,
    /// `1 - (embedding <=> $1)` descending, at least the threshold.
    Similarity,
}

/// Exact-match restrictions on the stored value's origin column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueFilters {
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub schema_name: Option<String>,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub column_name: Option<String>,
}

impl ValueFilters {
    pub fn for_target(target: &SearchTarget) -> Self {
        Self {
            database_name: Some(target.database_name.clone()),
            schema_name: Some(target.schema_name.clone()),
            table_name: Some(target.table_name.clone()),
            column_name: Some(target.column_name.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.predicates().next().is_none()
    }

    /// Present filters as `(column, value)` pairs in binding order.
    pub fn predicates(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        [
            ("database_name", self.database_name.as_deref()),
            ("schema_name", self.schema_name.as_deref()),
            ("table_name", self.table_name.as_deref()),
            ("column_name", self.column_name.as_deref()),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.map(|v| (column, v)))
    }

    /// Whether a value originating from the given column passes every filter.
    pub fn matches(
        &self,
        database_name: &str,
        schema_name: &str,
        table_name: &str,
        column_name: &str,
    ) -> bool {
        self.predicates().all(|(column, expected)| {
            let actual = match column {
                "database_name" => database_name,
                "schema_name" => schema_name,
                "table_name" => table_name,
                _ => column_name,
            };
            actual == expected
        })
    }
}

/// A built similarity query: SQL text, parameters, and the structured
/// request they were built from.
#[derive(Debug, Clone)]
pub struct SimilarityQuery {
    pub namespace: TenantNamespace,
    pub embedding: Embedding,
    pub limit: i64,
    pub similarity_threshold: Option<f64>,
    pub filters: ValueFilters,
    sql: String,
    params: Vec<QueryParam>,
}

impl SimilarityQuery {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[QueryParam] {
        &self.params
    }

    pub fn ranking_mode(&self) -> RankingMode {
        if self.similarity_threshold.is_some() {
            RankingMode::Similarity
        } else {
            RankingMode::Distance
        }
    }
}

/// Excludes rows whose cosine distance is undefined.
const NAN_GUARD: &str = "(embedding <=> $1::halfvec) <> 'NaN'::float8";

/// Builds a similarity query over `namespace`.
///
/// Pass `ValueFilters::default()` for an unfiltered search. `options` is
/// expected to be validated already.
pub fn build_similarity_query(
    namespace: &TenantNamespace,
    embedding: &Embedding,
    options: &SearchOptions,
    filters: &ValueFilters,
) -> SimilarityQuery {
    let mut params = vec![
        QueryParam::Text(embedding.to_literal()),
        QueryParam::Int(options.limit),
    ];
    let mut conditions = Vec::new();

    for (column, value) in filters.predicates() {
        params.push(QueryParam::Text(value.to_string()));
        conditions.push(format!("{} = ${}", column, params.len()));
    }

    let (rank_expr, order_clause) = match options.similarity_threshold {
        Some(threshold) => {
            params.push(QueryParam::Float(threshold));
            conditions.push(format!(
                "1 - (embedding <=> $1::halfvec) >= ${}",
                params.len()
            ));
            // Postgres orders NaN above every float, so a zero-norm vector
            // would otherwise pass any threshold.
            conditions.push(NAN_GUARD.to_string());
            (
                "1 - (embedding <=> $1::halfvec) AS similarity",
                "ORDER BY similarity DESC",
            )
        }
        None => ("embedding <=> $1::halfvec AS distance", "ORDER BY distance ASC"),
    };

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}\n", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT id, value, database_name, column_name, table_name, schema_name, synced_at,\n       \
         {}\nFROM {}\n{}{}\nLIMIT $2",
        rank_expr,
        namespace.values_table(),
        where_clause,
        order_clause,
    );

    SimilarityQuery {
        namespace: namespace.clone(),
        embedding: embedding.clone(),
        limit: options.limit,
        similarity_threshold: options.similarity_threshold,
        filters: filters.clone(),
        sql,
        params,
    }
}
