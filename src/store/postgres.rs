//! Postgres/pgvector-backed [`ValueStore`].
//!
//! Executes the SQL produced by the query builder verbatim, binding its
//! positional parameters in order. Every call is a single read statement on
//! a pooled connection; no transactions are opened.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::models::{Ranking, StoredValueResult};
use crate::query::{QueryParam, RankingMode, SimilarityQuery};
use crate::schema::{TenantNamespace, VALUES_TABLE};

use super::ValueStore;

/// Wraps a shared [`PgPool`]. The pool is owned by the caller; this store
/// only borrows connections for the duration of one statement.
#[derive(Clone)]
pub struct PgValueStore {
    pool: PgPool,
}

impl PgValueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_row(row: &PgRow, mode: RankingMode) -> Result<StoredValueResult> {
    let ranking = match mode {
        RankingMode::Distance => Ranking::Distance(row.try_get("distance")?),
        RankingMode::Similarity => Ranking::Similarity(row.try_get("similarity")?),
    };
    Ok(StoredValueResult {
        id: row.try_get::<Uuid, _>("id")?,
        value: row.try_get("value")?,
        database_name: row.try_get("database_name")?,
        column_name: row.try_get("column_name")?,
        table_name: row.try_get("table_name")?,
        schema_name: row.try_get("schema_name")?,
        synced_at: row.try_get::<Option<DateTime<Utc>>, _>("synced_at")?,
        ranking,
    })
}

#[async_trait]
impl ValueStore for PgValueStore {
    async fn fetch_values(&self, query: &SimilarityQuery) -> Result<Vec<StoredValueResult>> {
        let mut statement = sqlx::query(query.sql());
        for param in query.params() {
            statement = match param {
                QueryParam::Text(s) => statement.bind(s.as_str()),
                QueryParam::Int(i) => statement.bind(*i),
                QueryParam::Float(f) => statement.bind(*f),
            };
        }

        let rows = statement
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("query against schema '{}' failed", query.namespace))?;

        let mode = query.ranking_mode();
        rows.iter().map(|row| decode_row(row, mode)).collect()
    }

    async fn values_table_exists(&self, namespace: &TenantNamespace) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            ) AS table_exists
            "#,
        )
        .bind(namespace.as_str())
        .bind(VALUES_TABLE)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("catalog lookup for schema '{}' failed", namespace))?;

        Ok(row.try_get("table_exists")?)
    }
}
