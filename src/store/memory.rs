//! In-memory [`ValueStore`] implementation for tests and embedded use.
//!
//! Namespaces map to row lists behind `std::sync::RwLock`. Similarity is
//! brute-force cosine distance over all rows of the namespace, matching
//! pgvector's `<=>` operator (including `NaN` for zero-norm vectors).
//! Querying a namespace that was never created fails, as a missing relation
//! does in Postgres.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Ranking, StoredValueResult};
use crate::query::{RankingMode, SimilarityQuery};
use crate::schema::TenantNamespace;

use super::ValueStore;

/// One row of a namespace's `searchable_column_values` table.
#[derive(Debug, Clone)]
pub struct MemoryValue {
    pub id: Uuid,
    pub value: String,
    pub database_name: String,
    pub schema_name: String,
    pub table_name: String,
    pub column_name: String,
    pub synced_at: Option<DateTime<Utc>>,
    pub embedding: Vec<f32>,
}

impl MemoryValue {
    pub fn new(
        database_name: &str,
        schema_name: &str,
        table_name: &str,
        column_name: &str,
        value: &str,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            value: value.to_string(),
            database_name: database_name.to_string(),
            schema_name: schema_name.to_string(),
            table_name: table_name.to_string(),
            column_name: column_name.to_string(),
            synced_at: Some(Utc::now()),
            embedding,
        }
    }
}

#[derive(Default)]
pub struct MemoryValueStore {
    namespaces: RwLock<HashMap<TenantNamespace, Vec<MemoryValue>>>,
}

impl MemoryValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the namespace's values table if it does not exist yet.
    pub fn create_namespace(&self, namespace: &TenantNamespace) -> Result<()> {
        let mut namespaces = self
            .namespaces
            .write()
            .map_err(|_| anyhow!("value store lock poisoned"))?;
        namespaces.entry(namespace.clone()).or_default();
        Ok(())
    }

    /// Appends rows to a namespace, creating it when needed.
    pub fn insert_values(
        &self,
        namespace: &TenantNamespace,
        values: impl IntoIterator<Item = MemoryValue>,
    ) -> Result<()> {
        let mut namespaces = self
            .namespaces
            .write()
            .map_err(|_| anyhow!("value store lock poisoned"))?;
        namespaces
            .entry(namespace.clone())
            .or_default()
            .extend(values);
        Ok(())
    }

    pub fn drop_namespace(&self, namespace: &TenantNamespace) -> Result<bool> {
        let mut namespaces = self
            .namespaces
            .write()
            .map_err(|_| anyhow!("value store lock poisoned"))?;
        Ok(namespaces.remove(namespace).is_some())
    }
}

/// Cosine distance as computed by pgvector: `1 - cos(a, b)`, `NaN` when
/// either vector has zero norm.
fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return f64::NAN;
    }

    1.0 - (dot / denom)
}

#[async_trait]
impl ValueStore for MemoryValueStore {
    async fn fetch_values(&self, query: &SimilarityQuery) -> Result<Vec<StoredValueResult>> {
        let namespaces = self
            .namespaces
            .read()
            .map_err(|_| anyhow!("value store lock poisoned"))?;
        let rows = match namespaces.get(&query.namespace) {
            Some(rows) => rows,
            None => bail!(
                "relation \"{}\" does not exist",
                query.namespace.values_table()
            ),
        };

        let needle = query.embedding.as_slice();
        let mut scored: Vec<(f64, &MemoryValue)> = rows
            .iter()
            .filter(|row| {
                query.filters.matches(
                    &row.database_name,
                    &row.schema_name,
                    &row.table_name,
                    &row.column_name,
                )
            })
            .map(|row| (cosine_distance(needle, &row.embedding), row))
            .collect();

        let mode = query.ranking_mode();
        if let Some(threshold) = query.similarity_threshold {
            scored.retain(|(distance, _)| !distance.is_nan() && 1.0 - distance >= threshold);
        }
        // NaN distances sort last, as in Postgres.
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(query.limit.max(0) as usize);

        Ok(scored
            .into_iter()
            .map(|(distance, row)| StoredValueResult {
                id: row.id,
                value: row.value.clone(),
                database_name: row.database_name.clone(),
                column_name: row.column_name.clone(),
                table_name: row.table_name.clone(),
                schema_name: row.schema_name.clone(),
                synced_at: row.synced_at,
                ranking: match mode {
                    RankingMode::Distance => Ranking::Distance(distance),
                    RankingMode::Similarity => Ranking::Similarity(1.0 - distance),
                },
            })
            .collect())
    }

    async fn values_table_exists(&self, namespace: &TenantNamespace) -> Result<bool> {
        let namespaces = self
            .namespaces
            .read()
            .map_err(|_| anyhow!("value store lock poisoned"))?;
        Ok(namespaces.contains_key(namespace))
    }
}
