//! Storage abstraction for stored-values search.
//!
//! The [`ValueStore`] trait is the only way the search operations reach the
//! storage engine. Two backends ship with the crate:
//!
//! - [`postgres::PgValueStore`] executes the built SQL against a pgvector
//!   database through a shared `sqlx` pool.
//! - [`memory::MemoryValueStore`] evaluates the same query semantics in
//!   process, for tests and for embedding the engine without Postgres.
//!
//! Implementations must be `Send + Sync`; one store is shared by every
//! concurrent search of a fan-out.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::StoredValueResult;
use crate::query::SimilarityQuery;
use crate::schema::TenantNamespace;

#[async_trait]
pub trait ValueStore: Send + Sync {
    /// Runs one similarity query and returns its rows in ranking order.
    ///
    /// An empty result set is `Ok(vec![])`, not an error.
    async fn fetch_values(&self, query: &SimilarityQuery) -> Result<Vec<StoredValueResult>>;

    /// Whether the namespace's `searchable_column_values` table exists.
    async fn values_table_exists(&self, namespace: &TenantNamespace) -> Result<bool>;
}

#[async_trait]
impl<T: ValueStore + ?Sized> ValueStore for std::sync::Arc<T> {
    async fn fetch_values(&self, query: &SimilarityQuery) -> Result<Vec<StoredValueResult>> {
        (**self).fetch_values(query).await
    }

    async fn values_table_exists(&self, namespace: &TenantNamespace) -> Result<bool> {
        (**self).values_table_exists(namespace).await
    }
}
