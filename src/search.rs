//! Similarity search over one tenant namespace.
//!
//! [`search_by_embedding`] ranks every stored value of a data source;
//! [`search_by_embedding_with_filters`] restricts the ranking to values from
//! matching databases, schemas, tables, or columns. Both validate their
//! inputs first, build one query, and run it through [`execute`].
//!
//! # Ranking
//!
//! Without a similarity threshold, results come back by ascending cosine
//! distance with no floor. With a threshold, results carry a similarity
//! (`1 - distance`), come back by descending similarity, and every result
//! satisfies `similarity >= threshold`. The storage engine does the
//! ordering; results are never re-sorted here.

use tracing::{debug, warn};

use crate::error::{Result, StoredValuesError};
use crate::models::StoredValueResult;
use crate::query::{build_similarity_query, SimilarityQuery, ValueFilters};
use crate::schema::TenantNamespace;
use crate::store::ValueStore;
use crate::validate::{parse_data_source_id, validate_embedding, SearchOptions};

/// Runs one built query, wrapping any storage failure.
pub async fn execute<S>(store: &S, query: &SimilarityQuery) -> Result<Vec<StoredValueResult>>
where
    S: ValueStore + ?Sized,
{
    debug!(
        namespace = %query.namespace,
        limit = query.limit,
        threshold = ?query.similarity_threshold,
        filters = ?query.filters,
        params = query.params().len(),
        "executing stored value similarity search"
    );

    store.fetch_values(query).await.map_err(|e| {
        warn!(
            namespace = %query.namespace,
            error = %e,
            "stored value similarity search failed"
        );
        StoredValuesError::storage("similarity query failed", e)
    })
}

/// Searches all stored values of a data source by embedding similarity.
///
/// # Example
///
/// ```rust,no_run
/// # use stored_values::store::memory::MemoryValueStore;
/// # use stored_values::search::search_by_embedding;
/// # use stored_values::validate::SearchOptions;
/// # use stored_values::error::Result;
/// # async fn example(store: &MemoryValueStore, embedding: Vec<f32>) -> Result<()> {
/// let results = search_by_embedding(
///     store,
///     "cc3ef3bc-44ec-4a43-8dc4-681cae5c996a",
///     &embedding,
///     &SearchOptions::with_limit(10).threshold(0.7),
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn search_by_embedding<S>(
    store: &S,
    data_source_id: &str,
    embedding: &[f32],
    options: &SearchOptions,
) -> Result<Vec<StoredValueResult>>
where
    S: ValueStore + ?Sized,
{
    run_search(store, data_source_id, embedding, options, &ValueFilters::default())
        .await
        .map_err(|e| e.context("Failed to search values by embedding"))
}

/// Searches stored values restricted by exact-match origin filters.
///
/// Absent filters are not applied; with no filters at all this is the same
/// search as [`search_by_embedding`].
pub async fn search_by_embedding_with_filters<S>(
    store: &S,
    data_source_id: &str,
    embedding: &[f32],
    options: &SearchOptions,
    filters: &ValueFilters,
) -> Result<Vec<StoredValueResult>>
where
    S: ValueStore + ?Sized,
{
    run_search(store, data_source_id, embedding, options, filters)
        .await
        .map_err(|e| e.context("Failed to search values with filters"))
}

async fn run_search<S>(
    store: &S,
    data_source_id: &str,
    embedding: &[f32],
    options: &SearchOptions,
    filters: &ValueFilters,
) -> Result<Vec<StoredValueResult>>
where
    S: ValueStore + ?Sized,
{
    let id = parse_data_source_id(data_source_id)?;
    let embedding = validate_embedding(embedding)?;
    options.validate()?;

    let namespace = TenantNamespace::for_data_source(&id);
    let query = build_similarity_query(&namespace, &embedding, options, filters);
    execute(store, &query).await
}
