//! Concurrent search across many (table, column) targets.
//!
//! One filtered similarity search runs per target, all concurrently on the
//! caller's task, sharing one borrowed store. A failing target contributes
//! zero results; it never aborts the other targets or the operation. A store
//! call that panics is caught and reported as that target's failure. Only
//! input validation can fail the call.
//!
//! Results are concatenated per target, in target-list order, each block in
//! its own ranking order. There is no re-ranking across targets.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{SearchTarget, StoredValueResult};
use crate::query::{build_similarity_query, ValueFilters};
use crate::schema::TenantNamespace;
use crate::search::execute;
use crate::store::ValueStore;
use crate::validate::{validate_parallel_input, SearchOptions};

pub const DEFAULT_LIMIT_PER_TARGET: i64 = 10;

/// A target whose search failed and was absorbed.
#[derive(Debug, Clone, Serialize)]
pub struct TargetFailure {
    pub target: SearchTarget,
    pub error: String,
}

/// Outcome of a fan-out: the merged results plus per-target failures.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FanOutReport {
    pub results: Vec<StoredValueResult>,
    pub failures: Vec<TargetFailure>,
}

/// Searches every target concurrently and concatenates the results.
///
/// `options.limit` is replaced by `limit_per_target` for each target search;
/// `options.similarity_threshold` applies to all of them.
pub async fn search_across_targets<S>(
    store: &S,
    data_source_id: &str,
    embedding: &[f32],
    targets: &[SearchTarget],
    limit_per_target: i64,
    options: &SearchOptions,
) -> Result<Vec<StoredValueResult>>
where
    S: ValueStore + ?Sized,
{
    let report = search_across_targets_with_report(
        store,
        data_source_id,
        embedding,
        targets,
        limit_per_target,
        options,
    )
    .await?;
    Ok(report.results)
}

/// Like [`search_across_targets`], also reporting which targets failed.
pub async fn search_across_targets_with_report<S>(
    store: &S,
    data_source_id: &str,
    embedding: &[f32],
    targets: &[SearchTarget],
    limit_per_target: i64,
    options: &SearchOptions,
) -> Result<FanOutReport>
where
    S: ValueStore + ?Sized,
{
    let (input, per_target) = validate_parallel_input(
        data_source_id,
        embedding,
        targets,
        limit_per_target,
    )
    .and_then(|input| {
        options.validate()?;
        let per_target = SearchOptions {
            limit: input.limit_per_target,
            ..*options
        };
        Ok((input, per_target))
    })
    .map_err(|e| e.context("Failed to search values across targets"))?;

    let namespace = TenantNamespace::for_data_source(&input.data_source_id);
    debug!(
        namespace = %namespace,
        targets = targets.len(),
        limit_per_target = input.limit_per_target,
        "fanning out stored value search"
    );

    let searches = targets.iter().map(|target| {
        let query = build_similarity_query(
            &namespace,
            &input.embedding,
            &per_target,
            &ValueFilters::for_target(target),
        );
        AssertUnwindSafe(async move { execute(store, &query).await })
            .catch_unwind()
            .map(flatten_outcome)
    });
    let outcomes = join_all(searches).await;

    let mut report = FanOutReport::default();
    for (target, outcome) in targets.iter().zip(outcomes) {
        match outcome {
            Ok(values) => report.results.extend(values),
            Err(e) => {
                warn!(
                    namespace = %namespace,
                    target = %target,
                    error = %e,
                    "search target failed, continuing with remaining targets"
                );
                report.failures.push(TargetFailure {
                    target: target.clone(),
                    error: e,
                });
            }
        }
    }

    Ok(report)
}

fn flatten_outcome(
    caught: std::result::Result<Result<Vec<StoredValueResult>>, Box<dyn Any + Send>>,
) -> std::result::Result<Vec<StoredValueResult>, String> {
    match caught {
        Ok(outcome) => outcome.map_err(|e| e.to_string()),
        Err(payload) => Err(panic_message(payload)),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("search panicked: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SimilarityQuery;
    use crate::store::memory::{MemoryValue, MemoryValueStore};
    use crate::validate::EMBEDDING_DIMS;
    use async_trait::async_trait;

    const ID: &str = "22222222-2222-2222-2222-222222222222";

    fn unit(i: usize) -> Vec<f32> {
        let mut v = vec![0.0; EMBEDDING_DIMS];
        v[i] = 1.0;
        v
    }

    fn store() -> MemoryValueStore {
        let store = MemoryValueStore::new();
        let ns = TenantNamespace::parse(ID).unwrap();
        let mut rows = Vec::new();
        for i in 0..5 {
            let user = format!("user{}", i);
            let order = format!("order{}", i);
            rows.push(MemoryValue::new("prod", "public", "users", "name", &user, unit(i)));
            rows.push(MemoryValue::new("prod", "public", "orders", "note", &order, unit(i)));
        }
        store.insert_values(&ns, rows).unwrap();
        store
    }

    #[tokio::test]
    async fn test_results_grouped_in_target_order() {
        let targets = vec![
            SearchTarget::new("prod", "public", "orders", "note"),
            SearchTarget::new("prod", "public", "users", "name"),
        ];
        let results = search_across_targets(
            &store(),
            ID,
            &unit(0),
            &targets,
            2,
            &SearchOptions::default(),
        )
        .await
        .unwrap();
        let tables: Vec<&str> = results.iter().map(|r| r.table_name.as_str()).collect();
        assert_eq!(tables, vec!["orders", "orders", "users", "users"]);
        assert_eq!(results[0].value, "order0");
        assert_eq!(results[2].value, "user0");
    }

    #[tokio::test]
    async fn test_limit_per_target_overrides_options_limit() {
        let targets = vec![SearchTarget::new("prod", "public", "users", "name")];
        let results = search_across_targets(
            &store(),
            ID,
            &unit(0),
            &targets,
            3,
            &SearchOptions::with_limit(1),
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_namespace_is_absorbed_per_target() {
        let targets = vec![SearchTarget::new("prod", "public", "users", "name")];
        let report = search_across_targets_with_report(
            &MemoryValueStore::new(),
            ID,
            &unit(0),
            &targets,
            3,
            &SearchOptions::default(),
        )
        .await
        .unwrap();
        assert!(report.results.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].target, targets[0]);
    }

    #[tokio::test]
    async fn test_validation_still_fails_whole_call() {
        let err = search_across_targets(
            &store(),
            ID,
            &unit(0),
            &[],
            3,
            &SearchOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(err.is_validation());

        let targets = vec![SearchTarget::new("prod", "public", "users", "name")];
        let err = search_across_targets(
            &store(),
            ID,
            &unit(0),
            &targets,
            3,
            &SearchOptions::default().threshold(2.0),
        )
        .await
        .unwrap_err();
        assert!(err.is_validation());
    }

    /// Panics on the `orders` table, delegates everything else.
    struct PanickingStore(MemoryValueStore);

    #[async_trait]
    impl ValueStore for PanickingStore {
        async fn fetch_values(
            &self,
            query: &SimilarityQuery,
        ) -> anyhow::Result<Vec<StoredValueResult>> {
            if query.filters.table_name.as_deref() == Some("orders") {
                panic!("row decoder blew up");
            }
            self.0.fetch_values(query).await
        }

        async fn values_table_exists(&self, namespace: &TenantNamespace) -> anyhow::Result<bool> {
            self.0.values_table_exists(namespace).await
        }
    }

    #[tokio::test]
    async fn test_panicking_target_is_absorbed() {
        let targets = vec![
            SearchTarget::new("prod", "public", "orders", "note"),
            SearchTarget::new("prod", "public", "users", "name"),
        ];
        let report = search_across_targets_with_report(
            &PanickingStore(store()),
            ID,
            &unit(0),
            &targets,
            2,
            &SearchOptions::default(),
        )
        .await
        .unwrap();

        let values: Vec<&str> = report.results.iter().map(|r| r.value.as_str()).collect();
        assert_eq!(values, vec!["user0", "user1"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].target, targets[0]);
        assert!(report.failures[0].error.contains("row decoder blew up"));
    }
}
