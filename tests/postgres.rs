//! Runs against a real pgvector database.
//!
//! Set `STORED_VALUES_TEST_DATABASE_URL` to enable; every test returns early
//! otherwise. Each test creates its own tenant namespace and drops it after.

use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use stored_values::fanout::search_across_targets_with_report;
use stored_values::health::health_check;
use stored_values::models::SearchTarget;
use stored_values::query::ValueFilters;
use stored_values::schema::TenantNamespace;
use stored_values::search::{search_by_embedding, search_by_embedding_with_filters};
use stored_values::store::postgres::PgValueStore;
use stored_values::validate::{SearchOptions, EMBEDDING_DIMS};

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("STORED_VALUES_TEST_DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .unwrap();
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(&pool)
        .await
        .unwrap();
    Some(pool)
}

fn axis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIMS];
    v[i] = 1.0;
    v
}

fn literal(v: &[f32]) -> String {
    let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// Creates a tenant with `users.email` and `orders.note` values.
async fn create_tenant(pool: &PgPool) -> (String, TenantNamespace) {
    let id = Uuid::new_v4();
    let ns = TenantNamespace::for_data_source(&id);

    sqlx::query(&format!("CREATE SCHEMA \"{}\"", ns))
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(&format!(
        r#"CREATE TABLE {} (
            id uuid PRIMARY KEY,
            value text NOT NULL,
            database_name text NOT NULL,
            schema_name text NOT NULL,
            table_name text NOT NULL,
            column_name text NOT NULL,
            synced_at timestamptz,
            embedding halfvec(1536) NOT NULL
        )"#,
        ns.values_table()
    ))
    .execute(pool)
    .await
    .unwrap();

    let rows = [
        ("users", "email", "alice@example.com", axis(0)),
        ("users", "email", "bob@example.com", axis(1)),
        ("orders", "note", "rush delivery", axis(0)),
    ];
    for (table, column, value, embedding) in rows {
        sqlx::query(&format!(
            "INSERT INTO {} (id, value, database_name, schema_name, table_name, column_name, \
             synced_at, embedding) VALUES ($1, $2, 'prod', 'public', $3, $4, now(), $5::halfvec)",
            ns.values_table()
        ))
        .bind(Uuid::new_v4())
        .bind(value)
        .bind(table)
        .bind(column)
        .bind(literal(&embedding))
        .execute(pool)
        .await
        .unwrap();
    }

    (id.to_string(), ns)
}

async fn drop_tenant(pool: &PgPool, ns: &TenantNamespace) {
    sqlx::query(&format!("DROP SCHEMA \"{}\" CASCADE", ns))
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_pg_search_and_filters() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let (id, ns) = create_tenant(&pool).await;
    let store = PgValueStore::new(pool.clone());

    let results = search_by_embedding(&store, &id, &axis(0), &SearchOptions::with_limit(10))
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0].ranking.distance().unwrap() < 1e-3);
    assert!(results[0].synced_at.is_some());

    let options = SearchOptions::with_limit(10).threshold(0.9);
    let results = search_by_embedding(&store, &id, &axis(0), &options)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.ranking.similarity().unwrap() >= 0.9));

    let filters = ValueFilters {
        table_name: Some("users".to_string()),
        ..ValueFilters::default()
    };
    let results = search_by_embedding_with_filters(
        &store,
        &id,
        &axis(0),
        &SearchOptions::with_limit(10),
        &filters,
    )
    .await
    .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].value, "alice@example.com");

    drop_tenant(&pool, &ns).await;
}

#[tokio::test]
async fn test_pg_health_and_fanout() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let (id, ns) = create_tenant(&pool).await;
    let store = PgValueStore::new(pool.clone());

    assert!(health_check(&store, &id).await.unwrap());
    assert!(!health_check(&store, &Uuid::new_v4().to_string()).await.unwrap());

    let targets = vec![
        SearchTarget::new("prod", "public", "users", "email"),
        SearchTarget::new("prod", "public", "orders", "note"),
    ];
    let report = search_across_targets_with_report(
        &store,
        &id,
        &axis(0),
        &targets,
        1,
        &SearchOptions::default(),
    )
    .await
    .unwrap();
    let values: Vec<&str> = report.results.iter().map(|r| r.value.as_str()).collect();
    assert_eq!(values, vec!["alice@example.com", "rush delivery"]);
    assert!(report.failures.is_empty());

    drop_tenant(&pool, &ns).await;

    // The namespace is gone: every target fails, the fan-out still succeeds.
    let report = search_across_targets_with_report(
        &store,
        &id,
        &axis(0),
        &targets,
        1,
        &SearchOptions::default(),
    )
    .await
    .unwrap();
    assert!(report.results.is_empty());
    assert_eq!(report.failures.len(), 2);
}

#[tokio::test]
async fn test_pg_zero_embedding_never_passes_threshold() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let (id, ns) = create_tenant(&pool).await;
    let store = PgValueStore::new(pool.clone());
    let zero = vec![0.0; EMBEDDING_DIMS];

    // Every distance is NaN against a zero query vector.
    for threshold in [0.9, 0.0] {
        let options = SearchOptions::with_limit(10).threshold(threshold);
        let results = search_by_embedding(&store, &id, &zero, &options)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    // Distance ranking still returns the rows.
    let results = search_by_embedding(&store, &id, &zero, &SearchOptions::with_limit(10))
        .await
        .unwrap();
    assert_eq!(results.len(), 3);

    drop_tenant(&pool, &ns).await;
}
