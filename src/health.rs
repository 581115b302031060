//! Tenant health check.

use tracing::{debug, warn};

use crate::error::{Result, StoredValuesError};
use crate::schema::TenantNamespace;
use crate::store::ValueStore;

/// Reports whether the data source's searchable-values table exists.
///
/// A missing table is `Ok(false)`. Connectivity and catalog failures are
/// returned as storage errors rather than reported as unhealthy.
pub async fn health_check<S>(store: &S, data_source_id: &str) -> Result<bool>
where
    S: ValueStore + ?Sized,
{
    let context = "Health check failed";
    let namespace = TenantNamespace::parse(data_source_id).map_err(|e| e.context(context))?;

    let exists = store.values_table_exists(&namespace).await.map_err(|e| {
        warn!(namespace = %namespace, error = %e, "health check query failed");
        StoredValuesError::storage(context, e)
    })?;

    debug!(namespace = %namespace, exists, "health check complete");
    Ok(exists)
}
