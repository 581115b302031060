//! Tenant namespace naming.
//!
//! Every data source stores its searchable values in its own Postgres schema,
//! named `ds_<uuid with hyphens replaced by underscores>`. A
//! [`TenantNamespace`] can only be built from a parsed UUID, so its text is
//! always a safe SQL identifier and can be interpolated into query text.

use std::fmt;
use uuid::Uuid;

use crate::error::Result;
use crate::validate::parse_data_source_id;

pub const NAMESPACE_PREFIX: &str = "ds_";

/// The single table of searchable values inside each tenant namespace.
pub const VALUES_TABLE: &str = "searchable_column_values";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantNamespace(String);

impl TenantNamespace {
    pub fn for_data_source(data_source_id: &Uuid) -> Self {
        let id = data_source_id.hyphenated().to_string().replace('-', "_");
        Self(format!("{}{}", NAMESPACE_PREFIX, id))
    }

    /// Validates `raw` as a data-source UUID and derives its namespace.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(Self::for_data_source(&parse_data_source_id(raw)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recovers the data-source UUID this namespace was derived from.
    pub fn data_source_id(&self) -> Option<Uuid> {
        let id = self.0.strip_prefix(NAMESPACE_PREFIX)?.replace('_', "-");
        Uuid::parse_str(&id).ok()
    }

    /// Quoted `"schema"."searchable_column_values"` reference for query text.
    pub fn values_table(&self) -> String {
        format!("\"{}\".\"{}\"", self.0, VALUES_TABLE)
    }
}

impl fmt::Display for TenantNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_format() {
        let ns = TenantNamespace::parse("cc3ef3bc-44ec-4a43-8dc4-681cae5c996a").unwrap();
        assert_eq!(ns.as_str(), "ds_cc3ef3bc_44ec_4a43_8dc4_681cae5c996a");
        assert_eq!(
            ns.values_table(),
            "\"ds_cc3ef3bc_44ec_4a43_8dc4_681cae5c996a\".\"searchable_column_values\""
        );
    }

    #[test]
    fn test_namespace_is_lowercase_identifier() {
        let ns = TenantNamespace::parse("CC3EF3BC-44EC-4A43-8DC4-681CAE5C996A").unwrap();
        assert_eq!(ns.as_str(), "ds_cc3ef3bc_44ec_4a43_8dc4_681cae5c996a");
        assert!(ns
            .as_str()
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
    }

    #[test]
    fn test_namespace_roundtrip() {
        let id = Uuid::new_v4();
        let ns = TenantNamespace::for_data_source(&id);
        assert_eq!(ns.data_source_id(), Some(id));
    }

    #[test]
    fn test_namespace_rejects_invalid_id() {
        let err = TenantNamespace::parse("x\"; DROP SCHEMA public; --").unwrap_err();
        assert!(err.is_validation());
    }
}
