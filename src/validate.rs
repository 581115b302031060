//! Input contracts for every public operation.
//!
//! Each operation validates all of its inputs here before touching the
//! storage engine or the embedding provider. Failures are reported as
//! [`ErrorKind::Validation`](crate::error::ErrorKind::Validation) errors;
//! nothing is silently clamped. The only defaults are the documented ones
//! (`limit = 10`, `max_retries = 3`).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Result, StoredValuesError};
use crate::models::SearchTarget;

/// Dimensionality of every stored and query embedding.
pub const EMBEDDING_DIMS: usize = 1536;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 1000;
pub const MAX_TARGETS: usize = 100;
pub const MAX_SEARCH_TERMS: usize = 100;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const MAX_RETRIES: u32 = 10;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Parses a data-source identifier.
///
/// Only the canonical hyphenated form (`8-4-4-4-12`) is accepted; the simple,
/// braced, and URN forms that `Uuid::parse_str` also understands are not.
pub fn parse_data_source_id(raw: &str) -> Result<Uuid> {
    let is_hyphenated = raw.len() == 36
        && raw
            .char_indices()
            .all(|(i, c)| matches!(i, 8 | 13 | 18 | 23) == (c == '-'));
    if !is_hyphenated {
        return Err(StoredValuesError::validation(format!(
            "Invalid data source id '{}': expected a hyphenated UUID",
            raw
        )));
    }
    Uuid::parse_str(raw).map_err(|e| {
        StoredValuesError::validation(format!("Invalid data source id '{}': {}", raw, e))
    })
}

/// A query embedding that has passed the length and finiteness checks.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// Renders the vector as a pgvector text literal: `[0.1,0.2,...]`.
    pub fn to_literal(&self) -> String {
        let mut literal = String::with_capacity(self.0.len() * 8 + 2);
        literal.push('[');
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                literal.push(',');
            }
            literal.push_str(&v.to_string());
        }
        literal.push(']');
        literal
    }
}

/// Checks that `values` has exactly [`EMBEDDING_DIMS`] finite entries.
pub fn validate_embedding(values: &[f32]) -> Result<Embedding> {
    if values.len() != EMBEDDING_DIMS {
        return Err(StoredValuesError::validation(format!(
            "Embedding must have exactly {} dimensions, got {}",
            EMBEDDING_DIMS,
            values.len()
        )));
    }
    if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
        return Err(StoredValuesError::validation(format!(
            "Embedding contains a non-finite value at index {}",
            pos
        )));
    }
    Ok(Embedding(values.to_vec()))
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

/// Options for a single similarity search.
///
/// Setting `similarity_threshold` switches ranking from ascending distance
/// to descending similarity with a floor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            similarity_threshold: None,
        }
    }
}

impl SearchOptions {
    pub fn with_limit(limit: i64) -> Self {
        Self {
            limit,
            similarity_threshold: None,
        }
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_limit("limit", self.limit)?;
        if let Some(threshold) = self.similarity_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(StoredValuesError::validation(format!(
                    "similarityThreshold must be between 0 and 1, got {}",
                    threshold
                )));
            }
        }
        Ok(())
    }
}

fn validate_limit(name: &str, limit: i64) -> Result<()> {
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(StoredValuesError::validation(format!(
            "{} must be between 1 and {}, got {}",
            name, MAX_LIMIT, limit
        )));
    }
    Ok(())
}

/// Options for [`generate_embedding`](crate::embedding::generate_embedding).
#[derive(Debug, Clone)]
pub struct EmbeddingOptions {
    /// Retries after the first attempt, on transient provider failures only.
    pub max_retries: u32,
    /// Cancels the in-flight provider call and any pending backoff.
    pub cancel: Option<CancellationToken>,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub initial_backoff: Duration,
}

impl Default for EmbeddingOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            cancel: None,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }
}

impl EmbeddingOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries > MAX_RETRIES {
            return Err(StoredValuesError::validation(format!(
                "maxRetries must be between 0 and {}, got {}",
                MAX_RETRIES, self.max_retries
            )));
        }
        Ok(())
    }
}

/// Validates search terms and returns them trimmed.
pub fn validate_search_terms(terms: &[String]) -> Result<Vec<String>> {
    if terms.is_empty() || terms.len() > MAX_SEARCH_TERMS {
        return Err(StoredValuesError::validation(format!(
            "Search terms must contain between 1 and {} entries, got {}",
            MAX_SEARCH_TERMS,
            terms.len()
        )));
    }
    terms
        .iter()
        .enumerate()
        .map(|(i, term)| {
            let trimmed = term.trim();
            if trimmed.is_empty() {
                Err(StoredValuesError::validation(format!(
                    "Search term at index {} is empty",
                    i
                )))
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect()
}

pub fn validate_target(target: &SearchTarget) -> Result<()> {
    let fields = [
        ("database_name", &target.database_name),
        ("schema_name", &target.schema_name),
        ("table_name", &target.table_name),
        ("column_name", &target.column_name),
    ];
    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(StoredValuesError::validation(format!(
                "Search target {} must not be empty",
                name
            )));
        }
    }
    Ok(())
}

/// Validated input of a fan-out search, checked as one unit.
#[derive(Debug, Clone)]
pub struct ParallelSearchInput {
    pub data_source_id: Uuid,
    pub embedding: Embedding,
    pub limit_per_target: i64,
}

pub fn validate_parallel_input(
    data_source_id: &str,
    embedding: &[f32],
    targets: &[SearchTarget],
    limit_per_target: i64,
) -> Result<ParallelSearchInput> {
    let data_source_id = parse_data_source_id(data_source_id)?;
    let embedding = validate_embedding(embedding)?;
    if targets.is_empty() || targets.len() > MAX_TARGETS {
        return Err(StoredValuesError::validation(format!(
            "Targets must contain between 1 and {} entries, got {}",
            MAX_TARGETS,
            targets.len()
        )));
    }
    for target in targets {
        validate_target(target)?;
    }
    validate_limit("limitPerTarget", limit_per_target)?;
    Ok(ParallelSearchInput {
        data_source_id,
        embedding,
        limit_per_target,
    })
}
