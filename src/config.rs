//! TOML configuration for the `sv` binary and HTTP server.
//!
//! Only `[db]` is required; every other section has defaults. See
//! `config/sv.example.toml` for a complete file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::fanout::DEFAULT_LIMIT_PER_TARGET;
use crate::validate::{DEFAULT_LIMIT, EMBEDDING_DIMS, MAX_LIMIT, MAX_RETRIES};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// Postgres connection URL. Falls back to `DATABASE_URL` when unset.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}
fn default_acquire_timeout_secs() -> u64 {
    30
}

impl DbConfig {
    pub fn resolve_url(&self) -> Result<String> {
        match &self.url {
            Some(url) => Ok(url.clone()),
            None => std::env::var("DATABASE_URL")
                .context("db.url is not set and DATABASE_URL is not in the environment"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            base_url: default_base_url(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    EMBEDDING_DIMS
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: i64,
    #[serde(default = "default_limit_per_target")]
    pub default_limit_per_target: i64,
    /// Caller-level timeout around each search, in seconds.
    #[serde(default)]
    pub query_timeout_secs: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            default_limit_per_target: default_limit_per_target(),
            query_timeout_secs: None,
        }
    }
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

fn default_limit_per_target() -> i64 {
    DEFAULT_LIMIT_PER_TARGET
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parses and validates configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be >= 1");
    }

    for (name, limit) in [
        ("search.default_limit", config.search.default_limit),
        (
            "search.default_limit_per_target",
            config.search.default_limit_per_target,
        ),
    ] {
        if !(1..=MAX_LIMIT).contains(&limit) {
            anyhow::bail!("{} must be in [1, {}]", name, MAX_LIMIT);
        }
    }

    if config.search.query_timeout_secs == Some(0) {
        anyhow::bail!("search.query_timeout_secs must be > 0");
    }

    if config.embedding.max_retries > MAX_RETRIES {
        anyhow::bail!("embedding.max_retries must be in [0, {}]", MAX_RETRIES);
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.embedding.is_enabled() && config.embedding.dims != EMBEDDING_DIMS {
        anyhow::bail!(
            "embedding.dims must be {} when provider is '{}'",
            EMBEDDING_DIMS,
            config.embedding.provider
        );
    }

    match config.logging.level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => anyhow::bail!("Unknown logging.level: '{}'", other),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse_config("[db]\nurl = \"postgres://localhost/sv\"\n").unwrap();
        assert_eq!(config.db.max_connections, 10);
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.embedding.dims, 1536);
        assert_eq!(config.embedding.max_retries, 3);
        assert_eq!(config.search.default_limit, DEFAULT_LIMIT);
        assert_eq!(config.search.default_limit_per_target, DEFAULT_LIMIT_PER_TARGET);
        assert_eq!(config.search.query_timeout_secs, None);
        assert_eq!(config.server.bind, "127.0.0.1:7340");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_full_config() {
        let config = parse_config(
            r#"
[db]
url = "postgres://localhost/sv"
max_connections = 4

[embedding]
provider = "openai"
max_retries = 5

[search]
default_limit = 25
query_timeout_secs = 15

[server]
bind = "0.0.0.0:9000"

[logging]
level = "debug"
"#,
        )
        .unwrap();
        assert_eq!(config.db.max_connections, 4);
        assert!(config.embedding.is_enabled());
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.search.default_limit, 25);
        assert_eq!(config.search.default_limit_per_target, DEFAULT_LIMIT_PER_TARGET);
        assert_eq!(config.search.query_timeout_secs, Some(15));
    }

    #[test]
    fn test_rejects_bad_values() {
        let base = "[db]\nurl = \"postgres://x\"\n";
        for extra in [
            "[search]\ndefault_limit = 0\n",
            "[search]\ndefault_limit_per_target = 1001\n",
            "[search]\nquery_timeout_secs = 0\n",
            "[embedding]\nmax_retries = 11\n",
            "[embedding]\nprovider = \"cohere\"\n",
            "[embedding]\nprovider = \"openai\"\ndims = 768\n",
            "[logging]\nlevel = \"loud\"\n",
        ] {
            let text = format!("{}{}", base, extra);
            assert!(parse_config(&text).is_err(), "should reject: {}", extra);
        }
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/sv.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
