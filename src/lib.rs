//! # Stored Values
//!
//! Semantic search over the column values ingested for each data source.
//!
//! Every data source owns a Postgres namespace `ds_<uuid with underscores>`
//! holding a `searchable_column_values` table: one row per distinct column
//! value, with its origin (database, schema, table, column) and a
//! 1536-dimensional embedding. This crate answers "which stored values are
//! semantically closest to this query?" against that table.
//!
//! ## Architecture
//!
//! ```text
//!  terms ──▶ ┌────────────┐  embedding  ┌──────────────┐   SQL   ┌────────────┐
//!            │ embedding  │────────────▶│ search       │────────▶│ ValueStore │
//!            │ (OpenAI)   │             │ fanout       │         │ pg / memory│
//!            └────────────┘             └──────────────┘         └────────────┘
//!                                              ▲
//!  dataset YAML ──▶ dataset ── targets ────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sv health <data-source-id>
//! sv search <data-source-id> customer email --limit 5
//! sv search-targets <data-source-id> acme --dataset ./dataset.yaml
//! sv serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`error`] | Crate error type and kinds |
//! | [`validate`] | Input contracts, limits, and option structs |
//! | [`models`] | Result and target types |
//! | [`schema`] | Tenant namespace naming |
//! | [`query`] | Similarity SQL construction |
//! | [`store`] | Storage backends (Postgres, in-memory) |
//! | [`search`] | Single-namespace similarity search |
//! | [`fanout`] | Concurrent multi-target search |
//! | [`embedding`] | Embedding providers and generation |
//! | [`health`] | Tenant table existence check |
//! | [`dataset`] | Searchable columns from dataset definitions |
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Postgres connection pool |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`server`] | HTTP API |

pub mod config;
pub mod dataset;
pub mod db;
pub mod embedding;
pub mod error;
pub mod fanout;
pub mod health;
pub mod logging;
pub mod models;
pub mod query;
pub mod schema;
pub mod search;
pub mod server;
pub mod store;
pub mod validate;
