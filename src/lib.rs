//! # Clarion
//!
//! A deduplicating store and typo-tolerant search engine for clarification
//! records: the rows of a project tracker sheet describing a scenario, its
//! status, who raised it and who addressed it.
//!
//! The pure pieces (models, hashing, keyword extraction, ranking,
//! highlighting, suggestions, filters, the cache) live in `clarion-core`.
//! This crate adds the SQLite store, configuration, the import boundary,
//! the CLI commands, and the HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Sheet export│──▶│ Hash + dedup │──▶│  SQLite  │
//! │   (JSON)    │   │  + keywords  │   │ records  │
//! └─────────────┘   └──────────────┘   └────┬─────┘
//!                                           │
//!                       ┌───────────────────┤
//!                       ▼                   ▼
//!                  ┌──────────┐       ┌──────────┐
//!                  │   CLI    │       │   HTTP   │
//!                  │(clarion) │       │  (axum)  │
//!                  └──────────┘       └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | `RecordStore` backed by SQLite |
//! | [`import`] | Sheet export parsing and header mapping |
//! | [`ingest`] | Batch upload |
//! | [`records`] | Single-record save, lookup and listing |
//! | [`export`] | CSV export of filtered records |
//! | [`search`] | Cached search service |
//! | [`stats`] | Statistics and upload history |
//! | [`ask`] | Intent-gated search for free-form messages |
//! | [`server`] | HTTP server |
//! | [`logging`] | Tracing subscriber setup |

pub mod ask;
pub mod config;
pub mod db;
pub mod export;
pub mod import;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod records;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod stats;
