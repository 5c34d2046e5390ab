//! # Clarion Core
//!
//! Shared logic for Clarion: the clarification record schema, content
//! hashing, keyword extraction, the deduplicating ingestion orchestrator,
//! and the fuzzy search engine with highlighting and suggestions.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Persistence is
//! reached through the [`store::RecordStore`] trait; an in-memory
//! implementation lives in [`store::memory`].
//!
//! ## Data flow
//!
//! ```text
//! draft ──▶ normalize ──▶ keywords ──▶ row hash ──▶ dedupe ──▶ RecordStore
//!
//! query ──▶ normalize/correct ──▶ fuzzy score ──▶ rank ──▶ highlight ──▶ suggest
//! ```

pub mod cache;
pub mod filter;
pub mod hash;
pub mod highlight;
pub mod ingest;
pub mod intent;
pub mod keywords;
pub mod models;
pub mod search;
pub mod store;
pub mod suggest;
