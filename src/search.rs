//! Search over stored records.
//!
//! [`SearchService`] loads the corpus from the record store on every
//! uncached call and runs the fuzzy engine on a blocking thread. Responses
//! are cached per normalized query and `top_k` for `[cache].ttl_secs`;
//! callers that write to the store must call
//! [`invalidate`](SearchService::invalidate).

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use clarion_core::cache::{Clock, SearchCache, SystemClock};
use clarion_core::models::{RecordField, SearchResponse};
use clarion_core::search::SearchEngine;
use clarion_core::store::RecordStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub struct SearchService {
    store: Arc<dyn RecordStore>,
    engine: SearchEngine,
    default_top_k: usize,
    max_query_chars: usize,
    cache: Mutex<SearchCache>,
}

/// Cut `query` to at most `max_chars` characters.
fn clamp_query(query: &str, max_chars: usize) -> &str {
    match query.char_indices().nth(max_chars) {
        Some((end, _)) => &query[..end],
        None => query,
    }
}

impl SearchService {
    pub fn new(config: &Config, store: Arc<dyn RecordStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: &Config, store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            engine: SearchEngine::new(config.search.engine_config()),
            default_top_k: config.search.top_k,
            max_query_chars: config.search.max_query_chars,
            cache: Mutex::new(SearchCache::new(
                Duration::from_secs(config.cache.ttl_secs),
                config.cache.max_entries,
                clock,
            )),
        }
    }

    /// Run a query. An empty query returns an empty response without
    /// reading the store. Queries longer than `[search].max_query_chars`
    /// are truncated.
    pub async fn search(&self, query: &str, top_k: Option<usize>) -> Result<SearchResponse> {
        let query = clamp_query(query, self.max_query_chars);
        if query.trim().is_empty() {
            return Ok(SearchResponse::default());
        }
        let top_k = top_k.unwrap_or(self.default_top_k).max(1);

        let mut generation = None;
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(query, top_k) {
                debug!(query, top_k, "search cache hit");
                return Ok(hit);
            }
            generation = Some(cache.generation());
        }

        let corpus = self
            .store
            .all_records()
            .await
            .context("failed to load records for search")?;

        let engine = self.engine.clone();
        let owned_query = query.to_string();
        let response =
            tokio::task::spawn_blocking(move || engine.search(&corpus, &owned_query, top_k))
                .await
                .context("search task failed")?;

        if let (Some(generation), Ok(mut cache)) = (generation, self.cache.lock()) {
            if !cache.insert_if_current(generation, query, top_k, response.clone()) {
                debug!(query, top_k, "store changed during search, response not cached");
            }
        }
        Ok(response)
    }

    /// Drop every cached response.
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.invalidate_all();
        }
    }
}

/// CLI entry point for `clarion search`.
pub async fn run_search(config: &Config, query: &str, top_k: Option<usize>, json: bool) -> Result<()> {
    let store = Arc::new(SqliteStore::open(config).await?);
    let service = SearchService::new(config, store.clone());
    let response = service.search(query, top_k).await?;
    store.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in response.results.iter().enumerate() {
        let record = &result.record;
        let s_no = record
            .s_no
            .map(|n| format!("#{} ", n))
            .unwrap_or_default();
        println!(
            "{}. [{:.3}] {}{}",
            i + 1,
            result.score,
            s_no,
            if record.module.is_empty() { "-" } else { record.module.as_str() }
        );
        if let Some(excerpt) = result.highlights.get(&RecordField::ScenarioSteps) {
            println!("    {}", excerpt);
        } else {
            println!("    {}", record.scenario_steps);
        }
        for (field, excerpt) in &result.highlights {
            if *field != RecordField::ScenarioSteps {
                println!("    {}: {}", field.as_str(), excerpt);
            }
        }
        println!("    status: {}  priority: {}", record.status, record.priority);
        println!("    id: {}", result.id);
        println!();
    }

    if !response.suggestions.is_empty() {
        println!("Did you mean:");
        for s in &response.suggestions {
            println!("  {}", s);
        }
    }
    println!(
        "({} results, {:.1} ms)",
        response.results.len(),
        response.stats.total_ms
    );
    Ok(())
}
