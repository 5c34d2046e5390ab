//! `clarion ask`: answer a free-text question with matching records.
//!
//! The message is classified first. Only messages that look like a
//! record search are turned into a query; anything else gets a short
//! usage hint.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use clarion_core::intent::{PatternIntentClassifier, SearchIntent};

use crate::config::Config;
use crate::search::SearchService;
use crate::sqlite_store::SqliteStore;

/// Results shown for a question.
const ASK_RESULTS: usize = 5;

pub async fn run_ask(config: &Config, message: &str) -> Result<()> {
    run_ask_with(config, message, &PatternIntentClassifier).await
}

pub async fn run_ask_with(config: &Config, message: &str, intent: &dyn SearchIntent) -> Result<()> {
    let Some(query) = intent.search_query(message) else {
        println!("That does not look like a record search.");
        println!("Try mentioning a module, status, priority, defect id, or assignee.");
        return Ok(());
    };
    info!(message, query = %query, "question classified as search");

    let store = Arc::new(SqliteStore::open(config).await?);
    let service = SearchService::new(config, store.clone());
    let response = service.search(&query, Some(ASK_RESULTS)).await;
    store.close().await;
    let response = response?;

    println!("query: {}", query);
    if response.results.is_empty() {
        println!("No matching records.");
        return Ok(());
    }
    for result in &response.results {
        let r = &result.record;
        println!(
            "- {}[{}] {} ({}, {})",
            r.s_no.map(|n| format!("#{} ", n)).unwrap_or_default(),
            if r.module.is_empty() { "-" } else { r.module.as_str() },
            r.scenario_steps.chars().take(80).collect::<String>(),
            if r.status.is_empty() { "no status" } else { r.status.as_str() },
            if r.assigned_to.is_empty() { "unassigned" } else { r.assigned_to.as_str() },
        );
    }
    Ok(())
}
