use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clarion_core::highlight::Highlighter;
use clarion_core::ingest::DedupPolicy;
use clarion_core::keywords::KeywordSources;
use clarion_core::models::RecordField;
use clarion_core::search::{default_phrase_corrections, default_weights, SearchConfig};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchSettings {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
    /// Longer queries are cut to this many characters before matching.
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
    #[serde(default = "default_highlight_open")]
    pub highlight_open: String,
    #[serde(default = "default_highlight_close")]
    pub highlight_close: String,
    /// Per-field overrides on top of the built-in weights.
    #[serde(default)]
    pub weights: BTreeMap<RecordField, f64>,
    /// Extra or replacement jargon rewrites, applied after the built-ins.
    #[serde(default)]
    pub phrase_corrections: BTreeMap<String, String>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
            excerpt_chars: default_excerpt_chars(),
            max_query_chars: default_max_query_chars(),
            highlight_open: default_highlight_open(),
            highlight_close: default_highlight_close(),
            weights: BTreeMap::new(),
            phrase_corrections: BTreeMap::new(),
        }
    }
}

fn default_top_k() -> usize {
    20
}
fn default_min_similarity() -> f64 {
    0.6
}
fn default_excerpt_chars() -> usize {
    200
}
fn default_max_query_chars() -> usize {
    200
}
fn default_highlight_open() -> String {
    "<mark>".to_string()
}
fn default_highlight_close() -> String {
    "</mark>".to_string()
}

impl SearchSettings {
    /// Engine configuration with overrides merged into the defaults.
    pub fn engine_config(&self) -> SearchConfig {
        let mut weights = default_weights();
        for (field, weight) in &self.weights {
            match weights.iter_mut().find(|w| w.field == *field) {
                Some(w) => w.weight = *weight,
                None => weights.push(clarion_core::search::FieldWeight {
                    field: *field,
                    weight: *weight,
                }),
            }
        }

        let mut phrase_corrections = default_phrase_corrections();
        for (pattern, replacement) in &self.phrase_corrections {
            let pattern = pattern.to_lowercase();
            match phrase_corrections.iter_mut().find(|(p, _)| *p == pattern) {
                Some(entry) => entry.1 = replacement.clone(),
                None => phrase_corrections.push((pattern, replacement.clone())),
            }
        }

        SearchConfig {
            weights,
            min_similarity: self.min_similarity,
            excerpt_chars: self.excerpt_chars,
            highlighter: Highlighter {
                open: self.highlight_open.clone(),
                close: self.highlight_close.clone(),
            },
            phrase_corrections,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default)]
    pub dedup_policy: DedupPolicy,
    #[serde(default = "default_keyword_fields")]
    pub keyword_fields: Vec<RecordField>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            dedup_policy: DedupPolicy::default(),
            keyword_fields: default_keyword_fields(),
        }
    }
}

fn default_keyword_fields() -> Vec<RecordField> {
    vec![RecordField::ScenarioSteps]
}

impl IngestConfig {
    pub fn keyword_sources(&self) -> KeywordSources {
        KeywordSources {
            fields: self.keyword_fields.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    60
}
fn default_max_entries() -> usize {
    256
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    #[serde(default = "default_rate_window_ms")]
    pub rate_window_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            rate_limit: default_rate_limit(),
            rate_window_ms: default_rate_window_ms(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}
fn default_rate_limit() -> u32 {
    10
}
fn default_rate_window_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a TOML config document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.search.top_k < 1 {
        anyhow::bail!("search.top_k must be >= 1");
    }
    if config.search.max_query_chars < 1 {
        anyhow::bail!("search.max_query_chars must be >= 1");
    }
    config.search.engine_config().validate()?;

    if config.ingest.keyword_fields.is_empty() {
        anyhow::bail!("ingest.keyword_fields must name at least one field");
    }

    if config.server.rate_limit < 1 {
        anyhow::bail!("server.rate_limit must be >= 1");
    }
    if config.server.rate_window_ms < 1 {
        anyhow::bail!("server.rate_window_ms must be >= 1");
    }

    Ok(config)
}
