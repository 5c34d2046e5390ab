//! Fuzzy search over a record corpus.
//!
//! The engine is stateless: every call tokenizes the corpus it is handed,
//! scores each record, and returns the top hits with highlighted excerpts
//! and query suggestions. There is no persistent index.
//!
//! # Scoring
//!
//! 1. Normalize the query (lowercase, collapse whitespace) and apply the
//!    phrase-correction table on word boundaries.
//! 2. Split into terms; stopwords are dropped unless nothing else is left.
//! 3. Each term is compared with every token of a field. Exact match is
//!    1.0, a prefix/infix partial word scores 0.6–1.0 by length ratio, and
//!    anything else uses normalized Damerau-Levenshtein similarity. Values
//!    under `min_similarity` count as no match.
//! 4. A field's score is the mean of its best per-term similarities.
//! 5. The record score blends the best weighted field with the weighted
//!    mean over all fields:
//!    `0.8 × max(wᵢ/w_max × sᵢ) + 0.2 × Σwᵢsᵢ / Σwᵢ`, which stays in `[0, 1]`.
//! 6. Records scoring 0 are dropped; the rest are stable-sorted by score,
//!    so ties keep corpus order.
//!
//! Term/token similarities are memoized per call, so repeated vocabulary
//! across the corpus is compared once.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use anyhow::{bail, Result};
use strsim::normalized_damerau_levenshtein;
use tracing::debug;

use crate::highlight::Highlighter;
use crate::keywords::{is_stopword, tokenize};
use crate::models::{Record, RecordField, SearchResponse, SearchResult, SearchStats};
use crate::suggest::generate_suggestions;

/// Weight of the single best field in the final score.
const BEST_FIELD_SHARE: f64 = 0.8;

/// Query terms shorter than this are ignored.
const MIN_TERM_CHARS: usize = 2;

/// Partial-word matches need at least this many query chars.
const MIN_PARTIAL_CHARS: usize = 3;

/// Relative importance class of a field. Weights must respect
/// `Primary > Secondary > Categorical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldTier {
    Categorical,
    Secondary,
    Primary,
}

pub fn field_tier(field: RecordField) -> FieldTier {
    match field {
        RecordField::ScenarioSteps => FieldTier::Primary,
        RecordField::OffshoreComments | RecordField::OnsiteComments | RecordField::Reason => {
            FieldTier::Secondary
        }
        _ => FieldTier::Categorical,
    }
}

/// One searched field and its weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldWeight {
    pub field: RecordField,
    pub weight: f64,
}

pub fn default_weights() -> Vec<FieldWeight> {
    [
        (RecordField::ScenarioSteps, 0.4),
        (RecordField::OffshoreComments, 0.15),
        (RecordField::OnsiteComments, 0.15),
        (RecordField::Reason, 0.1),
        (RecordField::Module, 0.08),
        (RecordField::Status, 0.05),
        (RecordField::Priority, 0.04),
        (RecordField::AssignedTo, 0.03),
    ]
    .into_iter()
    .map(|(field, weight)| FieldWeight { field, weight })
    .collect()
}

/// Domain jargon rewrites, applied to whole words of the lowercased query.
pub fn default_phrase_corrections() -> Vec<(String, String)> {
    [
        ("displayed of", "displayed instead of"),
        ("authority conflict", "authority conflicts with"),
        ("mile post", "milepost"),
        ("mile-post", "milepost"),
        ("auth", "authority"),
        ("sig", "signal"),
    ]
    .into_iter()
    .map(|(a, b)| (a.to_string(), b.to_string()))
    .collect()
}

/// Tuning for [`SearchEngine`].
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub weights: Vec<FieldWeight>,
    /// Minimum term/token similarity in `(0, 1]` that counts as a match.
    pub min_similarity: f64,
    /// Maximum excerpt length in chars, before ellipsis markers.
    pub excerpt_chars: usize,
    pub highlighter: Highlighter,
    pub phrase_corrections: Vec<(String, String)>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            min_similarity: 0.6,
            excerpt_chars: 200,
            highlighter: Highlighter::default(),
            phrase_corrections: default_phrase_corrections(),
        }
    }
}

impl SearchConfig {
    /// Reject configurations that break the weight ordering or the
    /// similarity range.
    pub fn validate(&self) -> Result<()> {
        if !(self.min_similarity > 0.0 && self.min_similarity <= 1.0) {
            bail!("search.min_similarity must be in (0.0, 1.0]");
        }
        if self.excerpt_chars < 20 {
            bail!("search.excerpt_chars must be >= 20");
        }
        let active: Vec<&FieldWeight> = self.weights.iter().filter(|w| w.weight > 0.0).collect();
        if active.is_empty() {
            bail!("search.weights must give at least one field a positive weight");
        }
        if let Some(w) = self.weights.iter().find(|w| !w.weight.is_finite() || w.weight < 0.0) {
            bail!("search weight for {} must be a finite, non-negative number", w.field.as_str());
        }

        for (lower, higher) in [
            (FieldTier::Categorical, FieldTier::Secondary),
            (FieldTier::Secondary, FieldTier::Primary),
            (FieldTier::Categorical, FieldTier::Primary),
        ] {
            let max_lower = active
                .iter()
                .filter(|w| field_tier(w.field) == lower)
                .map(|w| w.weight)
                .fold(f64::NEG_INFINITY, f64::max);
            let min_higher = active
                .iter()
                .filter(|w| field_tier(w.field) == higher)
                .map(|w| w.weight)
                .fold(f64::INFINITY, f64::min);
            if max_lower >= min_higher {
                bail!(
                    "search weights must rank primary text > secondary text > categorical fields ({:?} weight {} is not below {:?} weight {})",
                    lower,
                    max_lower,
                    higher,
                    min_higher
                );
            }
        }
        Ok(())
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

/// Byte offset of `pattern` in `text` where both ends sit on word
/// boundaries.
fn find_phrase(text: &str, pattern: &str) -> Option<usize> {
    if pattern.is_empty() {
        return None;
    }
    let mut from = 0;
    while let Some(rel) = text[from..].find(pattern) {
        let start = from + rel;
        let end = start + pattern.len();
        let before_ok = text[..start].chars().next_back().map_or(true, |c| !is_word_char(c));
        let after_ok = text[end..].chars().next().map_or(true, |c| !is_word_char(c));
        if before_ok && after_ok {
            return Some(start);
        }
        from = start + text[start..].chars().next().map_or(1, |c| c.len_utf8());
    }
    None
}

/// True if the lowercased query contains `pattern` as whole words.
pub fn contains_phrase(query_lower: &str, pattern: &str) -> bool {
    find_phrase(query_lower, pattern).is_some()
}

/// Lowercase, trim, collapse whitespace, then apply each correction once.
pub fn normalize_query(query: &str, corrections: &[(String, String)]) -> String {
    let mut normalized = query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    for (pattern, replacement) in corrections {
        if let Some(start) = find_phrase(&normalized, pattern) {
            normalized.replace_range(start..start + pattern.len(), replacement);
        }
    }
    normalized
}

/// Distinct scoring terms of a normalized query.
pub fn query_terms(normalized: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let all: Vec<String> = tokenize(normalized)
        .filter(|t| t.chars().count() >= MIN_TERM_CHARS)
        .map(|t| t.to_lowercase())
        .filter(|t| seen.insert(t.clone()))
        .collect();
    let content: Vec<String> = all.iter().filter(|t| !is_stopword(t)).cloned().collect();
    if content.is_empty() {
        all
    } else {
        content
    }
}

/// Similarity of a query term to a field token, both lowercase.
pub fn term_similarity(term: &str, token: &str) -> f64 {
    if term == token {
        return 1.0;
    }
    let term_len = term.chars().count();
    let token_len = token.chars().count();

    let partial = if term_len >= MIN_PARTIAL_CHARS && token_len > term_len {
        let ratio = term_len as f64 / token_len as f64;
        if token.starts_with(term) {
            0.7 + 0.3 * ratio
        } else if token.contains(term) {
            0.6 + 0.3 * ratio
        } else {
            0.0
        }
    } else {
        0.0
    };

    partial.max(normalized_damerau_levenshtein(term, token))
}

/// Best-similarity lookup with a per-call memo for each query term.
struct TermMatcher<'a> {
    terms: &'a [String],
    term_lens: Vec<usize>,
    min_similarity: f64,
    memo: Vec<HashMap<String, f64>>,
}

impl<'a> TermMatcher<'a> {
    fn new(terms: &'a [String], min_similarity: f64) -> Self {
        Self {
            term_lens: terms.iter().map(|t| t.chars().count()).collect(),
            terms,
            min_similarity,
            memo: vec![HashMap::new(); terms.len()],
        }
    }

    fn similarity(&mut self, term_idx: usize, token: &str) -> f64 {
        if let Some(&s) = self.memo[term_idx].get(token) {
            return s;
        }
        let term = &self.terms[term_idx];
        let term_len = self.term_lens[term_idx];
        let token_len = token.chars().count();

        // Edit similarity can't reach the threshold past this length gap,
        // and a partial word needs the token to be longer.
        let gap = term_len.abs_diff(token_len) as f64 / term_len.max(token_len) as f64;
        let s = if gap > 1.0 - self.min_similarity && token_len <= term_len {
            0.0
        } else {
            let s = term_similarity(term, token);
            if s >= self.min_similarity {
                s
            } else {
                0.0
            }
        };
        self.memo[term_idx].insert(token.to_string(), s);
        s
    }

    /// Field score plus the tokens that matched some term.
    fn score_field(&mut self, tokens: &[&str]) -> (f64, Vec<String>) {
        if tokens.is_empty() {
            return (0.0, Vec::new());
        }
        let mut total = 0.0;
        let mut matched = Vec::new();
        for term_idx in 0..self.terms.len() {
            let mut best = 0.0;
            let mut best_token: Option<&str> = None;
            for &token in tokens {
                let s = self.similarity(term_idx, token);
                if s > best {
                    best = s;
                    best_token = Some(token);
                    if s >= 1.0 {
                        break;
                    }
                }
            }
            if let Some(token) = best_token {
                matched.push(token.to_string());
            }
            total += best;
        }
        (total / self.terms.len() as f64, matched)
    }
}

struct FieldMatch {
    field: RecordField,
    score: f64,
    tokens: Vec<String>,
}

struct Scored {
    index: usize,
    score: f64,
    fields: Vec<FieldMatch>,
}

/// Stateless fuzzy search engine.
#[derive(Debug, Clone, Default)]
pub struct SearchEngine {
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search `corpus` and return at most `top_k` ranked results.
    ///
    /// An empty or whitespace-only query returns an empty response without
    /// touching the corpus.
    pub fn search(&self, corpus: &[Record], query: &str, top_k: usize) -> SearchResponse {
        let started = Instant::now();
        if query.trim().is_empty() || top_k == 0 {
            return SearchResponse::default();
        }

        let normalized = normalize_query(query, &self.config.phrase_corrections);
        let terms = query_terms(&normalized);
        if terms.is_empty() {
            return SearchResponse::default();
        }

        let matching_started = Instant::now();
        let mut matcher = TermMatcher::new(&terms, self.config.min_similarity);
        let mut scored: Vec<Scored> = corpus
            .iter()
            .enumerate()
            .filter_map(|(index, record)| self.score_record(&mut matcher, index, record))
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        let matching_ms = matching_started.elapsed().as_secs_f64() * 1000.0;

        let raw_words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();

        let results: Vec<SearchResult> = scored
            .into_iter()
            .map(|s| self.build_result(&corpus[s.index], s, &raw_words))
            .collect();

        let suggestions = generate_suggestions(
            query,
            &self.config.phrase_corrections,
            results.first().map(|r| &r.record),
        );

        let total_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(
            query,
            normalized = %normalized,
            hits = results.len(),
            matching_ms,
            total_ms,
            "search complete"
        );

        SearchResponse {
            results,
            suggestions,
            stats: SearchStats {
                matching_ms,
                total_ms,
            },
        }
    }

    fn score_record(
        &self,
        matcher: &mut TermMatcher<'_>,
        index: usize,
        record: &Record,
    ) -> Option<Scored> {
        let w_max = self
            .config
            .weights
            .iter()
            .map(|w| w.weight)
            .fold(0.0_f64, f64::max);
        let w_sum: f64 = self.config.weights.iter().map(|w| w.weight).sum();
        if w_max <= 0.0 {
            return None;
        }

        let mut best_field = 0.0_f64;
        let mut weighted = 0.0;
        let mut fields = Vec::new();

        for fw in &self.config.weights {
            if fw.weight <= 0.0 {
                continue;
            }
            let text = record.text(fw.field).to_lowercase();
            let tokens: Vec<&str> = tokenize(&text).collect();
            let (score, tokens) = matcher.score_field(&tokens);
            if score <= 0.0 {
                continue;
            }
            best_field = best_field.max(fw.weight / w_max * score);
            weighted += fw.weight * score;
            fields.push(FieldMatch {
                field: fw.field,
                score,
                tokens,
            });
        }

        let score = BEST_FIELD_SHARE * best_field + (1.0 - BEST_FIELD_SHARE) * weighted / w_sum;
        if score > 0.0 {
            Some(Scored {
                index,
                score: score.min(1.0),
                fields,
            })
        } else {
            None
        }
    }

    fn build_result(&self, record: &Record, scored: Scored, raw_words: &[String]) -> SearchResult {
        let mut highlights = BTreeMap::new();
        for fm in scored.fields {
            let text = record.text(fm.field);
            if text.trim().is_empty() || fm.score <= 0.0 {
                continue;
            }
            let mut terms: Vec<String> = raw_words.to_vec();
            terms.extend(fm.tokens);
            let excerpt =
                self.config
                    .highlighter
                    .excerpt(&text, &terms, self.config.excerpt_chars);
            highlights.insert(fm.field, excerpt);
        }
        SearchResult {
            id: record.id.clone(),
            score: scored.score,
            record: record.clone(),
            highlights,
        }
    }
}
