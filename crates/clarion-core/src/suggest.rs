//! Query suggestions.
//!
//! Two sources, in order: the query rewritten through any phrase
//! corrections it triggers, then short slices of the top hit's scenario
//! text around each query word it contains.

use regex::{NoExpand, RegexBuilder};

use crate::highlight::first_match;
use crate::models::Record;
use crate::search::contains_phrase;

pub const MAX_SUGGESTIONS: usize = 3;

/// Chars of scenario text kept before a matched word.
const CONTEXT_BEFORE: usize = 20;
/// Chars kept after the end of a matched word.
const CONTEXT_AFTER: usize = 30;

const MIN_WORD_CHARS: usize = 3;

fn push_unique(out: &mut Vec<String>, query: &str, candidate: String) {
    let candidate = candidate.trim().to_string();
    if candidate.is_empty() || candidate.eq_ignore_ascii_case(query.trim()) {
        return;
    }
    if !out.iter().any(|s| s == &candidate) {
        out.push(candidate);
    }
}

/// Rewrite every case-insensitive whole-word occurrence of `pattern`.
fn apply_correction(query: &str, pattern: &str, replacement: &str) -> Option<String> {
    let re = RegexBuilder::new(&format!(r"\b{}\b", regex::escape(pattern)))
        .case_insensitive(true)
        .build()
        .ok()?;
    Some(re.replace_all(query, NoExpand(replacement)).into_owned())
}

/// Build up to [`MAX_SUGGESTIONS`] alternative queries.
///
/// `top` is the highest ranked hit, if any. Suggestions are distinct and
/// never equal to the query itself.
pub fn generate_suggestions(
    query: &str,
    corrections: &[(String, String)],
    top: Option<&Record>,
) -> Vec<String> {
    let mut out = Vec::new();
    let lowered = query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if lowered.is_empty() {
        return out;
    }

    for (pattern, replacement) in corrections {
        if contains_phrase(&lowered, pattern) {
            if let Some(corrected) = apply_correction(query, pattern, replacement) {
                push_unique(&mut out, query, corrected);
            }
        }
    }

    if let Some(record) = top {
        let scenario: Vec<char> = record.scenario_steps.chars().collect();
        let query_len = query.trim().chars().count();
        for word in lowered.split(' ') {
            let word_len = word.chars().count();
            if word_len < MIN_WORD_CHARS {
                continue;
            }
            let Some(idx) = first_match(&record.scenario_steps, &[word.to_string()]) else {
                continue;
            };
            let start = idx.saturating_sub(CONTEXT_BEFORE);
            let end = scenario.len().min(idx + word_len + CONTEXT_AFTER);
            let context: String = scenario[start..end].iter().collect();
            let context = context.trim().to_string();
            if context.chars().count() > query_len {
                push_unique(&mut out, query, context);
            }
        }
    }

    out.truncate(MAX_SUGGESTIONS);
    out
}
