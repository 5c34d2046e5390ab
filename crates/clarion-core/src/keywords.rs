//! Keyword extraction from free-text record fields.
//!
//! Produces a short, deduplicated list of salient lowercase tokens plus any
//! defect/ticket identifiers (`BUG-123`, `DEF_9`, `#40211`). Identifiers are
//! kept uppercased and are exempt from the minimum-length rule. The list is
//! capped at [`MAX_KEYWORDS`] entries, identifiers first.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::{RecordDraft, RecordField};

/// Upper bound on keywords per record.
pub const MAX_KEYWORDS: usize = 20;

/// Minimum length (in chars) of a general keyword.
pub const MIN_KEYWORD_LEN: usize = 3;

/// English stopwords plus generic request verbs that carry no signal.
pub const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "already", "also", "am", "an",
    "and", "any", "are", "as", "at", "be", "because", "been", "before", "being", "below",
    "between", "both", "but", "by", "can", "cannot", "could", "did", "do", "does", "doing",
    "down", "during", "each", "either", "else", "etc", "even", "every", "few", "for", "from",
    "further", "get", "gets", "got", "had", "has", "have", "having", "he", "her", "here",
    "hers", "him", "his", "how", "however", "i", "if", "in", "into", "is", "it", "its",
    "itself", "just", "let", "like", "may", "me", "might", "more", "most", "much", "must", "my",
    "need", "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other", "our",
    "ours", "out", "over", "own", "please", "same", "shall", "she", "should", "so", "some",
    "such", "than", "that", "the", "their", "theirs", "them", "then", "there", "these", "they",
    "this", "those", "through", "to", "too", "under", "until", "up", "upon", "very", "via",
    "was", "we", "were", "what", "when", "where", "whether", "which", "while", "who", "whom",
    "why", "will", "with", "within", "without", "would", "yet", "you", "your", "yours",
];

/// Returns true for a stopword (input must already be lowercase).
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.binary_search(&word).is_ok()
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:BUG|DEFECT|DEF|ISSUE|TICKET|INC|CR)[-_ ]?\d+\b|#\d{4,}\b")
            .expect("identifier pattern is valid")
    })
}

/// True if `text` mentions a defect/ticket identifier.
pub fn contains_identifier(text: &str) -> bool {
    identifier_regex().is_match(text)
}

/// Find defect/ticket identifiers, uppercased, in order of appearance.
pub fn extract_identifiers(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    identifier_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_uppercase().replace(' ', "-"))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Split on anything that is not a letter, digit, or in-word apostrophe.
pub fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
}

/// Extract keywords from one block of text.
pub fn extract_keywords(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<String> = Vec::new();

    for id in extract_identifiers(text) {
        if out.len() >= MAX_KEYWORDS {
            return out;
        }
        if seen.insert(id.to_lowercase()) {
            out.push(id);
        }
    }

    for token in tokenize(text) {
        if out.len() >= MAX_KEYWORDS {
            break;
        }
        let lower = token.to_lowercase();
        if lower.chars().count() < MIN_KEYWORD_LEN
            || lower.chars().all(|c| c.is_ascii_digit())
            || is_stopword(&lower)
        {
            continue;
        }
        if seen.insert(lower.clone()) {
            out.push(lower);
        }
    }

    out
}

/// Which draft fields feed keyword extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordSources {
    pub fields: Vec<RecordField>,
}

impl Default for KeywordSources {
    fn default() -> Self {
        Self {
            fields: vec![RecordField::ScenarioSteps],
        }
    }
}

impl KeywordSources {
    /// Extract keywords from the configured fields of a draft, joined with
    /// `", "`. Returns an empty string when every source field is empty.
    pub fn keywords_for(&self, draft: &RecordDraft) -> String {
        let text = self
            .fields
            .iter()
            .map(|f| draft.text(*f))
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        extract_keywords(&text).join(", ")
    }
}
