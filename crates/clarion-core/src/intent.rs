//! Decide whether a free-text message is a record search, and if so, turn
//! it into a search query.

use std::sync::OnceLock;

use regex::Regex;

use crate::keywords::{contains_identifier, is_stopword};

/// Maximum number of terms carried into the derived query.
pub const MAX_INTENT_TERMS: usize = 5;

/// Conversational filler that is not in the keyword stopword list.
const CHAT_FILLER: &[&str] = &[
    "already", "count", "display", "find", "get", "give", "help", "know", "like", "list",
    "many", "much", "need", "number", "please", "records", "search", "show", "status",
    "still", "tell", "total", "want",
];

fn domain_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)defect|retest|open|closed|offshore|onsite|module|assigned|priority|\bp[1-4]\b|bug|drop|scenario",
        )
        .expect("valid domain regex")
    })
}

fn person_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:assigned to|tester|reviewer)\s+\w+").expect("valid person regex")
    })
}

/// Classifies chat messages into search queries.
pub trait SearchIntent: Send + Sync {
    /// The query to run, or `None` if the message is not a search.
    fn search_query(&self, message: &str) -> Option<String>;
}

/// Regex-driven classifier for clarification-tracker vocabulary.
#[derive(Debug, Clone, Default)]
pub struct PatternIntentClassifier;

impl PatternIntentClassifier {
    pub fn looks_like_search(&self, message: &str) -> bool {
        domain_re().is_match(message)
            || contains_identifier(message)
            || person_re().is_match(message)
    }

    /// Up to [`MAX_INTENT_TERMS`] content words, in message order.
    pub fn extract_terms(&self, message: &str) -> Vec<String> {
        let cleaned: String = message
            .chars()
            .map(|c| if "?.,!;:()".contains(c) { ' ' } else { c })
            .collect();
        let mut terms: Vec<String> = Vec::new();
        for word in cleaned.split_whitespace() {
            let lower = word.to_lowercase();
            if word.chars().count() < 2
                || is_stopword(&lower)
                || CHAT_FILLER.contains(&lower.as_str())
                || terms.iter().any(|t| t.eq_ignore_ascii_case(word))
            {
                continue;
            }
            terms.push(word.to_string());
            if terms.len() == MAX_INTENT_TERMS {
                break;
            }
        }
        terms
    }
}

impl SearchIntent for PatternIntentClassifier {
    fn search_query(&self, message: &str) -> Option<String> {
        if !self.looks_like_search(message) {
            return None;
        }
        let terms = self.extract_terms(message);
        if terms.is_empty() {
            None
        } else {
            Some(terms.join(" "))
        }
    }
}
