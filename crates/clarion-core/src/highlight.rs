//! Excerpt windows and match highlighting.
//!
//! Long fields are cut to a window of at most `max_chars` characters that
//! starts 50 characters before the first matched term, with `...` marking
//! each cut side. Every case-insensitive occurrence of a term inside the
//! window is then wrapped in the highlight markers.
//!
//! All offsets are in `char`s, never bytes, so multi-byte text is safe.

use regex::{Captures, RegexBuilder};
use serde::Deserialize;

/// Characters of lead-in kept before the first match.
pub const LEAD_CHARS: usize = 50;

/// Marker placed at a cut boundary.
pub const ELLIPSIS: &str = "...";

/// Terms shorter than this are not highlighted.
const MIN_HIGHLIGHT_CHARS: usize = 3;

/// Lowercase char by char so positions line up with the original text.
fn fold(text: &str) -> Vec<char> {
    text.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

fn find_chars(hay: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > hay.len() {
        return None;
    }
    hay.windows(needle.len()).position(|w| w == needle)
}

/// Char position of the earliest case-insensitive occurrence of any term.
pub fn first_match(text: &str, terms: &[String]) -> Option<usize> {
    let hay = fold(text);
    terms
        .iter()
        .filter_map(|t| find_chars(&hay, &fold(t)))
        .min()
}

/// Cut `text` to a window around the first match of any term.
///
/// Text within `max_chars` is returned unchanged. Without a match the
/// window is the first `max_chars` characters.
pub fn truncate_with_context(text: &str, terms: &[String], max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }

    let usable: Vec<String> = terms
        .iter()
        .filter(|t| t.chars().count() >= MIN_HIGHLIGHT_CHARS)
        .cloned()
        .collect();

    let Some(idx) = first_match(text, &usable) else {
        let head: String = chars[..max_chars].iter().collect();
        return format!("{}{}", head, ELLIPSIS);
    };

    let start = idx.saturating_sub(LEAD_CHARS);
    let end = chars.len().min(start + max_chars);

    let mut out = String::new();
    if start > 0 {
        out.push_str(ELLIPSIS);
    }
    out.extend(&chars[start..end]);
    if end < chars.len() {
        out.push_str(ELLIPSIS);
    }
    out
}

/// Wraps matched terms in open/close markers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Highlighter {
    pub open: String,
    pub close: String,
}

impl Default for Highlighter {
    fn default() -> Self {
        Self {
            open: "<mark>".to_string(),
            close: "</mark>".to_string(),
        }
    }
}

impl Highlighter {
    /// Wrap every case-insensitive occurrence of each term (3+ chars).
    ///
    /// Overlapping terms are resolved longest-first, so markers never nest.
    pub fn highlight(&self, text: &str, terms: &[String]) -> String {
        let mut usable: Vec<&str> = terms
            .iter()
            .map(|t| t.as_str())
            .filter(|t| t.chars().count() >= MIN_HIGHLIGHT_CHARS)
            .collect();
        if text.is_empty() || usable.is_empty() {
            return text.to_string();
        }
        usable.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        usable.dedup();

        let pattern = usable
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        let re = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
            Ok(re) => re,
            Err(_) => return text.to_string(),
        };

        re.replace_all(text, |caps: &Captures| {
            format!("{}{}{}", self.open, &caps[0], self.close)
        })
        .into_owned()
    }

    /// Truncate around the first match, then highlight.
    pub fn excerpt(&self, text: &str, terms: &[String], max_chars: usize) -> String {
        self.highlight(&truncate_with_context(text, terms, max_chars), terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_short_text_unchanged() {
        assert_eq!(truncate_with_context("short", &terms(&["short"]), 200), "short");
    }

    #[test]
    fn test_window_around_match() {
        let text = format!("{}needle{}", "a".repeat(300), "b".repeat(300));
        let out = truncate_with_context(&text, &terms(&["needle"]), 200);
        assert!(out.starts_with(ELLIPSIS));
        assert!(out.ends_with(ELLIPSIS));
        assert!(out.contains("needle"));
        assert_eq!(out.chars().count(), 200 + 2 * ELLIPSIS.len());
        let lead = out[ELLIPSIS.len()..].find("needle").unwrap();
        assert_eq!(lead, LEAD_CHARS);
    }

    #[test]
    fn test_match_near_start_has_no_leading_ellipsis() {
        let text = format!("needle {}", "x".repeat(400));
        let out = truncate_with_context(&text, &terms(&["NEEDLE"]), 200);
        assert!(out.starts_with("needle"));
        assert!(out.ends_with(ELLIPSIS));
    }

    #[test]
    fn test_no_match_takes_head() {
        let text = "z".repeat(500);
        let out = truncate_with_context(&text, &terms(&["absent"]), 200);
        assert_eq!(out, format!("{}{}", "z".repeat(200), ELLIPSIS));
    }

    #[test]
    fn test_multibyte_safe() {
        let text = format!("{}Störung{}", "ä".repeat(300), "ü".repeat(300));
        let out = truncate_with_context(&text, &terms(&["störung"]), 100);
        assert!(out.contains("Störung"));
        assert!(out.chars().count() <= 106);
    }

    #[test]
    fn test_highlight_case_insensitive_all_occurrences() {
        let hl = Highlighter::default();
        let out = hl.highlight("Signal at SIGNAL box, signalling", &terms(&["signal"]));
        assert_eq!(
            out,
            "<mark>Signal</mark> at <mark>SIGNAL</mark> box, <mark>signal</mark>ling"
        );
    }

    #[test]
    fn test_highlight_skips_short_terms_and_escapes() {
        let hl = Highlighter::default();
        assert_eq!(hl.highlight("at a signal", &terms(&["at", "a"])), "at a signal");
        assert_eq!(
            hl.highlight("cost (c++) rises", &terms(&["c++"])),
            "cost (<mark>c++</mark>) rises"
        );
    }

    #[test]
    fn test_highlight_longest_first_no_nesting() {
        let hl = Highlighter::default();
        let out = hl.highlight("authority", &terms(&["auth", "authority"]));
        assert_eq!(out, "<mark>authority</mark>");
    }

    #[test]
    fn test_custom_markers() {
        let hl = Highlighter {
            open: "[".into(),
            close: "]".into(),
        };
        assert_eq!(hl.highlight("train halts", &terms(&["halt"])), "train [halt]s");
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let hl = Highlighter::default();
        let text = format!("{} train halts here {}", "w ".repeat(200), "q ".repeat(200));
        let out = hl.excerpt(&text, &terms(&["train"]), 200);
        assert!(out.contains("<mark>train</mark>"));
        let without_marks = out.replace("<mark>", "").replace("</mark>", "");
        assert!(without_marks.chars().count() <= 206);
    }
}
