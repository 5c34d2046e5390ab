//! Field normalization and content hashing.
//!
//! The row hash is the deduplication key: SHA-256 over the normalized
//! canonical field tuple, joined with `|`, rendered as lowercase hex.
//! The tuple is ordered, so swapping two fields' values changes the hash.
//!
//! # Canonical subset
//!
//! `s_no | module | scenario_steps | status | date | assigned_to | priority | reason`
//!
//! # Example
//!
//! ```rust
//! use clarion_core::hash::row_hash;
//! use clarion_core::models::RecordDraft;
//!
//! let a = RecordDraft { module: "Signals".into(), ..Default::default() };
//! let b = RecordDraft { module: "  SIGNALS ".into(), ..Default::default() };
//! assert_eq!(row_hash(&a), row_hash(&b));
//! assert_eq!(row_hash(&a).len(), 64);
//! ```

use sha2::{Digest, Sha256};

use crate::models::{RecordDraft, RecordField};

/// Delimiter between canonical fields.
pub const FIELD_DELIMITER: &str = "|";

/// Fields that feed the row hash, in order.
pub const CANONICAL_FIELDS: [RecordField; 8] = [
    RecordField::SNo,
    RecordField::Module,
    RecordField::ScenarioSteps,
    RecordField::Status,
    RecordField::Date,
    RecordField::AssignedTo,
    RecordField::Priority,
    RecordField::Reason,
];

/// Trim, collapse whitespace runs to one space, and lowercase.
pub fn normalize_text(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalized values of the canonical subset. Absent values are `""`.
pub fn canonical_values(draft: &RecordDraft) -> Vec<String> {
    CANONICAL_FIELDS
        .iter()
        .map(|field| match field {
            RecordField::SNo => draft.s_no.map(|n| n.to_string()).unwrap_or_default(),
            other => normalize_text(draft.text(*other)),
        })
        .collect()
}

/// Compute the 64-char hex row hash for a draft.
pub fn row_hash(draft: &RecordDraft) -> String {
    hash_parts(&canonical_values(draft))
}

/// SHA-256 of already-normalized parts joined with [`FIELD_DELIMITER`].
pub fn hash_parts(parts: &[String]) -> String {
    let joined = parts.join(FIELD_DELIMITER);
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Narrow dedupe key: the normalized scenario text alone.
pub fn scenario_key(draft: &RecordDraft) -> String {
    normalize_text(&draft.scenario_steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sample() -> RecordDraft {
        RecordDraft {
            s_no: Some(12),
            module: "Signals".into(),
            scenario_steps: "Train halts at signal 12".into(),
            status: "Open".into(),
            date: "2024-03-01".into(),
            assigned_to: "R. Iyer".into(),
            priority: "P1".into(),
            reason: "Aspect mismatch".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hello \t\n  World  "), "hello world");
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_text("  Mixed   CASE\ttext ");
        assert_eq!(normalize_text(&once), once);
    }

    #[test]
    fn test_hash_is_deterministic_hex() {
        let h1 = row_hash(&sample());
        let h2 = row_hash(&sample());
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_hash_ignores_case_and_whitespace() {
        let mut noisy = sample();
        noisy.scenario_steps = "  TRAIN   halts at\nSignal 12 ".into();
        noisy.module = "signals\t".into();
        assert_eq!(row_hash(&noisy), row_hash(&sample()));
    }

    #[test]
    fn test_hash_of_normalized_draft_matches() {
        let original = sample();
        let mut normalized = original.clone();
        for field in CANONICAL_FIELDS {
            if let Some(slot) = normalized.text_mut(field) {
                *slot = normalize_text(slot);
            }
        }
        assert_eq!(row_hash(&normalized), row_hash(&original));
    }

    #[test]
    fn test_hash_is_order_sensitive() {
        let a = RecordDraft {
            module: "alpha".into(),
            status: "beta".into(),
            ..Default::default()
        };
        let b = RecordDraft {
            module: "beta".into(),
            status: "alpha".into(),
            ..Default::default()
        };
        assert_ne!(row_hash(&a), row_hash(&b));
    }

    #[test]
    fn test_absent_sno_is_empty_not_null() {
        let draft = RecordDraft::default();
        let values = canonical_values(&draft);
        assert_eq!(values[0], "");
        assert_eq!(row_hash(&draft), hash_parts(&vec![String::new(); 8]));
    }

    #[test]
    fn test_non_canonical_fields_do_not_affect_hash() {
        let mut other = sample();
        other.offshore_comments = "extra context".into();
        other.tester = "someone".into();
        assert_eq!(row_hash(&other), row_hash(&sample()));
    }

    #[test]
    fn test_single_field_mutations_change_hash() {
        let base = sample();
        let mut seen = HashSet::new();
        seen.insert(row_hash(&base));
        for i in 0..200 {
            for field in CANONICAL_FIELDS {
                let mut mutated = base.clone();
                match field {
                    RecordField::SNo => mutated.s_no = Some(1000 + i),
                    other => {
                        let slot = mutated.text_mut(other).unwrap();
                        slot.push_str(&format!(" v{}", i));
                    }
                }
                assert!(
                    seen.insert(row_hash(&mutated)),
                    "collision after mutating {:?} #{}",
                    field,
                    i
                );
            }
        }
    }

    #[test]
    fn test_scenario_key() {
        let draft = RecordDraft {
            scenario_steps: " Train  HALTS ".into(),
            ..Default::default()
        };
        assert_eq!(scenario_key(&draft), "train halts");
    }
}
