//! Record listing filters, distinct option values, and store statistics.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::{Record, UploadRecord};

/// Number of uploads reported in [`RecordStats::recent_uploads`].
pub const RECENT_UPLOADS: usize = 5;

/// Status values that count as resolved, compared case-insensitively.
const RESOLVED_STATUSES: &[&str] = &["closed", "resolved", "done", "fixed", "completed"];

/// Listing filter. Every set criterion must hold.
///
/// Categorical criteria compare exactly. `date_from`/`date_to` compare
/// lexically, which is correct for ISO `YYYY-MM-DD` dates. `search` is a
/// case-insensitive substring over the main text fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordFilter {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub module: Option<String>,
    pub assigned_to: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub search: Option<String>,
}

fn set(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl RecordFilter {
    pub fn matches(&self, record: &Record) -> bool {
        if set(&self.status).is_some_and(|s| record.status != s) {
            return false;
        }
        if set(&self.priority).is_some_and(|p| record.priority != p) {
            return false;
        }
        if set(&self.module).is_some_and(|m| record.module != m) {
            return false;
        }
        if set(&self.assigned_to).is_some_and(|a| record.assigned_to != a) {
            return false;
        }
        if set(&self.date_from).is_some_and(|d| record.date.as_str() < d) {
            return false;
        }
        if set(&self.date_to).is_some_and(|d| record.date.as_str() > d) {
            return false;
        }
        if let Some(needle) = set(&self.search) {
            let haystack = [
                &record.module,
                &record.scenario_steps,
                &record.status,
                &record.offshore_comments,
                &record.onsite_comments,
                &record.reason,
                &record.assigned_to,
                &record.priority,
            ]
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
            if !haystack.contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }

    /// Filter and sort `records` for listing.
    pub fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        let mut out: Vec<Record> = records.into_iter().filter(|r| self.matches(r)).collect();
        out.sort_by(listing_order);
        out
    }
}

/// Numbered rows first by `s_no`, then unnumbered rows newest first.
fn listing_order(a: &Record, b: &Record) -> Ordering {
    let by_number = match (a.s_no, b.s_no) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_number
        .then(b.first_seen_at.cmp(&a.first_seen_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Distinct non-empty values for each filterable field, sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterOptions {
    pub statuses: Vec<String>,
    pub priorities: Vec<String>,
    pub modules: Vec<String>,
    pub assignees: Vec<String>,
}

impl FilterOptions {
    pub fn from_records(records: &[Record]) -> Self {
        fn distinct<'a>(values: impl Iterator<Item = &'a String>) -> Vec<String> {
            values
                .filter(|v| !v.is_empty())
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        }
        Self {
            statuses: distinct(records.iter().map(|r| &r.status)),
            priorities: distinct(records.iter().map(|r| &r.priority)),
            modules: distinct(records.iter().map(|r| &r.module)),
            assignees: distinct(records.iter().map(|r| &r.assigned_to)),
        }
    }
}

pub fn is_resolved_status(status: &str) -> bool {
    let status = status.trim().to_lowercase();
    RESOLVED_STATUSES.contains(&status.as_str())
}

/// Aggregate counts over the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStats {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_priority: BTreeMap<String, u64>,
    pub by_module: BTreeMap<String, u64>,
    pub open_count: u64,
    pub resolved_count: u64,
    pub recent_uploads: Vec<UploadRecord>,
}

impl RecordStats {
    /// `uploads` must already be newest first.
    pub fn compute(records: &[Record], uploads: &[UploadRecord]) -> Self {
        let mut stats = RecordStats {
            total: records.len() as u64,
            recent_uploads: uploads.iter().take(RECENT_UPLOADS).cloned().collect(),
            ..Default::default()
        };
        for r in records {
            if !r.status.is_empty() {
                *stats.by_status.entry(r.status.clone()).or_default() += 1;
            }
            if !r.priority.is_empty() {
                *stats.by_priority.entry(r.priority.clone()).or_default() += 1;
            }
            if !r.module.is_empty() {
                *stats.by_module.entry(r.module.clone()).or_default() += 1;
            }
            if is_resolved_status(&r.status) {
                stats.resolved_count += 1;
            } else {
                stats.open_count += 1;
            }
        }
        stats
    }
}
