//! Core data models for Clarion.
//!
//! A [`RecordDraft`] is what arrives at the ingestion boundary (one
//! spreadsheet row, or a single manual add/edit). A [`Record`] is what the
//! store holds: the draft's fields plus the derived keyword list, content
//! hash, and first-seen timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named fields of a clarification record.
///
/// Used as keys for highlight maps, search weights, and keyword source
/// selection. Serialized in `snake_case` to match the column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    SNo,
    Module,
    ScenarioSteps,
    Status,
    OffshoreComments,
    OnsiteComments,
    Date,
    Tester,
    OffshoreReviewer,
    Open,
    AddressedBy,
    DefectShouldBeRaised,
    Priority,
    AssignedTo,
    Reason,
    Keywords,
}

impl RecordField {
    /// Every field, in spreadsheet column order.
    pub const ALL: [RecordField; 16] = [
        RecordField::SNo,
        RecordField::Module,
        RecordField::ScenarioSteps,
        RecordField::Status,
        RecordField::OffshoreComments,
        RecordField::OnsiteComments,
        RecordField::Date,
        RecordField::Tester,
        RecordField::OffshoreReviewer,
        RecordField::Open,
        RecordField::AddressedBy,
        RecordField::DefectShouldBeRaised,
        RecordField::Priority,
        RecordField::AssignedTo,
        RecordField::Reason,
        RecordField::Keywords,
    ];

    /// Column name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordField::SNo => "s_no",
            RecordField::Module => "module",
            RecordField::ScenarioSteps => "scenario_steps",
            RecordField::Status => "status",
            RecordField::OffshoreComments => "offshore_comments",
            RecordField::OnsiteComments => "onsite_comments",
            RecordField::Date => "date",
            RecordField::Tester => "tester",
            RecordField::OffshoreReviewer => "offshore_reviewer",
            RecordField::Open => "open",
            RecordField::AddressedBy => "addressed_by",
            RecordField::DefectShouldBeRaised => "defect_should_be_raised",
            RecordField::Priority => "priority",
            RecordField::AssignedTo => "assigned_to",
            RecordField::Reason => "reason",
            RecordField::Keywords => "keywords",
        }
    }

    /// Spreadsheet header label.
    pub fn label(&self) -> &'static str {
        match self {
            RecordField::SNo => "S.no",
            RecordField::Module => "Module",
            RecordField::ScenarioSteps => "Scenario/Steps to be Reproduce",
            RecordField::Status => "Status",
            RecordField::OffshoreComments => "Offshore Comments",
            RecordField::OnsiteComments => "Onsite Comments",
            RecordField::Date => "Date",
            RecordField::Tester => "Tester",
            RecordField::OffshoreReviewer => "Offshore Reviewer",
            RecordField::Open => "Open",
            RecordField::AddressedBy => "Addressed by",
            RecordField::DefectShouldBeRaised => "Defect should be raised",
            RecordField::Priority => "Priority",
            RecordField::AssignedTo => "Assigned To",
            RecordField::Reason => "Reason",
            RecordField::Keywords => "Keywords",
        }
    }

    /// Parse a column name (`"scenario_steps"`) back into a field.
    pub fn from_column(name: &str) -> Option<RecordField> {
        RecordField::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == name)
    }
}

/// An incoming, possibly partial record.
///
/// Missing text fields default to the empty string. `id` is set only on
/// the edit path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordDraft {
    pub id: Option<String>,
    pub s_no: Option<i64>,
    pub module: String,
    pub scenario_steps: String,
    pub status: String,
    pub offshore_comments: String,
    pub onsite_comments: String,
    pub date: String,
    pub tester: String,
    pub offshore_reviewer: String,
    pub open: String,
    pub addressed_by: String,
    pub defect_should_be_raised: String,
    pub priority: String,
    pub assigned_to: String,
    pub reason: String,
}

impl RecordDraft {
    /// Mutable access to a text field. `SNo` and `Keywords` are not text
    /// columns of a draft and return `None`.
    pub fn text_mut(&mut self, field: RecordField) -> Option<&mut String> {
        let slot = match field {
            RecordField::Module => &mut self.module,
            RecordField::ScenarioSteps => &mut self.scenario_steps,
            RecordField::Status => &mut self.status,
            RecordField::OffshoreComments => &mut self.offshore_comments,
            RecordField::OnsiteComments => &mut self.onsite_comments,
            RecordField::Date => &mut self.date,
            RecordField::Tester => &mut self.tester,
            RecordField::OffshoreReviewer => &mut self.offshore_reviewer,
            RecordField::Open => &mut self.open,
            RecordField::AddressedBy => &mut self.addressed_by,
            RecordField::DefectShouldBeRaised => &mut self.defect_should_be_raised,
            RecordField::Priority => &mut self.priority,
            RecordField::AssignedTo => &mut self.assigned_to,
            RecordField::Reason => &mut self.reason,
            RecordField::SNo | RecordField::Keywords => return None,
        };
        Some(slot)
    }

    /// Text of a field; empty for `SNo` and `Keywords`.
    pub fn text(&self, field: RecordField) -> &str {
        match field {
            RecordField::Module => &self.module,
            RecordField::ScenarioSteps => &self.scenario_steps,
            RecordField::Status => &self.status,
            RecordField::OffshoreComments => &self.offshore_comments,
            RecordField::OnsiteComments => &self.onsite_comments,
            RecordField::Date => &self.date,
            RecordField::Tester => &self.tester,
            RecordField::OffshoreReviewer => &self.offshore_reviewer,
            RecordField::Open => &self.open,
            RecordField::AddressedBy => &self.addressed_by,
            RecordField::DefectShouldBeRaised => &self.defect_should_be_raised,
            RecordField::Priority => &self.priority,
            RecordField::AssignedTo => &self.assigned_to,
            RecordField::Reason => &self.reason,
            RecordField::SNo | RecordField::Keywords => "",
        }
    }
}

/// A stored clarification record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub s_no: Option<i64>,
    pub module: String,
    pub scenario_steps: String,
    pub status: String,
    pub offshore_comments: String,
    pub onsite_comments: String,
    pub date: String,
    pub tester: String,
    pub offshore_reviewer: String,
    pub open: String,
    pub addressed_by: String,
    pub defect_should_be_raised: String,
    pub priority: String,
    pub assigned_to: String,
    pub reason: String,
    /// Comma-and-space joined keywords, derived from text fields.
    pub keywords: String,
    /// 64-char lowercase SHA-256 hex of the canonical field tuple.
    pub row_hash: String,
    pub first_seen_at: DateTime<Utc>,
    pub source_upload_id: Option<String>,
}

impl Record {
    /// Build a stored record from a draft plus derived values.
    pub fn from_draft(
        draft: RecordDraft,
        id: String,
        keywords: String,
        row_hash: String,
        first_seen_at: DateTime<Utc>,
        source_upload_id: Option<String>,
    ) -> Self {
        Self {
            id,
            s_no: draft.s_no,
            module: draft.module,
            scenario_steps: draft.scenario_steps,
            status: draft.status,
            offshore_comments: draft.offshore_comments,
            onsite_comments: draft.onsite_comments,
            date: draft.date,
            tester: draft.tester,
            offshore_reviewer: draft.offshore_reviewer,
            open: draft.open,
            addressed_by: draft.addressed_by,
            defect_should_be_raised: draft.defect_should_be_raised,
            priority: draft.priority,
            assigned_to: draft.assigned_to,
            reason: draft.reason,
            keywords,
            row_hash,
            first_seen_at,
            source_upload_id,
        }
    }

    /// Text of a field. `SNo` is rendered as a decimal string (empty when
    /// absent), so callers get an owned value for it.
    pub fn text(&self, field: RecordField) -> std::borrow::Cow<'_, str> {
        use std::borrow::Cow;
        match field {
            RecordField::SNo => Cow::Owned(self.s_no.map(|n| n.to_string()).unwrap_or_default()),
            RecordField::Module => Cow::Borrowed(&self.module),
            RecordField::ScenarioSteps => Cow::Borrowed(&self.scenario_steps),
            RecordField::Status => Cow::Borrowed(&self.status),
            RecordField::OffshoreComments => Cow::Borrowed(&self.offshore_comments),
            RecordField::OnsiteComments => Cow::Borrowed(&self.onsite_comments),
            RecordField::Date => Cow::Borrowed(&self.date),
            RecordField::Tester => Cow::Borrowed(&self.tester),
            RecordField::OffshoreReviewer => Cow::Borrowed(&self.offshore_reviewer),
            RecordField::Open => Cow::Borrowed(&self.open),
            RecordField::AddressedBy => Cow::Borrowed(&self.addressed_by),
            RecordField::DefectShouldBeRaised => Cow::Borrowed(&self.defect_should_be_raised),
            RecordField::Priority => Cow::Borrowed(&self.priority),
            RecordField::AssignedTo => Cow::Borrowed(&self.assigned_to),
            RecordField::Reason => Cow::Borrowed(&self.reason),
            RecordField::Keywords => Cow::Borrowed(&self.keywords),
        }
    }

    /// Back to a draft carrying this record's identity, for the edit path.
    pub fn to_draft(&self) -> RecordDraft {
        RecordDraft {
            id: Some(self.id.clone()),
            s_no: self.s_no,
            module: self.module.clone(),
            scenario_steps: self.scenario_steps.clone(),
            status: self.status.clone(),
            offshore_comments: self.offshore_comments.clone(),
            onsite_comments: self.onsite_comments.clone(),
            date: self.date.clone(),
            tester: self.tester.clone(),
            offshore_reviewer: self.offshore_reviewer.clone(),
            open: self.open.clone(),
            addressed_by: self.addressed_by.clone(),
            defect_should_be_raised: self.defect_should_be_raised.clone(),
            priority: self.priority.clone(),
            assigned_to: self.assigned_to.clone(),
            reason: self.reason.clone(),
        }
    }
}

/// Audit row persisted once per ingested batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: String,
    pub filename: String,
    pub sheet_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub total_rows_in_file: u64,
    pub added_count: u64,
    pub duplicates_skipped: u64,
    pub failed_rows: u64,
}

/// A row that could not be ingested because of an infrastructure error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    /// Zero-based row position. Import rejects use the position in the
    /// source file, ingest failures the position among the parsed drafts.
    pub row: usize,
    pub message: String,
}

/// Outcome counts of a bulk ingestion.
///
/// Always populated, including for empty and all-duplicate batches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSummary {
    pub upload_id: String,
    pub added_count: u64,
    pub duplicates_skipped: u64,
    pub failed_rows: u64,
    pub total_rows_in_batch: u64,
    pub total_rows_now_in_store: u64,
    /// Set when the store became unreachable and the rest of the batch was
    /// not attempted. Counts reflect the rows processed before that.
    pub aborted: bool,
    pub errors: Vec<RowError>,
}

/// Result of a single-record create or edit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_duplicate: Option<bool>,
}

impl SaveOutcome {
    pub fn saved(id: String) -> Self {
        Self {
            success: true,
            id: Some(id),
            error: None,
            is_duplicate: None,
        }
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            error: Some(message.into()),
            is_duplicate: Some(true),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            error: Some(message.into()),
            is_duplicate: None,
        }
    }
}

/// One ranked search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    /// Relevance in `[0.0, 1.0]`; 1.0 is a perfect match.
    pub score: f64,
    pub record: Record,
    /// Highlighted excerpts keyed by field, only for fields that matched.
    pub highlights: BTreeMap<RecordField, String>,
}

/// Timing of one search call, for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    pub matching_ms: f64,
    pub total_ms: f64,
}

/// The full response of one search call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub suggestions: Vec<String>,
    pub stats: SearchStats,
}
