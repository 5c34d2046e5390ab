//! Single-record create, edit, lookup, and listing.
//!
//! Used by `clarion add`, `clarion edit`, `clarion get`, `clarion list`
//! and the `POST /records` / `GET /records/{id}` endpoints.

use anyhow::{bail, Result};

use clarion_core::filter::RecordFilter;
use clarion_core::ingest::save_record;
use clarion_core::models::{Record, RecordDraft, RecordField, SaveOutcome};
use clarion_core::store::RecordStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Create or edit through the deduplicating save path.
pub async fn save(store: &dyn RecordStore, config: &Config, draft: RecordDraft) -> SaveOutcome {
    save_record(
        store,
        draft,
        &config.ingest.keyword_sources(),
        config.ingest.dedup_policy,
    )
    .await
}

/// Parse a `field=value` assignment for `--set`.
pub fn parse_assignment(s: &str) -> Result<(RecordField, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid FIELD=VALUE: no '=' found in '{}'", s))?;
    let name = s[..pos].trim();
    let field = RecordField::from_column(name)
        .filter(|f| *f != RecordField::Keywords)
        .ok_or_else(|| format!("unknown record field: '{}'", name))?;
    Ok((field, s[pos + 1..].to_string()))
}

/// Overlay assignments onto a draft.
pub fn apply_assignments(draft: &mut RecordDraft, assignments: &[(RecordField, String)]) -> Result<()> {
    for (field, value) in assignments {
        match field {
            RecordField::SNo => {
                let value = value.trim();
                draft.s_no = if value.is_empty() {
                    None
                } else {
                    match value.parse() {
                        Ok(n) => Some(n),
                        Err(_) => bail!("s_no must be an integer, got '{}'", value),
                    }
                };
            }
            other => {
                if let Some(slot) = draft.text_mut(*other) {
                    *slot = value.clone();
                }
            }
        }
    }
    Ok(())
}

fn report(outcome: &SaveOutcome) -> Result<()> {
    match outcome {
        SaveOutcome {
            success: true,
            id: Some(id),
            ..
        } => {
            println!("saved {}", id);
            println!("ok");
            Ok(())
        }
        SaveOutcome {
            is_duplicate: Some(true),
            error,
            ..
        } => {
            println!("duplicate: {}", error.as_deref().unwrap_or("record already exists"));
            bail!("record not saved")
        }
        SaveOutcome { error, .. } => {
            bail!("save failed: {}", error.as_deref().unwrap_or("unknown error"))
        }
    }
}

/// CLI entry point for `clarion add`.
pub async fn run_add(config: &Config, assignments: &[(RecordField, String)]) -> Result<()> {
    let mut draft = RecordDraft::default();
    apply_assignments(&mut draft, assignments)?;
    if draft.scenario_steps.trim().is_empty() {
        bail!("scenario_steps must not be empty");
    }

    let store = SqliteStore::open(config).await?;
    let outcome = save(&store, config, draft).await;
    store.close().await;
    report(&outcome)
}

/// CLI entry point for `clarion edit`. Unassigned fields keep their
/// stored values.
pub async fn run_edit(config: &Config, id: &str, assignments: &[(RecordField, String)]) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let existing = store.get_record(id).await;
    let outcome = match existing {
        Ok(Some(record)) => {
            let mut draft = record.to_draft();
            match apply_assignments(&mut draft, assignments) {
                Ok(()) => save(&store, config, draft).await,
                Err(e) => SaveOutcome::failed(e.to_string()),
            }
        }
        Ok(None) => SaveOutcome::failed(format!("record not found: {}", id)),
        Err(e) => SaveOutcome::failed(e.to_string()),
    };
    store.close().await;
    report(&outcome)
}

pub async fn get_record(store: &dyn RecordStore, id: &str) -> Result<Record> {
    match store.get_record(id).await? {
        Some(record) => Ok(record),
        None => bail!("record not found: {}", id),
    }
}

/// CLI entry point for `clarion get`.
pub async fn run_get(config: &Config, id: &str, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let record = get_record(&store, id).await;
    store.close().await;
    let record = record?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("--- Record ---");
    println!("{:<24}{}", "id:", record.id);
    for field in RecordField::ALL {
        let value = record.text(field);
        if !value.is_empty() {
            println!("{:<24}{}", format!("{}:", field.as_str()), value);
        }
    }
    println!("{:<24}{}", "row_hash:", record.row_hash);
    println!("{:<24}{}", "first_seen_at:", record.first_seen_at.to_rfc3339());
    if let Some(upload) = &record.source_upload_id {
        println!("{:<24}{}", "source_upload_id:", upload);
    }
    Ok(())
}

/// CLI entry point for `clarion list`.
pub async fn run_list(config: &Config, filter: &RecordFilter, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let records = store.all_records().await;
    store.close().await;
    let records = filter.apply(records?);

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No records.");
        return Ok(());
    }

    println!(
        "{:>5}  {:<14} {:<10} {:<8} {:<14} SCENARIO",
        "S.NO", "MODULE", "STATUS", "PRIO", "ASSIGNED"
    );
    println!("{}", "-".repeat(96));
    for r in &records {
        let scenario: String = r.scenario_steps.chars().take(40).collect();
        println!(
            "{:>5}  {:<14} {:<10} {:<8} {:<14} {}",
            r.s_no.map(|n| n.to_string()).unwrap_or_default(),
            truncate(&r.module, 14),
            truncate(&r.status, 10),
            truncate(&r.priority, 8),
            truncate(&r.assigned_to, 14),
            scenario
        );
    }
    println!();
    println!("{} records", records.len());
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("status=Closed").unwrap(),
            (RecordField::Status, "Closed".to_string())
        );
        assert_eq!(
            parse_assignment("reason=a=b").unwrap(),
            (RecordField::Reason, "a=b".to_string())
        );
        assert!(parse_assignment("nonsense").is_err());
        assert!(parse_assignment("bogus=1").is_err());
        assert!(parse_assignment("keywords=x").is_err());
    }

    #[test]
    fn test_apply_assignments() {
        let mut draft = RecordDraft::default();
        apply_assignments(
            &mut draft,
            &[
                (RecordField::SNo, "7".into()),
                (RecordField::ScenarioSteps, "Gate stuck".into()),
            ],
        )
        .unwrap();
        assert_eq!(draft.s_no, Some(7));
        assert_eq!(draft.scenario_steps, "Gate stuck");

        assert!(apply_assignments(&mut draft, &[(RecordField::SNo, "x".into())]).is_err());
        apply_assignments(&mut draft, &[(RecordField::SNo, "".into())]).unwrap();
        assert_eq!(draft.s_no, None);
    }
}
