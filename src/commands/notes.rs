use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::NotesArgs;
use crate::commands::table::{load_store, save_store};
use crate::engine::merge::AnnotationStore;
use crate::engine::patterns::normalize_identifier;
use crate::engine::xref::{CrossReferenceIndex, NoteSections, rebuild_notes};
use crate::model::MatchReportRow;
use crate::util::now_epoch_ms;

pub fn read_report(path: &Path) -> Result<Vec<MatchReportRow>> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse match report {}", path.display()))
}

/// Documents whose note the selected sections can speak for: every stored
/// document, plus the citing documents (refers-to) or the cited identifiers
/// (referenced-in, transcript) of the report.
pub fn note_targets(
    store: &AnnotationStore,
    rows: &[MatchReportRow],
    sections: NoteSections,
) -> BTreeSet<String> {
    let mut targets = store
        .documents()
        .map(|(document_id, _)| document_id.clone())
        .collect::<BTreeSet<String>>();

    for row in rows {
        if matches!(sections, NoteSections::RefersTo | NoteSections::All) {
            targets.insert(row.document.clone());
        }
        if !matches!(sections, NoteSections::RefersTo) {
            let identifier = normalize_identifier(&row.matched_text);
            if !identifier.is_empty() {
                targets.insert(identifier);
            }
        }
    }

    targets
}

pub fn apply_report_notes(
    store: &mut AnnotationStore,
    rows: &[MatchReportRow],
    author: &str,
    sections: NoteSections,
    timestamp_ms: i64,
) -> Result<usize> {
    let index = CrossReferenceIndex::from_report_rows(rows);
    let targets = note_targets(store, rows, sections);
    rebuild_notes(store, &index, &targets, author, sections, timestamp_ms)
}

pub fn run(args: NotesArgs) -> Result<()> {
    let rows = read_report(&args.report_path)?;
    if rows.is_empty() {
        warn!(path = %args.report_path.display(), "match report has no rows");
    }

    let mut store = match &args.store_path {
        Some(path) => {
            let loaded = load_store(path)?;
            for warning in &loaded.warnings {
                warn!(warning = %warning, "store warning");
            }
            loaded.store
        }
        None => AnnotationStore::new(),
    };

    info!(
        rows = rows.len(),
        sections = args.sections.as_str(),
        "rebuilding notes from match report"
    );
    let written = apply_report_notes(
        &mut store,
        &rows,
        &args.author,
        args.sections,
        now_epoch_ms(),
    )?;

    save_store(&args.output_path, &store)?;
    info!(
        path = %args.output_path.display(),
        notes = written,
        documents = store.len(),
        "notes rebuilt"
    );
    Ok(())
}
