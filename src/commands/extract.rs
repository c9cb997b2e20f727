use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::ExtractArgs;
use crate::commands::table::load_store;
use crate::engine::merge::AnnotationStore;
use crate::util::write_json_pretty;

/// One exported highlight note. Highlights without notes export once with
/// an empty `note`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedRow {
    pub document: String,
    pub marked_text: String,
    pub note: String,
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub rows: Vec<ExtractedRow>,
    pub unreadable: usize,
}

pub fn extract_rows(store: &AnnotationStore, user: Option<&str>) -> Extraction {
    let mut extraction = Extraction::default();

    for (document_id, document) in store.documents() {
        for stored in &document.highlights {
            let Some(highlight) = &stored.parsed else {
                extraction.unreadable += 1;
                continue;
            };
            if user.is_some_and(|user| highlight.user != user) {
                continue;
            }

            if highlight.notes.is_empty() {
                extraction.rows.push(ExtractedRow {
                    document: document_id.clone(),
                    marked_text: highlight.marked_text.clone(),
                    note: String::new(),
                });
            }
            for note in &highlight.notes {
                extraction.rows.push(ExtractedRow {
                    document: document_id.clone(),
                    marked_text: highlight.marked_text.clone(),
                    note: note.text.clone(),
                });
            }
        }
    }

    extraction
}

pub fn run(args: ExtractArgs) -> Result<()> {
    let loaded = load_store(&args.store_path)?;
    for warning in &loaded.warnings {
        warn!(warning = %warning, "store warning");
    }

    let extraction = extract_rows(&loaded.store, args.user.as_deref());
    if extraction.unreadable > 0 {
        warn!(
            fragments = extraction.unreadable,
            "unreadable highlight fragments left out of the export"
        );
    }

    write_json_pretty(&args.output_path, &extraction.rows)?;
    info!(
        path = %args.output_path.display(),
        rows = extraction.rows.len(),
        "wrote highlight export"
    );
    Ok(())
}
