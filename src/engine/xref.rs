use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use clap::ValueEnum;

use crate::engine::identity::CrossRefKey;
use crate::engine::merge::{AnnotationStore, automated_note, upsert_automated_note};
use crate::engine::patterns::{normalize_identifier, strip_exhibit_prefix};
use crate::model::MatchReportRow;
use crate::util::padded_page;

pub const REFERS_TO_HEADER: &str = "<b>Refers To:</b> <br>";
pub const REFERENCED_IN_HEADER: &str = "<b>Referenced In:</b> <br>";
pub const TRANSCRIPT_HEADER: &str = "<b>Transcript:</b> <br>";

/// One accepted reference observed during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEvent {
    pub document_id: String,
    /// Matched identifier with line breaks collapsed, `Exhibit` removed.
    pub identifier: String,
    pub normalized: String,
    /// 0-based page index.
    pub page_index: u32,
}

/// Which parts of the cross-reference note get written.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum NoteSections {
    RefersTo,
    ReferencedIn,
    /// Referenced-in locations filed under the transcript header.
    Transcript,
    All,
}

impl NoteSections {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RefersTo => "refers-to",
            Self::ReferencedIn => "referenced-in",
            Self::Transcript => "transcript",
            Self::All => "all",
        }
    }
}

/// Derived "who cites whom" view over every event of one run.
#[derive(Debug, Clone, Default)]
pub struct CrossReferenceIndex {
    /// Loose key to the compact identifiers seen under it.
    events: BTreeMap<CrossRefKey, BTreeSet<String>>,
}

impl CrossReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a MatchEvent>,
    {
        let mut index = Self::new();
        for event in events {
            index.record(event);
        }
        index
    }

    /// Rebuilds the index from a saved match report instead of a scan.
    pub fn from_report_rows(rows: &[MatchReportRow]) -> Self {
        let mut index = Self::new();
        for row in rows {
            index.record(&MatchEvent {
                document_id: row.document.clone(),
                identifier: row.matched_text.clone(),
                normalized: normalize_identifier(&row.matched_text),
                page_index: row.page.saturating_sub(1),
            });
        }
        index
    }

    pub fn record(&mut self, event: &MatchEvent) {
        let key = CrossRefKey {
            document_id: event.document_id.clone(),
            normalized_text: event.normalized.clone(),
            page_index: event.page_index,
        };
        self.events
            .entry(key)
            .or_default()
            .insert(compact_identifier(&event.identifier));
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// `"<identifier> at <page>"` for every identifier found in `document_id`.
    pub fn refers_to(&self, document_id: &str) -> Vec<String> {
        self.events
            .keys()
            .filter(|key| key.document_id == document_id)
            .map(|key| format!("{} at {}", key.normalized_text, padded_page(key.page_index + 1)))
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect()
    }

    /// `"<citing document> at <page>"` for every other document that
    /// mentions `document_id`, with or without a `_NNNN` qualifier.
    pub fn referenced_in(&self, document_id: &str) -> Vec<String> {
        let target = compact_identifier(document_id);
        let target_normalized = normalize_identifier(document_id);
        let qualified_prefix = format!("{target}_");

        self.events
            .iter()
            .filter(|(key, _)| key.document_id != document_id)
            .filter(|(key, identifiers)| {
                key.normalized_text == target
                    || (key.normalized_text == target_normalized
                        && identifiers.iter().any(|identifier| {
                            *identifier == target || identifier.starts_with(&qualified_prefix)
                        }))
            })
            .map(|(key, _)| format!("{} at {}", key.document_id, padded_page(key.page_index + 1)))
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect()
    }

    /// Identifiers cited anywhere in the run, each with its citing locations.
    pub fn citations_by_identifier(&self) -> BTreeMap<String, Vec<String>> {
        let mut out = BTreeMap::<String, BTreeSet<String>>::new();
        for key in self.events.keys() {
            out.entry(key.normalized_text.clone())
                .or_default()
                .insert(format!("{} at {}", key.document_id, padded_page(key.page_index + 1)));
        }
        out.into_iter()
            .map(|(identifier, locations)| (identifier, locations.into_iter().collect()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossReferenceNote {
    pub refers_to: Vec<String>,
    pub referenced_in: Vec<String>,
}

impl CrossReferenceNote {
    pub fn for_document(index: &CrossReferenceIndex, document_id: &str) -> Self {
        Self {
            refers_to: index.refers_to(document_id),
            referenced_in: index.referenced_in(document_id),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.refers_to.is_empty() && self.referenced_in.is_empty()
    }

    pub fn is_empty_for(&self, sections: NoteSections) -> bool {
        match sections {
            NoteSections::RefersTo => self.refers_to.is_empty(),
            NoteSections::ReferencedIn | NoteSections::Transcript => self.referenced_in.is_empty(),
            NoteSections::All => self.is_empty(),
        }
    }

    pub fn render_sections(&self, sections: NoteSections) -> String {
        let mut out = String::new();
        match sections {
            NoteSections::RefersTo => {
                out.push_str(REFERS_TO_HEADER);
                push_items(&mut out, &self.refers_to);
            }
            NoteSections::ReferencedIn => {
                out.push_str(REFERENCED_IN_HEADER);
                push_items(&mut out, &self.referenced_in);
            }
            NoteSections::Transcript => {
                out.push_str(TRANSCRIPT_HEADER);
                push_items(&mut out, &self.referenced_in);
            }
            NoteSections::All => {
                out.push_str(REFERS_TO_HEADER);
                push_items(&mut out, &self.refers_to);
                out.push_str(REFERENCED_IN_HEADER);
                push_items(&mut out, &self.referenced_in);
                out.push_str(TRANSCRIPT_HEADER);
            }
        }
        out
    }
}

fn push_items(out: &mut String, items: &[String]) {
    for item in items {
        out.push(' ');
        out.push_str(item);
        out.push_str(" <br>");
    }
}

/// Uppercase identifier with whitespace and the `Exhibit` prefix removed;
/// qualifiers are kept.
pub fn compact_identifier(text: &str) -> String {
    strip_exhibit_prefix(text)
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Rewrites the automated author's document note for every target
/// document. Documents with nothing to say in the selected sections and no
/// prior automated note are left alone. Returns the number of notes written.
pub fn rebuild_notes(
    store: &mut AnnotationStore,
    index: &CrossReferenceIndex,
    target_documents: &BTreeSet<String>,
    author: &str,
    sections: NoteSections,
    timestamp_ms: i64,
) -> Result<usize> {
    let mut written = 0usize;

    for document_id in target_documents {
        let note = CrossReferenceNote::for_document(index, document_id);
        let has_prior = store
            .document(document_id)
            .and_then(|document| automated_note(document, author))
            .is_some();
        if note.is_empty_for(sections) && !has_prior {
            continue;
        }

        upsert_automated_note(
            store.document_mut(document_id),
            author,
            note.render_sections(sections),
            timestamp_ms,
        )
        .with_context(|| format!("failed to update document note for {document_id}"))?;
        written += 1;
    }

    Ok(written)
}
