use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::codec::{
    DocumentAnnotations, StoredHighlight, atty_note_author, decode_payload, encode_payload,
    parse_atty_note,
};
use crate::engine::highlight::AnnotationRecord;
use crate::engine::identity::{Deduplicator, IdentityKey, identity_key};
use crate::model::{AttyNote, HIGHLIGHT_UNIT, TableRow};

/// Annotation state for every document of one table, keyed by document id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationStore {
    documents: BTreeMap<String, DocumentAnnotations>,
}

#[derive(Debug, Default)]
pub struct StoreLoadOutcome {
    pub store: AnnotationStore,
    pub warnings: Vec<String>,
    pub legacy_fragments: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub documents_touched: usize,
    pub documents_created: usize,
    pub highlights_existing: usize,
    pub highlights_appended: usize,
    pub duplicates_dropped: usize,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from table rows. Unreadable payloads become empty
    /// documents that keep their original text, and are reported, never
    /// fatal.
    pub fn from_rows(rows: &[TableRow]) -> StoreLoadOutcome {
        let mut outcome = StoreLoadOutcome::default();

        for row in rows {
            let document_id = row.document_id.trim();
            if document_id.is_empty() {
                outcome
                    .warnings
                    .push("annotation row without a document id skipped".to_string());
                continue;
            }

            let decoded = decode_payload(&row.annotation_data);
            for issue in decoded.issues {
                warn!(doc_id = %document_id, issue = %issue, "annotation payload issue");
                outcome.warnings.push(format!("{document_id}: {issue}"));
            }
            outcome.legacy_fragments += decoded.legacy_fragments;

            match outcome.store.documents.get_mut(document_id) {
                Some(existing) => {
                    outcome.warnings.push(format!(
                        "{document_id}: duplicate annotation row folded into the first"
                    ));
                    absorb(existing, decoded.document);
                }
                None => {
                    outcome
                        .store
                        .documents
                        .insert(document_id.to_string(), decoded.document);
                }
            }
        }

        outcome
    }

    pub fn to_rows(&self) -> Result<Vec<TableRow>> {
        self.documents
            .iter()
            .map(|(document_id, document)| {
                let annotation_data = encode_payload(document)
                    .with_context(|| format!("failed to encode annotations for {document_id}"))?;
                Ok(TableRow {
                    document_id: document_id.clone(),
                    annotation_data,
                })
            })
            .collect()
    }

    pub fn document(&self, document_id: &str) -> Option<&DocumentAnnotations> {
        self.documents.get(document_id)
    }

    pub fn document_mut(&mut self, document_id: &str) -> &mut DocumentAnnotations {
        self.documents.entry(document_id.to_string()).or_default()
    }

    pub fn documents(&self) -> impl Iterator<Item = (&String, &DocumentAnnotations)> {
        self.documents.iter()
    }

    pub fn documents_mut(&mut self) -> impl Iterator<Item = (&String, &mut DocumentAnnotations)> {
        self.documents.iter_mut()
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.documents.contains_key(document_id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn highlight_count(&self) -> usize {
        self.documents
            .values()
            .map(|document| document.highlights.len())
            .sum()
    }

    /// Appends every new record whose identity key is absent from both the
    /// document's stored highlights and the records admitted before it.
    /// Stored highlights are never removed or rewritten.
    pub fn merge(
        &mut self,
        new_records: &BTreeMap<String, Vec<AnnotationRecord>>,
    ) -> Result<MergeStats> {
        let mut stats = MergeStats::default();

        for (document_id, records) in new_records {
            if records.is_empty() {
                continue;
            }

            if !self.contains(document_id) {
                debug!(doc_id = %document_id, "document absent from store, starting empty");
                stats.documents_created += 1;
            }
            let document = self.document_mut(document_id);
            stats.highlights_existing += document.highlights.len();

            let document_stats = merge_document(document, records)
                .with_context(|| format!("failed to merge highlights for {document_id}"))?;
            stats.highlights_appended += document_stats.appended;
            stats.duplicates_dropped += document_stats.dropped;
            stats.documents_touched += 1;
        }

        Ok(stats)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentMergeStats {
    pub appended: usize,
    pub dropped: usize,
}

pub fn stored_keys(document: &DocumentAnnotations) -> Vec<IdentityKey> {
    document
        .highlights
        .iter()
        .filter_map(|stored| stored.parsed.as_ref())
        .map(identity_key)
        .collect()
}

pub fn merge_document(
    document: &mut DocumentAnnotations,
    records: &[AnnotationRecord],
) -> Result<DocumentMergeStats> {
    let mut dedup = Deduplicator::seeded(stored_keys(document));
    let mut appended = 0usize;

    for record in records {
        if !dedup.admit(identity_key(&record.highlight)) {
            continue;
        }
        document
            .highlights
            .push(StoredHighlight::from_highlight(&record.highlight)?);
        appended += 1;
    }

    Ok(DocumentMergeStats {
        appended,
        dropped: dedup.dropped(),
    })
}

fn absorb(target: &mut DocumentAnnotations, other: DocumentAnnotations) {
    target.highlights.extend(other.highlights);
    for note in other.atty_notes {
        let author = atty_note_author(&note).map(ToOwned::to_owned);
        let already_present = target
            .atty_notes
            .iter()
            .any(|existing| author.is_some() && atty_note_author(existing) == author.as_deref());
        if !already_present {
            target.atty_notes.push(note);
        }
    }
    for (key, value) in other.extra {
        target.extra.entry(key).or_insert(value);
    }
    if target.raw_payload.is_none() {
        target.raw_payload = other.raw_payload;
    }
}

/// Replaces the note owned by `author` with `text`, keeping its creation
/// time. Notes from other authors are left as they are.
pub fn upsert_automated_note(
    document: &mut DocumentAnnotations,
    author: &str,
    text: String,
    timestamp_ms: i64,
) -> Result<()> {
    let position = document
        .atty_notes
        .iter()
        .position(|note| atty_note_author(note) == Some(author));

    let created = position
        .and_then(|index| parse_atty_note(&document.atty_notes[index]))
        .and_then(|note| note.created)
        .unwrap_or(timestamp_ms);

    let note = AttyNote {
        text,
        created: Some(created),
        updated: Some(timestamp_ms),
        parent_type: "Document".to_string(),
        parent_id: 0,
        id: 0,
        user: author.to_string(),
        unit: HIGHLIGHT_UNIT.to_string(),
    };
    let value: Value = serde_json::to_value(&note).context("failed to serialize AttyNote")?;

    match position {
        Some(index) => document.atty_notes[index] = value,
        None => document.atty_notes.push(value),
    }

    Ok(())
}

pub fn automated_note(document: &DocumentAnnotations, author: &str) -> Option<AttyNote> {
    document
        .atty_notes
        .iter()
        .find(|note| atty_note_author(note) == Some(author))
        .and_then(parse_atty_note)
}

/// Drops stored highlights whose identity key repeats an earlier one.
/// Unreadable fragments have no key and are always kept.
pub fn dedupe_document(document: &mut DocumentAnnotations) -> usize {
    let mut dedup = Deduplicator::new();
    document.highlights.retain(|stored| match &stored.parsed {
        Some(highlight) => dedup.admit(identity_key(highlight)),
        None => true,
    });
    dedup.dropped()
}
