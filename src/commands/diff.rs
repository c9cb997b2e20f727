use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::DiffArgs;
use crate::commands::table::{load_store, save_store};
use crate::engine::codec::{DocumentAnnotations, StoredHighlight};
use crate::engine::identity::{IdentityKey, identity_key};
use crate::engine::merge::AnnotationStore;
use crate::util::write_json_pretty;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffIssue {
    MissingInOther,
    ExtraInOther,
    DocumentMissingInOther,
    DocumentExtraInOther,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffEntry {
    pub document_id: String,
    pub issue: DiffIssue,
    pub master_highlights: Vec<String>,
    pub other_highlights: Vec<String>,
}

/// Comparison key; fragments that could not be read compare by raw text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DiffKey {
    Identity(IdentityKey),
    Raw(String),
}

fn diff_key(stored: &StoredHighlight) -> DiffKey {
    match &stored.parsed {
        Some(highlight) => DiffKey::Identity(identity_key(highlight)),
        None => DiffKey::Raw(stored.raw.clone()),
    }
}

fn authored_by(stored: &StoredHighlight, users: &[String]) -> bool {
    if users.is_empty() {
        return true;
    }
    stored
        .parsed
        .as_ref()
        .map(|highlight| users.iter().any(|user| *user == highlight.user))
        .unwrap_or(false)
}

/// Multiset difference of two highlight lists: (missing from other, extra in other).
pub fn match_highlights<'a>(
    master: &[&'a StoredHighlight],
    other: &[&'a StoredHighlight],
) -> (Vec<&'a StoredHighlight>, Vec<&'a StoredHighlight>) {
    let mut unmatched = HashMap::<DiffKey, Vec<usize>>::new();
    for (index, stored) in other.iter().enumerate().rev() {
        unmatched.entry(diff_key(stored)).or_default().push(index);
    }

    let mut used = vec![false; other.len()];
    let mut missing = Vec::new();
    for stored in master {
        match unmatched.get_mut(&diff_key(stored)).and_then(Vec::pop) {
            Some(index) => used[index] = true,
            None => missing.push(*stored),
        }
    }

    let extra = other
        .iter()
        .zip(used)
        .filter(|(_, used)| !used)
        .map(|(stored, _)| *stored)
        .collect();

    (missing, extra)
}

fn filtered<'a>(document: &'a DocumentAnnotations, users: &[String]) -> Vec<&'a StoredHighlight> {
    document
        .highlights
        .iter()
        .filter(|stored| authored_by(stored, users))
        .collect()
}

fn raws(items: &[&StoredHighlight]) -> Vec<String> {
    items.iter().map(|stored| stored.raw.clone()).collect()
}

/// Compares `other` against `master`. Also returns, per document, the
/// master highlights that `other` lacks.
pub fn compare_stores(
    master: &AnnotationStore,
    other: &AnnotationStore,
    users: &[String],
) -> (Vec<DiffEntry>, Vec<(String, Vec<StoredHighlight>)>) {
    let mut entries = Vec::new();
    let mut fixes = Vec::new();

    for (document_id, master_document) in master.documents() {
        let master_items = filtered(master_document, users);
        let Some(other_document) = other.document(document_id) else {
            entries.push(DiffEntry {
                document_id: document_id.clone(),
                issue: DiffIssue::DocumentMissingInOther,
                master_highlights: raws(&master_items),
                other_highlights: Vec::new(),
            });
            continue;
        };

        let other_items = filtered(other_document, users);
        let (missing, extra) = match_highlights(&master_items, &other_items);

        if !missing.is_empty() {
            entries.push(DiffEntry {
                document_id: document_id.clone(),
                issue: DiffIssue::MissingInOther,
                master_highlights: raws(&missing),
                other_highlights: Vec::new(),
            });
            fixes.push((
                document_id.clone(),
                missing.into_iter().cloned().collect::<Vec<StoredHighlight>>(),
            ));
        }
        if !extra.is_empty() {
            entries.push(DiffEntry {
                document_id: document_id.clone(),
                issue: DiffIssue::ExtraInOther,
                master_highlights: Vec::new(),
                other_highlights: raws(&extra),
            });
        }
    }

    let master_ids = master
        .documents()
        .map(|(document_id, _)| document_id.clone())
        .collect::<BTreeSet<String>>();
    for (document_id, other_document) in other.documents() {
        if master_ids.contains(document_id) {
            continue;
        }
        entries.push(DiffEntry {
            document_id: document_id.clone(),
            issue: DiffIssue::DocumentExtraInOther,
            master_highlights: Vec::new(),
            other_highlights: raws(&filtered(other_document, users)),
        });
    }

    (entries, fixes)
}

pub fn run(args: DiffArgs) -> Result<()> {
    let master = load_store(&args.master_path)?;
    let other = load_store(&args.other_path)?;
    for warning in master.warnings.iter().chain(other.warnings.iter()) {
        warn!(warning = %warning, "store warning");
    }

    let (entries, fixes) = compare_stores(&master.store, &other.store, &args.users);
    write_json_pretty(&args.report_path, &entries)?;
    info!(
        path = %args.report_path.display(),
        differences = entries.len(),
        "wrote diff report"
    );

    if let Some(fix_path) = &args.fix_output {
        let mut fixed = other.store;
        let mut appended = 0usize;
        for (document_id, missing) in fixes {
            appended += missing.len();
            fixed.document_mut(&document_id).highlights.extend(missing);
        }
        save_store(fix_path, &fixed)?;
        info!(path = %fix_path.display(), appended, "wrote fixed table");
    }

    Ok(())
}
