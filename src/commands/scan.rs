use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::{CorpusArgs, DEFAULT_AUTHOR, ScanArgs};
use crate::commands::corpus::{discover_documents, document_id_for, load_document};
use crate::engine::geometry::StampRegion;
use crate::engine::highlight::{DEFAULT_COLOR, HighlightStyle};
use crate::engine::patterns::{ReferencePattern, load_pattern_config};
use crate::engine::scan::{DocumentScan, ScanCounters, ScanSettings, scan_document};
use crate::engine::xref::CrossReferenceIndex;
use crate::model::MatchReportRow;
use crate::util::{now_epoch_ms, now_utc_string, write_json_pretty};

/// Result of scanning a whole corpus, in corpus order.
#[derive(Debug, Default)]
pub struct CorpusScan {
    /// Source paths of the documents that scanned, aligned with `documents`.
    pub paths: Vec<PathBuf>,
    pub documents: Vec<DocumentScan>,
    pub counters: ScanCounters,
    pub skipped: usize,
    pub warnings: Vec<String>,
}

impl CorpusScan {
    pub fn index(&self) -> CrossReferenceIndex {
        CrossReferenceIndex::from_events(self.documents.iter().flat_map(|scan| scan.events.iter()))
    }

    pub fn report_rows(&self) -> Vec<MatchReportRow> {
        let mut rows = self
            .documents
            .iter()
            .flat_map(DocumentScan::report_rows)
            .collect::<Vec<MatchReportRow>>();
        rows.sort();
        rows.dedup();
        rows
    }
}

pub fn build_pattern(args: &CorpusArgs) -> Result<ReferencePattern> {
    let config = load_pattern_config(args.pattern_config.as_deref())?;
    ReferencePattern::new(&config)
}

/// Scans every document under the corpus directory. Documents are loaded
/// one at a time; with `jobs > 1` they fan out over a worker pool and the
/// results are reduced in corpus order.
pub fn scan_corpus(args: &CorpusArgs, settings: &ScanSettings<'_>) -> Result<CorpusScan> {
    let paths = discover_documents(&args.corpus_dir, args.recursive)?;
    info!(
        corpus_dir = %args.corpus_dir.display(),
        documents = paths.len(),
        jobs = args.jobs,
        "scanning corpus"
    );

    let results = if args.jobs > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(args.jobs)
            .build()
            .context("failed to build scan worker pool")?;
        pool.install(|| {
            paths
                .par_iter()
                .map(|path| scan_path(path, settings))
                .collect::<Vec<Result<DocumentScan>>>()
        })
    } else {
        paths
            .iter()
            .map(|path| scan_path(path, settings))
            .collect::<Vec<Result<DocumentScan>>>()
    };

    let mut corpus = CorpusScan::default();

    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(scan) => {
                corpus.paths.push(path.clone());
                corpus.counters += scan.counters;
                corpus.documents.push(scan);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %format!("{err:#}"), "document skipped");
                corpus.skipped += 1;
                corpus
                    .warnings
                    .push(format!("{}: document skipped: {err:#}", path.display()));
            }
        }
    }

    info!(
        documents = corpus.documents.len(),
        skipped = corpus.skipped,
        pages = corpus.counters.pages,
        references = corpus.counters.references_found,
        "corpus scan complete"
    );

    Ok(corpus)
}

fn scan_path(path: &Path, settings: &ScanSettings<'_>) -> Result<DocumentScan> {
    let document_id = document_id_for(path)?;
    let document = load_document(path)?;
    let scan = scan_document(&document_id, &document.pages, settings);

    info!(
        doc_id = %document_id,
        pages = scan.counters.pages,
        references = scan.counters.references_found,
        highlights = scan.records.len(),
        "scanned document"
    );
    Ok(scan)
}

#[derive(Debug, Serialize)]
struct ReferencedInReport {
    generated_at: String,
    identifiers: usize,
    referenced_in: BTreeMap<String, Vec<String>>,
}

pub fn run(args: ScanArgs) -> Result<()> {
    let pattern = build_pattern(&args.corpus)?;
    let style = HighlightStyle::new(DEFAULT_AUTHOR, DEFAULT_COLOR);
    let settings = ScanSettings {
        pattern: &pattern,
        stamp: StampRegion::new(args.corpus.stamp_width, args.corpus.stamp_height),
        style: &style,
        timestamp_ms: now_epoch_ms(),
    };

    let corpus = scan_corpus(&args.corpus, &settings)?;

    let index = corpus.index();
    if index.is_empty() {
        warn!("no references located in corpus");
    }

    let rows = corpus.report_rows();
    write_json_pretty(&args.report_path, &rows)?;
    info!(path = %args.report_path.display(), rows = rows.len(), "wrote match report");

    if let Some(path) = &args.referenced_in_path {
        let referenced_in = index.citations_by_identifier();
        let report = ReferencedInReport {
            generated_at: now_utc_string(),
            identifiers: referenced_in.len(),
            referenced_in,
        };
        write_json_pretty(path, &report)?;
        info!(path = %path.display(), identifiers = report.identifiers, "wrote referenced-in report");
    }

    Ok(())
}
