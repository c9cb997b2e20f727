use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::LinkArgs;
use crate::commands::scan::{build_pattern, scan_corpus};
use crate::commands::table::{load_store, save_store};
use crate::engine::geometry::StampRegion;
use crate::engine::highlight::{AnnotationRecord, HighlightStyle};
use crate::engine::merge::AnnotationStore;
use crate::engine::scan::ScanSettings;
use crate::engine::xref::{NoteSections, rebuild_notes};
use crate::model::{LinkCounts, LinkPaths, LinkRunManifest, SourceHash};
use crate::util::{
    now_epoch_ms, now_utc_string, sha256_file, utc_compact_string, write_json_pretty,
};

pub fn run(args: LinkArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));
    let timestamp_ms = now_epoch_ms();

    info!(run_id = %run_id, corpus_dir = %args.corpus.corpus_dir.display(), "starting link");

    let mut warnings = Vec::<String>::new();
    let mut source_hashes = Vec::<SourceHash>::new();

    let mut store = match &args.store_path {
        Some(path) => {
            source_hashes.push(SourceHash {
                path: path.display().to_string(),
                sha256: sha256_file(path)?,
            });
            let loaded = load_store(path)?;
            if loaded.legacy_fragments > 0 {
                info!(
                    fragments = loaded.legacy_fragments,
                    "migrated legacy escaped highlight fragments"
                );
            }
            warnings.extend(loaded.warnings);
            loaded.store
        }
        None => AnnotationStore::new(),
    };

    let pattern = build_pattern(&args.corpus)?;
    let style = HighlightStyle::new(args.author.clone(), args.color.clone());
    let settings = ScanSettings {
        pattern: &pattern,
        stamp: StampRegion::new(args.corpus.stamp_width, args.corpus.stamp_height),
        style: &style,
        timestamp_ms,
    };

    let corpus = scan_corpus(&args.corpus, &settings)?;
    warnings.extend(corpus.warnings.iter().cloned());
    source_hashes.extend(hash_sources(&corpus.paths, &mut warnings));

    let mut new_records = BTreeMap::<String, Vec<AnnotationRecord>>::new();
    let mut scanned_documents = BTreeSet::<String>::new();
    for scan in &corpus.documents {
        scanned_documents.insert(scan.document_id.clone());
        for record in &scan.records {
            new_records
                .entry(record.document_id.clone())
                .or_default()
                .push(record.clone());
        }
    }

    let merge_stats = store.merge(&new_records)?;
    info!(
        documents = merge_stats.documents_touched,
        created = merge_stats.documents_created,
        appended = merge_stats.highlights_appended,
        duplicates = merge_stats.duplicates_dropped,
        "merged highlights"
    );

    let atty_notes_written = if args.skip_notes {
        0
    } else {
        let index = corpus.index();
        info!(entries = index.len(), "built cross-reference index");
        rebuild_notes(
            &mut store,
            &index,
            &scanned_documents,
            &args.author,
            NoteSections::All,
            timestamp_ms,
        )?
    };

    if args.dry_run {
        warn!("dry run: annotation table and report not written");
    } else {
        save_store(&args.output_path, &store)?;
        if let Some(report_path) = &args.report_path {
            let rows = corpus.report_rows();
            write_json_pretty(report_path, &rows)?;
            info!(path = %report_path.display(), rows = rows.len(), "wrote match report");
        }
    }

    let counts = LinkCounts {
        documents_scanned: corpus.documents.len(),
        documents_skipped: corpus.skipped,
        pages_scanned: corpus.counters.pages,
        references_found: corpus.counters.references_found,
        references_ignored: corpus.counters.references_ignored,
        rectangles_located: corpus.counters.rectangles_located,
        rectangles_in_stamp: corpus.counters.rectangles_in_stamp,
        geometry_misses: corpus.counters.geometry_misses,
        duplicate_records_dropped: corpus.counters.duplicates_dropped
            + merge_stats.duplicates_dropped,
        highlights_existing: merge_stats.highlights_existing,
        highlights_appended: merge_stats.highlights_appended,
        atty_notes_written,
        documents_written: store.len(),
    };

    let manifest = LinkRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        dry_run: args.dry_run,
        author: args.author.clone(),
        paths: LinkPaths {
            corpus_dir: args.corpus.corpus_dir.display().to_string(),
            store_path: args.store_path.as_ref().map(|path| path.display().to_string()),
            output_path: args.output_path.display().to_string(),
            report_path: args.report_path.as_ref().map(|path| path.display().to_string()),
        },
        counts,
        source_hashes,
        warnings,
    };

    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        args.output_path
            .with_file_name(format!("link_run_{}.json", utc_compact_string(started_ts)))
    });
    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote link run manifest");
    info!(
        run_id = %run_id,
        highlights = store.highlight_count(),
        documents = store.len(),
        "link completed"
    );

    Ok(())
}

/// Fingerprints scanned sources for the run manifest. A source that can no
/// longer be read is reported as a warning and left out.
pub fn hash_sources(paths: &[PathBuf], warnings: &mut Vec<String>) -> Vec<SourceHash> {
    let mut hashes = Vec::with_capacity(paths.len());
    for path in paths {
        match sha256_file(path) {
            Ok(sha256) => hashes.push(SourceHash {
                path: path.display().to_string(),
                sha256,
            }),
            Err(err) => {
                warn!(path = %path.display(), error = %format!("{err:#}"), "source not hashed");
                warnings.push(format!("{}: source not hashed: {err:#}", path.display()));
            }
        }
    }
    hashes
}
