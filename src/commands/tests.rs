use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tempfile::TempDir;

use super::corpus::{CorpusPage, discover_documents, document_id_for, load_document};
use super::diff::{DiffIssue, compare_stores, match_highlights};
use super::extract::{ExtractedRow, extract_rows};
use super::filter::HighlightFilter;
use super::link::hash_sources;
use super::notes::{apply_report_notes, note_targets};
use super::scan::{build_pattern, scan_corpus};
use super::table::{TableFormat, load_store, read_table, save_store, write_table};
use crate::cli::{
    CorpusArgs, DEFAULT_AUTHOR, ExtractArgs, FilterArgs, LinkArgs, NotesArgs, SelectionMode,
};
use crate::engine::codec::StoredHighlight;
use crate::engine::geometry::StampRegion;
use crate::engine::highlight::HighlightStyle;
use crate::engine::locate::PageGeometry;
use crate::engine::merge::{AnnotationStore, automated_note};
use crate::engine::scan::ScanSettings;
use crate::engine::xref::{NoteSections, REFERS_TO_HEADER};
use crate::model::{
    Highlight, HighlightNote, HighlightRects, MatchReportRow, PageRectangle, TableRow,
};

const CITING_LINE: &str = "See Exhibit CEX-001_0004 and CEX-002.";

fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("temp dir should be created")
}

fn write_json(path: &Path, value: &Value) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent dir should be created");
    }
    fs::write(path, serde_json::to_vec(value).expect("json should serialize"))
        .expect("json file should be written");
}

fn page_json(line: &str) -> Value {
    json!({
        "bounds": { "x": 0.0, "y": 0.0, "width": 612.0, "height": 792.0 },
        "lines": [
            { "text": line, "x": 72.0, "y": 700.0, "width": 10.0 * line.chars().count() as f64, "height": 12.0 }
        ]
    })
}

fn write_corpus(dir: &Path) {
    write_json(&dir.join("DOC1.json"), &json!({ "pages": [page_json(CITING_LINE)] }));
    write_json(
        &dir.join("DOC2.json"),
        &json!({ "pages": [page_json("Nothing to cite here"), page_json("Per DOC1 page two")] }),
    );
}

fn corpus_args(dir: &Path, jobs: usize) -> CorpusArgs {
    CorpusArgs {
        corpus_dir: dir.to_path_buf(),
        recursive: false,
        pattern_config: None,
        stamp_width: 100.0,
        stamp_height: 50.0,
        jobs,
    }
}

fn highlight(user: &str, page_num: u32, marked_text: &str, x: f64) -> Highlight {
    Highlight {
        rectangles: HighlightRects {
            rectangles: vec![PageRectangle::new(x, 10.0, 50.0, 12.0)],
            page_num,
            color: "BLUE".to_string(),
        },
        user: user.to_string(),
        marked_text: marked_text.to_string(),
        ..Highlight::default()
    }
}

fn stored(highlight: &Highlight) -> StoredHighlight {
    StoredHighlight::from_highlight(highlight).expect("highlight should encode")
}

#[test]
fn corpus_page_search_interpolates_character_offsets() {
    let page: CorpusPage = serde_json::from_value(page_json("See Exhibit CEX-001 here"))
        .expect("page should deserialize");

    let hits = page.search_for("exhibit   CEX-001");
    assert_eq!(hits, vec![PageRectangle::new(112.0, 700.0, 150.0, 12.0)]);
    assert!(page.search_for("CEX-404").is_empty());
    assert!(page.search_for("  ").is_empty());
}

#[test]
fn corpus_page_search_finds_every_occurrence() {
    let page: CorpusPage =
        serde_json::from_value(page_json("CEX-1 CEX-1")).expect("page should deserialize");

    let hits = page.search_for("CEX-1");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].x, 72.0);
    assert_eq!(hits[1].x, 132.0);
}

#[test]
fn load_document_fills_text_from_lines() {
    let dir = temp_dir();
    let path = dir.path().join("DOC1.json");
    write_json(
        &path,
        &json!({ "pages": [{
            "bounds": { "x": 0.0, "y": 0.0, "width": 612.0, "height": 792.0 },
            "lines": [
                { "text": "Exhibit", "x": 0.0, "y": 0.0, "width": 70.0, "height": 12.0 },
                { "text": "CEX-001", "x": 0.0, "y": 12.0, "width": 70.0, "height": 12.0 }
            ]
        }]}),
    );

    let document = load_document(&path).expect("document should load");
    assert_eq!(document.pages.len(), 1);
    assert_eq!(document.pages[0].text(), "Exhibit\nCEX-001");
    assert_eq!(document_id_for(&path).expect("id"), "DOC1");
}

#[test]
fn discover_documents_respects_recursion_and_extension() {
    let dir = temp_dir();
    write_json(&dir.path().join("B.json"), &json!({ "pages": [] }));
    write_json(&dir.path().join("A.JSON"), &json!({ "pages": [] }));
    write_json(&dir.path().join("nested/C.json"), &json!({ "pages": [] }));
    fs::write(dir.path().join("notes.txt"), "ignored").expect("txt should be written");

    let flat = discover_documents(dir.path(), false).expect("discovery should succeed");
    let names = flat
        .iter()
        .map(|path| document_id_for(path).expect("id"))
        .collect::<Vec<String>>();
    assert_eq!(names, vec!["A", "B"]);

    let deep = discover_documents(dir.path(), true).expect("discovery should succeed");
    assert_eq!(deep.len(), 3);

    assert!(discover_documents(&dir.path().join("missing"), false).is_err());
}

#[test]
fn table_format_follows_extension() {
    assert_eq!(TableFormat::for_path(Path::new("a.sqlite")), TableFormat::Sqlite);
    assert_eq!(TableFormat::for_path(Path::new("a.DB")), TableFormat::Sqlite);
    assert_eq!(TableFormat::for_path(Path::new("a.json")), TableFormat::Json);
    assert_eq!(TableFormat::for_path(Path::new("table")), TableFormat::Json);
}

fn sample_store() -> AnnotationStore {
    let mut store = AnnotationStore::new();
    store
        .document_mut("DOC1")
        .highlights
        .push(stored(&highlight("a@firm", 0, "CEX-001", 10.0)));
    store
        .document_mut("DOC2")
        .highlights
        .push(StoredHighlight {
            raw: "legacy garbage".to_string(),
            parsed: None,
        });
    store
}

#[test]
fn json_table_round_trips_store() {
    let dir = temp_dir();
    let path = dir.path().join("out/table.json");
    let store = sample_store();

    save_store(&path, &store).expect("store should save");
    let loaded = load_store(&path).expect("store should load");

    assert_eq!(loaded.warnings.len(), 1);
    assert_eq!(
        loaded.store.to_rows().expect("rows"),
        store.to_rows().expect("rows")
    );
}

#[test]
fn sqlite_table_is_replaced_wholesale() {
    let dir = temp_dir();
    let path = dir.path().join("table.sqlite");
    let first = vec![
        TableRow {
            document_id: "DOC1".to_string(),
            annotation_data: "{}".to_string(),
        },
        TableRow {
            document_id: "DOC9".to_string(),
            annotation_data: "{}".to_string(),
        },
    ];
    write_table(&path, &first).expect("first write should succeed");

    let store = sample_store();
    save_store(&path, &store).expect("store should save");

    let rows = read_table(&path).expect("table should read");
    assert_eq!(rows, store.to_rows().expect("rows"));
    assert!(rows.iter().all(|row| row.document_id != "DOC9"));
    assert_ne!(rows[0].annotation_data, "{}");
}

#[test]
fn filter_by_user_and_page_range() {
    let filter = HighlightFilter {
        user: Some(("a@firm".to_string(), SelectionMode::Exclude)),
        pages: Some((1, 2, SelectionMode::Include)),
        drop_blank: true,
    };

    assert!(filter.keep(&stored(&highlight("b@firm", 1, "CEX-001", 10.0))));
    assert!(!filter.keep(&stored(&highlight("a@firm", 1, "CEX-001", 10.0))));
    assert!(!filter.keep(&stored(&highlight("b@firm", 2, "CEX-001", 10.0))));
    assert!(!filter.keep(&stored(&highlight("b@firm", 0, "   ", 10.0))));
    assert!(filter.keep(&StoredHighlight {
        raw: "unreadable".to_string(),
        parsed: None,
    }));
}

#[test]
fn filter_args_reject_inverted_page_ranges() {
    let args = FilterArgs {
        store_path: PathBuf::from("in.json"),
        output_path: PathBuf::from("out.json"),
        user: None,
        user_mode: SelectionMode::Include,
        start_page: Some(3),
        end_page: Some(2),
        page_mode: SelectionMode::Include,
        drop_blank: false,
    };
    assert!(HighlightFilter::from_args(&args).is_err());

    let args = FilterArgs {
        start_page: None,
        end_page: None,
        ..args
    };
    let filter = HighlightFilter::from_args(&args).expect("filter should build");
    assert!(filter.is_noop());
}

#[test]
fn match_highlights_is_a_multiset_difference() {
    let a = stored(&highlight("a@firm", 0, "CEX-001", 10.0));
    let b = stored(&highlight("a@firm", 0, "CEX-002", 20.0));
    let mut a_again = highlight("a@firm", 0, "CEX-001", 10.0);
    a_again.created = Some(5);
    let a_again = stored(&a_again);

    let (missing, extra) = match_highlights(&[&a, &a, &b], &[&a_again, &b]);
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].raw, a.raw);
    assert!(extra.is_empty());

    let (missing, extra) = match_highlights(&[&b], &[&a, &b]);
    assert!(missing.is_empty());
    assert_eq!(extra.len(), 1);
    assert_eq!(extra[0].raw, a.raw);
}

#[test]
fn compare_stores_reports_every_difference() {
    let h1 = highlight("a@firm", 0, "CEX-001", 10.0);
    let h2 = highlight("a@firm", 0, "CEX-002", 20.0);
    let h3 = highlight("b@firm", 1, "CEX-003", 30.0);
    let h4 = highlight("b@firm", 1, "CEX-004", 40.0);

    let mut master = AnnotationStore::new();
    master.document_mut("DOC1").highlights = vec![stored(&h1), stored(&h2), stored(&h4)];
    master.document_mut("DOC2").highlights = vec![stored(&h3)];

    let mut other = AnnotationStore::new();
    other.document_mut("DOC1").highlights = vec![stored(&h1), stored(&h3)];
    other.document_mut("DOC3").highlights = vec![stored(&h4)];

    let (entries, fixes) = compare_stores(&master, &other, &[]);
    let issues = entries
        .iter()
        .map(|entry| (entry.document_id.as_str(), entry.issue))
        .collect::<Vec<_>>();
    assert_eq!(
        issues,
        vec![
            ("DOC1", DiffIssue::MissingInOther),
            ("DOC1", DiffIssue::ExtraInOther),
            ("DOC2", DiffIssue::DocumentMissingInOther),
            ("DOC3", DiffIssue::DocumentExtraInOther),
        ]
    );
    assert_eq!(fixes.len(), 1);
    assert_eq!(fixes[0].1.len(), 2);

    let (entries, fixes) = compare_stores(&master, &other, &["a@firm".to_string()]);
    assert_eq!(entries[0].issue, DiffIssue::MissingInOther);
    assert_eq!(entries[0].master_highlights, vec![stored(&h2).raw]);
    assert_eq!(fixes[0].1, vec![stored(&h2)]);
}

#[test]
fn scan_corpus_reports_matches_and_skips_broken_documents() {
    let dir = temp_dir();
    write_corpus(dir.path());
    fs::write(dir.path().join("BROKEN.json"), "{").expect("broken file should be written");

    let args = corpus_args(dir.path(), 1);
    let pattern = build_pattern(&args).expect("pattern should build");
    let style = HighlightStyle::new(DEFAULT_AUTHOR, "BLUE");
    let settings = ScanSettings {
        pattern: &pattern,
        stamp: StampRegion::default(),
        style: &style,
        timestamp_ms: 1,
    };

    let corpus = scan_corpus(&args, &settings).expect("scan should succeed");
    assert_eq!(corpus.documents.len(), 2);
    assert_eq!(corpus.skipped, 1);
    assert_eq!(corpus.warnings.len(), 1);
    assert_eq!(corpus.paths.len(), 2);
    assert!(corpus.paths.iter().all(|path| !path.ends_with("BROKEN.json")));

    let rows = corpus.report_rows();
    let texts = rows
        .iter()
        .map(|row| (row.document.as_str(), row.matched_text.as_str(), row.page))
        .collect::<Vec<_>>();
    assert_eq!(
        texts,
        vec![("DOC1", "CEX-001_0004", 1), ("DOC1", "CEX-002", 1)]
    );

    let parallel = scan_corpus(&corpus_args(dir.path(), 2), &settings).expect("scan should succeed");
    assert_eq!(parallel.report_rows(), rows);
    assert_eq!(parallel.counters, corpus.counters);
}

#[test]
fn link_run_is_idempotent_over_its_own_output() {
    let corpus_dir = temp_dir();
    write_corpus(corpus_dir.path());
    let out_dir = temp_dir();
    let table = out_dir.path().join("table.sqlite");

    let args = LinkArgs {
        corpus: corpus_args(corpus_dir.path(), 1),
        store_path: None,
        output_path: table.clone(),
        report_path: Some(out_dir.path().join("report.json")),
        manifest_path: Some(out_dir.path().join("manifest.json")),
        author: DEFAULT_AUTHOR.to_string(),
        color: "BLUE".to_string(),
        skip_notes: false,
        dry_run: false,
    };
    super::link::run(args.clone()).expect("first link should succeed");

    let first = load_store(&table).expect("table should load").store;
    let doc1 = first.document("DOC1").expect("DOC1 should be stored");
    assert_eq!(doc1.highlights.len(), 2);
    let note = automated_note(doc1, DEFAULT_AUTHOR).expect("DOC1 should have a note");
    assert!(note.text.contains("CEX-001 at 0001"));
    assert!(note.text.contains("CEX-002 at 0001"));
    assert!(first.document("DOC2").is_none());

    let manifest: Value = serde_json::from_slice(
        &fs::read(out_dir.path().join("manifest.json")).expect("manifest should exist"),
    )
    .expect("manifest should parse");
    assert_eq!(manifest["counts"]["highlights_appended"], json!(2));

    super::link::run(LinkArgs {
        store_path: Some(table.clone()),
        ..args
    })
    .expect("second link should succeed");

    let second = load_store(&table).expect("table should load").store;
    assert_eq!(second.highlight_count(), 2);
    let doc1 = second.document("DOC1").expect("DOC1 should be stored");
    assert_eq!(doc1.atty_notes.len(), 1);
}

#[test]
fn unreadable_sources_become_manifest_warnings() {
    let dir = temp_dir();
    let present = dir.path().join("DOC1.json");
    write_json(&present, &json!({ "pages": [] }));
    let missing = dir.path().join("GONE.json");

    let mut warnings = Vec::new();
    let hashes = hash_sources(&[present.clone(), missing], &mut warnings);

    assert_eq!(hashes.len(), 1);
    assert_eq!(hashes[0].path, present.display().to_string());
    assert_eq!(hashes[0].sha256.len(), 64);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("GONE.json"));
}

#[test]
fn link_manifest_hashes_only_scanned_documents() {
    let corpus_dir = temp_dir();
    write_corpus(corpus_dir.path());
    fs::write(corpus_dir.path().join("BROKEN.json"), "{").expect("broken file should be written");
    let out_dir = temp_dir();

    super::link::run(LinkArgs {
        corpus: corpus_args(corpus_dir.path(), 1),
        store_path: None,
        output_path: out_dir.path().join("table.json"),
        report_path: None,
        manifest_path: Some(out_dir.path().join("manifest.json")),
        author: DEFAULT_AUTHOR.to_string(),
        color: "BLUE".to_string(),
        skip_notes: false,
        dry_run: false,
    })
    .expect("link should succeed despite a broken document");

    let manifest: Value = serde_json::from_slice(
        &fs::read(out_dir.path().join("manifest.json")).expect("manifest should exist"),
    )
    .expect("manifest should parse");
    assert_eq!(manifest["counts"]["documents_skipped"], json!(1));
    let hashed = manifest["source_hashes"]
        .as_array()
        .expect("source hashes should be a list");
    assert_eq!(hashed.len(), 2);
    assert!(hashed.iter().all(|entry| {
        !entry["path"]
            .as_str()
            .unwrap_or_default()
            .ends_with("BROKEN.json")
    }));
}

fn noted_store() -> AnnotationStore {
    let mut store = sample_store();
    let mut with_notes = highlight("b@firm", 2, "CEX-002", 20.0);
    with_notes.notes = ["first", "second"]
        .into_iter()
        .map(|text| HighlightNote {
            text: text.to_string(),
            ..HighlightNote::default()
        })
        .collect();
    store.document_mut("DOC3").highlights.push(stored(&with_notes));
    store
}

#[test]
fn extract_emits_one_row_per_note_and_skips_unreadable_fragments() {
    let store = noted_store();

    let extraction = extract_rows(&store, None);
    assert_eq!(extraction.unreadable, 1);
    assert_eq!(
        extraction.rows,
        vec![
            ExtractedRow {
                document: "DOC1".to_string(),
                marked_text: "CEX-001".to_string(),
                note: String::new(),
            },
            ExtractedRow {
                document: "DOC3".to_string(),
                marked_text: "CEX-002".to_string(),
                note: "first".to_string(),
            },
            ExtractedRow {
                document: "DOC3".to_string(),
                marked_text: "CEX-002".to_string(),
                note: "second".to_string(),
            },
        ]
    );

    let only_a = extract_rows(&store, Some("a@firm"));
    assert_eq!(only_a.rows.len(), 1);
    assert_eq!(only_a.rows[0].document, "DOC1");
}

#[test]
fn extract_command_writes_flat_rows() {
    let dir = temp_dir();
    let table = dir.path().join("table.json");
    save_store(&table, &noted_store()).expect("store should save");
    let output = dir.path().join("export/rows.json");

    super::extract::run(ExtractArgs {
        store_path: table,
        output_path: output.clone(),
        user: None,
    })
    .expect("extract should succeed");

    let rows: Value =
        serde_json::from_slice(&fs::read(&output).expect("export should exist")).expect("json");
    let rows = rows.as_array().expect("export should be a list");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1]["marked_text"], json!("CEX-002"));
    assert_eq!(rows[1]["note"], json!("first"));
}

fn report_rows() -> Vec<MatchReportRow> {
    [
        ("DOC1", "CEX-001_0004", 1),
        ("DOC1", "CEX-002", 1),
        ("DOC2", "DOC1", 2),
    ]
    .into_iter()
    .map(|(document, matched_text, page)| MatchReportRow {
        document: document.to_string(),
        matched_text: matched_text.to_string(),
        page,
    })
    .collect()
}

#[test]
fn notes_from_report_cover_citing_and_cited_documents() {
    let dir = temp_dir();
    let report = dir.path().join("report.json");
    write_json(&report, &serde_json::to_value(report_rows()).expect("rows should serialize"));
    let output = dir.path().join("table.json");

    super::notes::run(NotesArgs {
        store_path: None,
        report_path: report,
        output_path: output.clone(),
        author: DEFAULT_AUTHOR.to_string(),
        sections: NoteSections::All,
    })
    .expect("notes should rebuild");

    let store = load_store(&output).expect("table should load").store;
    let doc1 = automated_note(store.document("DOC1").expect("DOC1"), DEFAULT_AUTHOR)
        .expect("DOC1 should have a note");
    assert!(doc1.text.contains("CEX-001 at 0001"));
    assert!(doc1.text.contains("CEX-002 at 0001"));
    assert!(doc1.text.contains("DOC2 at 0002"));

    let cited = automated_note(store.document("CEX-001").expect("CEX-001"), DEFAULT_AUTHOR)
        .expect("cited identifier should have a note");
    assert!(cited.text.contains("DOC1 at 0001"));
    assert_eq!(store.highlight_count(), 0);
}

#[test]
fn notes_from_report_write_only_the_selected_section() {
    let rows = report_rows();
    let mut store = sample_store();

    let targets = note_targets(&store, &rows, NoteSections::RefersTo);
    assert!(targets.contains("DOC1"));
    assert!(!targets.contains("CEX-001"));

    let written = apply_report_notes(&mut store, &rows, DEFAULT_AUTHOR, NoteSections::RefersTo, 3)
        .expect("notes should rebuild");
    assert_eq!(written, 2);

    let doc1 = automated_note(store.document("DOC1").expect("DOC1"), DEFAULT_AUTHOR)
        .expect("DOC1 should have a note");
    assert!(doc1.text.starts_with(REFERS_TO_HEADER));
    assert!(!doc1.text.contains("Referenced In"));
    assert!(store.document("CEX-001").is_none());
    assert_eq!(store.highlight_count(), 2);
}
