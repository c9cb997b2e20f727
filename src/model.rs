use serde::{Deserialize, Serialize};

pub const HIGHLIGHT_UNIT: &str = "point";
pub const NOTE_SECURITY: [&str; 3] = ["WRITE", "READ", "ADMIN"];

/// Page-relative box in points. The owning page travels separately.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PageRectangle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightRects {
    pub rectangles: Vec<PageRectangle>,
    /// 0-based page index.
    #[serde(rename = "pageNum")]
    pub page_num: u32,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightNote {
    pub text: String,
    pub created: Option<i64>,
    #[serde(rename = "parentType")]
    pub parent_type: String,
    #[serde(rename = "parentId")]
    pub parent_id: i64,
    pub id: i64,
    pub user: String,
    #[serde(rename = "docId")]
    pub doc_id: i64,
    pub security: Vec<String>,
}

/// One persisted highlight, in the host platform's field order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Highlight {
    pub rectangles: HighlightRects,
    pub created: Option<i64>,
    pub updated: Option<i64>,
    pub notes: Vec<HighlightNote>,
    pub id: i64,
    pub user: String,
    pub unit: String,
    #[serde(rename = "markedText")]
    pub marked_text: String,
}

/// Document-level note stored under `AttyNotes`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttyNote {
    pub text: String,
    pub created: Option<i64>,
    pub updated: Option<i64>,
    #[serde(rename = "parentType")]
    pub parent_type: String,
    #[serde(rename = "parentId")]
    pub parent_id: i64,
    pub id: i64,
    pub user: String,
    pub unit: String,
}

/// One row of the annotation table exchanged with the host platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub document_id: String,
    pub annotation_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchReportRow {
    pub document: String,
    pub matched_text: String,
    /// 1-based page number.
    pub page: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceHash {
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkPaths {
    pub corpus_dir: String,
    pub store_path: Option<String>,
    pub output_path: String,
    pub report_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkCounts {
    pub documents_scanned: usize,
    pub documents_skipped: usize,
    pub pages_scanned: usize,
    pub references_found: usize,
    pub references_ignored: usize,
    pub rectangles_located: usize,
    pub rectangles_in_stamp: usize,
    pub geometry_misses: usize,
    pub duplicate_records_dropped: usize,
    pub highlights_existing: usize,
    pub highlights_appended: usize,
    pub atty_notes_written: usize,
    pub documents_written: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub dry_run: bool,
    pub author: String,
    pub paths: LinkPaths,
    pub counts: LinkCounts,
    pub source_hashes: Vec<SourceHash>,
    pub warnings: Vec<String>,
}
