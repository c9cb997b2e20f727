use crate::engine::patterns::{ReferenceToken, collapse_line_breaks};
use crate::model::{
    HIGHLIGHT_UNIT, Highlight, HighlightNote, HighlightRects, NOTE_SECURITY, PageRectangle,
};

pub const DEFAULT_COLOR: &str = "BLUE";

/// Authorship and styling shared by every highlight produced in one run.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightStyle {
    pub author: String,
    pub color: String,
}

impl HighlightStyle {
    pub fn new(author: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            color: color.into(),
        }
    }
}

/// A highlight produced by a scan, bound to the document it was found in.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRecord {
    pub document_id: String,
    pub highlight: Highlight,
}

pub fn wrap_note_text(text: &str) -> String {
    format!("<p>{text}</p>")
}

/// Builds the highlight for one located rectangle of `token` on a 0-based page.
pub fn build_record(
    document_id: &str,
    token: &ReferenceToken,
    rect: PageRectangle,
    page_index: u32,
    style: &HighlightStyle,
    timestamp_ms: i64,
) -> AnnotationRecord {
    let note = HighlightNote {
        text: wrap_note_text(&token.identifier),
        created: Some(timestamp_ms),
        parent_type: "Highlight".to_string(),
        parent_id: 0,
        id: 0,
        user: style.author.clone(),
        doc_id: 0,
        security: NOTE_SECURITY.iter().map(|tag| tag.to_string()).collect(),
    };

    let marked_text = collapse_line_breaks(&token.raw);

    AnnotationRecord {
        document_id: document_id.to_string(),
        highlight: Highlight {
            rectangles: HighlightRects {
                rectangles: vec![rect],
                page_num: page_index,
                color: style.color.clone(),
            },
            created: Some(timestamp_ms),
            updated: Some(timestamp_ms),
            notes: vec![note],
            id: 0,
            user: style.author.clone(),
            unit: HIGHLIGHT_UNIT.to_string(),
            marked_text,
        },
    }
}
