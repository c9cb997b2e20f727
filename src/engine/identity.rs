use std::collections::HashSet;

use crate::engine::patterns::strip_qualifier;
use crate::model::{Highlight, PageRectangle};

/// Coordinates are compared at 1/1000 point.
const COORDINATE_SCALE: f64 = 1000.0;

/// Strict identity of a highlight within one document.
///
/// Volatile fields (timestamps, ids, author, color) are not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub marked_text: String,
    pub notes: Vec<String>,
    pub page_index: u32,
    pub rects: Vec<[i64; 4]>,
}

/// Loose identity used for cross-reference aggregation; ignores geometry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CrossRefKey {
    pub document_id: String,
    pub normalized_text: String,
    pub page_index: u32,
}

pub fn identity_key(highlight: &Highlight) -> IdentityKey {
    let mut notes = highlight
        .notes
        .iter()
        .map(|note| normalize_key_text(&strip_markup(&note.text)))
        .filter(|text| !text.is_empty())
        .collect::<Vec<String>>();
    notes.sort();

    let mut rects = highlight
        .rectangles
        .rectangles
        .iter()
        .map(quantize)
        .collect::<Vec<[i64; 4]>>();
    rects.sort();

    IdentityKey {
        marked_text: normalize_key_text(&highlight.marked_text),
        notes,
        page_index: highlight.rectangles.page_num,
        rects,
    }
}

/// Whitespace-collapsed, qualifier-free, uppercase form of free text.
pub fn normalize_key_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<&str>>().join(" ");
    strip_qualifier(&collapsed).to_ascii_uppercase()
}

/// Drops `<...>` tags, keeping the text between them.
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;

    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }

    out.trim().to_string()
}

fn quantize(rect: &PageRectangle) -> [i64; 4] {
    [
        (rect.x * COORDINATE_SCALE).round() as i64,
        (rect.y * COORDINATE_SCALE).round() as i64,
        (rect.width * COORDINATE_SCALE).round() as i64,
        (rect.height * COORDINATE_SCALE).round() as i64,
    ]
}

/// First-wins admission over one scope of identity keys.
///
/// A fresh instance is owned by each document's merge so no state leaks
/// between documents.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<IdentityKey>,
    dropped: usize,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = IdentityKey>,
    {
        Self {
            seen: keys.into_iter().collect(),
            dropped: 0,
        }
    }

    /// Returns true when `key` has not been seen before in this scope.
    pub fn admit(&mut self, key: IdentityKey) -> bool {
        if self.seen.insert(key) {
            true
        } else {
            self.dropped += 1;
            false
        }
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Keeps the first highlight per identity key, in input order.
pub fn dedup_in_order<T, F>(items: Vec<T>, key_of: F) -> (Vec<T>, usize)
where
    F: Fn(&T) -> IdentityKey,
{
    let mut dedup = Deduplicator::new();
    let kept = items
        .into_iter()
        .filter(|item| dedup.admit(key_of(item)))
        .collect::<Vec<T>>();
    (kept, dedup.dropped())
}
