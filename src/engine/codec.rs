use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::model::{AttyNote, Highlight};

/// Separator between highlight fragments inside the `Highlights` string.
pub const HIGHLIGHT_DELIMITER: char = '\u{13}';
const LEGACY_DELIMITER: &str = "\\u0013";

pub const HIGHLIGHTS_FIELD: &str = "Highlights";
pub const ATTY_NOTES_FIELD: &str = "AttyNotes";

/// One stored highlight fragment. `raw` is what gets written back, so
/// fragments this tool did not create keep their exact bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredHighlight {
    pub raw: String,
    pub parsed: Option<Highlight>,
}

impl StoredHighlight {
    pub fn from_highlight(highlight: &Highlight) -> Result<Self> {
        let raw = serde_json::to_string(highlight).context("failed to serialize highlight")?;
        Ok(Self {
            raw,
            parsed: Some(highlight.clone()),
        })
    }
}

/// Decoded annotation payload of one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentAnnotations {
    pub highlights: Vec<StoredHighlight>,
    /// Document-level notes, at most one per author.
    pub atty_notes: Vec<Value>,
    /// Payload fields other than `Highlights` and `AttyNotes`.
    pub extra: Map<String, Value>,
    /// Original text of a payload that could not be decoded. Written back
    /// unchanged until the document gains content.
    pub raw_payload: Option<String>,
}

#[derive(Debug, Default)]
pub struct DecodeOutcome {
    pub document: DocumentAnnotations,
    pub issues: Vec<String>,
    pub legacy_fragments: usize,
}

/// Decodes a stored payload. Nothing here is fatal: unreadable parts are
/// reported in `issues` and decoded as empty.
pub fn decode_payload(payload: &str) -> DecodeOutcome {
    let mut outcome = DecodeOutcome::default();
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return outcome;
    }

    let object = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(object)) => object,
        Ok(other) => {
            outcome
                .issues
                .push(format!("annotation payload is not an object: {}", value_kind(&other)));
            outcome.document.raw_payload = Some(payload.to_string());
            return outcome;
        }
        Err(err) => {
            outcome
                .issues
                .push(format!("annotation payload is not valid JSON: {err}"));
            outcome.document.raw_payload = Some(payload.to_string());
            return outcome;
        }
    };

    for (key, value) in object {
        match key.as_str() {
            HIGHLIGHTS_FIELD => decode_highlights(value, &mut outcome),
            ATTY_NOTES_FIELD => decode_atty_notes(value, &mut outcome),
            _ => {
                outcome.document.extra.insert(key, value);
            }
        }
    }

    outcome
}

fn decode_highlights(value: Value, outcome: &mut DecodeOutcome) {
    match value {
        Value::Null => {}
        Value::String(joined) => {
            for fragment in split_fragments(&joined) {
                let stored = decode_fragment(fragment, outcome);
                outcome.document.highlights.push(stored);
            }
        }
        Value::Array(items) => {
            for item in items {
                let raw = item.to_string();
                let parsed = match serde_json::from_value::<Highlight>(item) {
                    Ok(highlight) => Some(highlight),
                    Err(err) => {
                        outcome
                            .issues
                            .push(format!("unreadable highlight entry kept verbatim: {err}"));
                        None
                    }
                };
                outcome.document.highlights.push(StoredHighlight { raw, parsed });
            }
        }
        other => outcome.issues.push(format!(
            "Highlights field has unexpected type: {}",
            value_kind(&other)
        )),
    }
}

fn split_fragments(joined: &str) -> Vec<&str> {
    let pieces = if joined.contains(HIGHLIGHT_DELIMITER) {
        joined.split(HIGHLIGHT_DELIMITER).collect::<Vec<&str>>()
    } else {
        joined.split(LEGACY_DELIMITER).collect::<Vec<&str>>()
    };

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn decode_fragment(fragment: &str, outcome: &mut DecodeOutcome) -> StoredHighlight {
    let first_error = match serde_json::from_str::<Highlight>(fragment) {
        Ok(highlight) => {
            return StoredHighlight {
                raw: fragment.to_string(),
                parsed: Some(highlight),
            };
        }
        Err(err) => err,
    };

    if fragment.contains("\\\"") {
        let unescaped = unescape_legacy(fragment);
        if let Ok(highlight) = serde_json::from_str::<Highlight>(&unescaped) {
            outcome.legacy_fragments += 1;
            return StoredHighlight {
                raw: unescaped,
                parsed: Some(highlight),
            };
        }
    }

    outcome.issues.push(format!(
        "unreadable highlight fragment kept verbatim: {first_error}"
    ));
    StoredHighlight {
        raw: fragment.to_string(),
        parsed: None,
    }
}

/// Reverses the backslash-escaping older exports applied to whole fragments.
pub fn unescape_legacy(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut chars = fragment.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(&next) = chars.peek() {
                if next == '"' || next == '\\' {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(ch);
    }

    out
}

fn decode_atty_notes(value: Value, outcome: &mut DecodeOutcome) {
    let decoded = match value {
        Value::Null => return,
        Value::String(text) if text.trim().is_empty() => return,
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(inner) => inner,
            Err(err) => {
                outcome
                    .issues
                    .push(format!("AttyNotes is not valid JSON, treated as empty: {err}"));
                return;
            }
        },
        other => other,
    };

    match decoded {
        Value::Object(_) => outcome.document.atty_notes.push(decoded),
        Value::Array(items) => {
            for item in items {
                if item.is_object() {
                    outcome.document.atty_notes.push(item);
                } else {
                    outcome.issues.push(format!(
                        "AttyNotes entry is not an object, dropped: {}",
                        value_kind(&item)
                    ));
                }
            }
        }
        Value::Null => {}
        other => outcome.issues.push(format!(
            "AttyNotes has unexpected type, treated as empty: {}",
            value_kind(&other)
        )),
    }
}

/// Encodes in the canonical form: unescaped fragments joined by U+0013 and
/// `AttyNotes` as a JSON string.
pub fn encode_payload(document: &DocumentAnnotations) -> Result<String> {
    if let Some(raw) = &document.raw_payload
        && document.highlights.is_empty()
        && document.atty_notes.is_empty()
        && document.extra.is_empty()
    {
        return Ok(raw.clone());
    }

    let mut object = Map::new();

    if !document.highlights.is_empty() {
        let joined = document
            .highlights
            .iter()
            .map(|stored| stored.raw.as_str())
            .collect::<Vec<&str>>()
            .join(&HIGHLIGHT_DELIMITER.to_string());
        object.insert(HIGHLIGHTS_FIELD.to_string(), Value::String(joined));
    }

    let notes_value = match document.atty_notes.as_slice() {
        [] => None,
        [single] => Some(single.clone()),
        many => Some(Value::Array(many.to_vec())),
    };
    if let Some(notes_value) = notes_value {
        let text = serde_json::to_string(&notes_value).context("failed to serialize AttyNotes")?;
        object.insert(ATTY_NOTES_FIELD.to_string(), Value::String(text));
    }

    for (key, value) in &document.extra {
        object.insert(key.clone(), value.clone());
    }

    serde_json::to_string(&Value::Object(object)).context("failed to serialize annotation payload")
}

pub fn atty_note_author(note: &Value) -> Option<&str> {
    note.get("user").and_then(Value::as_str)
}

pub fn parse_atty_note(note: &Value) -> Option<AttyNote> {
    serde_json::from_value(note.clone()).ok()
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
