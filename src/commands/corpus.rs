use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::engine::locate::PageGeometry;
use crate::model::PageRectangle;

/// A positioned line of extracted text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CorpusLine {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CorpusPage {
    pub bounds: PageRectangle,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub lines: Vec<CorpusLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CorpusDocument {
    #[serde(default)]
    pub pages: Vec<CorpusPage>,
}

impl PageGeometry for CorpusPage {
    fn bounds(&self) -> PageRectangle {
        self.bounds
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn search_for(&self, needle: &str) -> Vec<PageRectangle> {
        let needle = fold_for_search(needle)
            .into_iter()
            .map(|(ch, _)| ch)
            .collect::<Vec<char>>();
        if needle.is_empty() {
            return Vec::new();
        }

        let mut hits = Vec::new();
        for line in &self.lines {
            let total = line.text.chars().count();
            if total == 0 {
                continue;
            }

            let folded = fold_for_search(&line.text);
            let mut cursor = 0usize;
            while cursor + needle.len() <= folded.len() {
                let window = &folded[cursor..cursor + needle.len()];
                if window.iter().map(|(ch, _)| *ch).eq(needle.iter().copied()) {
                    let start = window[0].1;
                    let end = window[window.len() - 1].1 + 1;
                    let unit = line.width / total as f64;
                    hits.push(PageRectangle::new(
                        line.x + unit * start as f64,
                        line.y,
                        unit * (end - start) as f64,
                        line.height,
                    ));
                    cursor += needle.len();
                } else {
                    cursor += 1;
                }
            }
        }

        hits
    }
}

/// Lowercased characters with whitespace runs folded to one space, each
/// paired with its char offset in the original text.
fn fold_for_search(text: &str) -> Vec<(char, usize)> {
    let mut out = Vec::<(char, usize)>::new();
    let mut pending_space: Option<usize> = None;

    for (offset, ch) in text.chars().enumerate() {
        if ch.is_whitespace() {
            pending_space.get_or_insert(offset);
            continue;
        }
        if let Some(space_offset) = pending_space.take() {
            if !out.is_empty() {
                out.push((' ', space_offset));
            }
        }
        out.push((ch.to_ascii_lowercase(), offset));
    }

    out
}

pub fn discover_documents(corpus_dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !corpus_dir.is_dir() {
        bail!("corpus directory not found: {}", corpus_dir.display());
    }

    let mut paths = Vec::new();
    collect_documents(corpus_dir, recursive, &mut paths)?;
    paths.sort();
    Ok(paths)
}

fn collect_documents(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?;

        if file_type.is_dir() {
            if recursive {
                collect_documents(&path, recursive, out)?;
            }
            continue;
        }

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if file_type.is_file() && is_json {
            out.push(path);
        }
    }

    Ok(())
}

/// Document id is the file stem, matching the store's Bates/control number.
pub fn document_id_for(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 file name: {}", path.display()))
}

pub fn load_document(path: &Path) -> Result<CorpusDocument> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut document: CorpusDocument = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    for page in &mut document.pages {
        if page.text.is_empty() && !page.lines.is_empty() {
            page.text = page
                .lines
                .iter()
                .map(|line| line.text.as_str())
                .collect::<Vec<&str>>()
                .join("\n");
        }
    }

    Ok(document)
}
