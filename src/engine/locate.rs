use tracing::debug;

use crate::model::PageRectangle;

/// Text and geometry of one page, supplied by the extraction backend.
pub trait PageGeometry {
    fn bounds(&self) -> PageRectangle;

    fn text(&self) -> &str;

    /// Boxes of every occurrence of `needle` on the page.
    fn search_for(&self, needle: &str) -> Vec<PageRectangle>;
}

/// Rectangles for `matched_text`, one search per physical line it spans.
///
/// A sub-line the provider cannot place contributes nothing; the remaining
/// sub-lines are still searched.
pub fn locate<G: PageGeometry + ?Sized>(page: &G, matched_text: &str) -> Vec<PageRectangle> {
    let mut rectangles = Vec::new();

    for line in split_sub_lines(matched_text) {
        let found = page.search_for(line);
        if found.is_empty() {
            debug!(line, "no rectangles located for sub-line");
            continue;
        }
        rectangles.extend(found);
    }

    rectangles
}

pub fn split_sub_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}
