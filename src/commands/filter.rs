use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::cli::{FilterArgs, SelectionMode};
use crate::commands::table::{load_store, save_store};
use crate::engine::codec::StoredHighlight;

/// Keep/drop rules applied to every stored highlight.
#[derive(Debug, Clone, Default)]
pub struct HighlightFilter {
    pub user: Option<(String, SelectionMode)>,
    /// Inclusive 1-based page range.
    pub pages: Option<(u32, u32, SelectionMode)>,
    pub drop_blank: bool,
}

impl HighlightFilter {
    pub fn from_args(args: &FilterArgs) -> Result<Self> {
        let pages = match (args.start_page, args.end_page) {
            (Some(start), Some(end)) => {
                if start == 0 || end < start {
                    bail!("invalid page range {start}-{end}: pages are 1-based and ordered");
                }
                Some((start, end, args.page_mode))
            }
            _ => None,
        };

        Ok(Self {
            user: args.user.clone().map(|user| (user, args.user_mode)),
            pages,
            drop_blank: args.drop_blank,
        })
    }

    pub fn is_noop(&self) -> bool {
        self.user.is_none() && self.pages.is_none() && !self.drop_blank
    }

    /// Fragments that could not be read are always kept.
    pub fn keep(&self, stored: &StoredHighlight) -> bool {
        let Some(highlight) = &stored.parsed else {
            return true;
        };

        if let Some((user, mode)) = &self.user {
            let matches = highlight.user == *user;
            if !selected(matches, *mode) {
                return false;
            }
        }

        if let Some((start, end, mode)) = self.pages {
            let page_number = highlight.rectangles.page_num + 1;
            let in_range = (start..=end).contains(&page_number);
            if !selected(in_range, mode) {
                return false;
            }
        }

        !(self.drop_blank && highlight.marked_text.trim().is_empty())
    }
}

fn selected(matches: bool, mode: SelectionMode) -> bool {
    match mode {
        SelectionMode::Include => matches,
        SelectionMode::Exclude => !matches,
    }
}

pub fn run(args: FilterArgs) -> Result<()> {
    let filter = HighlightFilter::from_args(&args)?;
    if filter.is_noop() {
        warn!("no filter criteria given, table is copied unchanged");
    }
    if let Some((user, mode)) = &filter.user {
        info!(user = %user, mode = mode.as_str(), "filtering by author");
    }
    if let Some((start, end, mode)) = filter.pages {
        info!(start, end, mode = mode.as_str(), "filtering by page range");
    }

    let loaded = load_store(&args.store_path)?;
    for warning in &loaded.warnings {
        warn!(warning = %warning, "store warning");
    }

    let mut store = loaded.store;
    let before = store.highlight_count();
    for (_, document) in store.documents_mut() {
        document.highlights.retain(|stored| filter.keep(stored));
    }

    save_store(&args.output_path, &store)?;

    info!(
        before,
        after = store.highlight_count(),
        "filter completed"
    );
    Ok(())
}
