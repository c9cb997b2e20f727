use anyhow::Result;
use tracing::{info, warn};

use crate::cli::DedupeArgs;
use crate::commands::table::{load_store, save_store};
use crate::engine::merge::dedupe_document;

pub fn run(args: DedupeArgs) -> Result<()> {
    let loaded = load_store(&args.store_path)?;
    for warning in &loaded.warnings {
        warn!(warning = %warning, "store warning");
    }

    let mut store = loaded.store;
    let before = store.highlight_count();
    let mut removed_total = 0usize;

    for (document_id, document) in store.documents_mut() {
        let removed = dedupe_document(document);
        if removed > 0 {
            info!(doc_id = %document_id, removed, "removed duplicate highlights");
        }
        removed_total += removed;
    }

    save_store(&args.output_path, &store)?;

    info!(
        before,
        after = store.highlight_count(),
        removed = removed_total,
        "dedupe completed"
    );
    Ok(())
}
