use std::ops::AddAssign;

use tracing::debug;

use crate::engine::geometry::{StampRegion, is_excluded};
use crate::engine::highlight::{AnnotationRecord, HighlightStyle, build_record};
use crate::engine::identity::{dedup_in_order, identity_key};
use crate::engine::locate::{PageGeometry, locate};
use crate::engine::patterns::{ReferencePattern, ReferenceToken};
use crate::engine::xref::MatchEvent;
use crate::model::MatchReportRow;

pub struct ScanSettings<'a> {
    pub pattern: &'a ReferencePattern,
    pub stamp: StampRegion,
    pub style: &'a HighlightStyle,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanCounters {
    pub pages: usize,
    pub references_found: usize,
    pub references_ignored: usize,
    pub rectangles_located: usize,
    pub rectangles_in_stamp: usize,
    pub geometry_misses: usize,
    pub duplicates_dropped: usize,
}

impl AddAssign for ScanCounters {
    fn add_assign(&mut self, other: Self) {
        self.pages += other.pages;
        self.references_found += other.references_found;
        self.references_ignored += other.references_ignored;
        self.rectangles_located += other.rectangles_located;
        self.rectangles_in_stamp += other.rectangles_in_stamp;
        self.geometry_misses += other.geometry_misses;
        self.duplicates_dropped += other.duplicates_dropped;
    }
}

/// Everything one document contributes to a run.
#[derive(Debug, Clone, Default)]
pub struct DocumentScan {
    pub document_id: String,
    /// Within-run unique highlights in discovery order.
    pub records: Vec<AnnotationRecord>,
    pub events: Vec<MatchEvent>,
    pub counters: ScanCounters,
}

impl DocumentScan {
    pub fn report_rows(&self) -> Vec<MatchReportRow> {
        self.events
            .iter()
            .map(|event| MatchReportRow {
                document: event.document_id.clone(),
                matched_text: event.identifier.clone(),
                page: event.page_index + 1,
            })
            .collect()
    }
}

pub fn scan_document<G: PageGeometry>(
    document_id: &str,
    pages: &[G],
    settings: &ScanSettings<'_>,
) -> DocumentScan {
    let mut scan = DocumentScan {
        document_id: document_id.to_string(),
        ..DocumentScan::default()
    };

    for (index, page) in pages.iter().enumerate() {
        scan_page(&mut scan, index as u32, page, settings);
    }

    let (records, dropped) = dedup_in_order(std::mem::take(&mut scan.records), |record| {
        identity_key(&record.highlight)
    });
    scan.records = records;
    scan.counters.duplicates_dropped += dropped;

    scan
}

/// Scans one 0-based page, appending highlights and events to `scan`.
pub fn scan_page<G: PageGeometry + ?Sized>(
    scan: &mut DocumentScan,
    page_index: u32,
    page: &G,
    settings: &ScanSettings<'_>,
) {
    scan.counters.pages += 1;
    let stamp = settings.stamp.anchored(&page.bounds());

    for found in settings.pattern.match_all(page.text()) {
        scan.counters.references_found += 1;
        let token = ReferenceToken::from_match(&found);

        if settings.pattern.is_ignored(&token) {
            scan.counters.references_ignored += 1;
            continue;
        }

        let rectangles = locate(page, &found.text);
        if rectangles.is_empty() {
            scan.counters.geometry_misses += 1;
            debug!(
                doc_id = %scan.document_id,
                page = page_index + 1,
                text = %token.identifier,
                family = token.family.as_str(),
                "reference not located on page"
            );
            continue;
        }

        let mut kept = 0usize;
        for rect in rectangles {
            scan.counters.rectangles_located += 1;
            if is_excluded(&rect, &stamp) {
                scan.counters.rectangles_in_stamp += 1;
                continue;
            }
            scan.records.push(build_record(
                &scan.document_id,
                &token,
                rect,
                page_index,
                settings.style,
                settings.timestamp_ms,
            ));
            kept += 1;
        }

        if kept > 0 {
            scan.events.push(MatchEvent {
                document_id: scan.document_id.clone(),
                identifier: token.identifier.clone(),
                normalized: token.normalized.clone(),
                page_index,
            });
        }
    }
}
