pub mod category;
pub mod dedup;
pub mod normalize;
pub mod records;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::Result;
use category::{Category, Precedence};

/// One decision or notice published in the register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterEntry {
    pub number: String,
    pub title: String,
    pub decided: String,
    pub category: Category,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtractReport {
    pub matched: usize,
    pub oversized: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub entries: Vec<RegisterEntry>,
    pub report: ExtractReport,
}

/// validate → normalize → scan → dedup.
pub fn extract_with(raw: &str, precedence: Precedence) -> Result<Extraction> {
    normalize::validate(raw)?;
    let text = normalize::normalize(raw);
    Ok(extract_text(&text, precedence))
}

/// Extraction over already-normalized text. Never fails; no matches means no entries.
pub fn extract_text(text: &str, precedence: Precedence) -> Extraction {
    let (raw_records, stats) = records::scan(text, precedence);
    let scanned = raw_records.len();
    for r in &raw_records {
        trace!(
            offset = r.span.start,
            number = %r.entry.number,
            category = %r.entry.category,
            "docket record"
        );
    }
    let entries = dedup::dedup(raw_records.into_iter().map(|r| r.entry).collect());

    let report = ExtractReport {
        matched: stats.matched,
        oversized: stats.oversized,
        duplicates: scanned - entries.len(),
    };
    debug!(
        chars = text.len(),
        matched = report.matched,
        oversized = report.oversized,
        duplicates = report.duplicates,
        kept = entries.len(),
        "extracted register entries"
    );

    Extraction { entries, report }
}
