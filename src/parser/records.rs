use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use super::category::{classify, Precedence};
use super::normalize::collapse_ws;
use super::RegisterEntry;

/// Longest title accepted; anything longer is a runaway capture.
pub const MAX_TITLE_CHARS: usize = 500;

/// Docket token, lazily captured body, date sentinel.
///
/// The lazy body stops at the first date-shaped token, so a date inside a
/// title truncates it there.
static RECORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)((?:MX-MC|MC|FF|MX)-\d+)\s+(.*?)\s+(\d{2}/\d{2}/\d{4})").unwrap()
});

/// One accepted match plus where its docket token sits in the normalized text.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub span: Range<usize>,
    pub entry: RegisterEntry,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub matched: usize,
    pub oversized: usize,
}

/// Scan normalized text once, left to right. Oversized titles are dropped, not errors.
pub fn scan(text: &str, precedence: Precedence) -> (Vec<RawRecord>, ScanStats) {
    let mut stats = ScanStats::default();
    let mut records = Vec::new();

    for caps in RECORD_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        stats.matched += 1;

        let title = collapse_ws(&caps[2]);
        if title.chars().count() > MAX_TITLE_CHARS {
            stats.oversized += 1;
            continue;
        }

        records.push(RawRecord {
            span: whole.range(),
            entry: RegisterEntry {
                number: caps[1].to_string(),
                title,
                decided: caps[3].to_string(),
                category: classify(text, whole.start(), precedence),
            },
        });
    }

    (records, stats)
}
