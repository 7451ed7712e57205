use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RegisterError;

/// Characters of text before a docket token searched for section headers.
pub const CONTEXT_WINDOW: usize = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "NAME CHANGE")]
    NameChange,
    #[serde(rename = "CERTIFICATE, PERMIT, LICENSE")]
    CertificatePermitLicense,
    #[serde(rename = "CERTIFICATE OF REGISTRATION")]
    CertificateOfRegistration,
    #[serde(rename = "DISMISSAL")]
    Dismissal,
    #[serde(rename = "WITHDRAWAL")]
    Withdrawal,
    #[serde(rename = "REVOCATION")]
    Revocation,
    #[serde(rename = "TRANSFERS")]
    Transfers,
    #[serde(rename = "GRANT DECISION NOTICES")]
    GrantDecisionNotices,
    #[serde(rename = "MISCELLANEOUS")]
    Miscellaneous,
}

/// Section headers per category. Order matters: with `Precedence::Declared`
/// a later row beats an earlier one when both occur in the same window.
pub const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (Category::NameChange, &["NAME CHANGES"]),
    (
        Category::CertificatePermitLicense,
        &["CERTIFICATES, PERMITS & LICENSES", "CERTIFICATES, PERMITS AND LICENSES"],
    ),
    (Category::CertificateOfRegistration, &["CERTIFICATES OF REGISTRATION"]),
    (Category::Dismissal, &["DISMISSALS"]),
    (Category::Withdrawal, &["WITHDRAWAL OF APPLICATION", "WITHDRAWALS"]),
    (Category::Revocation, &["REVOCATIONS"]),
    (Category::Transfers, &["TRANSFERS"]),
    (Category::GrantDecisionNotices, &["GRANT DECISION NOTICES"]),
];

impl Category {
    pub const ALL: [Category; 9] = [
        Category::NameChange,
        Category::CertificatePermitLicense,
        Category::CertificateOfRegistration,
        Category::Dismissal,
        Category::Withdrawal,
        Category::Revocation,
        Category::Transfers,
        Category::GrantDecisionNotices,
        Category::Miscellaneous,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::NameChange => "NAME CHANGE",
            Category::CertificatePermitLicense => "CERTIFICATE, PERMIT, LICENSE",
            Category::CertificateOfRegistration => "CERTIFICATE OF REGISTRATION",
            Category::Dismissal => "DISMISSAL",
            Category::Withdrawal => "WITHDRAWAL",
            Category::Revocation => "REVOCATION",
            Category::Transfers => "TRANSFERS",
            Category::GrantDecisionNotices => "GRANT DECISION NOTICES",
            Category::Miscellaneous => "MISCELLANEOUS",
        }
    }

    /// Case-insensitive label lookup, used for CLI filters and DB reads.
    pub fn from_label(s: &str) -> Result<Self, RegisterError> {
        let wanted = s.trim().to_uppercase();
        Category::ALL
            .into_iter()
            .find(|c| c.label() == wanted)
            .ok_or_else(|| RegisterError::UnknownCategory(s.to_string()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How to pick between several categories whose headers share one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precedence {
    /// Last matching row of `CATEGORY_KEYWORDS` wins, regardless of position.
    #[default]
    Declared,
    /// The header occurring closest before the docket token wins.
    Nearest,
}

/// Byte offset where the context window for a match at `start` begins.
fn window_start(text: &str, start: usize) -> usize {
    text[..start]
        .char_indices()
        .rev()
        .nth(CONTEXT_WINDOW - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Infer the category of the record whose docket token starts at byte `start`.
pub fn classify(text: &str, start: usize, precedence: Precedence) -> Category {
    let window = text[window_start(text, start)..start].to_uppercase();

    match precedence {
        Precedence::Declared => {
            let mut found = Category::Miscellaneous;
            for (category, keywords) in CATEGORY_KEYWORDS {
                if keywords.iter().any(|kw| window.contains(kw)) {
                    found = *category;
                }
            }
            found
        }
        Precedence::Nearest => {
            let mut best: Option<(usize, Category)> = None;
            for (category, keywords) in CATEGORY_KEYWORDS {
                let end = keywords
                    .iter()
                    .filter_map(|kw| window.rfind(kw).map(|i| i + kw.len()))
                    .max();
                if let Some(end) = end {
                    if best.map_or(true, |(b, _)| end >= b) {
                        best = Some((end, *category));
                    }
                }
            }
            best.map(|(_, c)| c).unwrap_or(Category::Miscellaneous)
        }
    }
}
