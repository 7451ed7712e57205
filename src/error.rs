use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("register for {date} unavailable: {reason}")]
    SourceUnavailable { date: String, reason: String },

    #[error("document is not an FMCSA Register page (marker {marker:?} not found)")]
    InvalidDocument { marker: &'static str },

    #[error("http client setup failed: {0}")]
    Client(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid date {0:?} (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("unknown category {0:?}")]
    UnknownCategory(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, RegisterError>;
