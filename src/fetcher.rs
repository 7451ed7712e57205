use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::dates;
use crate::db::{self, PageRow};
use crate::error::RegisterError;
use crate::settings::Settings;

const USER_AGENT: &str = concat!("fmcsa_register/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the register page of a given date.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    backoff: Duration,
}

impl Fetcher {
    pub fn new(settings: &Settings) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            max_retries: settings.max_retries,
            backoff: Duration::from_millis(settings.backoff_ms),
        })
    }

    pub fn page_url(&self, date: NaiveDate) -> String {
        format!(
            "{}?pd_date={}&pv_vpath=LIVIEW",
            self.base_url,
            dates::to_register_key(date)
        )
    }

    /// Single attempt. Errors carry the register key and a readable reason.
    pub async fn fetch_register_page(&self, date: NaiveDate) -> crate::error::Result<String> {
        let (row, _) = self.fetch_once(date).await;
        into_html(row)
    }

    /// Retries 429/5xx, timeouts and connect failures with exponential backoff.
    /// Always returns a row; failures are recorded in `error`.
    pub async fn fetch_with_retry(&self, date: NaiveDate) -> PageRow {
        let mut attempt = 0;
        loop {
            let (row, retryable) = self.fetch_once(date).await;
            if !retryable || attempt >= self.max_retries {
                return row;
            }

            let backoff = self.backoff_for(attempt);
            warn!(
                date = %dates::to_register_key(date),
                error = row.error.as_deref().unwrap_or_default(),
                "fetch failed (attempt {}/{}), backing off {:.1}s",
                attempt + 1,
                self.max_retries,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// `backoff * 2^attempt`, saturating instead of overflowing on large retry counts.
    fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }

    async fn fetch_once(&self, date: NaiveDate) -> (PageRow, bool) {
        let url = self.page_url(date);
        let start = Instant::now();
        let response = self.client.get(&url).send().await;

        let failed = |url: String, status: Option<u16>, error: String, start: Instant| PageRow {
            fetch_date: date,
            url,
            html: None,
            status,
            error: Some(error),
            latency_ms: Some(start.elapsed().as_millis() as i64),
        };

        let resp = match response {
            Ok(resp) => resp,
            Err(e) => {
                let retryable = e.is_timeout() || e.is_connect();
                return (failed(url, None, e.to_string(), start), retryable);
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            return (
                failed(url, Some(status.as_u16()), format!("HTTP {}", status), start),
                retryable,
            );
        }

        match resp.text().await {
            Ok(html) => {
                debug!(url = %url, bytes = html.len(), "fetched register page");
                (
                    PageRow {
                        fetch_date: date,
                        url,
                        html: Some(html),
                        status: Some(status.as_u16()),
                        error: None,
                        latency_ms: Some(start.elapsed().as_millis() as i64),
                    },
                    false,
                )
            }
            Err(e) => {
                let retryable = e.is_timeout();
                (failed(url, Some(status.as_u16()), e.to_string(), start), retryable)
            }
        }
    }
}

/// The page markup, or `SourceUnavailable` if the fetch failed.
pub fn into_html(row: PageRow) -> crate::error::Result<String> {
    match (row.html, row.error) {
        (Some(html), None) => Ok(html),
        (_, error) => Err(RegisterError::SourceUnavailable {
            date: dates::to_register_key(row.fetch_date),
            reason: error.unwrap_or_else(|| "empty response".to_string()),
        }),
    }
}

pub struct BackfillStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

/// Fetch many dates concurrently, saving each page to the store as it arrives.
pub async fn backfill(
    conn: &Connection,
    fetcher: &Fetcher,
    days: Vec<NaiveDate>,
    concurrency: usize,
) -> Result<BackfillStats> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let total = days.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel::<PageRow>(concurrency.max(1) * 2);

    for date in days {
        let fetcher = fetcher.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let row = fetcher.fetch_with_retry(date).await;
            let _ = tx.send(row).await;
        });
    }

    // rx closes once every task has sent its row
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;
    while let Some(row) = rx.recv().await {
        match &row.error {
            Some(e) => {
                warn!(date = %dates::to_iso(row.fetch_date), "fetch failed: {}", e);
                errors += 1;
            }
            None => ok += 1,
        }
        db::save_page(conn, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} dates ({} ok, {} errors)", total, ok, errors);

    Ok(BackfillStats { total, ok, errors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::category::Precedence;

    fn settings() -> Settings {
        Settings {
            db_path: ":memory:".into(),
            base_url: "https://li-public.fmcsa.dot.gov/LIVIEW/PKG_register.prc_reg_detail/".into(),
            timeout_secs: 5,
            concurrency: 2,
            max_retries: 0,
            backoff_ms: 10,
            precedence: Precedence::Declared,
        }
    }

    #[test]
    fn url_uses_register_key() {
        let f = Fetcher::new(&settings()).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 2, 20).unwrap();
        assert_eq!(
            f.page_url(date),
            "https://li-public.fmcsa.dot.gov/LIVIEW/PKG_register.prc_reg_detail?pd_date=20-FEB-26&pv_vpath=LIVIEW"
        );
    }

    #[test]
    fn failed_row_is_source_unavailable() {
        let row = PageRow {
            fetch_date: NaiveDate::from_ymd_opt(2026, 2, 20).unwrap(),
            url: "x".into(),
            html: None,
            status: Some(503),
            error: Some("HTTP 503 Service Unavailable".into()),
            latency_ms: None,
        };
        match into_html(row) {
            Err(RegisterError::SourceUnavailable { date, reason }) => {
                assert_eq!(date, "20-FEB-26");
                assert!(reason.contains("503"));
            }
            other => panic!("unexpected {:?}", other.map(|s| s.len())),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_reported_not_panicked() {
        let mut s = settings();
        s.base_url = "http://127.0.0.1:9/register".into();
        let f = Fetcher::new(&s).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 2, 20).unwrap();
        let err = f.fetch_register_page(date).await.unwrap_err();
        assert!(matches!(err, RegisterError::SourceUnavailable { .. }));
    }

    #[test]
    fn backoff_doubles_then_saturates() {
        let f = Fetcher::new(&settings()).unwrap();
        assert_eq!(f.backoff_for(0), Duration::from_millis(10));
        assert_eq!(f.backoff_for(3), Duration::from_millis(80));
        assert!(f.backoff_for(31) < f.backoff_for(32));
        assert_eq!(f.backoff_for(40), f.backoff_for(32));
    }

    #[tokio::test]
    async fn many_retries_without_backoff_do_not_overflow() {
        let mut s = settings();
        s.base_url = "http://127.0.0.1:9/register".into();
        s.max_retries = 40;
        s.backoff_ms = 0;
        let f = Fetcher::new(&s).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 2, 20).unwrap();
        let row = f.fetch_with_retry(date).await;
        assert!(row.html.is_none());
        assert!(row.error.is_some());
    }
}
