mod dates;
mod db;
mod error;
mod fetcher;
mod parser;
mod settings;

use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::fetcher::Fetcher;
use crate::parser::category::{Category, Precedence};
use crate::parser::RegisterEntry;
use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "fmcsa_register", about = "FMCSA Register scraper and decision extractor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, extract and store the register for one date
    Fetch {
        /// Register date, YYYY-MM-DD (default: today, UTC)
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Fetch a range of dates into the page store, then process them
    Backfill {
        /// First date, YYYY-MM-DD
        #[arg(long)]
        from: String,
        /// Last date (inclusive), YYYY-MM-DD (default: today, UTC)
        #[arg(long)]
        to: Option<String>,
    },
    /// Extract entries from stored pages that have not been processed yet
    Process {
        /// Max pages to process (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Extract entries from a local HTML file, or a single live fetch, and print them as JSON
    Extract {
        #[arg(short, long, conflicts_with = "date", required_unless_present = "date")]
        file: Option<std::path::PathBuf>,
        /// Fetch this date once instead of reading a file (nothing is stored)
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Query stored entries
    Query {
        /// Category label, e.g. "REVOCATION"
        #[arg(short, long)]
        category: Option<String>,
        /// Earliest fetch date, YYYY-MM-DD
        #[arg(long)]
        from: Option<String>,
        /// Latest fetch date, YYYY-MM-DD
        #[arg(long)]
        to: Option<String>,
        /// Substring of docket number or title
        #[arg(short, long)]
        search: Option<String>,
        /// Max rows
        #[arg(short = 'n', long, default_value = "100")]
        limit: usize,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Page store statistics and entries per category
    Stats {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load settings")?;
    info!(db = ?settings.db_path, precedence = ?settings.precedence, "settings loaded");

    let result = match cli.command {
        Commands::Fetch { date } => {
            let date = optional_date(date.as_deref())?.unwrap_or_else(dates::today_utc);
            let conn = open_db(&settings)?;
            let fetcher = Fetcher::new(&settings)?;

            println!("Fetching register for {} ({})", dates::to_iso(date), dates::to_register_key(date));
            let row = fetcher.fetch_with_retry(date).await;
            let page_id = db::save_page(&conn, &row)?;
            let html = fetcher::into_html(row)?;

            let extraction = match parser::extract_with(&html, settings.precedence) {
                Ok(x) => x,
                Err(e) => {
                    db::mark_processed(&conn, page_id, 0, Some(&e.to_string()))?;
                    return Err(e.into());
                }
            };
            let r = extraction.report;
            println!(
                "Extracted {} entries ({} matched, {} oversized, {} duplicates)",
                extraction.entries.len(), r.matched, r.oversized, r.duplicates
            );
            print_breakdown(&extraction.entries);

            match db::upsert_entries(&conn, &extraction.entries, date) {
                Ok(n) => {
                    db::mark_processed(&conn, page_id, extraction.entries.len(), None)?;
                    println!("Saved {} entries for {}.", n, dates::to_iso(date));
                    Ok(())
                }
                Err(e) => {
                    // keep the extracted entries visible even though they were not stored
                    println!("{}", serde_json::to_string_pretty(&extraction.entries)?);
                    Err(anyhow::Error::new(e).context("Failed to store entries"))
                }
            }
        }
        Commands::Backfill { from, to } => {
            let from = dates::parse_iso(&from)?;
            let to = optional_date(to.as_deref())?.unwrap_or_else(dates::today_utc);
            let days = dates::days_between(from, to);
            if days.is_empty() {
                println!("Empty range: {} is after {}.", dates::to_iso(from), dates::to_iso(to));
                return Ok(());
            }

            let conn = open_db(&settings)?;
            let fetcher = Fetcher::new(&settings)?;

            let t_fetch = Instant::now();
            println!("Backfill: fetching {} dates ({} concurrent)...", days.len(), settings.concurrency);
            let stats = fetcher::backfill(&conn, &fetcher, days, settings.concurrency).await?;
            println!(
                "Fetched {} dates ({} ok, {} errors) in {:.1}s",
                stats.total, stats.ok, stats.errors, t_fetch.elapsed().as_secs_f64()
            );

            let pending = db::fetch_unprocessed(&conn, None)?;
            if pending.is_empty() {
                println!("Nothing to process (all fetches failed).");
                return Ok(());
            }
            println!("Processing {} pages...", pending.len());
            let counts = process_pages(&conn, &pending, settings.precedence)?;
            counts.print();
            Ok(())
        }
        Commands::Process { limit } => {
            let conn = open_db(&settings)?;
            let pending = db::fetch_unprocessed(&conn, limit)?;
            if pending.is_empty() {
                println!("No pending pages. Run 'fetch' or 'backfill' first.");
                return Ok(());
            }
            println!("Processing {} pages...", pending.len());
            let counts = process_pages(&conn, &pending, settings.precedence)?;
            counts.print();
            Ok(())
        }
        Commands::Extract { file, date } => {
            let html = match (file, optional_date(date.as_deref())?) {
                (Some(file), _) => std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {:?}", file))?,
                (None, Some(date)) => Fetcher::new(&settings)?.fetch_register_page(date).await?,
                (None, None) => anyhow::bail!("either --file or --date is required"),
            };
            let extraction = parser::extract_with(&html, settings.precedence)?;
            println!("{}", serde_json::to_string_pretty(&extraction)?);
            Ok(())
        }
        Commands::Query { category, from, to, search, limit, json } => {
            let filter = db::EntryFilter {
                category: category.as_deref().map(Category::from_label).transpose()?,
                date_from: optional_date(from.as_deref())?,
                date_to: optional_date(to.as_deref())?,
                search,
                limit: Some(limit),
            };
            let conn = open_db(&settings)?;
            let rows = db::query_entries(&conn, &filter)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }
            if rows.is_empty() {
                println!("No entries found.");
                return Ok(());
            }

            println!(
                "{:<10} | {:<12} | {:<10} | {:<28} | {}",
                "Fetched", "Number", "Decided", "Category", "Title"
            );
            println!("{}", "-".repeat(110));
            for r in &rows {
                println!(
                    "{:<10} | {:<12} | {:<10} | {:<28} | {}",
                    dates::to_iso(r.fetch_date),
                    r.number,
                    r.decided,
                    r.category.label(),
                    truncate(&r.title, 60)
                );
            }
            println!("\n{} entries", rows.len());
            Ok(())
        }
        Commands::Stats { from, to } => {
            let from = optional_date(from.as_deref())?;
            let to = optional_date(to.as_deref())?;
            let conn = open_db(&settings)?;

            let s = db::get_stats(&conn)?;
            println!("Pages:        {}", s.pages);
            println!("Fetch errors: {}", s.fetch_errors);
            println!("Invalid:      {}", s.invalid);
            println!("Processed:    {}", s.processed);
            println!("Pending:      {}", s.pending);
            println!("Entries:      {} over {} dates", s.entries, s.dates_with_entries);

            let counts = db::category_counts(&conn, from, to)?;
            if !counts.is_empty() {
                println!("\n--- Categories ---");
                for (category, n) in counts {
                    println!("  {:<30} {:>6}", category.label(), n);
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_db(settings: &Settings) -> anyhow::Result<rusqlite::Connection> {
    let conn = db::connect(&settings.db_path)
        .with_context(|| format!("Failed to open {:?}", settings.db_path))?;
    db::init_schema(&conn)?;
    Ok(conn)
}

fn optional_date(s: Option<&str>) -> anyhow::Result<Option<chrono::NaiveDate>> {
    Ok(s.map(dates::parse_iso).transpose()?)
}

struct ProcessCounts {
    pages: usize,
    invalid: usize,
    entries: usize,
    oversized: usize,
    duplicates: usize,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Saved {} entries from {} pages ({} invalid pages, {} oversized, {} duplicates dropped).",
            self.entries, self.pages, self.invalid, self.oversized, self.duplicates,
        );
    }
}

fn process_pages(
    conn: &rusqlite::Connection,
    pages: &[db::StoredPage],
    precedence: Precedence,
) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts {
        pages: 0,
        invalid: 0,
        entries: 0,
        oversized: 0,
        duplicates: 0,
    };

    // register pages are large; small chunks keep memory bounded
    for chunk in pages.chunks(32) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|page| (page, parser::extract_with(&page.html, precedence)))
            .collect();

        for (page, result) in results {
            counts.pages += 1;
            match result {
                Ok(extraction) => {
                    counts.entries += db::upsert_entries(conn, &extraction.entries, page.fetch_date)?;
                    counts.oversized += extraction.report.oversized;
                    counts.duplicates += extraction.report.duplicates;
                    db::mark_processed(conn, page.id, extraction.entries.len(), None)?;
                }
                Err(e) => {
                    warn!(date = %dates::to_iso(page.fetch_date), "skipping page: {}", e);
                    counts.invalid += 1;
                    db::mark_processed(conn, page.id, 0, Some(&e.to_string()))?;
                }
            }
        }
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn print_breakdown(entries: &[RegisterEntry]) {
    for category in Category::ALL {
        let n = entries.iter().filter(|e| e.category == category).count();
        if n > 0 {
            println!("  {:<30} {:>6}", category.label(), n);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
