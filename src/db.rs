use std::path::Path;

use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql};
use serde::Serialize;

use crate::dates;
use crate::error::Result;
use crate::parser::category::Category;
use crate::parser::RegisterEntry;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS register_pages (
            id           INTEGER PRIMARY KEY,
            fetch_date   TEXT UNIQUE NOT NULL,
            url          TEXT NOT NULL,
            html         TEXT,
            status       INTEGER,
            error        TEXT,
            latency_ms   INTEGER,
            entry_count  INTEGER,
            fetched_at   TEXT NOT NULL DEFAULT (datetime('now')),
            processed_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_pages_processed ON register_pages(processed_at);

        CREATE TABLE IF NOT EXISTS register_entries (
            id          INTEGER PRIMARY KEY,
            number      TEXT NOT NULL,
            title       TEXT NOT NULL CHECK(length(title) <= 500),
            decided     TEXT NOT NULL,
            category    TEXT NOT NULL CHECK(category IN (
                'NAME CHANGE', 'CERTIFICATE, PERMIT, LICENSE', 'CERTIFICATE OF REGISTRATION',
                'DISMISSAL', 'WITHDRAWAL', 'REVOCATION', 'TRANSFERS',
                'GRANT DECISION NOTICES', 'MISCELLANEOUS')),
            fetch_date  TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(number, fetch_date)
        );
        CREATE INDEX IF NOT EXISTS idx_entries_date ON register_entries(fetch_date);
        CREATE INDEX IF NOT EXISTS idx_entries_category ON register_entries(category);
        ",
    )?;
    Ok(())
}

impl ToSql for Category {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.label()))
    }
}

impl FromSql for Category {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Category::from_label(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

// ── Page store ──

pub struct PageRow {
    pub fetch_date: NaiveDate,
    pub url: String,
    pub html: Option<String>,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

/// Store a fetch result and return its page id. Re-fetching a date replaces
/// the page and makes it pending again.
pub fn save_page(conn: &Connection, row: &PageRow) -> Result<i64> {
    let id = conn.query_row(
        "INSERT INTO register_pages (fetch_date, url, html, status, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(fetch_date) DO UPDATE SET
             url = excluded.url, html = excluded.html, status = excluded.status,
             error = excluded.error, latency_ms = excluded.latency_ms,
             entry_count = NULL, fetched_at = datetime('now'), processed_at = NULL
         RETURNING id",
        rusqlite::params![
            dates::to_iso(row.fetch_date),
            row.url,
            row.html,
            row.status,
            row.error,
            row.latency_ms,
        ],
        |r| r.get(0),
    )?;
    Ok(id)
}

pub struct StoredPage {
    pub id: i64,
    pub fetch_date: NaiveDate,
    pub html: String,
}

/// Successfully fetched pages that have not been extracted yet, oldest date first.
pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<StoredPage>> {
    let sql = format!(
        "SELECT id, fetch_date, html FROM register_pages
         WHERE html IS NOT NULL AND error IS NULL AND processed_at IS NULL
         ORDER BY fetch_date{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StoredPage {
                id: row.get(0)?,
                fetch_date: row.get(1)?,
                html: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// `error` marks the page as terminally invalid; it is not picked up again.
pub fn mark_processed(
    conn: &Connection,
    page_id: i64,
    entry_count: usize,
    error: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE register_pages
         SET processed_at = datetime('now'), entry_count = ?2, error = COALESCE(?3, error)
         WHERE id = ?1",
        rusqlite::params![page_id, entry_count, error],
    )?;
    Ok(())
}

// ── Entries ──

/// Upsert keyed by (number, fetch_date); returns rows written.
pub fn upsert_entries(
    conn: &Connection,
    entries: &[RegisterEntry],
    fetch_date: NaiveDate,
) -> Result<usize> {
    let date = dates::to_iso(fetch_date);
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO register_entries (number, title, decided, category, fetch_date)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(number, fetch_date) DO UPDATE SET
                 title = excluded.title, decided = excluded.decided,
                 category = excluded.category, updated_at = datetime('now')",
        )?;
        for e in entries {
            count += stmt.execute(rusqlite::params![e.number, e.title, e.decided, e.category, date])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryRow {
    pub number: String,
    pub title: String,
    pub decided: String,
    pub category: Category,
    pub fetch_date: NaiveDate,
}

#[derive(Debug, Default, Clone)]
pub struct EntryFilter {
    pub category: Option<Category>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub search: Option<String>,
    pub limit: Option<usize>,
}

fn date_conditions(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    conditions: &mut Vec<String>,
    params: &mut Vec<Box<dyn ToSql>>,
) {
    if let Some(d) = from {
        conditions.push(format!("fetch_date >= ?{}", params.len() + 1));
        params.push(Box::new(dates::to_iso(d)));
    }
    if let Some(d) = to {
        conditions.push(format!("fetch_date <= ?{}", params.len() + 1));
        params.push(Box::new(dates::to_iso(d)));
    }
}

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// Newest fetch date first, document order within a date.
pub fn query_entries(conn: &Connection, filter: &EntryFilter) -> Result<Vec<EntryRow>> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(c) = filter.category {
        conditions.push(format!("category = ?{}", params.len() + 1));
        params.push(Box::new(c));
    }
    date_conditions(filter.date_from, filter.date_to, &mut conditions, &mut params);
    if let Some(term) = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let n = params.len() + 1;
        conditions.push(format!("(number LIKE ?{n} OR title LIKE ?{n})"));
        params.push(Box::new(format!("%{}%", term)));
    }

    let sql = format!(
        "SELECT number, title, decided, category, fetch_date
         FROM register_entries{}
         ORDER BY fetch_date DESC, id{}",
        where_clause(&conditions),
        match filter.limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(EntryRow {
                number: row.get(0)?,
                title: row.get(1)?,
                decided: row.get(2)?,
                category: row.get(3)?,
                fetch_date: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Entry count per category, largest first.
pub fn category_counts(
    conn: &Connection,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<(Category, usize)>> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();
    date_conditions(from, to, &mut conditions, &mut params);

    let sql = format!(
        "SELECT category, COUNT(*) FROM register_entries{}
         GROUP BY category
         ORDER BY COUNT(*) DESC, category",
        where_clause(&conditions)
    );
    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub pages: usize,
    pub fetch_errors: usize,
    pub invalid: usize,
    pub processed: usize,
    pub pending: usize,
    pub entries: usize,
    pub dates_with_entries: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> rusqlite::Result<usize> { conn.query_row(sql, [], |r| r.get(0)) };
    Ok(Stats {
        pages: count("SELECT COUNT(*) FROM register_pages")?,
        fetch_errors: count("SELECT COUNT(*) FROM register_pages WHERE html IS NULL")?,
        invalid: count(
            "SELECT COUNT(*) FROM register_pages WHERE html IS NOT NULL AND error IS NOT NULL",
        )?,
        processed: count("SELECT COUNT(*) FROM register_pages WHERE processed_at IS NOT NULL")?,
        pending: count(
            "SELECT COUNT(*) FROM register_pages
             WHERE html IS NOT NULL AND error IS NULL AND processed_at IS NULL",
        )?,
        entries: count("SELECT COUNT(*) FROM register_entries")?,
        dates_with_entries: count("SELECT COUNT(DISTINCT fetch_date) FROM register_entries")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    fn entry(number: &str, title: &str, category: Category) -> RegisterEntry {
        RegisterEntry {
            number: number.into(),
            title: title.into(),
            decided: "02/19/2026".into(),
            category,
        }
    }

    fn seed(conn: &Connection) {
        upsert_entries(
            conn,
            &[
                entry("MC-1", "ACME TRUCKING CO", Category::NameChange),
                entry("MC-2", "BLUE RIDGE FREIGHT", Category::Revocation),
            ],
            day(19),
        )
        .unwrap();
        upsert_entries(
            conn,
            &[
                entry("MC-3", "ACME LOGISTICS", Category::Revocation),
                entry("FF-4", "OCEANIC FORWARDING", Category::Miscellaneous),
            ],
            day(20),
        )
        .unwrap();
    }

    #[test]
    fn upsert_replaces_by_number_and_date() {
        let conn = mem();
        assert_eq!(upsert_entries(&conn, &[entry("MC-1", "OLD", Category::Miscellaneous)], day(20)).unwrap(), 1);
        assert_eq!(upsert_entries(&conn, &[entry("MC-1", "NEW", Category::Revocation)], day(20)).unwrap(), 1);
        upsert_entries(&conn, &[entry("MC-1", "OTHER DAY", Category::Dismissal)], day(21)).unwrap();

        let rows = query_entries(&conn, &EntryFilter::default()).unwrap();
        assert_eq!(rows.len(), 2);
        let feb20 = rows.iter().find(|r| r.fetch_date == day(20)).unwrap();
        assert_eq!(feb20.title, "NEW");
        assert_eq!(feb20.category, Category::Revocation);
    }

    #[test]
    fn query_filters() {
        let conn = mem();
        seed(&conn);

        let by_cat = query_entries(
            &conn,
            &EntryFilter { category: Some(Category::Revocation), ..Default::default() },
        )
        .unwrap();
        assert_eq!(by_cat.len(), 2);
        // newest date first
        assert_eq!(by_cat[0].number, "MC-3");

        let by_range = query_entries(
            &conn,
            &EntryFilter { date_from: Some(day(20)), date_to: Some(day(20)), ..Default::default() },
        )
        .unwrap();
        let numbers: Vec<&str> = by_range.iter().map(|r| r.number.as_str()).collect();
        assert_eq!(numbers, vec!["MC-3", "FF-4"]);

        let by_search = query_entries(
            &conn,
            &EntryFilter { search: Some("acme".into()), ..Default::default() },
        )
        .unwrap();
        assert_eq!(by_search.len(), 2);

        let by_number = query_entries(
            &conn,
            &EntryFilter { search: Some("FF-4".into()), ..Default::default() },
        )
        .unwrap();
        assert_eq!(by_number.len(), 1);

        let limited = query_entries(&conn, &EntryFilter { limit: Some(1), ..Default::default() }).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn counts_per_category() {
        let conn = mem();
        seed(&conn);
        let all = category_counts(&conn, None, None).unwrap();
        assert_eq!(all[0], (Category::Revocation, 2));
        assert_eq!(all.len(), 3);

        let feb19 = category_counts(&conn, Some(day(19)), Some(day(19))).unwrap();
        assert_eq!(feb19.iter().map(|(_, n)| n).sum::<usize>(), 2);
    }

    #[test]
    fn page_lifecycle() {
        let conn = mem();
        let ok = PageRow {
            fetch_date: day(20),
            url: "https://example.test/?pd_date=20-FEB-26".into(),
            html: Some("<html>FMCSA REGISTER</html>".into()),
            status: Some(200),
            error: None,
            latency_ms: Some(120),
        };
        let first_id = save_page(&conn, &ok).unwrap();
        save_page(
            &conn,
            &PageRow {
                fetch_date: day(21),
                url: "https://example.test/?pd_date=21-FEB-26".into(),
                html: None,
                status: Some(503),
                error: Some("HTTP 503".into()),
                latency_ms: Some(80),
            },
        )
        .unwrap();

        let pending = fetch_unprocessed(&conn, None).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].fetch_date, day(20));

        mark_processed(&conn, pending[0].id, 0, Some("not a register page")).unwrap();
        assert!(fetch_unprocessed(&conn, None).unwrap().is_empty());

        let s = get_stats(&conn).unwrap();
        assert_eq!((s.pages, s.fetch_errors, s.invalid, s.processed, s.pending), (2, 1, 1, 1, 0));

        // refetching makes the date pending again, under the same id
        assert_eq!(save_page(&conn, &ok).unwrap(), first_id);
        assert_eq!(fetch_unprocessed(&conn, None).unwrap().len(), 1);
    }
}
