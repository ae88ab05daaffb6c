use std::path::Path;

use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::ConflictPolicy;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS journals (
            id                INTEGER PRIMARY KEY,
            title             TEXT NOT NULL,
            url               TEXT UNIQUE NOT NULL,
            language          TEXT,
            publication_place TEXT,
            created_at        TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS issues (
            id         INTEGER PRIMARY KEY,
            journal_id INTEGER NOT NULL REFERENCES journals(id),
            issue_date TEXT NOT NULL,
            url        TEXT UNIQUE NOT NULL,
            text       TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_issues_journal ON issues(journal_id);
        CREATE INDEX IF NOT EXISTS idx_issues_date ON issues(issue_date);

        CREATE TABLE IF NOT EXISTS pages (
            id       INTEGER PRIMARY KEY,
            issue_id INTEGER NOT NULL REFERENCES issues(id),
            number   INTEGER NOT NULL,
            text     TEXT,
            hit      BOOLEAN NOT NULL DEFAULT 0,
            url      TEXT UNIQUE NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_pages_issue ON pages(issue_id);
        ",
    )?;
    Ok(())
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// ── Upserts ──
//
// Urls are the natural keys: every write first looks the url up and then
// inserts, updates or leaves the row alone depending on the policy.
// SkipIfPresent writes like InsertOrSkip; its issue-level pre-check lives in
// the orchestrator, before any fetch work happens.

pub struct JournalRow {
    pub title: String,
    pub url: String,
    pub language: Option<String>,
    pub publication_place: Option<String>,
}

pub struct IssueRow {
    pub journal_id: i64,
    pub issue_date: NaiveDate,
    pub url: String,
    pub text: String,
}

pub struct PageRow {
    pub issue_id: i64,
    pub number: u32,
    pub text: Option<String>,
    pub hit: bool,
    pub url: String,
}

pub fn journal_id_by_url(conn: &Connection, url: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row("SELECT id FROM journals WHERE url = ?1", [url], |r| r.get(0))
        .optional()?;
    Ok(id)
}

pub fn issue_id_by_url(conn: &Connection, url: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row("SELECT id FROM issues WHERE url = ?1", [url], |r| r.get(0))
        .optional()?;
    Ok(id)
}

pub fn issue_exists(conn: &Connection, url: &str) -> Result<bool> {
    Ok(issue_id_by_url(conn, url)?.is_some())
}

pub fn upsert_journal(conn: &Connection, policy: ConflictPolicy, row: &JournalRow) -> Result<i64> {
    if let Some(id) = journal_id_by_url(conn, &row.url)? {
        if policy == ConflictPolicy::InsertOrUpdate {
            conn.execute(
                "UPDATE journals SET title = ?1, language = ?2, publication_place = ?3
                 WHERE id = ?4",
                params![row.title, row.language, row.publication_place, id],
            )?;
        }
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO journals (title, url, language, publication_place)
         VALUES (?1, ?2, ?3, ?4)",
        params![row.title, row.url, row.language, row.publication_place],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn upsert_issue(conn: &Connection, policy: ConflictPolicy, row: &IssueRow) -> Result<i64> {
    if let Some(id) = issue_id_by_url(conn, &row.url)? {
        if policy == ConflictPolicy::InsertOrUpdate {
            conn.execute(
                "UPDATE issues SET journal_id = ?1, issue_date = ?2, text = ?3 WHERE id = ?4",
                params![row.journal_id, iso(row.issue_date), row.text, id],
            )?;
        }
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO issues (journal_id, issue_date, url, text) VALUES (?1, ?2, ?3, ?4)",
        params![row.journal_id, iso(row.issue_date), row.url, row.text],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn upsert_page(conn: &Connection, policy: ConflictPolicy, row: &PageRow) -> Result<()> {
    let existing: Option<i64> = conn
        .query_row("SELECT id FROM pages WHERE url = ?1", [&row.url], |r| r.get(0))
        .optional()?;

    if let Some(id) = existing {
        if policy == ConflictPolicy::InsertOrUpdate {
            conn.execute(
                "UPDATE pages SET issue_id = ?1, number = ?2, text = ?3, hit = ?4 WHERE id = ?5",
                params![row.issue_id, row.number, row.text, row.hit, id],
            )?;
        }
        return Ok(());
    }
    conn.execute(
        "INSERT INTO pages (issue_id, number, text, hit, url) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![row.issue_id, row.number, row.text, row.hit, row.url],
    )?;
    Ok(())
}

// ── Projections ──
//
// Read side for the statistics and chart consumers; nothing here mutates
// the store.

pub struct IssueSummary {
    pub id: i64,
    pub journal_title: String,
    pub issue_date: String,
    pub url: String,
    pub page_count: i64,
    pub hit_count: i64,
}

pub fn fetch_issues_in_range(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<IssueSummary>> {
    let mut stmt = conn.prepare(
        "SELECT i.id, j.title, i.issue_date, i.url,
                (SELECT COUNT(*) FROM pages p WHERE p.issue_id = i.id),
                (SELECT COUNT(*) FROM pages p WHERE p.issue_id = i.id AND p.hit = 1)
         FROM issues i
         JOIN journals j ON j.id = i.journal_id
         WHERE i.issue_date >= ?1 AND i.issue_date <= ?2
         ORDER BY i.issue_date, i.id",
    )?;
    let rows = stmt
        .query_map(params![iso(from), iso(to)], |row| {
            Ok(IssueSummary {
                id: row.get(0)?,
                journal_title: row.get(1)?,
                issue_date: row.get(2)?,
                url: row.get(3)?,
                page_count: row.get(4)?,
                hit_count: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct PageRecord {
    pub number: u32,
    pub text: Option<String>,
    pub hit: bool,
    pub url: String,
}

pub fn fetch_pages(conn: &Connection, issue_id: i64) -> Result<Vec<PageRecord>> {
    let mut stmt = conn.prepare(
        "SELECT number, text, hit, url FROM pages WHERE issue_id = ?1 ORDER BY number",
    )?;
    let rows = stmt
        .query_map([issue_id], |row| {
            Ok(PageRecord {
                number: row.get(0)?,
                text: row.get(1)?,
                hit: row.get(2)?,
                url: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub journals: usize,
    pub issues: usize,
    pub pages: usize,
    pub hits: usize,
    pub missing_text: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    Ok(Stats {
        journals: count("SELECT COUNT(*) FROM journals")?,
        issues: count("SELECT COUNT(*) FROM issues")?,
        pages: count("SELECT COUNT(*) FROM pages")?,
        hits: count("SELECT COUNT(*) FROM pages WHERE hit = 1")?,
        missing_text: count("SELECT COUNT(*) FROM pages WHERE text IS NULL")?,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn journal(title: &str) -> JournalRow {
        JournalRow {
            title: title.to_string(),
            url: "http://anno.test/info/bkn".to_string(),
            language: None,
            publication_place: None,
        }
    }

    fn issue(journal_id: i64, text: &str) -> IssueRow {
        IssueRow {
            journal_id,
            issue_date: NaiveDate::from_ymd_opt(1898, 1, 17).unwrap(),
            url: "http://anno.test/bkn/18980117".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn insert_or_skip_is_idempotent() {
        let conn = test_conn();
        let policy = ConflictPolicy::InsertOrSkip;

        let id1 = upsert_journal(&conn, policy, &journal("Bukowiner Nachrichten")).unwrap();
        let id2 = upsert_journal(&conn, policy, &journal("Renamed")).unwrap();
        assert_eq!(id1, id2);

        let count: usize = conn
            .query_row("SELECT COUNT(*) FROM journals", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);

        // Second application must not mutate fields.
        let title: String = conn
            .query_row("SELECT title FROM journals WHERE id = ?1", [id1], |r| r.get(0))
            .unwrap();
        assert_eq!(title, "Bukowiner Nachrichten");
    }

    #[test]
    fn insert_or_update_overwrites_text() {
        let conn = test_conn();
        let jid =
            upsert_journal(&conn, ConflictPolicy::InsertOrSkip, &journal("Bukowiner")).unwrap();

        let id1 = upsert_issue(&conn, ConflictPolicy::InsertOrSkip, &issue(jid, "first")).unwrap();
        let id2 =
            upsert_issue(&conn, ConflictPolicy::InsertOrUpdate, &issue(jid, "second")).unwrap();
        assert_eq!(id1, id2);

        let text: String = conn
            .query_row("SELECT text FROM issues WHERE id = ?1", [id1], |r| r.get(0))
            .unwrap();
        assert_eq!(text, "second");
    }

    #[test]
    fn skip_if_present_writes_like_insert_or_skip() {
        let conn = test_conn();
        let policy = ConflictPolicy::SkipIfPresent;
        let jid = upsert_journal(&conn, policy, &journal("Bukowiner")).unwrap();
        upsert_issue(&conn, policy, &issue(jid, "first")).unwrap();
        upsert_issue(&conn, policy, &issue(jid, "second")).unwrap();

        let text: String = conn
            .query_row("SELECT text FROM issues", [], |r| r.get(0))
            .unwrap();
        assert_eq!(text, "first");
    }

    #[test]
    fn page_upsert_by_url() {
        let conn = test_conn();
        let policy = ConflictPolicy::InsertOrSkip;
        let jid = upsert_journal(&conn, policy, &journal("Bukowiner")).unwrap();
        let iid = upsert_issue(&conn, policy, &issue(jid, "text")).unwrap();

        let page = |text: Option<&str>, hit: bool| PageRow {
            issue_id: iid,
            number: 1,
            text: text.map(String::from),
            hit,
            url: "http://anno.test/bkn/18980117/1".to_string(),
        };

        upsert_page(&conn, policy, &page(Some("body"), false)).unwrap();
        upsert_page(&conn, policy, &page(Some("changed"), true)).unwrap();

        let pages = fetch_pages(&conn, iid).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].text.as_deref(), Some("body"));
        assert!(!pages[0].hit);

        upsert_page(&conn, ConflictPolicy::InsertOrUpdate, &page(Some("changed"), true)).unwrap();
        let pages = fetch_pages(&conn, iid).unwrap();
        assert_eq!(pages[0].text.as_deref(), Some("changed"));
        assert!(pages[0].hit);
    }

    #[test]
    fn issue_existence_by_url() {
        let conn = test_conn();
        let policy = ConflictPolicy::InsertOrSkip;
        let jid = upsert_journal(&conn, policy, &journal("Bukowiner")).unwrap();
        upsert_issue(&conn, policy, &issue(jid, "text")).unwrap();

        assert!(issue_exists(&conn, "http://anno.test/bkn/18980117").unwrap());
        assert!(!issue_exists(&conn, "http://anno.test/bkn/18980118").unwrap());
    }

    #[test]
    fn date_range_projection() {
        let conn = test_conn();
        let policy = ConflictPolicy::InsertOrSkip;
        let jid = upsert_journal(&conn, policy, &journal("Bukowiner")).unwrap();

        for (day, url) in [(10, "http://a/1"), (20, "http://a/2"), (28, "http://a/3")] {
            let row = IssueRow {
                journal_id: jid,
                issue_date: NaiveDate::from_ymd_opt(1898, 2, day).unwrap(),
                url: url.to_string(),
                text: String::new(),
            };
            upsert_issue(&conn, policy, &row).unwrap();
        }

        let summaries = fetch_issues_in_range(
            &conn,
            NaiveDate::from_ymd_opt(1898, 2, 12).unwrap(),
            NaiveDate::from_ymd_opt(1898, 2, 28).unwrap(),
        )
        .unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].issue_date, "1898-02-20");
        assert_eq!(summaries[0].journal_title, "Bukowiner");
    }

    #[test]
    fn stats_count_hits_and_missing_text() {
        let conn = test_conn();
        let policy = ConflictPolicy::InsertOrSkip;
        let jid = upsert_journal(&conn, policy, &journal("Bukowiner")).unwrap();
        let iid = upsert_issue(&conn, policy, &issue(jid, "text")).unwrap();

        for (number, text, hit) in [(1, Some("body"), true), (2, None, false)] {
            upsert_page(
                &conn,
                policy,
                &PageRow {
                    issue_id: iid,
                    number,
                    text: text.map(String::from),
                    hit,
                    url: format!("http://a/p{number}"),
                },
            )
            .unwrap();
        }

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.journals, 1);
        assert_eq!(stats.issues, 1);
        assert_eq!(stats.pages, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.missing_text, 1);
    }
}
