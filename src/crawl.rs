use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::browser::ListingClient;
use crate::config::{ConflictPolicy, CrawlConfig};
use crate::date::parse_issue_date;
use crate::db::{self, IssueRow, JournalRow, PageRow};
use crate::error::CrawlError;
use crate::fetch::TextFetcher;
use crate::segment::TagSegmenter;

const JOURNAL_TITLE_SELECTOR: &str = "div#tools-media h2.title";
const JOURNAL_INFO_SELECTOR: &str = "div#tools-media-page div.content span.xoom a[title='info']";
const ISSUE_DATE_SELECTOR: &str = "div#tools-main div.content ul li:nth-child(3)";
const PAGE_LINK_SELECTOR: &str = "div#content div.prevws a";

/// Class the listing UI puts on page thumbnails that carry a search-term
/// highlight.
const HIT_MARKER_CLASS: &str = "treffer";

/// Journal abbreviation code, parsed from the fixed-position path segment
/// after `/ANNO/` in an issue url.
pub fn journal_abbreviation(issue_url: &str) -> Result<String, CrawlError> {
    let tail = issue_url.split("/ANNO/").nth(1).unwrap_or("");
    let abbr: String = tail.chars().take(3).collect();
    if abbr.chars().count() == 3 {
        Ok(abbr)
    } else {
        Err(CrawlError::MissingAbbreviation {
            url: issue_url.to_string(),
        })
    }
}

#[derive(Debug)]
pub struct CrawlStats {
    pub crawled: usize,
    pub skipped: usize,
}

/// Drives the per-issue pipeline: detail view -> journal upsert -> date
/// parse -> text fetch -> page enumeration + segmentation -> one commit per
/// issue. Strictly sequential; the browser and the store connection are the
/// only held resources.
pub struct Crawler<'a, C, F> {
    client: &'a mut C,
    fetcher: &'a F,
    conn: &'a Connection,
    cfg: &'a CrawlConfig,
}

impl<'a, C: ListingClient, F: TextFetcher> Crawler<'a, C, F> {
    pub fn new(client: &'a mut C, fetcher: &'a F, conn: &'a Connection, cfg: &'a CrawlConfig) -> Self {
        Self {
            client,
            fetcher,
            conn,
            cfg,
        }
    }

    pub async fn crawl(&mut self, issue_urls: &[String]) -> Result<CrawlStats> {
        let pb = ProgressBar::new(issue_urls.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
                .progress_chars("=> "),
        );

        let mut stats = CrawlStats {
            crawled: 0,
            skipped: 0,
        };

        for url in issue_urls {
            let url = url.trim();
            if url.is_empty() {
                continue;
            }

            // Under SkipIfPresent a stored issue is skipped before any
            // fetch work: no text retrieval, no page enumeration.
            if self.cfg.policy == ConflictPolicy::SkipIfPresent
                && db::issue_exists(self.conn, url)?
            {
                debug!("Skipping issue {url}, already in store");
                stats.skipped += 1;
                pb.inc(1);
                continue;
            }

            self.crawl_issue(url).await?;
            stats.crawled += 1;
            pb.inc(1);
        }

        pb.finish_and_clear();
        info!(
            "Crawled {} issues ({} skipped as already stored)",
            stats.crawled, stats.skipped
        );
        Ok(stats)
    }

    async fn crawl_issue(&mut self, issue_url: &str) -> Result<()> {
        self.client.navigate(issue_url).await?;
        debug!("Crawling issue from {issue_url}");

        let journal_title = self.client.read_text(JOURNAL_TITLE_SELECTOR).await?;
        let journal_url = self.client.read_attr(JOURNAL_INFO_SELECTOR, "href").await?;
        let journal_abbr = journal_abbreviation(issue_url)?;
        debug!("Journal info extracted: {journal_title:?} ({journal_abbr})");

        let date_text = self.client.read_text(ISSUE_DATE_SELECTOR).await?;
        let issue_date = parse_issue_date(date_text.trim())?;

        let issue_text = self
            .fetcher
            .fetch_issue_text(&journal_abbr, issue_date)
            .await?;
        debug!("Issue date {issue_date}, {} bytes of full text", issue_text.len());

        let page_links = self.client.find_all(PAGE_LINK_SELECTOR).await?;
        let segmenter = TagSegmenter::new(&journal_title, issue_date);

        let tx = self.conn.unchecked_transaction()?;
        let journal_id = db::upsert_journal(
            &tx,
            self.cfg.policy,
            &JournalRow {
                title: journal_title,
                url: journal_url,
                language: None,
                publication_place: None,
            },
        )?;
        let issue_id = db::upsert_issue(
            &tx,
            self.cfg.policy,
            &IssueRow {
                journal_id,
                issue_date,
                url: issue_url.to_string(),
                text: issue_text.clone(),
            },
        )?;

        let page_count = page_links.len();
        for (index, link) in page_links.into_iter().enumerate() {
            let number = index as u32 + 1;
            let Some(page_url) = link.href else {
                warn!("Page link {number} of {issue_url} has no href, not stored");
                continue;
            };
            // Absent highlight marker just means the page is not a hit.
            let hit = link.html.contains(HIT_MARKER_CLASS);
            let text = segmenter.page_text(&issue_text, number).map(str::to_string);
            db::upsert_page(
                &tx,
                self.cfg.policy,
                &PageRow {
                    issue_id,
                    number,
                    text,
                    hit,
                    url: page_url,
                },
            )?;
        }
        tx.commit()?;
        debug!("Committed issue {issue_url} with {page_count} pages");
        Ok(())
    }
}

// ── Tests ──
