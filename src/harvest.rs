use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::browser::ListingClient;
use crate::config::{CrawlConfig, SEARCH_URL};
use crate::error::CrawlError;
use crate::fetch::BASE_BACKOFF_MS;

const RESULT_COUNT_SELECTOR: &str = "div#contentForm\\:result h4";
const ENTRY_LINK_SELECTOR: &str = "div.entry_title a";

/// Listing url for one result page. `offset` is the 1-based index of the
/// first result on that page.
pub fn listing_url(cfg: &CrawlConfig, offset: u64) -> String {
    format!(
        "{}#searchMode=complex&text={}&dateMode=date&dateFrom={}&dateTo={}&from={}&sort=date+asc&selectedFilters=type%3A{}",
        SEARCH_URL,
        urlencoding::encode(&cfg.search_text),
        cfg.date_from,
        cfg.date_to,
        offset,
        cfg.result_kind
    )
}

/// Leading locale-formatted integer of the listing header, e.g.
/// `1.234 Treffer`. Thousands are '.'-separated.
pub fn parse_result_count(text: &str) -> Result<u64, CrawlError> {
    text.split_whitespace()
        .next()
        .and_then(|token| token.replace('.', "").parse().ok())
        .ok_or_else(|| CrawlError::ResultCount {
            text: text.to_string(),
        })
}

pub fn total_pages(result_count: u64, page_size: u64) -> u64 {
    result_count.div_ceil(page_size)
}

/// Paginate the search-result listing and collect issue links in listing
/// order. Links are not deduplicated here; the store's natural-key lookups
/// take care of repeats.
pub async fn harvest_issue_links<C: ListingClient>(
    client: &mut C,
    cfg: &CrawlConfig,
) -> Result<Vec<String>> {
    navigate_paced(client, &listing_url(cfg, 1), cfg).await?;

    let header = client.read_text(RESULT_COUNT_SELECTOR).await?;
    let result_count = parse_result_count(&header)?;
    let pages = total_pages(result_count, cfg.page_size);
    info!("Expecting {result_count} results on {pages} pages");

    let mut links = Vec::new();
    for page in 1..=pages {
        for element in client.find_all(ENTRY_LINK_SELECTOR).await? {
            match element.href {
                Some(href) => links.push(href),
                None => warn!("Entry link without href on listing page {page}"),
            }
        }
        debug!("Crawled page: {page}/{pages}");
        navigate_paced(client, &listing_url(cfg, 1 + page * cfg.page_size), cfg).await?;
    }

    info!("Extracted {} issue links", links.len());
    Ok(links)
}

/// Navigate with bounded retry, then wait out the pacing delay. The delay is
/// a correctness requirement: the listing renders asynchronously and reading
/// it right after navigation risks an incomplete page.
async fn navigate_paced<C: ListingClient>(
    client: &mut C,
    url: &str,
    cfg: &CrawlConfig,
) -> Result<()> {
    let mut attempt = 0;
    loop {
        match client.navigate(url).await {
            Ok(()) => break,
            Err(e) => {
                if attempt >= cfg.max_retries {
                    return Err(e);
                }
                let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                warn!(
                    "Navigation to {} failed ({}), attempt {}/{}, backing off {:.1}s",
                    url,
                    e,
                    attempt + 1,
                    cfg.max_retries,
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
    tokio::time::sleep(cfg.nap).await;
    Ok(())
}

// ── Checkpoint file ──

/// Persist the harvested link list, one url per line, so the extraction
/// phase can run later without re-harvesting.
pub fn write_checkpoint(path: &Path, links: &[String]) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, links.join("\n"))
        .with_context(|| format!("writing checkpoint {}", path.display()))?;
    Ok(())
}

pub fn read_checkpoint(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading checkpoint {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

// ── Tests ──
