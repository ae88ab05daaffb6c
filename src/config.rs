use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::NaiveDate;

use crate::error::CrawlError;

/// Search entry point of the archive. The listing UI renders client-side, so
/// it is driven through the browser channel.
pub const SEARCH_URL: &str = "https://anno.onb.ac.at/anno-suche";

/// Plain content endpoint serving an issue's full text, no rendering needed.
pub const TEXT_ENDPOINT: &str = "https://anno.onb.ac.at/cgi-content/annoshow";

/// What to do when a row with the same url already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Leave existing rows untouched, insert new ones.
    InsertOrSkip,
    /// Overwrite mutable fields of existing rows with freshly crawled values.
    InsertOrUpdate,
    /// Like InsertOrSkip, but stored issues are skipped before any fetch work.
    SkipIfPresent,
}

impl ConflictPolicy {
    /// Map the two CLI flags onto one policy. Both set is a contradiction
    /// (skip the issue entirely vs. overwrite it) and is rejected here,
    /// before any crawl work begins.
    pub fn from_flags(update: bool, skip_existing: bool) -> Result<Self, CrawlError> {
        match (update, skip_existing) {
            (true, true) => Err(CrawlError::ContradictoryPolicies),
            (true, false) => Ok(Self::InsertOrUpdate),
            (false, true) => Ok(Self::SkipIfPresent),
            (false, false) => Ok(Self::InsertOrSkip),
        }
    }
}

/// Immutable per-run configuration. Built once in main from CLI arguments and
/// passed by reference into every component.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Free-text search phrase, may carry a trailing wildcard (`Anarchis*`).
    pub search_text: String,
    /// Listing date bounds, dd.mm.yyyy as the archive expects them.
    pub date_from: String,
    pub date_to: String,
    /// Result-kind filter of the listing query.
    pub result_kind: String,
    /// Results per listing page; the archive serves 10.
    pub page_size: u64,
    /// Pause after every listing navigation. The listing renders
    /// asynchronously, reading it immediately risks an incomplete page.
    pub nap: Duration,
    pub headless: bool,
    pub policy: ConflictPolicy,
    pub http_timeout: Duration,
    pub max_retries: u32,
}

impl CrawlConfig {
    pub fn new(
        search_text: String,
        date_from: String,
        date_to: String,
        headless: bool,
        policy: ConflictPolicy,
    ) -> Self {
        Self {
            search_text,
            date_from,
            date_to,
            result_kind: "journal".to_string(),
            page_size: 10,
            nap: Duration::from_secs(2),
            headless,
            policy,
            http_timeout: Duration::from_secs(60),
            max_retries: 3,
        }
    }

    /// Sanity-check the parts that would otherwise fail mid-crawl.
    pub fn validate(&self) -> Result<()> {
        if self.search_text.trim().is_empty() {
            bail!("search text must not be empty");
        }
        for bound in [&self.date_from, &self.date_to] {
            if NaiveDate::parse_from_str(bound, "%d.%m.%Y").is_err() {
                bail!("date bound {bound:?} is not dd.mm.yyyy");
            }
        }
        if self.page_size == 0 {
            bail!("page size must be positive");
        }
        Ok(())
    }

    /// Search phrase without the wildcard, used in derived file names.
    pub fn slug(&self) -> String {
        self.search_text.replace('*', "")
    }

    /// One store per (search phrase, date range) combination.
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(format!(
            "data/{}_{}-{}.sqlite",
            self.slug(),
            self.date_from,
            self.date_to
        ))
    }

    /// Checkpoint file holding the harvested link list, named from the same
    /// parameters so a later `--skip-harvest` run finds it again.
    pub fn checkpoint_path(&self) -> PathBuf {
        PathBuf::from(format!(
            "data/{}_{}-{}.links.txt",
            self.slug(),
            self.date_from,
            self.date_to
        ))
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn config(policy: ConflictPolicy) -> CrawlConfig {
        CrawlConfig::new(
            "Anarchis*".into(),
            "01.01.1898".into(),
            "31.12.1898".into(),
            true,
            policy,
        )
    }

    #[test]
    fn flags_map_to_policies() {
        assert_eq!(
            ConflictPolicy::from_flags(false, false).unwrap(),
            ConflictPolicy::InsertOrSkip
        );
        assert_eq!(
            ConflictPolicy::from_flags(true, false).unwrap(),
            ConflictPolicy::InsertOrUpdate
        );
        assert_eq!(
            ConflictPolicy::from_flags(false, true).unwrap(),
            ConflictPolicy::SkipIfPresent
        );
    }

    #[test]
    fn contradictory_flags_rejected() {
        let err = ConflictPolicy::from_flags(true, true).unwrap_err();
        assert!(matches!(err, CrawlError::ContradictoryPolicies));
    }

    #[test]
    fn derived_paths_drop_wildcard() {
        let cfg = config(ConflictPolicy::InsertOrSkip);
        assert_eq!(
            cfg.db_path().to_str().unwrap(),
            "data/Anarchis_01.01.1898-31.12.1898.sqlite"
        );
        assert_eq!(
            cfg.checkpoint_path().to_str().unwrap(),
            "data/Anarchis_01.01.1898-31.12.1898.links.txt"
        );
    }

    #[test]
    fn validate_rejects_bad_bounds() {
        let mut cfg = config(ConflictPolicy::InsertOrSkip);
        cfg.date_from = "1898-01-01".into();
        assert!(cfg.validate().is_err());
        assert!(config(ConflictPolicy::InsertOrSkip).validate().is_ok());
    }
}
