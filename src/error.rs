use thiserror::Error;

/// Failures the crawl distinguishes beyond plain transport errors.
///
/// Only `MissingElement` is ever recovered from, and only at call sites that
/// can substitute a default (e.g. the per-page hit indicator). Everything else
/// surfaces to the top level and ends the run; previously committed issues
/// stay in the store and a rerun with `--skip-existing` resumes after them.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The listing header did not yield a result count; without it the
    /// page-count arithmetic is undefined, so the harvest aborts.
    #[error("cannot parse result count from listing header {text:?}")]
    ResultCount { text: String },

    #[error("expected element not found: {selector}")]
    MissingElement { selector: String },

    #[error("cannot parse issue date from {text:?}")]
    InvalidDate { text: String },

    #[error("issue url {url:?} carries no journal abbreviation")]
    MissingAbbreviation { url: String },

    #[error("--update and --skip-existing contradict each other; pick one")]
    ContradictoryPolicies,
}
