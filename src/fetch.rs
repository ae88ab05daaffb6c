use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::config::{CrawlConfig, TEXT_ENDPOINT};
use crate::date::date_key;

pub const BASE_BACKOFF_MS: u64 = 2000;

/// Second access channel into the archive: bulk issue text comes from a plain
/// content request keyed by `{abbreviation}|{YYYYMMDD}|x`, independent of the
/// browser-driven listing channel.
#[async_trait]
pub trait TextFetcher {
    async fn fetch_issue_text(&self, journal_abbr: &str, issue_date: NaiveDate) -> Result<String>;
}

pub struct AnnoTextFetcher {
    client: reqwest::Client,
    max_retries: u32,
}

impl AnnoTextFetcher {
    pub fn new(cfg: &CrawlConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.http_timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            max_retries: cfg.max_retries,
        })
    }

    async fn try_fetch(&self, text_param: &str) -> Result<String> {
        let response = self
            .client
            .get(TEXT_ENDPOINT)
            .query(&[("text", text_param)])
            .send()
            .await?;
        debug!("Getting issue full text from: {}", response.url());
        let bytes = response.error_for_status()?.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[async_trait]
impl TextFetcher for AnnoTextFetcher {
    async fn fetch_issue_text(&self, journal_abbr: &str, issue_date: NaiveDate) -> Result<String> {
        let text_param = format!("{}|{}|x", journal_abbr, date_key(issue_date));

        let mut attempt = 0;
        loop {
            match self.try_fetch(&text_param).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    if attempt >= self.max_retries || !is_retryable(&e) {
                        return Err(e.context(format!("fetching issue text {text_param:?}")));
                    }
                    let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                    warn!(
                        "Text fetch for {} failed ({}), attempt {}/{}, backing off {:.1}s",
                        text_param,
                        e,
                        attempt + 1,
                        self.max_retries,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Timeouts, connection failures and throttling/server errors are worth a
/// retry; everything else fails the run immediately.
fn is_retryable(error: &anyhow::Error) -> bool {
    let Some(e) = error.downcast_ref::<reqwest::Error>() else {
        return false;
    };
    if e.is_timeout() || e.is_connect() {
        return true;
    }
    match e.status() {
        Some(status) => status.as_u16() == 429 || status.is_server_error(),
        None => false,
    }
}
