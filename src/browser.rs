use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::CrawlError;

/// Snapshot of a matched DOM element. Handles are not kept across calls, so
/// implementations stay swappable and the orchestrator never touches the CDP
/// layer directly.
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub href: Option<String>,
    pub html: String,
}

/// Narrow capability interface over the rendering client used for the
/// listing and issue detail views. The bulk text retrieval deliberately does
/// NOT go through here; see `fetch` for the second access channel.
#[async_trait]
pub trait ListingClient {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Inner text of the first element matching `selector`.
    /// Absence is `CrawlError::MissingElement`.
    async fn read_text(&mut self, selector: &str) -> Result<String>;

    /// Attribute value of the first element matching `selector`.
    async fn read_attr(&mut self, selector: &str, attr: &str) -> Result<String>;

    /// Snapshots of all elements matching `selector`, in document order.
    async fn find_all(&mut self, selector: &str) -> Result<Vec<Element>>;

    /// Release the underlying client. Must be called on every exit path.
    async fn close(&mut self) -> Result<()>;
}

/// Chromium-backed implementation. Owns the browser process, its CDP event
/// handler task and a single tab for the whole crawl session.
pub struct ChromeClient {
    browser: Browser,
    handler: Option<JoinHandle<()>>,
    page: Page,
}

impl ChromeClient {
    pub async fn launch(headless: bool) -> Result<Self> {
        let builder = if headless {
            info!("Launching Chromium headless");
            BrowserConfig::builder()
        } else {
            info!("Launching Chromium with a visible window");
            BrowserConfig::builder().with_head()
        };
        let config = builder
            .window_size(1280, 1024)
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch browser")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("Browser handler error: {e:?}");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open a tab")?;

        Ok(Self {
            browser,
            handler: Some(handler_task),
            page,
        })
    }
}

#[async_trait]
impl ListingClient for ChromeClient {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("navigation to {url} failed"))?;
        Ok(())
    }

    async fn read_text(&mut self, selector: &str) -> Result<String> {
        let element = self.page.find_element(selector).await.map_err(|_| {
            CrawlError::MissingElement {
                selector: selector.to_string(),
            }
        })?;
        Ok(element.inner_text().await?.unwrap_or_default())
    }

    async fn read_attr(&mut self, selector: &str, attr: &str) -> Result<String> {
        let element = self.page.find_element(selector).await.map_err(|_| {
            CrawlError::MissingElement {
                selector: selector.to_string(),
            }
        })?;
        element.attribute(attr).await?.ok_or_else(|| {
            CrawlError::MissingElement {
                selector: format!("{selector}[{attr}]"),
            }
            .into()
        })
    }

    async fn find_all(&mut self, selector: &str) -> Result<Vec<Element>> {
        let matches = match self.page.find_elements(selector).await {
            Ok(elements) => elements,
            Err(e) => {
                debug!("No matches for {selector:?}: {e}");
                return Ok(Vec::new());
            }
        };

        let mut snapshots = Vec::with_capacity(matches.len());
        for element in matches {
            snapshots.push(Element {
                href: element.attribute("href").await.ok().flatten(),
                html: element.inner_html().await.ok().flatten().unwrap_or_default(),
            });
        }
        Ok(snapshots)
    }

    async fn close(&mut self) -> Result<()> {
        self.browser.close().await?;
        self.browser.wait().await?;
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        info!("Browser closed");
        Ok(())
    }
}

impl Drop for ChromeClient {
    fn drop(&mut self) {
        // Fallback for exit paths that never reached close(); the handler
        // task would otherwise outlive the browser process.
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

// ── Test double ──
