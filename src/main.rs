mod browser;
mod config;
mod crawl;
mod date;
mod db;
mod error;
mod fetch;
mod harvest;
mod segment;

use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::browser::{ChromeClient, ListingClient};
use crate::config::{ConflictPolicy, CrawlConfig};
use crate::crawl::{CrawlStats, Crawler};
use crate::fetch::AnnoTextFetcher;

#[derive(Parser)]
#[command(
    name = "anno_harvester",
    about = "Harvest and segment digitized newspaper issues from the ANNO archive"
)]
struct Cli {
    /// Increase output verbosity
    #[arg(long, global = true)]
    verbose: bool,
    /// Run the browser with a visible window
    #[arg(long = "no-headless", global = true)]
    no_headless: bool,
    /// Free-text search phrase, trailing wildcard allowed
    #[arg(long, global = true, default_value = "Anarchis*")]
    text: String,
    /// Lower issue-date bound (dd.mm.yyyy)
    #[arg(long, global = true, default_value = "01.01.1898")]
    date_from: String,
    /// Upper issue-date bound (dd.mm.yyyy)
    #[arg(long, global = true, default_value = "31.12.1898")]
    date_to: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Paginate the search listing and write the issue-link checkpoint file
    Harvest,
    /// Crawl issues: fetch full text, segment pages, persist incrementally
    Crawl {
        /// Reuse the checkpoint file instead of harvesting
        #[arg(long)]
        skip_harvest: bool,
        /// Overwrite stored rows with freshly crawled values
        #[arg(long)]
        update: bool,
        /// Skip issues already stored, before any fetch work
        #[arg(long)]
        skip_existing: bool,
        /// Max issues to process this run
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show store statistics
    Stats,
    /// List stored issues in a date range
    Issues {
        /// Lower bound (dd.mm.yyyy), defaults to the configured range
        #[arg(long)]
        from: Option<String>,
        /// Upper bound (dd.mm.yyyy), defaults to the configured range
        #[arg(long)]
        to: Option<String>,
    },
    /// List the stored pages of one issue
    Pages {
        /// Canonical url of the issue
        issue_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let t0 = Instant::now();
    let result = run(cli).await;

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        info!("Completed. Processing took {}", format_duration(elapsed));
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Harvest => {
            let cfg = CrawlConfig::new(
                cli.text,
                cli.date_from,
                cli.date_to,
                !cli.no_headless,
                ConflictPolicy::InsertOrSkip,
            );
            cfg.validate()?;

            let mut client = ChromeClient::launch(cfg.headless).await?;
            let harvested = harvest::harvest_issue_links(&mut client, &cfg).await;
            close_client(&mut client).await;

            let links = harvested?;
            harvest::write_checkpoint(&cfg.checkpoint_path(), &links)?;
            println!(
                "Harvested {} issue links to {}",
                links.len(),
                cfg.checkpoint_path().display()
            );
            Ok(())
        }
        Commands::Crawl {
            skip_harvest,
            update,
            skip_existing,
            limit,
        } => {
            let policy = ConflictPolicy::from_flags(update, skip_existing)?;
            let cfg = CrawlConfig::new(
                cli.text,
                cli.date_from,
                cli.date_to,
                !cli.no_headless,
                policy,
            );
            cfg.validate()?;

            let conn = db::connect(&cfg.db_path())?;
            db::init_schema(&conn)?;
            info!("Established database connection: {}", cfg.db_path().display());
            let fetcher = AnnoTextFetcher::new(&cfg)?;

            let mut client = ChromeClient::launch(cfg.headless).await?;
            let outcome = crawl_links(&mut client, &fetcher, &conn, &cfg, skip_harvest, limit).await;
            close_client(&mut client).await;

            let stats = outcome?;
            println!("Crawled {} issues ({} skipped).", stats.crawled, stats.skipped);
            Ok(())
        }
        Commands::Stats => {
            let cfg = CrawlConfig::new(
                cli.text,
                cli.date_from,
                cli.date_to,
                true,
                ConflictPolicy::InsertOrSkip,
            );
            let conn = db::connect(&cfg.db_path())?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Journals:     {}", s.journals);
            println!("Issues:       {}", s.issues);
            println!("Pages:        {}", s.pages);
            println!("Hit pages:    {}", s.hits);
            println!("Missing text: {}", s.missing_text);
            Ok(())
        }
        Commands::Issues { from, to } => {
            let cfg = CrawlConfig::new(
                cli.text,
                cli.date_from,
                cli.date_to,
                true,
                ConflictPolicy::InsertOrSkip,
            );
            let conn = db::connect(&cfg.db_path())?;
            db::init_schema(&conn)?;

            let from = date::parse_range_bound(from.as_deref().unwrap_or(&cfg.date_from))?;
            let to = date::parse_range_bound(to.as_deref().unwrap_or(&cfg.date_to))?;
            let rows = db::fetch_issues_in_range(&conn, from, to)?;
            if rows.is_empty() {
                println!("No issues stored in this range.");
                return Ok(());
            }

            println!(
                "{:>4} | {:<10} | {:<28} | {:>5} | {:>4}",
                "#", "Date", "Journal", "Pages", "Hits"
            );
            println!("{}", "-".repeat(64));
            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>4} | {:<10} | {:<28} | {:>5} | {:>4}",
                    i + 1,
                    r.issue_date,
                    truncate(&r.journal_title, 28),
                    r.page_count,
                    r.hit_count
                );
            }
            println!("\n{} issues", rows.len());
            Ok(())
        }
        Commands::Pages { issue_url } => {
            let cfg = CrawlConfig::new(
                cli.text,
                cli.date_from,
                cli.date_to,
                true,
                ConflictPolicy::InsertOrSkip,
            );
            let conn = db::connect(&cfg.db_path())?;
            db::init_schema(&conn)?;

            let Some(issue_id) = db::issue_id_by_url(&conn, &issue_url)? else {
                println!("No stored issue with url {issue_url}");
                return Ok(());
            };
            let pages = db::fetch_pages(&conn, issue_id)?;
            println!("{:>4} | {:>3} | {:>8} | {}", "#", "Hit", "Chars", "Url");
            println!("{}", "-".repeat(72));
            for p in &pages {
                println!(
                    "{:>4} | {:>3} | {:>8} | {}",
                    p.number,
                    if p.hit { "*" } else { "" },
                    p.text.as_ref().map(|t| t.chars().count()).unwrap_or(0),
                    p.url
                );
            }
            println!("\n{} pages", pages.len());
            Ok(())
        }
    }
}

/// Close the browser without masking an error from the work it was used for.
async fn close_client(client: &mut ChromeClient) {
    if let Err(e) = client.close().await {
        tracing::warn!("Failed to close browser cleanly: {e}");
    }
}

/// Resolve the issue-link list (fresh harvest or checkpoint), then run the
/// per-issue crawl over it.
async fn crawl_links(
    client: &mut ChromeClient,
    fetcher: &AnnoTextFetcher,
    conn: &rusqlite::Connection,
    cfg: &CrawlConfig,
    skip_harvest: bool,
    limit: Option<usize>,
) -> Result<CrawlStats> {
    let mut links = if skip_harvest {
        let links = harvest::read_checkpoint(&cfg.checkpoint_path())?;
        info!(
            "Read issue list from {} with {} items",
            cfg.checkpoint_path().display(),
            links.len()
        );
        links
    } else {
        let links = harvest::harvest_issue_links(client, cfg).await?;
        harvest::write_checkpoint(&cfg.checkpoint_path(), &links)?;
        info!("Saved issue list to {}", cfg.checkpoint_path().display());
        links
    };
    if let Some(n) = limit {
        links.truncate(n);
    }

    Crawler::new(client, fetcher, conn, cfg).crawl(&links).await
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
